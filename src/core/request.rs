//! Requests accepted by the engine and the bus carrying them

use std::fmt;

use color_eyre::eyre::{eyre, Result};
use strum::Display;
use tokio::sync::mpsc;

/// Edge of the loaded window a push extends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Direction {
    Prepend,
    Append,
}

/// A request for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingRequest<K> {
    /// Reload the window from the initial key
    Refresh,
    /// Refresh, unless the engine has already started paging.
    ///
    /// Sent by views that start the engine themselves; any number of them collapse into one
    /// refresh.
    Start,
    /// Load the page after the last loaded page
    Append,
    /// Load the page before the first loaded page
    Prepend,
    /// Load the page beyond `key`, unless that edge has moved on since the requester looked.
    ///
    /// Issued by consumers prefetching near an edge, so that several consumers (or several
    /// accesses before the next snapshot arrives) collapse into a single fetch.
    Prefetch { direction: Direction, key: K },
}

impl<K> PagingRequest<K> {
    pub fn push(direction: Direction) -> Self {
        match direction {
            Direction::Prepend => Self::Prepend,
            Direction::Append => Self::Append,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::Refresh | Self::Start => None,
            Self::Append => Some(Direction::Append),
            Self::Prepend => Some(Direction::Prepend),
            Self::Prefetch { direction, .. } => Some(*direction),
        }
    }
}

/// Sending half of one engine's request queue.
///
/// Any number of clones may send concurrently; the engine consumes requests one at a time
/// in arrival order.
pub struct RequestBus<K> {
    tx: mpsc::UnboundedSender<PagingRequest<K>>,
}

impl<K> RequestBus<K> {
    /// Create a bus and the receiver an engine consumes it with
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PagingRequest<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, request: PagingRequest<K>) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| eyre!("Request bus is closed, the pager is no longer running"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles feed the same engine
    pub fn same_bus(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl<K> Clone for RequestBus<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K> fmt::Debug for RequestBus<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBus")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_direction_of_requests() {
        assert_eq!(PagingRequest::<u32>::Refresh.direction(), None);
        assert_eq!(PagingRequest::<u32>::Start.direction(), None);
        assert_eq!(
            PagingRequest::<u32>::push(Direction::Append),
            PagingRequest::Append
        );
        assert_eq!(
            PagingRequest::Prefetch {
                direction: Direction::Prepend,
                key: 3
            }
            .direction(),
            Some(Direction::Prepend)
        );
    }

    #[tokio::test]
    async fn test_bus_preserves_arrival_order_across_clones() {
        let (bus, mut rx) = RequestBus::<u32>::channel();
        let other = bus.clone();

        assert!(bus.send(PagingRequest::Refresh).is_ok());
        assert!(other.send(PagingRequest::Append).is_ok());
        assert!(bus.send(PagingRequest::Prepend).is_ok());

        assert_eq!(rx.recv().await, Some(PagingRequest::Refresh));
        assert_eq!(rx.recv().await, Some(PagingRequest::Append));
        assert_eq!(rx.recv().await, Some(PagingRequest::Prepend));
        assert!(bus.same_bus(&other));
    }

    #[test]
    fn test_send_fails_when_engine_is_gone() {
        let (bus, rx) = RequestBus::<u32>::channel();
        drop(rx);
        assert!(bus.is_closed());
        assert!(bus.send(PagingRequest::Refresh).is_err());
    }
}
