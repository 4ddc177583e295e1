//! Per-direction load status

use std::{fmt, sync::Arc};

use color_eyre::eyre::Report;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::EnumIs;

use super::request::Direction;

/// A fetch failure reported by a [`PagingSource`](super::source::PagingSource).
///
/// The underlying report is shared so that snapshots carrying it stay cheap to clone.
/// Two errors are equal when they render to the same message.
#[derive(Clone)]
pub struct LoadError(Arc<Report>);

impl LoadError {
    pub fn new(report: Report) -> Self {
        Self(Arc::new(report))
    }

    /// Rebuild an opaque error from a persisted message.
    pub fn restored(message: impl Into<String>) -> Self {
        Self::new(Report::msg(message.into()))
    }

    pub fn report(&self) -> &Report {
        &self.0
    }

    pub fn message(&self) -> String {
        self.0.to_string()
    }
}

impl From<Report> for LoadError {
    fn from(report: Report) -> Self {
        Self::new(report)
    }
}

impl fmt::Debug for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoadError").field(&self.message()).finish()
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for LoadError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.message() == other.message()
    }
}

impl Eq for LoadError {}

// Only the message survives persistence; the cause chain is not replayed.
impl Serialize for LoadError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.message())
    }
}

impl<'de> Deserialize<'de> for LoadError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::restored)
    }
}

/// Status of one paging direction
#[derive(Debug, Clone, PartialEq, Eq, EnumIs, Serialize, Deserialize)]
pub enum LoadState {
    /// Not initialized and no request is in flight.
    ///
    /// - For prepend and append: the first refresh has not completed yet.
    /// - For refresh: only observable through a consumer adapter before its first snapshot.
    Idle,
    /// Initialized, idle, more data can be fetched.
    ///
    /// For refresh this means paging has not been started yet.
    NotLoading,
    /// Initialized, idle, end of pagination reached.
    ///
    /// For refresh this means the last refresh completed.
    Complete,
    /// The paging source is performing a request.
    Loading,
    /// The paging source failed. Recoverable by retrying.
    Error(LoadError),
}

impl LoadState {
    /// `NotLoading`, or `Complete` when the end of pagination is reached
    pub fn not_loading(end_of_pagination_reached: bool) -> Self {
        if end_of_pagination_reached {
            Self::Complete
        } else {
            Self::NotLoading
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}

/// Load states of all three directions, always published together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStates {
    pub prepend: LoadState,
    pub append: LoadState,
    pub refresh: LoadState,
}

impl LoadStates {
    pub fn new(prepend: LoadState, append: LoadState, refresh: LoadState) -> Self {
        Self {
            prepend,
            append,
            refresh,
        }
    }

    /// Everything `Idle`, the view of a consumer that has not seen a snapshot yet
    pub fn idle() -> Self {
        Self::new(LoadState::Idle, LoadState::Idle, LoadState::Idle)
    }

    /// Prepend and append reset, refresh in flight
    pub fn refreshing() -> Self {
        Self::new(LoadState::Idle, LoadState::Idle, LoadState::Loading)
    }

    pub fn get(&self, direction: Direction) -> &LoadState {
        match direction {
            Direction::Prepend => &self.prepend,
            Direction::Append => &self.append,
        }
    }

    pub fn set(&mut self, direction: Direction, state: LoadState) {
        match direction {
            Direction::Prepend => self.prepend = state,
            Direction::Append => self.append = state,
        }
    }

    pub fn has_error(&self) -> bool {
        self.refresh.is_error() || self.append.is_error() || self.prepend.is_error()
    }
}

/// The state of a freshly constructed engine: nothing loaded, paging not started
impl Default for LoadStates {
    fn default() -> Self {
        Self::new(LoadState::Idle, LoadState::Idle, LoadState::NotLoading)
    }
}
