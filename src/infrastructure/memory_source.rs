use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use color_eyre::eyre::{bail, Result};
use tokio::time::sleep;
use tracing::debug;

use super::config::SourceSettings;
use crate::core::{LoadParams, LoadedPage, PagingSource};

/// Numbers `0..total_items` split into pages of a fixed length, keyed by page number.
///
/// Can simulate latency and fail every Nth load.
#[derive(Debug)]
pub struct MemorySource {
    total_items: u64,
    page_len: u64,
    fail_every: u64,
    latency: Duration,
    loads: AtomicU64,
}

impl MemorySource {
    pub fn new(total_items: u64, page_len: u64) -> Self {
        Self {
            total_items,
            page_len: page_len.max(1),
            fail_every: 0,
            latency: Duration::ZERO,
            loads: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &SourceSettings, page_len: u64) -> Self {
        Self::new(settings.total_items, page_len)
            .with_failures(settings.fail_every)
            .with_latency(Duration::from_millis(settings.latency_ms))
    }

    #[must_use]
    pub fn with_failures(mut self, fail_every: u64) -> Self {
        self.fail_every = fail_every;
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn page_count(&self) -> u64 {
        self.total_items.div_ceil(self.page_len)
    }

    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PagingSource<u64, u64> for MemorySource {
    async fn load(&self, params: LoadParams<u64>) -> Result<LoadedPage<u64, u64>> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(page = params.key, params.requested_size, attempt, "Loading page");
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        if self.fail_every > 0 && attempt % self.fail_every == 0 {
            bail!("Simulated failure on load #{attempt}");
        }

        let page = params.key;
        let start = page.saturating_mul(self.page_len).min(self.total_items);
        let end = start.saturating_add(self.page_len).min(self.total_items);
        let prev_key = page.checked_sub(1).filter(|prev| *prev < self.page_count());
        let next_key = Some(page + 1).filter(|next| *next < self.page_count());
        Ok(LoadedPage::new((start..end).collect(), prev_key, next_key))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::*;

    use super::*;

    fn params(key: u64) -> LoadParams<u64> {
        LoadParams {
            key,
            requested_size: 4,
        }
    }

    #[rstest]
    #[case::first(0, vec![0, 1, 2, 3], None, Some(1))]
    #[case::middle(1, vec![4, 5, 6, 7], Some(0), Some(2))]
    #[case::last_is_short(2, vec![8, 9], Some(1), None)]
    #[tokio::test]
    async fn test_pages(
        #[case] key: u64,
        #[case] data: Vec<u64>,
        #[case] prev_key: Option<u64>,
        #[case] next_key: Option<u64>,
    ) -> Result<()> {
        let source = MemorySource::new(10, 4);
        assert_eq!(
            source.load(params(key)).await?,
            LoadedPage::new(data, prev_key, next_key)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_fail_every() {
        let source = MemorySource::new(10, 4).with_failures(2);
        assert!(source.load(params(0)).await.is_ok());
        assert!(source.load(params(0)).await.is_err());
        assert!(source.load(params(0)).await.is_ok());
        assert_eq!(source.loads(), 3);
    }

    #[tokio::test]
    async fn test_empty_source() -> Result<()> {
        let source = MemorySource::new(0, 4);
        assert_eq!(source.page_count(), 0);
        assert_eq!(
            source.load(params(0)).await?,
            LoadedPage::new(Vec::new(), None, None)
        );
        Ok(())
    }
}
