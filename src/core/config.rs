//! Paging configuration

use color_eyre::eyre::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Sizes used by the engine and the consumer adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Requested size of every prepend and append fetch
    pub page_size: usize,
    /// Requested size of the refresh fetch, may be larger to fill the first screen
    pub initial_load_size: usize,
    /// How close to an edge of the loaded window an access must be to trigger a fetch
    pub prefetch_distance: usize,
}

impl PagingConfig {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            initial_load_size: page_size,
            prefetch_distance: page_size,
        }
    }

    #[must_use]
    pub fn with_initial_load_size(mut self, initial_load_size: usize) -> Self {
        self.initial_load_size = initial_load_size;
        self
    }

    #[must_use]
    pub fn with_prefetch_distance(mut self, prefetch_distance: usize) -> Self {
        self.prefetch_distance = prefetch_distance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.page_size > 0, "page_size must be greater than zero");
        ensure!(
            self.initial_load_size > 0,
            "initial_load_size must be greater than zero"
        );
        Ok(())
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_new_uses_page_size_everywhere() {
        let config = PagingConfig::new(10);
        assert_eq!(config.initial_load_size, 10);
        assert_eq!(config.prefetch_distance, 10);
    }

    #[test]
    fn test_builders() {
        let config = PagingConfig::new(10)
            .with_initial_load_size(30)
            .with_prefetch_distance(3);
        assert_eq!(
            config,
            PagingConfig {
                page_size: 10,
                initial_load_size: 30,
                prefetch_distance: 3,
            }
        );
    }

    #[test]
    fn test_validate() {
        assert!(PagingConfig::new(1).validate().is_ok());
        assert!(PagingConfig::new(0).validate().is_err());
        assert!(PagingConfig::new(5)
            .with_initial_load_size(0)
            .validate()
            .is_err());
        // a zero prefetch distance only disables prefetching
        assert!(PagingConfig::new(5)
            .with_prefetch_distance(0)
            .validate()
            .is_ok());
    }
}
