use std::path::{Path, PathBuf};

use color_eyre::eyre::Result;
use config::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::cli::Cli;
use crate::{core::PagingConfig, utils};

const CONFIG: &str = include_str!("../../.config/config.json5");

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub _data_dir: PathBuf,
    #[serde(default)]
    pub _config_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceSettings {
    pub total_items: u64,
    pub start_page: u64,
    pub fail_every: u64,
    pub latency_ms: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default, flatten)]
    pub config: AppConfig,
    pub paging: PagingConfig,
    pub source: SourceSettings,
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

impl Settings {
    /// Defaults, overridden by an optional user file in the config directory
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(&utils::get_config_dir(), &utils::get_data_dir())
    }

    pub fn load(config_dir: &Path, data_dir: &Path) -> Result<Self, ConfigError> {
        let mut defaults = Self::defaults()?;
        defaults.config = AppConfig {
            _data_dir: data_dir.to_path_buf(),
            _config_dir: config_dir.to_path_buf(),
        };
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        let config_files = [
            ("config.json5", config::FileFormat::Json5),
            ("config.json", config::FileFormat::Json),
            ("config.yaml", config::FileFormat::Yaml),
            ("config.toml", config::FileFormat::Toml),
            ("config.ini", config::FileFormat::Ini),
        ];
        for (file, format) in &config_files {
            let path = config_dir.join(file);
            if path.exists() {
                info!("Loading settings from {}", path.display());
            }
            builder = builder.add_source(
                config::File::from(path)
                    .format(*format)
                    .required(false),
            );
        }

        builder.build()?.try_deserialize()
    }

    /// The settings embedded in the binary
    pub fn defaults() -> Result<Self, ConfigError> {
        json5::from_str(CONFIG)
            .map_err(|e| ConfigError::Message(format!("Failed to load default config: {e}")))
    }

    /// Command line arguments take precedence over every file
    #[must_use]
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(page_size) = cli.page_size {
            self.paging.page_size = page_size;
        }
        if let Some(initial_load_size) = cli.initial_load_size {
            self.paging.initial_load_size = initial_load_size;
        }
        if let Some(prefetch_distance) = cli.prefetch_distance {
            self.paging.prefetch_distance = prefetch_distance;
        }
        if let Some(total_items) = cli.total_items {
            self.source.total_items = total_items;
        }
        if let Some(start_page) = cli.start_page {
            self.source.start_page = start_page;
        }
        if let Some(fail_every) = cli.fail_every {
            self.source.fail_every = fail_every;
        }
        if let Some(latency_ms) = cli.latency_ms {
            self.source.latency_ms = latency_ms;
        }
        if let Some(state_file) = &cli.state_file {
            self.state_file = Some(state_file.clone());
        }
        self
    }

    pub fn paging_config(&self) -> Result<PagingConfig> {
        self.paging.validate()?;
        Ok(self.paging)
    }

    /// The configured state file, else `state.json` in the data directory
    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.config._data_dir.join("state.json"))
    }
}
