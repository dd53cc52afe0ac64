use std::env;
use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{ConfigBuilder, WriteLogger};

/// Names the file logs are written to. Unset means no logging.
pub const LOG_FILE_VAR: &str = "SPRUNNER_LOG";
/// `error`, `warn`, `info`, `debug` or `trace`.
pub const LOG_LEVEL_VAR: &str = "SPRUNNER_LOG_LEVEL";

/// Where logs go. The terminal belongs to the panes, so only a file will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub path: Option<PathBuf>,
    pub level: LevelFilter,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = lookup(LOG_FILE_VAR)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        let level = lookup(LOG_LEVEL_VAR)
            .and_then(|level| level.parse().ok())
            .unwrap_or(LevelFilter::Info);
        Self { path, level }
    }

    pub fn init(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = File::create(path)
            .with_context(|| format!("cannot create log file {}", path.display()))?;
        let config = ConfigBuilder::new().set_thread_level(LevelFilter::Off).build();
        WriteLogger::init(self.level, config, file).context("logger already initialised")?;
        Ok(())
    }
}
