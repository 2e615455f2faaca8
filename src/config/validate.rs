// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SchedulerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SchedulerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.executor, raw.logging))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_thread_limits(cfg)?;
    Ok(())
}

fn validate_thread_limits(cfg: &RawConfigFile) -> Result<()> {
    if cfg.executor.max_parallel_threads == 0 {
        return Err(SchedulerError::ConfigError(
            "[executor].max_parallel_threads must be >= 1 (got 0)".to_string(),
        ));
    }

    match cfg.executor.parallel_threads {
        Some(0) => Err(SchedulerError::ConfigError(
            "[executor].parallel_threads must be >= 1 (got 0); omit it to use all processing units"
                .to_string(),
        )),
        Some(n) if n > cfg.executor.max_parallel_threads => {
            Err(SchedulerError::ConfigError(format!(
                "[executor].parallel_threads ({}) exceeds max_parallel_threads ({})",
                n, cfg.executor.max_parallel_threads
            )))
        }
        _ => Ok(()),
    }
}
