//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BrassConfig, DispatchConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BrassConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_dispatch(&config.dispatch)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    if logging.max_files == Some(0) {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.max_concurrent_handlers == 0 {
        return Err(ConfigError::validation(
            "dispatch.max_concurrent_handlers must be greater than 0",
        ));
    }
    Ok(())
}
