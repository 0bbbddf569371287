//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, DispatchConfig, IdStrategy, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_dispatch_config(&config.dispatch)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter target cannot be blank: {target:?}"
        )));
    }

    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.id_strategy == IdStrategy::Sequential && dispatch.id_prefix.trim().is_empty() {
        return Err(ConfigError::missing_field("dispatch.id_prefix"));
    }

    if dispatch.id_prefix.contains(char::is_whitespace) {
        return Err(ConfigError::validation("Id prefix cannot contain whitespace"));
    }

    if dispatch.depth_warning == Some(0) {
        return Err(ConfigError::validation(
            "Depth warning must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = CourierConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some("logs/courier.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_sequential_ids_need_prefix() {
        let mut config = CourierConfig::default();
        config.dispatch.id_prefix = String::new();
        assert!(validate_config(&config).is_ok());

        config.dispatch.id_strategy = IdStrategy::Sequential;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_depth_warning() {
        let mut config = CourierConfig::default();
        config.dispatch.depth_warning = Some(0);
        assert!(validate_config(&config).is_err());

        config.dispatch.depth_warning = None;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_blank_filter_target() {
        let mut config = CourierConfig::default();
        config
            .logging
            .filters
            .insert(" ".to_string(), super::super::schema::LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
