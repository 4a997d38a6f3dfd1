//! Configuration validation.
//!
//! Checks that credentials are present for every enabled transport and
//! that numeric settings are usable before the relay starts.

use thiserror::Error;

use crate::config::{AccessConfig, BackendConfig, Config, ObservabilityConfig, ProgressConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !self.telegram.enabled && !self.cli.enabled {
            errors.push(ValidationError::Conflict {
                reason: "no transport enabled (telegram.enabled or cli.enabled)".into(),
            });
        }

        if self.telegram.enabled
            && self
                .telegram
                .bot_token
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
        {
            errors.push(ValidationError::MissingField {
                field: "telegram.bot_token (TELEGRAM_TOKEN)".into(),
            });
        }

        let sections: [&dyn Validate; 4] = [
            &self.backend,
            &self.access,
            &self.progress,
            &self.observability,
        ];
        for section in sections {
            if let Err(e) = section.validate() {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load with environment overrides and validate.
    pub fn load_and_validate() -> crate::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate()?;
        Ok(config)
    }
}

impl Validate for BackendConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(ValidationError::MissingField {
                field: "backend.api_key (CHATGPT_TOKEN)".into(),
            });
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "backend.base_url".into(),
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }

        Ok(())
    }
}

impl Validate for AccessConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.restricted && self.allowed_users.is_empty() {
            return Err(ValidationError::MissingField {
                field: "access.allowed_users (WHITELISTED_TELEGRAM_IDS)".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ProgressConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.interval_ms == 0 {
            return Err(ValidationError::InvalidValue {
                field: "progress.interval_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("expected one of {}", LEVELS.join(", ")),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = Some("123:ABC".into());
        config.backend.api_key = Some("sk-test".into());
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_telegram_token() {
        let mut config = valid_config();
        config.telegram.bot_token = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_TOKEN"));
    }

    #[test]
    fn test_cli_only_needs_no_telegram_token() {
        let mut config = valid_config();
        config.telegram.enabled = false;
        config.telegram.bot_token = None;
        config.cli.enabled = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_restricted_without_allow_list() {
        let mut config = valid_config();
        config.access.restricted = true;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { .. }));
        assert!(err.to_string().contains("WHITELISTED_TELEGRAM_IDS"));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.progress.interval_ms = 0;
        let err = config.validate().unwrap_err();
        match err {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other}"),
        }
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = valid_config();
        config.observability.log_level = "loud".into();
        assert!(config.validate().is_err());
    }
}
