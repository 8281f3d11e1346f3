//! Configuration validation.
//!
//! Checks that required values are present and within valid ranges before
//! the relay starts polling.

use thiserror::Error;

use crate::config::{AssistantConfig, ChannelKind, Config, DeliveryConfig, ObservabilityConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

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

        if self.channel == ChannelKind::Telegram {
            if self.telegram.bot_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
                errors.push(ValidationError::MissingField {
                    field: "telegram.bot_token".into(),
                });
            }
            if self
                .telegram
                .allowed_username
                .as_deref()
                .map_or(true, |u| u.trim().is_empty())
            {
                errors.push(ValidationError::MissingField {
                    field: "telegram.allowed_username".into(),
                });
            }
        }

        if let Err(e) = self.assistant.validate() {
            errors.push(e);
        }
        if let Err(e) = self.delivery.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for AssistantConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.binary.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "assistant.binary".into(),
            });
        }
        if self.prompt_flag.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "assistant.prompt_flag".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "assistant.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for DeliveryConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.inline_limit < 200 {
            return Err(ValidationError::InvalidValue {
                field: "delivery.inline_limit".into(),
                reason: format!("{} is too small (minimum 200)", self.inline_limit),
            });
        }
        if self.max_file_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "delivery.max_file_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["json", "pretty"];

        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {LEVELS:?}"),
            });
        }
        if !FORMATS.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of {FORMATS:?}"),
            });
        }
        Ok(())
    }
}
