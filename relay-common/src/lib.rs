//! Relay Common - shared configuration, logging and error types.
//!
//! This crate provides:
//! - Configuration types and loading (file, `.env`, environment)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Small string and size helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    AssistantConfig, ChannelKind, Config, DeliveryConfig, ObservabilityConfig, SessionConfig,
    TelegramConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
