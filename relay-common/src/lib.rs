//! Relay Common - Shared types and utilities for the chat relay.
//!
//! This crate provides:
//! - Configuration types and loading (file, `.env`, environment)
//! - Configuration validation
//! - Error types
//! - Logging setup and trace id helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    AccessConfig, BackendConfig, CliConfig, Config, ObservabilityConfig, ProgressConfig,
    ServerConfig, TelegramConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
