//! Core types and utilities for fluxion
//!
//! # Modules
//!
//! - `config`: Environment loading and resolved application settings
//! - `error`: Error types and Result alias
//! - `text`: Small text helpers shared by logging and formatting

pub mod config;
pub mod error;
pub mod text;

// Re-exports
pub use config::AppConfig;
pub use error::{Error, Result};
pub use text::{truncate_chars, truncate_text};
