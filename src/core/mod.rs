//! Core infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Process runtime for the binary
//! - [`time`] - Tick and wall-clock time domains
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;
