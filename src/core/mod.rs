//! Core runtime infrastructure.
//!
//! This module contains the essential components for running the registry:
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Main runtime orchestration
//! - [`error`] - Error types and gateway status mapping

pub mod config;
pub mod error;
pub mod runtime;
