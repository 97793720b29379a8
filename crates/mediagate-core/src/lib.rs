//! `MediaGate` Core Library
//!
//! Shared functionality for the `MediaGate` gateway:
//! - Configuration resolution and hierarchy
//! - Tracing subscriber setup
//! - Common error types

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::{Config, GatewayConfig, WorkerConfig};
pub use error::{Error, Result};
