//! MediaGate Gateway Library
//!
//! Core functionality for the MediaGate gateway:
//! - Supervision of the worker process with restart-on-exit
//! - Forwarding of `/api/*` traffic to the worker's HTTP API
//! - Local informational and control endpoints

pub mod proxy;
pub mod routes;
pub mod supervisor;
