//! Request forwarding to the worker's HTTP API.

pub mod client;
pub mod error;

#[cfg(test)]
mod tests;

pub use client::{ProxyRequest, ProxyResponse, WorkerClient, WorkerClientConfig, forwarded_headers};
pub use error::{ErrorEnvelope, ProxyError};
