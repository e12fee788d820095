//! Host Telemetry Endpoint - liveness checks and point-in-time OS metrics
//! over HTTP.
//!
//! Exposed as a library so integration tests can drive the router without
//! binding a socket.

pub mod metrics;
pub mod server;
