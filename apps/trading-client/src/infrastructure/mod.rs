//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus process-level
//! concerns: configuration, logging and metrics.

/// Configuration loaded from the environment.
pub mod config;

/// `reqwest` command transport.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// WebSocket event channel and decoder.
pub mod stream;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
