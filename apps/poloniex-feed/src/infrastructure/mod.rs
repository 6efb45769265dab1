//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the ambient
//! services the binary needs.

/// Poloniex push API codec, transport and session.
pub mod poloniex;

/// mpsc adapter for session events.
pub mod sink;

/// Environment and file configuration.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
