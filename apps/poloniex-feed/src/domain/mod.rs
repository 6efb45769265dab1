//! Domain Layer - Core feed types and routing logic.
//!
//! Pure types with no I/O: instruments and channel naming, decoded records,
//! sequence tracking and channel-id routing.

/// Instrument symbols and wire channel naming.
pub mod instrument;

/// Decoded order book records.
pub mod records;

/// Channel id to instrument routing.
pub mod routing;

/// Per-channel sequence number tracking.
pub mod sequence;
