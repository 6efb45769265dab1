//! Application Layer - Port definitions.
//!
//! The contracts the feed session needs from the outside world: a way to
//! dial the push API and a place to deliver events.

/// Port interfaces for the feed connection and event delivery.
pub mod ports;
