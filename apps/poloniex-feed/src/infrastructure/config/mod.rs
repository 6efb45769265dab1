//! Configuration Module
//!
//! Configuration loading for the feed binary.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_DEADLINE, DEFAULT_INSTRUMENTS, FeedConfig, InstrumentsFile,
    load_instruments_file,
};
