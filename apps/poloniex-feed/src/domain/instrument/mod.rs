//! Instruments and Channel Mapping
//!
//! A configured instrument symbol is written `BASE_QUOTE` (e.g. `BTC_USDT`),
//! while the Poloniex push API names the matching order book channel the
//! other way round (`USDT_BTC`). This module converts between the two.
//!
//! # Example
//!
//! ```rust
//! use poloniex_feed::domain::instrument::Instrument;
//!
//! let btc = Instrument::parse("BTC_USDT").unwrap();
//! assert_eq!(btc.channel(), "USDT_BTC");
//! assert_eq!(Instrument::from_channel("USDT_BTC").unwrap(), btc);
//! ```

use std::fmt;

/// Separator between the two asset codes, both in symbols and channel names.
pub const SEPARATOR: char = '_';

/// Errors produced while mapping symbols and channel names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    /// Input did not contain exactly two non-empty components.
    #[error("invalid instrument format: {input:?}")]
    InvalidInstrumentFormat {
        /// The offending input.
        input: String,
    },
}

/// A tradable pair of asset codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instrument {
    base: String,
    quote: String,
}

impl Instrument {
    /// Parse a configured `BASE_QUOTE` symbol.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentError::InvalidInstrumentFormat`] unless the input
    /// has exactly two non-empty components.
    pub fn parse(symbol: &str) -> Result<Self, InstrumentError> {
        let (base, quote) = split_pair(symbol)?;
        Ok(Self {
            base: base.to_string(),
            quote: quote.to_string(),
        })
    }

    /// Recover an instrument from a wire channel name (`QUOTE_BASE`).
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentError::InvalidInstrumentFormat`] for malformed names.
    pub fn from_channel(channel: &str) -> Result<Self, InstrumentError> {
        let (quote, base) = split_pair(channel)?;
        Ok(Self {
            base: base.to_string(),
            quote: quote.to_string(),
        })
    }

    /// Base asset code (`BTC` in `BTC_USDT`).
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote asset code (`USDT` in `BTC_USDT`).
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Configured symbol, `BASE_QUOTE`.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}{SEPARATOR}{}", self.base, self.quote)
    }

    /// Wire channel name, `QUOTE_BASE`.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("{}{SEPARATOR}{}", self.quote, self.base)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.base, self.quote)
    }
}

/// Map a configured symbol straight to its channel name.
///
/// # Errors
///
/// Returns [`InstrumentError::InvalidInstrumentFormat`] for malformed symbols.
pub fn to_channel(symbol: &str) -> Result<String, InstrumentError> {
    Instrument::parse(symbol).map(|instrument| instrument.channel())
}

fn split_pair(input: &str) -> Result<(&str, &str), InstrumentError> {
    let invalid = || InstrumentError::InvalidInstrumentFormat {
        input: input.to_string(),
    };

    let mut parts = input.split(SEPARATOR);
    let (Some(first), Some(second), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    if first.is_empty() || second.is_empty() {
        return Err(invalid());
    }

    Ok((first, second))
}
