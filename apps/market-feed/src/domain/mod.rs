//! Domain Layer - Core market data types with no I/O.
//!
//! This layer contains the connection lifecycle model shared by every
//! transport and the market values (tickers, candles, subscriptions)
//! exchanged with the venue.

/// Connection lifecycle states, inbound events and transport errors.
pub mod connection;

/// Tickers, candles, subscription requests and interval specifications.
pub mod market;
