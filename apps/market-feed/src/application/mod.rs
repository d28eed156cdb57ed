//! Application Layer - Ports and services.
//!
//! Ports describe what the services need from the outside world
//! (a streaming transport, a candle source, a clock); services implement
//! the ticker stream and the historical series fetch on top of them.

/// Port traits and feed plumbing.
pub mod ports;

/// Ticker stream and historical fetch services.
pub mod services;
