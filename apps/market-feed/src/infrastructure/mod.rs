//! Infrastructure Layer
//!
//! Adapters behind the application ports: WebSocket transports, the Upbit
//! codec and REST client, the ticker hub, and the ambient configuration,
//! metrics and telemetry setup.

pub mod broadcast;
pub mod config;
pub mod metrics;
pub mod telemetry;
pub mod transport;
pub mod upbit;
