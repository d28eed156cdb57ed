//! Upbit venue adapters: stream wire format and REST candle client.

pub mod codec;
pub mod messages;
pub mod rest;

pub use codec::UpbitCodec;
pub use rest::UpbitRestClient;
