//! Upbit Stream Codec
//!
//! Encodes ticker subscriptions and decodes inbound stream payloads.
//! Upbit sends JSON as binary frames; a payload is either a single object
//! or an array of objects. Status keepalives are recognized and reported
//! separately from tickers.

use serde_json::Value;

use crate::application::ports::{CodecError, DecodedFrame, FrameCodec};
use crate::domain::market::{SubscriptionRequest, TickerValue};
use crate::infrastructure::upbit::messages::{
    ErrorMessage, StatusMessage, SubscriptionElement, TICKER_TYPE, TickerMessage,
};

/// JSON codec for the Upbit ticker stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpbitCodec;

enum Element {
    Ticker(TickerValue),
    Status(String),
}

impl UpbitCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decode_value(value: Value) -> Result<Element, CodecError> {
        if !value.is_object() {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got {}",
                kind_of(&value)
            )));
        }

        if value.get("status").is_some() {
            let status: StatusMessage = serde_json::from_value(value)?;
            return Ok(Element::Status(status.status));
        }

        if value.get("error").is_some() {
            let error: ErrorMessage = serde_json::from_value(value)?;
            return Err(CodecError::Venue {
                name: error.error.name,
                message: error.error.message,
            });
        }

        let msg_type = value
            .get("type")
            .or_else(|| value.get("ty"))
            .and_then(Value::as_str);
        if let Some(kind) = msg_type
            && kind != TICKER_TYPE
        {
            return Err(CodecError::UnknownMessageType(kind.to_string()));
        }

        let message: TickerMessage = serde_json::from_value(value)?;
        Ok(Element::Ticker(message.into_ticker()))
    }
}

impl FrameCodec for UpbitCodec {
    fn encode_subscription(&self, request: &SubscriptionRequest) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&SubscriptionElement::ticker_frame(
            request,
        ))?)
    }

    fn decode(&self, payload: &[u8]) -> Result<DecodedFrame, CodecError> {
        let value: Value = serde_json::from_slice(payload)?;

        match value {
            Value::Array(items) => {
                let mut tickers = Vec::with_capacity(items.len());
                let mut status = None;
                for item in items {
                    match Self::decode_value(item)? {
                        Element::Ticker(ticker) => tickers.push(ticker),
                        Element::Status(s) => status = Some(s),
                    }
                }
                match status {
                    Some(s) if tickers.is_empty() => Ok(DecodedFrame::Status(s)),
                    _ => Ok(DecodedFrame::Tickers(tickers)),
                }
            }
            other => match Self::decode_value(other)? {
                Element::Ticker(ticker) => Ok(DecodedFrame::Tickers(vec![ticker])),
                Element::Status(s) => Ok(DecodedFrame::Status(s)),
            },
        }
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
