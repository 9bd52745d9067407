//! Pluggable payload codecs.
//!
//! A [`Codec`] turns values into request/response bodies and back. It works
//! over the serde data model (`serde_json::Value`) so it stays object safe and
//! can be swapped per client, per call or per server. The typed helpers
//! [`encode`] and [`decode`] bridge concrete Rust types.

use hyper::body::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

use crate::error::Result;

/// Encodes values into bodies and decodes bodies into values.
pub trait Codec: Send + Sync + Debug {
    /// MIME type written as `Content-Type` on requests and responses.
    fn content_type(&self) -> &'static str;

    /// Encodes a value into a body.
    fn encode_value(&self, value: &Value) -> Result<Bytes>;

    /// Decodes a body into a value.
    ///
    /// An empty body decodes as `null`.
    fn decode_value(&self, body: &[u8]) -> Result<Value>;
}

/// The default codec: plain JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_value(&self, value: &Value) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode_value(&self, body: &[u8]) -> Result<Value> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(body)?)
    }
}

/// Encodes a typed value with `codec`.
pub fn encode<T: Serialize + ?Sized>(codec: &dyn Codec, value: &T) -> Result<Bytes> {
    let value = serde_json::to_value(value)?;
    codec.encode_value(&value)
}

/// Decodes a typed value with `codec`.
pub fn decode<T: DeserializeOwned>(codec: &dyn Codec, body: &[u8]) -> Result<T> {
    let value = codec.decode_value(body)?;
    Ok(serde_json::from_value(value)?)
}
