//! Response envelopes and the wrap/unwrap capability.
//!
//! Some callers expect every response as `{code, msg, data}`. Whether a type
//! travels enveloped is a static property of the type: [`Payload::WRAP`]
//! makes a server embed results (and errors) in an [`Envelope`], and
//! [`Payload::UNWRAP`] makes a client decode through one and check its code.
//! Wrap any payload in [`Enveloped`] to opt in.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::code;

/// Wire shape of an enveloped response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// A success envelope around `data`.
    pub fn success(data: T) -> Self {
        Envelope {
            code: code::OK,
            msg: code::SUCCESS_MSG.to_string(),
            data: Some(data),
        }
    }

    /// An error envelope with no data.
    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Envelope {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// A value that can be sent as a request or returned as a response.
pub trait Payload: Serialize + DeserializeOwned + Send + 'static {
    /// Servers embed this type in an [`Envelope`].
    const WRAP: bool = false;
    /// Clients decode this type through an [`Envelope`].
    const UNWRAP: bool = false;
}

macro_rules! raw_payload {
    ($($ty:ty),* $(,)?) => {
        $(impl Payload for $ty {})*
    };
}

raw_payload!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    serde_json::Value,
);

impl<T: Serialize + DeserializeOwned + Send + 'static> Payload for Vec<T> {}
impl<T: Serialize + DeserializeOwned + Send + 'static> Payload for Option<T> {}
impl<T: Serialize + DeserializeOwned + Send + 'static> Payload for HashMap<String, T> {}
impl<T: Serialize + DeserializeOwned + Send + 'static> Payload for BTreeMap<String, T> {}

/// Opts `T` into the envelope convention on both sides of a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Enveloped<T>(pub T);

impl<T: Serialize + DeserializeOwned + Send + 'static> Payload for Enveloped<T> {
    const WRAP: bool = true;
    const UNWRAP: bool = true;
}

impl<T> Enveloped<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}
