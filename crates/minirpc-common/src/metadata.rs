//! Call metadata.
//!
//! [`Metadata`] is a multi-valued string map that travels next to a call, the
//! way request headers do. Keys are stored lowercase. Values under one key
//! accumulate: [`Metadata::add`] appends and [`Metadata::merge`] unions both
//! sides without overriding anything.

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

use crate::error::{Result, RpcError};

/// Key carrying the caller's auth token
pub const TOKEN_KEY: &str = "token";
/// Key carrying the caller's identity
pub const LDAP_KEY: &str = "ldap";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(HashMap<String, Vec<String>>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` under `key`. Existing values are kept.
    pub fn add(&mut self, key: impl AsRef<str>, value: impl Into<String>) -> &mut Self {
        self.0
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Builder flavour of [`Metadata::add`].
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Returns the first value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// Returns every value stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the union of `self` and `other`.
    ///
    /// Every (key, value) pair of both operands is kept; values of `other`
    /// are appended after those of `self`. Merging the same operand twice
    /// therefore duplicates its values.
    pub fn merge(&self, other: &Metadata) -> Metadata {
        let mut merged = self.clone();
        for (key, values) in &other.0 {
            merged
                .0
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        merged
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn token(&self) -> Option<&str> {
        self.get(TOKEN_KEY)
    }

    pub fn ldap(&self) -> Option<&str> {
        self.get(LDAP_KEY)
    }

    /// Builds metadata from HTTP headers. Values that are not valid UTF-8
    /// are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut md = Metadata::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                md.add(name.as_str(), value);
            }
        }
        md
    }

    /// Appends every (key, value) pair to `headers`.
    pub fn write_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        for (key, values) in &self.0 {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| RpcError::InvalidMetadata(key.clone()))?;
            for value in values {
                let value = HeaderValue::from_str(value)
                    .map_err(|_| RpcError::InvalidMetadata(key.clone()))?;
                headers.append(name.clone(), value);
            }
        }
        Ok(())
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = Metadata::new();
        for (k, v) in iter {
            md.add(k, v);
        }
        md
    }
}
