use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Origin class of a response, mirroring the fetch standard's response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response with CORS headers.
    Cors,
    /// Cross-origin response whose contents are hidden.
    Opaque,
    /// Synthetic error response.
    Error,
}

/// A response produced by the cache, the network, or the worker itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "base64_body")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub response_type: ResponseType,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: Self::reason(status),
            headers: BTreeMap::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
        }
    }

    /// Placeholder served when neither the cache nor the network answered.
    pub fn gateway_timeout() -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT.as_u16(), Vec::new())
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only successful same-origin responses are written back to the cache.
    pub fn is_cacheable(&self) -> bool {
        self.is_ok() && self.response_type == ResponseType::Basic
    }

    fn reason(status: u16) -> String {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string()
    }
}

/// Bodies are stored as base64 strings rather than arrays of numbers.
mod base64_body {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}
