//! Request envelope carried through the resilience layer
//!
//! The executor never inspects the payload. Headers exist so a fallback
//! result can be routed back to its caller: the correlation id ties the
//! result to the originating request and `reply_to` names the delivery
//! target for whatever boundary consumes the result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every request entering the resilience layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeaders {
    /// Unique id correlating the request with its response or fallback
    pub correlation_id: Uuid,
    /// Delivery target for the reply, if the caller expects one
    pub reply_to: Option<String>,
    /// Free-form metadata preserved verbatim through the fallback path
    pub attributes: BTreeMap<String, String>,
}

impl RequestHeaders {
    /// Create headers with a fresh correlation id and no reply target
    pub fn new() -> Self {
        Self { correlation_id: Uuid::new_v4(), reply_to: None, attributes: BTreeMap::new() }
    }

    /// Set the reply delivery target
    pub fn with_reply_to(mut self, target: impl Into<String>) -> Self {
        self.reply_to = Some(target.into());
        self
    }

    /// Attach a free-form attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self::new()
    }
}

/// A request envelope: opaque payload plus routing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request<T> {
    headers: RequestHeaders,
    payload: T,
}

impl<T> Request<T> {
    /// Wrap a payload with fresh headers
    pub fn new(payload: T) -> Self {
        Self { headers: RequestHeaders::new(), payload }
    }

    /// Wrap a payload with the given headers
    pub fn with_headers(payload: T, headers: RequestHeaders) -> Self {
        Self { headers, payload }
    }

    /// The request's routing metadata
    pub fn headers(&self) -> &RequestHeaders {
        &self.headers
    }

    /// The request's payload
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consume the envelope and return the payload
    pub fn into_payload(self) -> T {
        self.payload
    }
}
