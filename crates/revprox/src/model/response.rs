use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};
use std::time::SystemTime;

/// A response independent of whether it came from the cache or the origin.
#[derive(Debug, Clone)]
pub struct ResponseModel {
    pub id: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub generated_at: SystemTime,
    /// Set by the policy evaluator, never by the origin.
    pub cacheable: bool,
}

impl ResponseModel {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status,
            headers,
            body: body.into(),
            generated_at: SystemTime::now(),
            cacheable: false,
        }
    }

    /// First value of a header as a string, if present and visible ASCII.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
