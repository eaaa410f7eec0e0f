//! Header names the proxy adds to its own responses.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;

pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub trait ProxyHeadersExt {
    /// Insert a header, replacing existing values.
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Insert a header from a string. Returns false if `value` is not a
    /// valid header value.
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;
}

impl<B> ProxyHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers_mut().insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}
