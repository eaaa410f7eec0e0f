use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Uri};
use std::net::IpAddr;
use std::time::SystemTime;

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// An inbound client request as seen by the pipeline.
///
/// Built once by the HTTP boundary. The pipeline never mutates it; forwarding
/// headers are added to a derived copy (see [`RequestModel::for_origin`]).
#[derive(Debug, Clone)]
pub struct RequestModel {
    pub id: String,
    pub method: Method,
    pub client_ip: Option<IpAddr>,
    pub url: Option<Uri>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub received_at: SystemTime,
}

impl RequestModel {
    /// A bodiless request with a fresh id, mostly useful in tests.
    pub fn new(method: Method, url: Uri) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            client_ip: None,
            url: Some(url),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            received_at: SystemTime::now(),
        }
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Copy of this request carrying the forwarding headers sent upstream.
    ///
    /// `X-Forwarded-For` is replaced by the client IP when known;
    /// `X-Forwarded-Host` and `X-Forwarded-Proto` are replaced from the
    /// original URL when it carries a host or scheme.
    pub fn for_origin(&self) -> RequestModel {
        let mut outbound = self.clone();

        if let Some(ip) = self.client_ip {
            set_header(&mut outbound.headers, &X_FORWARDED_FOR, &ip.to_string());
        }

        if let Some(url) = &self.url {
            if let Some(host) = url.authority().map(|a| a.as_str()) {
                set_header(&mut outbound.headers, &X_FORWARDED_HOST, host);
            }
            if let Some(scheme) = url.scheme_str() {
                set_header(&mut outbound.headers, &X_FORWARDED_PROTO, scheme);
            }
        }

        outbound
    }
}

/// Overwrite every value of `name` with `value`; invalid values are skipped.
fn set_header(headers: &mut HeaderMap, name: &HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name.clone(), v);
        }
        Err(_) => {
            tracing::debug!(header = %name, "skipping invalid forwarding header value");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn request(url: &str) -> RequestModel {
        RequestModel::new(Method::GET, url.parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_overwrites_existing_values() {
        let req = request("http://proxy.local/data")
            .with_header(
                X_FORWARDED_FOR.clone(),
                HeaderValue::from_static("10.0.0.1"),
            )
            .with_header(
                X_FORWARDED_FOR.clone(),
                HeaderValue::from_static("10.0.0.2"),
            )
            .with_client_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)));

        let outbound = req.for_origin();
        let values: Vec<_> = outbound.headers.get_all(&X_FORWARDED_FOR).iter().collect();
        assert_eq!(values, vec!["192.168.1.7"]);
    }

    #[test]
    fn test_forwarded_for_untouched_without_client_ip() {
        let req = request("http://proxy.local/data").with_header(
            X_FORWARDED_FOR.clone(),
            HeaderValue::from_static("10.0.0.1"),
        );

        let outbound = req.for_origin();
        assert_eq!(outbound.headers.get(&X_FORWARDED_FOR).unwrap(), "10.0.0.1");
    }

    #[test]
    fn test_forwarded_host_and_proto_from_url() {
        let req = request("https://Shop.Example.com:8443/cart");
        let outbound = req.for_origin();
        assert_eq!(
            outbound.headers.get(&X_FORWARDED_HOST).unwrap(),
            "Shop.Example.com:8443"
        );
        assert_eq!(outbound.headers.get(&X_FORWARDED_PROTO).unwrap(), "https");
    }

    #[test]
    fn test_relative_url_sets_no_host_headers() {
        let req = request("/cart?id=1");
        let outbound = req.for_origin();
        assert!(outbound.headers.get(&X_FORWARDED_HOST).is_none());
        assert!(outbound.headers.get(&X_FORWARDED_PROTO).is_none());
    }

    #[test]
    fn test_original_request_is_not_modified() {
        let req = request("http://proxy.local/data")
            .with_client_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let _ = req.for_origin();
        assert!(req.headers.is_empty());
    }
}
