use std::collections::HashMap;

/// Parsed `Cache-Control` header: directive names lower-cased, values with
/// surrounding quotes stripped. Bare directives map to an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: HashMap<String, String>,
}

impl CacheControl {
    pub fn parse(header: &str) -> Self {
        let mut directives = HashMap::new();

        for part in header.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (name, value) = match part.split_once('=') {
                Some((name, value)) => (name, value.trim().trim_matches('"')),
                None => (part, ""),
            };
            directives.insert(name.trim().to_ascii_lowercase(), value.to_string());
        }

        Self { directives }
    }

    /// Parse every `Cache-Control` value of a header map as one list.
    pub fn from_headers(headers: &hyper::HeaderMap) -> Self {
        let joined: Vec<&str> = headers
            .get_all(hyper::header::CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        Self::parse(&joined.join(","))
    }

    pub fn has(&self, directive: &str) -> bool {
        self.directives.contains_key(&directive.to_ascii_lowercase())
    }

    pub fn get(&self, directive: &str) -> Option<&str> {
        self.directives
            .get(&directive.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Value of a delta-seconds directive, when present and a non-negative
    /// integer.
    pub fn seconds(&self, directive: &str) -> Option<i64> {
        self.get(directive)?
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs >= 0)
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}
