//! Ordered, case-insensitive, multi-valued header map.
//!
//! Unlike `http::HeaderMap`, insertion order is preserved across distinct
//! names and the original spelling of each name is kept for forwarding.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    key: String,
    value: String,
    /// Original bytes of a value that is not valid UTF-8. `value` holds the
    /// lossy text for filters; forwarding uses these bytes.
    raw: Option<HeaderValue>,
}

/// Header multimap carried by request and response messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<HeaderEntry>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an `http` header map. Values that are not valid UTF-8 are
    /// readable lossily but are forwarded byte for byte.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map.iter() {
            match value.to_str() {
                Ok(v) => headers.add(name.as_str(), v),
                Err(_) => headers.entries.push(HeaderEntry {
                    name: name.as_str().to_string(),
                    key: name.as_str().to_string(),
                    value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    raw: Some(value.clone()),
                }),
            }
        }
        headers
    }

    /// Convert into an `http` header map, skipping entries that are not
    /// legal header names or values.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = match HeaderName::from_bytes(entry.name.as_bytes()) {
                Ok(n) => n,
                Err(_) => {
                    tracing::debug!(header = %entry.name, "Dropping invalid header name");
                    continue;
                }
            };
            if let Some(raw) = &entry.raw {
                map.append(name, raw.clone());
                continue;
            }
            match HeaderValue::from_str(&entry.value) {
                Ok(v) => {
                    map.append(name, v);
                }
                Err(_) => tracing::debug!(header = %entry.name, "Dropping invalid header value"),
            }
        }
        map
    }

    /// First value for `name`.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.key.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.key.eq_ignore_ascii_case(name))
    }

    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).count()
    }

    /// Append a value, keeping any existing values for the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.push(HeaderEntry {
            key: name.to_ascii_lowercase(),
            name,
            value: value.into(),
            raw: None,
        });
    }

    /// Replace all values for `name` with a single value. The new entry takes
    /// the position of the first existing one, or is appended.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let value = value.into();
        match self.entries.iter().position(|e| e.key == key) {
            Some(pos) => {
                self.entries[pos] = HeaderEntry {
                    name,
                    key: key.clone(),
                    value,
                    raw: None,
                };
                let mut index = 0;
                self.entries.retain(|e| {
                    let keep = index <= pos || e.key != key;
                    index += 1;
                    keep
                });
            }
            None => self.entries.push(HeaderEntry {
                name,
                key,
                value,
                raw: None,
            }),
        }
    }

    /// Remove every value for `name`, returning them.
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if e.key.eq_ignore_ascii_case(name) {
                removed.push(e.value.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in insertion order, with the original
    /// spelling of each name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|e| (e.name.as_str(), e.value.as_str()))
    }

    /// Strip connection-scoped headers, including any named by `Connection`.
    pub fn remove_hop_by_hop(&mut self) {
        let listed: Vec<String> = self
            .get_all("connection")
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.entries
            .retain(|e| !HOP_BY_HOP.contains(&e.key.as_str()) && !listed.contains(&e.key));
    }
}

/// Headers that apply to a single connection and are never forwarded.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];
