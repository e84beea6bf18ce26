use std::collections::HashMap;

/// Extra request headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// Inclusive byte range for a `Range` header. `end: None` means "to the end".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Range covering the half-open `start..end`. `None` for an empty range.
    pub fn from_half_open(range: std::ops::Range<u64>) -> Option<Self> {
        (!range.is_empty()).then(|| Self::new(range.start, Some(range.end - 1)))
    }

    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{end}", self.start),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Client construction options.
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Max idle connections per host. 0 disables pooling.
    pub pool_max_idle_per_host: usize,
    pub user_agent: Option<String>,
    /// Sent with every request.
    pub headers: Headers,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 0,
            user_agent: Some(concat!("tapedeck/", env!("CARGO_PKG_VERSION")).to_string()),
            headers: Headers::new(),
        }
    }
}

/// Total length from a `Content-Range` value such as `bytes 0-99/1000`.
///
/// Returns `None` for an unknown (`*`) or malformed total.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.trim().strip_prefix("bytes")?.rsplit_once('/')?;
    total.trim().parse().ok()
}
