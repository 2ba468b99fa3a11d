//! HTTP header map with case-insensitive name lookup.
//!
//! Headers keep their original spelling, insertion order, and value bytes
//! so that a response dumped to the wire and parsed back reproduces the same
//! bytes. Values need not be UTF-8; the text accessors skip those that are not.

use bytes::{BufMut, BytesMut};

/// A case-insensitive, multi-value, order-preserving HTTP header map.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/html; charset=utf-8");
/// headers.insert("X-Custom", "first");
/// headers.insert("X-Custom", "second");
///
/// assert_eq!(headers.get("content-type"), Some("text/html; charset=utf-8"));
/// let all: Vec<_> = headers.get_all("x-custom").collect();
/// assert_eq!(all, vec!["first", "second"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, Vec<u8>)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into().into_bytes()));
    }

    /// Appends a header entry whose value is kept byte for byte.
    pub fn insert_raw(&mut self, name: impl Into<String>, value: &[u8]) {
        self.inner.push((name.into(), value.to_vec()));
    }

    /// Replaces every entry named `name` with a single entry.
    ///
    /// The replacement takes the position of the first removed entry, or is
    /// appended if the header was absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into().into_bytes();
        match self.position(&name) {
            Some(pos) => {
                let mut idx = 0;
                self.inner.retain(|(k, _)| {
                    let keep = idx <= pos || !k.eq_ignore_ascii_case(&name);
                    idx += 1;
                    keep
                });
                self.inner[pos] = (name, value);
            }
            None => self.inner.push((name, value)),
        }
    }

    /// Returns the first value for the given header name (case-insensitive),
    /// or `None` if it is absent or not UTF-8.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_raw(name)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Returns the bytes of the first value for the given header name.
    pub fn get_raw(&self, name: &str) -> Option<&[u8]> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Returns an iterator over all UTF-8 values for the given header name
    /// (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .filter_map(|(_, v)| std::str::from_utf8(v).ok())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Parses the `Content-Length` header, if present and well formed.
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length")?.trim().parse().ok()
    }

    /// Returns `true` if the last transfer coding applied is `chunked`.
    pub fn is_chunked(&self) -> bool {
        self.get_all("transfer-encoding")
            .flat_map(|v| v.split(','))
            .last()
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Writes every entry as a `Name: value\r\n` line.
    pub fn write_to(&self, buf: &mut BytesMut) {
        for (name, value) in &self.inner {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value);
            buf.put_slice(b"\r\n");
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.inner.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into().into_bytes()))
                .collect(),
        }
    }
}
