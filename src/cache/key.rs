//! Cache keys.

use std::borrow::Borrow;
use std::fmt;

use crate::http::Request;

/// The key a response is cached under: the request's target URL, exactly
/// as written.
///
/// No normalization takes place. Query parameter order, trailing slashes,
/// and letter case all distinguish keys. A request without a target maps to
/// the empty key.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::CacheKey;
/// use rttp_cache::http::Request;
///
/// let a = CacheKey::from(&Request::get("http://h/x?a=1&b=2").unwrap());
/// let b = CacheKey::from(&Request::get("http://h/x?b=2&a=1").unwrap());
/// assert_eq!(a.as_str(), "http://h/x?a=1&b=2");
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Request> for CacheKey {
    fn from(request: &Request) -> Self {
        Self(request.url().to_string())
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
