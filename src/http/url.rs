//! Request targets.
//!
//! A [`Url`] keeps the exact string it was parsed from. Its [`Display`]
//! output is that string, byte for byte, which makes it usable as a cache
//! key without any normalization: `http://h/x?a=1&b=2` and
//! `http://h/x?b=2&a=1` stay distinct, as do `http://h/x` and `http://h/x/`.
//!
//! [`Display`]: std::fmt::Display

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a [`Url`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("invalid scheme in {0:?}")]
    InvalidScheme(String),

    #[error("missing host in {0:?}")]
    MissingHost(String),

    #[error("invalid port in {0:?}")]
    InvalidPort(String),

    #[error("{0:?} is neither an absolute URL nor an origin-form path")]
    Unsupported(String),
}

/// A parsed request target: either absolute (`scheme://host[:port]/path?query`)
/// or origin-form (`/path?query`), or empty when a request has no target.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::Url;
///
/// let url: Url = "http://127.0.0.1:8080/x?b=2&a=1".parse().unwrap();
/// assert_eq!(url.scheme(), Some("http"));
/// assert_eq!(url.host(), Some("127.0.0.1"));
/// assert_eq!(url.port(), Some(8080));
/// assert_eq!(url.request_target(), "/x?b=2&a=1");
/// assert_eq!(url.to_string(), "http://127.0.0.1:8080/x?b=2&a=1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Url {
    serialization: String,
    scheme: Option<Range<usize>>,
    authority: Option<Range<usize>>,
    host: Option<Range<usize>>,
    port: Option<u16>,
    path: Range<usize>,
    query: Option<Range<usize>>,
    fragment: Option<Range<usize>>,
}

impl Url {
    /// Parses a URL string.
    ///
    /// The empty string parses to the empty URL.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let mut url = Self {
            serialization: input.to_owned(),
            ..Self::default()
        };
        if input.is_empty() {
            return Ok(url);
        }

        let rest_start = if let Some(sep) = input.find("://") {
            let scheme = &input[..sep];
            let valid = scheme
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if !valid {
                return Err(UrlError::InvalidScheme(input.to_owned()));
            }
            url.scheme = Some(0..sep);

            let auth_start = sep + 3;
            let auth_end = input[auth_start..]
                .find(['/', '?', '#'])
                .map_or(input.len(), |i| auth_start + i);
            let (host, port) = parse_authority(input, auth_start, auth_end)?;
            url.authority = Some(auth_start..auth_end);
            url.host = Some(host);
            url.port = port;
            auth_end
        } else if input.starts_with('/') {
            0
        } else {
            return Err(UrlError::Unsupported(input.to_owned()));
        };

        let fragment_at = input[rest_start..].find('#').map(|i| rest_start + i);
        let before_fragment = fragment_at.unwrap_or(input.len());
        let query_at = input[rest_start..before_fragment]
            .find('?')
            .map(|i| rest_start + i);

        url.path = rest_start..query_at.unwrap_or(before_fragment);
        url.query = query_at.map(|q| q + 1..before_fragment);
        url.fragment = fragment_at.map(|f| f + 1..input.len());
        Ok(url)
    }

    /// Builds an absolute URL from its parts, bracketing IPv6 hosts.
    pub fn from_parts(scheme: &str, host: &str, port: u16) -> Result<Self, UrlError> {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        Self::parse(&format!("{scheme}://{host}:{port}"))
    }

    fn slice(&self, range: &Option<Range<usize>>) -> Option<&str> {
        range.clone().map(|r| &self.serialization[r])
    }

    /// Returns the URL exactly as it was parsed.
    pub fn as_str(&self) -> &str {
        &self.serialization
    }

    /// Returns `true` for the empty URL.
    pub fn is_empty(&self) -> bool {
        self.serialization.is_empty()
    }

    /// Returns `true` if the URL carries a scheme and host.
    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some()
    }

    pub fn scheme(&self) -> Option<&str> {
        self.slice(&self.scheme)
    }

    /// Returns the host, including brackets for IPv6 literals.
    pub fn host(&self) -> Option<&str> {
        self.slice(&self.host)
    }

    /// Returns the authority (`host[:port]`) as written, for the `Host` header.
    pub fn authority(&self) -> Option<&str> {
        let authority = self.slice(&self.authority)?;
        Some(authority.rsplit_once('@').map_or(authority, |(_, a)| a))
    }

    /// Returns the explicit port, if one was written.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the explicit port, or the scheme's well-known port.
    pub fn port_or_known_default(&self) -> Option<u16> {
        self.port.or_else(|| match self.scheme()? {
            s if s.eq_ignore_ascii_case("http") => Some(80),
            s if s.eq_ignore_ascii_case("https") => Some(443),
            _ => None,
        })
    }

    /// Returns the path as written (possibly empty).
    pub fn path(&self) -> &str {
        &self.serialization[self.path.clone()]
    }

    pub fn query(&self) -> Option<&str> {
        self.slice(&self.query)
    }

    pub fn fragment(&self) -> Option<&str> {
        self.slice(&self.fragment)
    }

    /// Returns the origin-form target for a request line: the path (or `/`
    /// when empty) followed by the query. The fragment is never sent.
    pub fn request_target(&self) -> String {
        let path = match self.path() {
            "" => "/",
            p => p,
        };
        match self.query() {
            Some(q) => format!("{path}?{q}"),
            None => path.to_owned(),
        }
    }
}

fn parse_authority(
    input: &str,
    start: usize,
    end: usize,
) -> Result<(Range<usize>, Option<u16>), UrlError> {
    // Userinfo is not part of the host.
    let start = input[start..end].rfind('@').map_or(start, |i| start + i + 1);
    let authority = &input[start..end];

    let (host_end, port) = if authority.starts_with('[') {
        let close = authority
            .find(']')
            .ok_or_else(|| UrlError::MissingHost(input.to_owned()))?;
        match &authority[close + 1..] {
            "" => (start + close + 1, None),
            rest => match rest.strip_prefix(':') {
                Some(port) => (start + close + 1, Some(port)),
                None => return Err(UrlError::InvalidPort(input.to_owned())),
            },
        }
    } else {
        match authority.rfind(':') {
            Some(i) => (start + i, Some(&authority[i + 1..])),
            None => (end, None),
        }
    };

    if host_end == start {
        return Err(UrlError::MissingHost(input.to_owned()));
    }
    let port = match port {
        None | Some("") => None,
        Some(p) => Some(
            p.parse()
                .map_err(|_| UrlError::InvalidPort(input.to_owned()))?,
        ),
    };
    Ok((start..host_end, port))
}

impl FromStr for Url {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialization)
    }
}
