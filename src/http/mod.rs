//! HTTP/1.1 protocol types, wire serialization, and parsing.
//!
//! This module provides the descriptors that flow through a transport:
//! [`Method`], [`StatusCode`], [`Headers`], [`Url`], [`Request`], and
//! [`Response`]. Responses can be dumped to and reparsed from the exact
//! HTTP/1.1 wire form, which is what the cache stores.

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;
pub mod url;

pub use headers::Headers;
pub use request::Request;
pub use response::{Response, ResponseError, WireError};
pub use url::Url;

macro_rules! status_codes {
    ($($(#[$doc:meta])* $name:ident = $code:literal, $reason:literal;)+) => {
        /// An HTTP response status code.
        ///
        /// Registered codes have named variants; any other three-digit code
        /// is carried as [`StatusCode::Other`]. Equality and hashing go by
        /// the numeric code, so `Other(200) == Ok`.
        ///
        /// # Examples
        ///
        /// ```
        /// use rttp_cache::http::StatusCode;
        ///
        /// let status = StatusCode::Ok;
        /// assert_eq!(status.as_u16(), 200);
        /// assert_eq!(status.canonical_reason(), "OK");
        /// assert!(status.is_success());
        ///
        /// let custom = StatusCode::from_u16(299).unwrap();
        /// assert_eq!(custom, StatusCode::Other(299));
        /// assert!(custom.is_success());
        /// ```
        #[derive(Debug, Clone, Copy)]
        pub enum StatusCode {
            $($(#[$doc])* $name,)+
            /// A code in `100..=999` with no named variant.
            Other(u16),
        }

        impl StatusCode {
            /// Returns the numeric status code as a `u16`.
            pub fn as_u16(self) -> u16 {
                match self {
                    $(Self::$name => $code,)+
                    Self::Other(code) => code,
                }
            }

            /// Returns the status for a three-digit code, or `None` outside
            /// `100..=999`.
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)+
                    100..=999 => Some(Self::Other(code)),
                    _ => None,
                }
            }

            /// Returns the canonical reason phrase, or `""` for an
            /// unregistered code.
            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $(Self::$name => $reason,)+
                    Self::Other(_) => "",
                }
            }
        }
    };
}

status_codes! {
    // 1xx Informational
    Continue = 100, "Continue";
    SwitchingProtocols = 101, "Switching Protocols";

    // 2xx Success
    Ok = 200, "OK";
    Created = 201, "Created";
    Accepted = 202, "Accepted";
    NonAuthoritativeInformation = 203, "Non-Authoritative Information";
    NoContent = 204, "No Content";
    ResetContent = 205, "Reset Content";
    PartialContent = 206, "Partial Content";

    // 3xx Redirection
    MultipleChoices = 300, "Multiple Choices";
    MovedPermanently = 301, "Moved Permanently";
    Found = 302, "Found";
    SeeOther = 303, "See Other";
    NotModified = 304, "Not Modified";
    TemporaryRedirect = 307, "Temporary Redirect";
    PermanentRedirect = 308, "Permanent Redirect";

    // 4xx Client Error
    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    PaymentRequired = 402, "Payment Required";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    NotAcceptable = 406, "Not Acceptable";
    ProxyAuthenticationRequired = 407, "Proxy Authentication Required";
    RequestTimeout = 408, "Request Timeout";
    Conflict = 409, "Conflict";
    Gone = 410, "Gone";
    LengthRequired = 411, "Length Required";
    PreconditionFailed = 412, "Precondition Failed";
    PayloadTooLarge = 413, "Payload Too Large";
    UriTooLong = 414, "URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    RangeNotSatisfiable = 416, "Range Not Satisfiable";
    ExpectationFailed = 417, "Expectation Failed";
    ImATeapot = 418, "I'm a teapot";
    MisdirectedRequest = 421, "Misdirected Request";
    UnprocessableEntity = 422, "Unprocessable Entity";
    UpgradeRequired = 426, "Upgrade Required";
    PreconditionRequired = 428, "Precondition Required";
    TooManyRequests = 429, "Too Many Requests";
    RequestHeaderFieldsTooLarge = 431, "Request Header Fields Too Large";
    UnavailableForLegalReasons = 451, "Unavailable For Legal Reasons";

    // 5xx Server Error
    InternalServerError = 500, "Internal Server Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    GatewayTimeout = 504, "Gateway Timeout";
    HttpVersionNotSupported = 505, "HTTP Version Not Supported";
    NetworkAuthenticationRequired = 511, "Network Authentication Required";
}

impl StatusCode {
    /// Returns `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Returns `true` for status codes that never carry a body
    /// (1xx, `204 No Content`, `304 Not Modified`).
    pub fn forbids_body(self) -> bool {
        let code = self.as_u16();
        (100..200).contains(&code) || code == 204 || code == 304
    }
}

impl PartialEq for StatusCode {
    fn eq(&self, other: &Self) -> bool {
        self.as_u16() == other.as_u16()
    }
}

impl Eq for StatusCode {}

impl std::hash::Hash for StatusCode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_u16().hash(state);
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_reason() {
            "" => write!(f, "{}", self.as_u16()),
            reason => write!(f, "{} {reason}", self.as_u16()),
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_u16(code).ok_or(code)
    }
}

/// An HTTP request method.
///
/// Standard methods are represented as unit variants for zero-cost comparison.
/// Non-standard methods are captured in the `Custom` variant.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.as_str(), "GET");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET — retrieve a representation of the target resource.
    Get,
    /// POST — perform resource-specific processing on the request payload.
    Post,
    /// PUT — replace the target resource's current representation.
    Put,
    /// DELETE — remove the association between the target resource and its functionality.
    Delete,
    /// HEAD — identical to GET but without a response body.
    Head,
    /// OPTIONS — describe the communication options for the target resource.
    Options,
    /// PATCH — apply partial modifications to a resource.
    Patch,
    /// CONNECT — establish a tunnel to the server identified by the target resource.
    Connect,
    /// TRACE — perform a message loop-back test along the path to the target resource.
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl Default for Method {
    fn default() -> Self {
        Self::Get
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
