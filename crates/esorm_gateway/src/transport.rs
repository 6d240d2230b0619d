//! Transport layer abstraction for backend requests.

use crate::error::GatewayResult;
use std::fmt;

/// HTTP method of a backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content type of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `application/x-ndjson`, used by bulk requests.
    NdJson,
}

impl ContentType {
    /// Returns the MIME type.
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::NdJson => "application/x-ndjson",
        }
    }
}

/// A backend request.
///
/// The path is kept as unencoded segments so each transport can apply its
/// own escaping (the HTTP transport percent-encodes them, in-memory
/// transports route on them directly).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Path segments, e.g. `["goiot-device", "_doc", "42"]`.
    pub path: Vec<String>,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Content type of `body`.
    pub content_type: ContentType,
}

impl Request {
    /// Creates a request without a body.
    pub fn new<I, S>(method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
            content_type: ContentType::Json,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self.content_type = ContentType::Json;
        self
    }

    /// Sets an NDJSON body.
    #[must_use]
    pub fn ndjson(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self.content_type = ContentType::NdJson;
        self
    }

    /// Returns the value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the path joined with `/`, for logging.
    pub fn path_string(&self) -> String {
        format!("/{}", self.path.join("/"))
    }
}

/// A raw backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns the body as text, for logging.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A backend transport sends requests and returns raw responses.
///
/// Implementations must report network failures as
/// [`GatewayError::Transport`](crate::GatewayError::Transport) or
/// [`GatewayError::Timeout`](crate::GatewayError::Timeout); non-2xx
/// statuses are returned as responses and normalized by the gateway.
///
/// # Implementors
///
/// - [`crate::HttpTransport`] - blocking HTTP client
/// - `esorm_testkit::MemoryBackend` - in-memory emulation for tests
pub trait Transport: Send + Sync {
    /// Sends a request and waits for the response.
    fn send(&self, request: &Request) -> GatewayResult<Response>;
}
