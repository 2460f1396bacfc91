//! Transport-independent request/response model.
//!
//! The handler chain and its strategies never see axum types; the HTTP
//! layer adapts inbound requests into [`ServerRequest`] and the chain's
//! [`ServerResponse`] back out. Header names are lowercased at
//! construction so lookups are case-insensitive.

use std::collections::HashMap;

use bytes::Bytes;

/// Header carrying the event id on structured-event POSTs.
pub const EVENT_HEADER: &str = "x-ripple-event";
/// Session cookie name.
pub const SESSION_COOKIE: &str = "ripple_session";
/// Session header fallback.
pub const SESSION_HEADER: &str = "x-ripple-session";

/// One inbound request, independent of transport.
#[derive(Clone, Debug, Default)]
pub struct ServerRequest {
    /// Uppercase method (`GET`, `POST`, ...).
    pub method: String,
    /// Request path, without query string.
    pub path: String,
    /// Decoded query pairs, in order.
    pub query: Vec<(String, String)>,
    /// Headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: Bytes,
}

impl ServerRequest {
    /// Build a request with a method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Attach a header (name is lowercased).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a query pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// The media type of the body, without parameters.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    /// Whether this is a WebSocket upgrade request.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.method == "GET"
            && self
                .header("upgrade")
                .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }

    /// First query value for a key.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Extract the opaque session id: cookie, then header, then query.
    ///
    /// Cookie decryption/verification is the session layer's job upstream;
    /// by the time a request reaches the pipeline the value is opaque.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        if let Some(cookies) = self.header("cookie") {
            for pair in cookies.split(';') {
                let mut parts = pair.trim().splitn(2, '=');
                if parts.next() == Some(SESSION_COOKIE) {
                    if let Some(value) = parts.next() {
                        if !value.is_empty() {
                            return Some(value.to_owned());
                        }
                    }
                }
            }
        }
        if let Some(value) = self.header(SESSION_HEADER) {
            if !value.is_empty() {
                return Some(value.to_owned());
            }
        }
        self.query_value("session")
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
    }
}

/// One outbound response, independent of transport.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerResponse {
    /// HTTP status.
    pub status: u16,
    /// Response headers, in order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl ServerResponse {
    /// A 200 HTML response.
    #[must_use]
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".into(), "text/html; charset=utf-8".into())],
            body: body.into(),
        }
    }

    /// A JSON response with an explicit status.
    #[must_use]
    pub fn json(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.into(),
        }
    }

    /// A redirect response.
    #[must_use]
    pub fn redirect(url: impl Into<String>, status: u16) -> Self {
        Self {
            status,
            headers: vec![("location".into(), url.into())],
            body: Bytes::new(),
        }
    }

    /// A plain 404.
    #[must_use]
    pub fn not_found(message: impl Into<Bytes>) -> Self {
        Self {
            status: 404,
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
            body: message.into(),
        }
    }

    /// The 101 marker the HTTP layer turns into a real upgrade.
    #[must_use]
    pub fn switching_protocols() -> Self {
        Self {
            status: 101,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the status while keeping headers and body.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }
}
