//! Request identification and parameter extraction.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) and echo it on the response
//! - Flatten query string and urlencoded form body into key/value pairs
//! - Render parameters for the access log with secrets redacted

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Uri};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const REDACTED: &str = "[redacted]";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Layer assigning an `x-request-id` to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer copying the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Read the request ID set by [`set_request_id_layer`].
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Flat request parameters in arrival order: form body first, then query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    /// Parse the query string and, for urlencoded bodies, the form body.
    pub fn parse(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Self {
        let mut pairs = Vec::new();

        if is_form(headers) {
            pairs.extend(
                url::form_urlencoded::parse(body).map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }
        if let Some(query) = query {
            pairs.extend(
                url::form_urlencoded::parse(query.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }

        Self { pairs }
    }

    /// First value for `key`. Body values shadow query values.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value for `key`, or `""` when absent.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `k=v&k=v` form for logging; anything that looks like a password is redacted.
    pub fn to_log_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                if is_secret(k) {
                    format!("{k}={REDACTED}")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

fn is_secret(key: &str) -> bool {
    key.to_ascii_lowercase().contains("password")
}

/// Inbound request data exposed to handlers.
#[derive(Debug, Clone)]
pub struct RequestData {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub params: RequestParams,
    pub client: SocketAddr,
}
