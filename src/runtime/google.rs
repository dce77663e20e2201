//! Google HTTP request normalization.
//!
//! Google functions receive an Express-style `(request, response)` pair.
//! The adapter sets permissive CORS headers on every response, answers
//! preflight requests itself, merges query parameters with the parsed JSON
//! body into the unified event, and maps handler failures to an empty 500.

use super::{HandlerError, HandlerFn, HttpSubset};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_HEADERS: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, POST";
pub const CORS_MAX_AGE_SECS: u32 = 30;

// ---------------------------------------------------------------------------
// Request / response model
// ---------------------------------------------------------------------------

/// An incoming HTTP request as the google platform layer presents it: the
/// query string already split, the body already parsed by the platform's
/// JSON body parser (an object, or `Null` when absent or unparsed).
#[derive(Debug, Clone, Default)]
pub struct GoogleRequest {
    pub method: String,
    pub headers: HashMap<String, String>,
    pub query: Map<String, Value>,
    pub body: Value,
}

impl GoogleRequest {
    /// The unified event: query parameters merged with body fields, body
    /// fields winning on collision.
    pub fn merged_event(&self) -> Value {
        let mut merged = self.query.clone();
        if let Some(body) = self.body.as_object() {
            for (key, value) in body {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }

    pub fn http_subset(&self) -> HttpSubset {
        HttpSubset {
            method: Some(self.method.clone()),
            headers: self.headers.clone(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// The response the wrapper writes back.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl GoogleResponse {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: cors_headers(),
            body: None,
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            headers: cors_headers(),
            body: Some(value.to_string()),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn cors_headers() -> Vec<(String, String)> {
    vec![
        ("Access-Control-Allow-Origin".into(), CORS_ALLOW_ORIGIN.into()),
        ("Access-Control-Allow-Headers".into(), CORS_ALLOW_HEADERS.into()),
        ("Access-Control-Allow-Methods".into(), CORS_ALLOW_METHODS.into()),
        ("Access-Control-Max-Age".into(), CORS_MAX_AGE_SECS.to_string()),
    ]
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Handle one HTTP request.
///
/// `OPTIONS` is answered immediately with an empty 204 and the user
/// function is never invoked. Other methods invoke the user function as
/// `(event, httpSubset)`; the return value is serialized as JSON, and any
/// handler error becomes a 500 with an empty body.
pub async fn handle(handler: &HandlerFn, request: GoogleRequest) -> GoogleResponse {
    if request.method.eq_ignore_ascii_case("OPTIONS") {
        return GoogleResponse::empty(204);
    }

    // Without this header the platform's body parser leaves the body empty,
    // a common source of "my function receives no input" reports.
    if request.method.eq_ignore_ascii_case("POST")
        && request.header("content-type") != Some("application/json")
    {
        tracing::warn!("POST without Content-Type: application/json; the body will not be parsed");
    }

    let event = request.merged_event();
    let http = request.http_subset();

    match handler(event, http).await {
        Ok(value) => GoogleResponse::json(value),
        Err(HandlerError { message, .. }) => {
            tracing::debug!(error = %message, "handler failed, returning 500");
            GoogleResponse::empty(500)
        }
    }
}
