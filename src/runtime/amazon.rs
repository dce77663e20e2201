//! Amazon invocation envelope normalization.
//!
//! A deployed function receives either a *direct* invocation (console or
//! SDK test call: the payload is the event itself) or an *HTTP-proxied*
//! envelope from the gateway. The adapter classifies the input, derives the
//! `(event, httpSubset)` pair, and maps access-denied handler failures to a
//! diagnostic 200 response instead of an undifferentiated server error.

use super::{HandlerError, HandlerFn, HttpSubset};
use base64::Engine;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Envelope fields whose presence marks an HTTP-proxied invocation.
pub const ROUTE_KEY_FIELD: &str = "routeKey";
pub const RAW_PATH_FIELD: &str = "rawPath";
pub const HEADERS_FIELD: &str = "headers";

pub const QUERY_FIELD: &str = "queryStringParameters";
pub const BODY_FIELD: &str = "body";
pub const BASE64_FLAG_FIELD: &str = "isBase64Encoded";

/// Error code the adapter converts into a diagnostic 200 response.
pub const ACCESS_DENIED: &str = "AccessDeniedException";

/// Notice serialized alongside surfaced access-denied errors.
pub const ACCESS_DENIED_NOTICE: &str =
    "Error details returned by the skylift wrapper because the handler raised \
     AccessDeniedException. Permission misconfigurations are always surfaced with full detail.";

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How an invocation reached the deployed function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Console or SDK test call; the whole input is the event.
    Direct,
    /// Routed through the HTTP gateway; the input is a proxy envelope.
    HttpProxied,
}

/// Classify an invocation input.
///
/// An input is HTTP-proxied only when every envelope marker field is
/// present; a bare object (or `null`) is a direct invocation.
pub fn classify(input: &Value) -> Invocation {
    let has = |field: &str| input.get(field).is_some();
    if input.is_null() || !has(ROUTE_KEY_FIELD) || !has(RAW_PATH_FIELD) || !has(HEADERS_FIELD) {
        Invocation::Direct
    } else {
        Invocation::HttpProxied
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Derive the unified `(event, httpSubset)` pair from an invocation input.
///
/// Event derivation for HTTP-proxied envelopes, in order: decoded query
/// string parameters if present; else the body, base64-decoded first when
/// the envelope flags it, parsed as JSON with a URL-encoded-form fallback;
/// else an empty event plus a diagnostic warning.
pub fn normalize(input: &Value) -> (Value, HttpSubset) {
    match classify(input) {
        Invocation::Direct => (input.clone(), HttpSubset::default()),
        Invocation::HttpProxied => {
            let http = HttpSubset {
                method: input
                    .pointer("/requestContext/http/method")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                headers: header_map(input.get(HEADERS_FIELD)),
            };

            let event = if let Some(query) = input.get(QUERY_FIELD).filter(|q| !q.is_null()) {
                query.clone()
            } else if let Some(body) = input.get(BODY_FIELD).filter(|b| !b.is_null()) {
                parse_body(body, input.get(BASE64_FLAG_FIELD) == Some(&Value::Bool(true)))
            } else {
                tracing::warn!("no query string or body field found in input");
                Value::Object(Map::new())
            };

            (event, http)
        }
    }
}

fn header_map(headers: Option<&Value>) -> HashMap<String, String> {
    headers
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_body(body: &Value, is_base64: bool) -> Value {
    let raw = match body.as_str() {
        Some(s) => s.to_string(),
        // A pre-parsed body passes through unchanged.
        None => return body.clone(),
    };

    let decoded = if is_base64 {
        match base64::engine::general_purpose::STANDARD.decode(raw.as_bytes()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => raw,
        }
    } else {
        raw
    };

    match serde_json::from_str::<Value>(&decoded) {
        Ok(value) => value,
        Err(_) => parse_form(&decoded),
    }
}

/// Parse an `a=1&b=2` form body into an object of string values.
fn parse_form(raw: &str) -> Value {
    let mut object = Map::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        let key = urlencoding::decode(key).map(|c| c.into_owned()).unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| value.to_string());
        object.insert(key, Value::String(value));
    }
    Value::Object(object)
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Invoke a user function with an amazon invocation input.
///
/// The return value is what the wrapper delivers on the provider's success
/// channel. An access-denied handler error becomes a successful HTTP 200
/// whose body serializes the error plus a notice; any other error
/// propagates and surfaces as a generic server error.
pub async fn invoke(handler: &HandlerFn, input: Value) -> Result<Value, HandlerError> {
    let (event, http) = normalize(&input);
    match handler(event, http).await {
        Ok(value) => Ok(value),
        Err(err) if err.code.as_deref() == Some(ACCESS_DENIED) => Ok(json!({
            "statusCode": 200,
            "body": serde_json::to_string(&json!({
                "code": ACCESS_DENIED,
                "message": err.message,
                "notice": ACCESS_DENIED_NOTICE,
            }))
            .unwrap_or_default(),
        })),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::handler_fn;

    fn proxied(body: Option<Value>, base64_flag: bool, query: Option<Value>) -> Value {
        let mut envelope = json!({
            "routeKey": "$default",
            "rawPath": "/",
            "headers": {"content-type": "application/json"},
            "requestContext": {"http": {"method": "POST"}},
        });
        if let Some(body) = body {
            envelope[BODY_FIELD] = body;
        }
        if base64_flag {
            envelope[BASE64_FLAG_FIELD] = Value::Bool(true);
        }
        if let Some(query) = query {
            envelope[QUERY_FIELD] = query;
        }
        envelope
    }

    #[test]
    fn bare_object_is_direct() {
        let input = json!({"a": 1});
        assert_eq!(classify(&input), Invocation::Direct);
        let (event, http) = normalize(&input);
        assert_eq!(event, input);
        assert_eq!(http, HttpSubset::default());
    }

    #[test]
    fn envelope_fields_mean_proxied() {
        let input = proxied(None, false, None);
        assert_eq!(classify(&input), Invocation::HttpProxied);
    }

    #[test]
    fn query_parameters_win_over_body() {
        let input = proxied(
            Some(Value::String("{\"a\":1}".into())),
            false,
            Some(json!({"q": "7"})),
        );
        let (event, _) = normalize(&input);
        assert_eq!(event, json!({"q": "7"}));
    }

    #[test]
    fn json_body_is_parsed() {
        let input = proxied(Some(Value::String("{\"a\":1}".into())), false, None);
        let (event, http) = normalize(&input);
        assert_eq!(event, json!({"a": 1}));
        assert_eq!(http.method.as_deref(), Some("POST"));
    }

    #[test]
    fn form_body_falls_back_to_urlencoded() {
        let input = proxied(Some(Value::String("a=1&b=2".into())), false, None);
        let (event, _) = normalize(&input);
        assert_eq!(event, json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn base64_body_is_decoded_first() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("{\"a\":1}");
        let input = proxied(Some(Value::String(encoded)), true, None);
        let (event, _) = normalize(&input);
        assert_eq!(event, json!({"a": 1}));
    }

    #[test]
    fn missing_query_and_body_gives_empty_event() {
        let input = proxied(None, false, None);
        let (event, _) = normalize(&input);
        assert_eq!(event, json!({}));
    }

    #[tokio::test]
    async fn access_denied_becomes_diagnostic_200() {
        let handler = handler_fn(|_event, _http| async move {
            Err(HandlerError::with_code(ACCESS_DENIED, "role lacks s3:GetObject"))
        });

        let out = invoke(&handler, json!({"a": 1})).await.unwrap();
        assert_eq!(out["statusCode"], 200);
        let body: Value = serde_json::from_str(out["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["code"], ACCESS_DENIED);
        assert!(body["notice"].as_str().unwrap().contains("AccessDeniedException"));
    }

    #[tokio::test]
    async fn other_errors_propagate() {
        let handler =
            handler_fn(|_event, _http| async move { Err(HandlerError::new("boom")) });
        let err = invoke(&handler, json!({})).await.unwrap_err();
        assert_eq!(err.message, "boom");
    }
}
