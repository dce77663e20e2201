//! Wrapper and authorizer code generation.
//!
//! [`generate`] is a pure, synchronous, deterministic string
//! transformation: it appends a cold-start shim to a bundled module so the
//! deployed code detects its execution context once per process lifetime
//! and normalizes provider invocation envelopes into the unified
//! `(event, httpSubset)` calling convention. The emitted shim mirrors the
//! native model in [`crate::runtime`] and is rendered from the same
//! platform constants.

use crate::runtime::{amazon, google, AMAZON_ENV_MARKERS, GOOGLE_ENV_SUBSTRING};

// ---------------------------------------------------------------------------
// Authorization policy
// ---------------------------------------------------------------------------

/// Whether and how a run's endpoints are gated.
///
/// Created at most once per orchestrator run; the same bearer token is
/// shared by every authorizer provisioned in that run.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationPolicy {
    pub need_auth: bool,
    pub expected_bearer: Option<String>,
}

impl AuthorizationPolicy {
    /// Policy for an unauthenticated run.
    pub fn open() -> Self {
        Self::default()
    }

    /// Policy gating every endpoint behind the given shared secret.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            need_auth: true,
            expected_bearer: Some(token.into()),
        }
    }
}

/// Generate a fresh run-wide bearer token.
pub fn generate_bearer_token() -> String {
    // 32 hex chars, comfortably above the 10-char validation floor.
    uuid::Uuid::new_v4().simple().to_string()
}

/// Sanitize a bearer token for embedding inside generated source.
///
/// Percent-escaping keeps the token from terminating the generated string
/// literal. This is a best-effort mitigation, not a general injection
/// defense: a pathological token can produce false negatives at the
/// authorizer, never false positives.
pub fn sanitize_bearer(token: &str) -> String {
    urlencoding::encode(token).into_owned()
}

// ---------------------------------------------------------------------------
// Wrapper shim generation
// ---------------------------------------------------------------------------

/// Marker comment identifying generated wrapper code.
pub const WRAPPER_MARKER: &str = "skylift wrapper";

/// Append the cold-start wrapper shim to a bundled module.
///
/// Pure and deterministic; performs no I/O. The `policy` is part of the
/// generation contract but does not alter the wrapper itself:
/// authorization is enforced at the routing layer, not inside deployed
/// code.
pub fn generate(bundled_code: &str, _policy: &AuthorizationPolicy) -> String {
    let mut augmented = String::with_capacity(bundled_code.len() + 4096);
    augmented.push_str(bundled_code);
    augmented.push_str(&wrapper_shim());
    augmented
}

fn wrapper_shim() -> String {
    let amazon_check = AMAZON_ENV_MARKERS
        .iter()
        .map(|marker| format!("process.env.{marker}"))
        .collect::<Vec<_>>()
        .join(" || ");

    format!(
        r#"

;module.exports = (() => {{
  // {marker}: plain text for readability in provider consoles.
  const wrapped = globalThis.__skylift_wrapped = globalThis.__skylift_wrapped || new Set();

  function wrapExports(me, platform) {{
    const out = {{ ...me }};
    for (const name of Object.keys(me)) {{
      if (wrapped.has(name)) continue;
      wrapped.add(name);
      const userfunc = out[name];
      if (platform === 'amazon') {{
        out[name] = async function handler(input, context) {{
          let event = {{}};
          let httpSubset = {{}};
          if (input == null || input.{route_key} === undefined || input.{raw_path} === undefined || input.{headers} === undefined) {{
            // Invoked from console or SDK: the input is the event.
            event = input;
          }} else {{
            httpSubset = {{
              method: input.requestContext && input.requestContext.http && input.requestContext.http.method,
              headers: input.{headers},
            }};
            if (input.{query} != null) {{
              event = input.{query};
            }} else if (input.{body} != null) {{
              event = (input.{base64_flag} === true)
                ? Buffer.from(input.{body}, 'base64').toString('utf-8')
                : input.{body};
              try {{
                event = JSON.parse(event);
              }} catch (e) {{
                event = Object.fromEntries(new URLSearchParams(event));
              }}
            }} else {{
              console.log("Warn: no query string or 'body' field found in input.");
            }}
          }}
          try {{
            const res = await userfunc(event, httpSubset);
            context.succeed(res);
          }} catch (e) {{
            if (e.code === '{access_denied}') {{
              context.succeed({{
                statusCode: 200,
                body: JSON.stringify({{ ...e, notice: '{access_denied_notice}' }}),
              }});
            }} else {{
              throw e;
            }}
          }}
        }};
      }}
      if (platform === 'google') {{
        out[name] = async function handler(req, resp) {{
          resp.header('Access-Control-Allow-Origin', '{cors_origin}');
          resp.header('Access-Control-Allow-Headers', '{cors_headers}');
          resp.set('Access-Control-Allow-Methods', '{cors_methods}');
          resp.set('Access-Control-Max-Age', {cors_max_age});
          if (req.method === 'OPTIONS') {{
            resp.status(204).send('');
            return;
          }}
          if (req.method.toLowerCase() === 'post' && req.headers['content-type'] !== 'application/json') {{
            console.warn('Specify the Content-Type header when POSTing JSON, or the body arrives empty.');
          }}
          const event = {{ ...req.query, ...JSON.parse(JSON.stringify(req.body)) }};
          const httpSubset = {{ method: req.method, headers: req.headers }};
          try {{
            const output = await userfunc(event, httpSubset);
            resp.json(output);
          }} catch (e) {{
            resp.status(500).send('');
          }}
        }};
      }}
    }}
    return out;
  }}

  const current = {{ ...exports, ...module.exports }};
  const inAmazon = !!({amazon_check});
  const inGoogle = (/{google_substring}/.test(process.env._) === true);
  if (inAmazon) return wrapExports(current, 'amazon');
  if (inGoogle) return wrapExports(current, 'google');
  return current;
}})();
"#,
        marker = WRAPPER_MARKER,
        route_key = amazon::ROUTE_KEY_FIELD,
        raw_path = amazon::RAW_PATH_FIELD,
        headers = amazon::HEADERS_FIELD,
        query = amazon::QUERY_FIELD,
        body = amazon::BODY_FIELD,
        base64_flag = amazon::BASE64_FLAG_FIELD,
        access_denied = amazon::ACCESS_DENIED,
        access_denied_notice = amazon::ACCESS_DENIED_NOTICE,
        cors_origin = google::CORS_ALLOW_ORIGIN,
        cors_headers = google::CORS_ALLOW_HEADERS,
        cors_methods = google::CORS_ALLOW_METHODS,
        cors_max_age = google::CORS_MAX_AGE_SECS,
        amazon_check = amazon_check,
        google_substring = GOOGLE_ENV_SUBSTRING,
    )
}

// ---------------------------------------------------------------------------
// Authorizer source generation
// ---------------------------------------------------------------------------

/// Generate the complete source of a bearer-checking authorizer function.
///
/// The function's entire logic is one comparison: the incoming
/// `authorization` header against `Bearer <sanitized token>`. It performs
/// no I/O, so it is provisioned with a short timeout.
///
/// `sanitized_bearer` must already have passed [`sanitize_bearer`]; the
/// escaping guarantees the token cannot terminate the string literal.
pub fn generate_authorizer_source(sanitized_bearer: &str) -> String {
    format!(
        r#"exports.handler = async (event) => {{
  const expected = 'Bearer {sanitized_bearer}';
  const isAuthorized = (event.headers.authorization === expected);
  return {{ isAuthorized }};
}};
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let policy = AuthorizationPolicy::open();
        let a = generate("exports.f = () => 1", &policy);
        let b = generate("exports.f = () => 1", &policy);
        assert_eq!(a, b);
    }

    #[test]
    fn shim_preserves_bundle_and_appends_wrapper() {
        let bundled = "exports.endpoint_hello = async () => 'hi'";
        let augmented = generate(bundled, &AuthorizationPolicy::open());

        assert!(augmented.starts_with(bundled));
        assert!(augmented.contains(WRAPPER_MARKER));
        // Detection is emitted exactly once.
        assert_eq!(augmented.matches("wrapExports(current, 'amazon')").count(), 1);
        assert_eq!(augmented.matches("wrapExports(current, 'google')").count(), 1);
    }

    #[test]
    fn shim_uses_runtime_markers() {
        let augmented = generate("", &AuthorizationPolicy::open());
        for marker in AMAZON_ENV_MARKERS {
            assert!(augmented.contains(marker));
        }
        assert!(augmented.contains(crate::runtime::amazon::ROUTE_KEY_FIELD));
        assert!(augmented.contains(crate::runtime::google::CORS_ALLOW_METHODS));
    }

    #[test]
    fn bearer_tokens_meet_the_length_floor() {
        let token = generate_bearer_token();
        assert!(token.trim().len() >= 10);
        assert_ne!(token, generate_bearer_token());
    }

    #[test]
    fn sanitization_escapes_literal_boundaries() {
        let sanitized = sanitize_bearer("ab'c`d\"e f");
        assert!(!sanitized.contains('\''));
        assert!(!sanitized.contains('`'));
        assert!(!sanitized.contains('"'));
        assert!(!sanitized.contains(' '));
    }

    #[test]
    fn authorizer_source_embeds_sanitized_token() {
        let sanitized = sanitize_bearer("secret-token-123");
        let source = generate_authorizer_source(&sanitized);
        assert!(source.contains("Bearer secret-token-123"));
        assert!(source.contains("isAuthorized"));
    }
}
