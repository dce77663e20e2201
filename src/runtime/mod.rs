//! Host-side model of the deployed cold-start wrapper.
//!
//! The code emitted by [`crate::codegen`] wraps every exported function at
//! cold start so that amazon and google invocation envelopes arrive at the
//! user function in one calling convention: `(event, httpSubset)`. This
//! module implements the same semantics natively so the calling convention
//! can be exercised in tests without a cloud deployment, and so the code
//! generator and the model share one set of platform constants.
//!
//! Platform detection is injected: [`detect_platform`] is a pure function
//! over an environment map, and reading the real process environment is
//! confined to [`Platform::from_process_env`].

pub mod amazon;
pub mod google;

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Platform detection
// ---------------------------------------------------------------------------

/// Environment variables whose presence marks an amazon execution context.
pub const AMAZON_ENV_MARKERS: [&str; 2] = ["LAMBDA_TASK_ROOT", "AWS_EXECUTION_ENV"];

/// Environment field inspected for a google execution context.
pub const GOOGLE_ENV_FIELD: &str = "_";

/// Substring of [`GOOGLE_ENV_FIELD`] that marks a google execution context.
pub const GOOGLE_ENV_SUBSTRING: &str = "google";

/// The execution context a deployed function finds itself in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Amazon,
    Google,
    /// Not a recognized cloud runtime; exports stay unwrapped so functions
    /// remain callable in local tests.
    Local,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Google => "google",
            Platform::Local => "local",
        }
    }

    /// Classify the real process environment. The only place this crate
    /// reads ambient environment state for dispatch.
    pub fn from_process_env() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        detect_platform(&env)
    }
}

/// Classify an execution context from an environment map.
///
/// Amazon wins over google when both marker sets are present, matching the
/// emitted wrapper's check order.
pub fn detect_platform(env: &HashMap<String, String>) -> Platform {
    if AMAZON_ENV_MARKERS
        .iter()
        .any(|marker| env.get(*marker).is_some_and(|v| !v.is_empty()))
    {
        return Platform::Amazon;
    }
    if env
        .get(GOOGLE_ENV_FIELD)
        .is_some_and(|v| v.contains(GOOGLE_ENV_SUBSTRING))
    {
        return Platform::Google;
    }
    Platform::Local
}

// ---------------------------------------------------------------------------
// Handler types
// ---------------------------------------------------------------------------

/// A boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The HTTP-derived second argument of the unified calling convention.
///
/// Empty for direct (console/SDK) invocations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpSubset {
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
}

/// Error returned by a user function.
///
/// `code` carries a provider error discriminant when one exists; the amazon
/// adapter gives [`amazon::ACCESS_DENIED`] special treatment.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub code: Option<String>,
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// A user function in the unified calling convention.
pub type HandlerFn = Arc<
    dyn Fn(Value, HttpSubset) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync,
>;

/// Convenience constructor for a [`HandlerFn`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Value, HttpSubset) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(move |event, http| {
        Box::pin(f(event, http)) as BoxFuture<'static, Result<Value, HandlerError>>
    })
}

// ---------------------------------------------------------------------------
// Wrap registry
// ---------------------------------------------------------------------------

/// Names already wrapped in the current warm execution context.
///
/// Owned by a [`Dispatcher`], never shared across processes: each deployed
/// function instance has its own registry, populated monotonically from the
/// cold-start path and cleared only when the execution context is recycled
/// externally.
#[derive(Debug, Default)]
pub struct WrapRegistry {
    names: HashSet<String>,
}

impl WrapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Record a name as wrapped. Returns `false` if it was already present.
    pub fn record(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

enum Wrapped {
    /// Local platform: the export is kept unmodified.
    Plain(HandlerFn),
    Amazon(HandlerFn),
    Google(HandlerFn),
}

/// The long-lived per-process context that wraps exports at cold start and
/// dispatches invocations to them.
///
/// [`Dispatcher::absorb`] is idempotent: a name already present in the
/// [`WrapRegistry`] is skipped, so re-running the wrap logic within the
/// same warm context never double-wraps a handler. Double wrapping would
/// corrupt the calling convention (nested envelope shapes, double JSON
/// parsing).
pub struct Dispatcher {
    platform: Platform,
    registry: WrapRegistry,
    exports: HashMap<String, Wrapped>,
}

impl Dispatcher {
    /// Create a dispatcher for an explicitly injected platform.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            registry: WrapRegistry::new(),
            exports: HashMap::new(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Names currently registered as wrapped.
    pub fn wrapped_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_wrapped(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Absorb a module's exports, wrapping each one for the platform.
    ///
    /// Names already recorded in the registry are left untouched; calling
    /// `absorb` again with the same exports (module re-evaluation in a warm
    /// context) is a no-op for them.
    pub fn absorb(&mut self, exports: Vec<(String, HandlerFn)>) {
        for (name, handler) in exports {
            if !self.registry.record(&name) {
                tracing::debug!(export = %name, "already wrapped, skipping");
                continue;
            }
            let wrapped = match self.platform {
                Platform::Local => Wrapped::Plain(handler),
                Platform::Amazon => Wrapped::Amazon(handler),
                Platform::Google => Wrapped::Google(handler),
            };
            self.exports.insert(name, wrapped);
        }
    }

    /// Invoke an export with an amazon invocation envelope.
    ///
    /// Returns the value delivered on the provider's success channel, or
    /// the propagated handler error.
    pub async fn invoke_amazon(&self, name: &str, input: Value) -> Result<Value, HandlerError> {
        match self.exports.get(name) {
            Some(Wrapped::Amazon(handler)) => amazon::invoke(handler, input).await,
            Some(Wrapped::Plain(handler)) => handler(input, HttpSubset::default()).await,
            Some(Wrapped::Google(_)) => Err(HandlerError::new(format!(
                "{name} is wrapped for google, not amazon"
            ))),
            None => Err(HandlerError::new(format!("no export named {name}"))),
        }
    }

    /// Invoke an export with a google HTTP request.
    pub async fn invoke_google(
        &self,
        name: &str,
        request: google::GoogleRequest,
    ) -> google::GoogleResponse {
        match self.exports.get(name) {
            Some(Wrapped::Google(handler)) => google::handle(handler, request).await,
            Some(Wrapped::Plain(handler)) => {
                // Local fallback keeps the raw convention observable.
                let event = request.merged_event();
                let http = request.http_subset();
                match handler(event, http).await {
                    Ok(value) => google::GoogleResponse::json(value),
                    Err(_) => google::GoogleResponse::empty(500),
                }
            }
            _ => google::GoogleResponse::empty(500),
        }
    }

    /// Invoke an export directly with the unified calling convention.
    pub async fn invoke_local(
        &self,
        name: &str,
        event: Value,
        http: HttpSubset,
    ) -> Result<Value, HandlerError> {
        match self.exports.get(name) {
            Some(Wrapped::Plain(handler) | Wrapped::Amazon(handler) | Wrapped::Google(handler)) => {
                handler(event, http).await
            }
            None => Err(HandlerError::new(format!("no export named {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn detects_amazon_from_task_root() {
        let platform = detect_platform(&env(&[("LAMBDA_TASK_ROOT", "/var/task")]));
        assert_eq!(platform, Platform::Amazon);
    }

    #[test]
    fn detects_google_from_underscore_field() {
        let platform = detect_platform(&env(&[("_", "/usr/bin/google-entrypoint")]));
        assert_eq!(platform, Platform::Google);
    }

    #[test]
    fn falls_back_to_local() {
        let platform = detect_platform(&env(&[("PATH", "/usr/bin")]));
        assert_eq!(platform, Platform::Local);
    }

    #[test]
    fn registry_records_once() {
        let mut registry = WrapRegistry::new();
        assert!(registry.record("endpoint_hello"));
        assert!(!registry.record("endpoint_hello"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn local_platform_keeps_exports_unmodified() {
        let mut dispatcher = Dispatcher::new(Platform::Local);
        dispatcher.absorb(vec![(
            "echo".to_string(),
            handler_fn(|event, _http| async move { Ok(event) }),
        )]);

        let out = dispatcher
            .invoke_local("echo", json!({"a": 1}), HttpSubset::default())
            .await
            .unwrap();
        assert_eq!(out, json!({"a": 1}));
    }
}
