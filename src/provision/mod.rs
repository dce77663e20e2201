//! Cloud provisioning seams.
//!
//! The low-level create/update calls are collaborators of the pipeline:
//! object-safe traits in front of thin per-provider REST wrappers, so the
//! orchestrator and the authorizer manager stay free of provider SDK
//! details and tests can substitute recording fakes.

pub mod amazon;
pub mod google;
pub(crate) mod sign;

use crate::errors::Result;
use crate::runtime::BoxFuture;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Function provisioning
// ---------------------------------------------------------------------------

/// Desired identity and shape of a provisioned function.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub region: String,
    /// Execution timeout in seconds.
    pub timeout_secs: u32,
    /// Entry point, e.g. `index.handler` on amazon or the export name on
    /// google.
    pub handler: String,
    /// IAM role ARN (amazon only).
    pub role: Option<String>,
    /// Cloud project (google only).
    pub project: Option<String>,
}

impl FunctionSpec {
    /// Default execution timeout for user functions.
    pub const DEFAULT_TIMEOUT_SECS: u32 = 60;
}

/// Creates or updates a function resource from a deployable archive.
///
/// Idempotent under repeated calls with the same name (create-or-update
/// semantics); returns the stable resource identifier.
pub trait Provisioner: Send + Sync + Debug {
    fn provision(&self, archive: &Path, spec: &FunctionSpec) -> BoxFuture<'_, Result<String>>;
}

/// A cloneable, type-erased provisioner handle.
pub type DynProvisioner = Arc<dyn Provisioner>;

// ---------------------------------------------------------------------------
// Endpoint exposure
// ---------------------------------------------------------------------------

/// An HTTP endpoint fronting a provisioned function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    /// Routing resource id the endpoint is served through; present only
    /// where a separate gateway resource exists (amazon).
    pub api_id: Option<String>,
}

/// Exposes a provisioned function as an HTTP endpoint.
pub trait Exposer: Send + Sync + Debug {
    fn expose(&self, function_id: &str, region: &str) -> BoxFuture<'_, Result<Endpoint>>;
}

/// A cloneable, type-erased exposer handle.
pub type DynExposer = Arc<dyn Exposer>;
