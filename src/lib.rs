#![deny(warnings)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Allowed pedantic lints for existing codebase compatibility
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::single_match_else)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::ref_option)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::map_unwrap_or)]
//! # skylift
//!
//! Deploys selected exported functions from a source tree to serverless
//! cloud runtimes (amazon and google) as independently invocable HTTP
//! endpoints, optionally gated by a shared-secret bearer-token authorizer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skylift::{DeployConfig, Orchestrator, progress::NullReporter};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> skylift::Result<()> {
//! let config = DeployConfig::load("skylift.json")?;
//! let orchestrator = Orchestrator::from_config(&config, Arc::new(NullReporter))?;
//!
//! let pattern = regex::Regex::new("^endpoint_").unwrap();
//! let outcome = orchestrator.run("./src", &pattern, true).await?;
//!
//! for result in &outcome.results {
//!     println!("{} on {}: {:?}", result.export_name, result.provider, result.url);
//! }
//! if let Some(bearer) = &outcome.shared_bearer {
//!     println!("Authorization: Bearer {bearer}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Orchestrator**: fans packaging and provisioning work out across
//!   files, exports and providers, isolating failures per unit.
//! - **Code generation** ([`codegen`]): appends the cold-start wrapper
//!   that normalizes provider invocation envelopes into one calling
//!   convention; [`runtime`] is the host-side model of those semantics.
//! - **Authorizer lifecycle** ([`authorizer`]): provisions a
//!   bearer-checking function and converges it onto the default route.
//! - External collaborators (discovery, packaging, provisioning calls,
//!   progress output) sit behind object-safe traits so tests substitute
//!   recording fakes.

pub mod authorizer;
pub mod codegen;
pub mod config;
pub mod discover;
pub mod errors;
pub mod init;
pub mod orchestrator;
pub mod packager;
pub mod progress;
pub mod provision;
pub mod runtime;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use authorizer::{
    authorizes, AuthorizerManager, CreateOutcome, GatewayApi, RouteAuthorization,
};
pub use codegen::AuthorizationPolicy;
pub use config::{AmazonConfig, DeployConfig, DeploymentTarget, GoogleConfig, Provider};
pub use discover::{FileExports, FunctionExport};
pub use errors::{DeployError, Result};
pub use orchestrator::{DeploymentResult, Orchestrator, ProviderStack, RunOutcome};
pub use packager::{PackageArtifact, Packager, ZipPackager};
pub use progress::{ProgressReporter, RecordingReporter};
pub use provision::{Endpoint, Exposer, FunctionSpec, Provisioner};
pub use runtime::{Dispatcher, Platform, WrapRegistry};
