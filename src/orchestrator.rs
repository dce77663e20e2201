//! Top-level deployment driver.
//!
//! One run fans out over discovered files, and within each file over
//! (export, provider) pairs. Tasks at the same level run concurrently with
//! no ordering guarantee and no synchronization barrier other than "all
//! complete before the aggregate result is produced". A failure in one
//! unit never cancels or fails its siblings: best-effort completion, not a
//! transaction. The orchestrator retries nothing itself.

use crate::authorizer::{authorizer_name, AuthorizerManager};
use crate::codegen::{self, AuthorizationPolicy};
use crate::config::{DeployConfig, DeploymentTarget, Provider};
use crate::discover::{self, FileExports};
use crate::errors::{DeployError, Result};
use crate::packager::{DynPackager, PackageArtifact, ZipPackager};
use crate::progress::DynReporter;
use crate::provision::{
    amazon::AmazonApi, google::GoogleApi, DynExposer, DynProvisioner, FunctionSpec,
};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of deploying one export to one provider.
///
/// A `None` url records an isolated failure for that (export, provider)
/// pair; sibling results are unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    pub export_name: String,
    pub provider: Provider,
    pub url: Option<String>,
}

/// Aggregate outcome of a run. Structurally successful even when every
/// individual unit failed.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub results: Vec<DeploymentResult>,
    /// The run-wide bearer token, present when authorization was
    /// requested, so the caller can hand it to the operator out-of-band.
    pub shared_bearer: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider stacks
// ---------------------------------------------------------------------------

/// The collaborator set for one enabled provider.
#[derive(Clone)]
pub struct ProviderStack {
    pub target: DeploymentTarget,
    pub packager: DynPackager,
    pub provisioner: DynProvisioner,
    pub exposer: DynExposer,
    /// Authorizer support; `None` where the provider's routing layer has
    /// no custom-authorizer resource.
    pub authorizer: Option<AuthorizerManager>,
}

impl ProviderStack {
    fn provider(&self) -> Provider {
        self.target.provider
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives a whole deployment run.
pub struct Orchestrator {
    stacks: Vec<ProviderStack>,
    reporter: DynReporter,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stacks", &self.stacks.len())
            .finish()
    }
}

impl Orchestrator {
    /// Assemble an orchestrator from explicit provider stacks. Primarily
    /// used by tests substituting fakes for the cloud seams.
    pub fn new(stacks: Vec<ProviderStack>, reporter: DynReporter) -> Self {
        Self { stacks, reporter }
    }

    /// Assemble the real provider stacks for a validated configuration.
    ///
    /// Fails fast on an invalid configuration, before any cloud side
    /// effect.
    pub fn from_config(config: &DeployConfig, reporter: DynReporter) -> Result<Self> {
        config.validate()?;

        let mut stacks = Vec::new();
        if let Some(section) = &config.amazon {
            let api = Arc::new(AmazonApi::new(section)?);
            let packager: DynPackager = Arc::new(ZipPackager::new(Provider::Amazon));
            stacks.push(ProviderStack {
                target: DeploymentTarget {
                    provider: Provider::Amazon,
                    region: section.region.clone(),
                    project: None,
                    role: Some(section.role.clone()),
                },
                packager: packager.clone(),
                provisioner: api.clone(),
                exposer: api.clone(),
                authorizer: Some(AuthorizerManager::new(packager, api.clone(), api)),
            });
        }
        if let Some(section) = &config.google {
            let api = Arc::new(GoogleApi::new(section)?);
            stacks.push(ProviderStack {
                target: DeploymentTarget {
                    provider: Provider::Google,
                    region: section.region.clone(),
                    project: Some(section.project.clone()),
                    role: None,
                },
                packager: Arc::new(ZipPackager::new(Provider::Google)),
                provisioner: api.clone(),
                exposer: api,
                authorizer: None,
            });
        }

        Ok(Self { stacks, reporter })
    }

    /// Deploy every export under `dir` whose name matches `pattern` to
    /// every enabled provider.
    ///
    /// Zero discovered exports is an empty result, not an error. When
    /// `need_auth` is set, exactly one shared secret is generated for the
    /// entire run and returned in the outcome.
    pub async fn run(
        &self,
        dir: impl AsRef<Path>,
        pattern: &Regex,
        need_auth: bool,
    ) -> Result<RunOutcome> {
        if self.stacks.is_empty() {
            return Err(DeployError::Configuration(
                "no provider enabled for this run".into(),
            ));
        }

        let groups = discover::find(dir.as_ref(), pattern)?;
        if groups.is_empty() {
            tracing::info!(pattern = %pattern, "no exports found");
            return Ok(RunOutcome {
                results: Vec::new(),
                shared_bearer: None,
            });
        }

        // One run, one secret: generated once, read-only afterwards, shared
        // by every concurrent task.
        let policy = Arc::new(if need_auth {
            AuthorizationPolicy::bearer(codegen::generate_bearer_token())
        } else {
            AuthorizationPolicy::open()
        });
        if policy.need_auth {
            tracing::info!("generated run-wide bearer token");
        }

        let mut file_tasks = JoinSet::new();
        for group in groups {
            let stacks = self.stacks.clone();
            let reporter = self.reporter.clone();
            let policy = policy.clone();
            file_tasks.spawn(async move { deploy_file(group, stacks, policy, reporter).await });
        }

        let mut results = Vec::new();
        while let Some(joined) = file_tasks.join_next().await {
            match joined {
                Ok(mut file_results) => results.append(&mut file_results),
                Err(e) => tracing::error!(error = %e, "file task panicked"),
            }
        }

        results.sort_by(|a, b| {
            (a.export_name.as_str(), a.provider.as_str())
                .cmp(&(b.export_name.as_str(), b.provider.as_str()))
        });

        Ok(RunOutcome {
            results,
            shared_bearer: policy.expected_bearer.clone(),
        })
    }

    /// Remove authorization from an api's `$default` route using the
    /// first provider stack that supports authorizers.
    pub async fn detach_default_route(&self, api_id: &str, api_region: &str) -> Result<()> {
        let manager = self
            .stacks
            .iter()
            .find_map(|stack| stack.authorizer.as_ref())
            .ok_or_else(|| {
                DeployError::Configuration(
                    "no configured provider supports route authorizers".into(),
                )
            })?;
        manager.detach_from_default_route(api_id, api_region).await
    }
}

// ---------------------------------------------------------------------------
// Per-file pipeline
// ---------------------------------------------------------------------------

/// Bundle, adapt and archive once per provider, then deploy each export.
async fn deploy_file(
    group: FileExports,
    stacks: Vec<ProviderStack>,
    policy: Arc<AuthorizationPolicy>,
    reporter: DynReporter,
) -> Vec<DeploymentResult> {
    // Exports within a file share one bundle, so one archive per provider.
    let mut artifacts: HashMap<Provider, Arc<PackageArtifact>> = HashMap::new();
    for stack in &stacks {
        match package(stack, &group.path, &policy).await {
            Ok(artifact) => {
                artifacts.insert(stack.provider(), Arc::new(artifact));
            }
            Err(e) => {
                // Every export of this file records a failure for this
                // provider; other providers proceed.
                let task_id = format!("{}-{}", stack.provider(), group.path.display());
                reporter.fail(
                    &task_id,
                    &format!(
                        "{} errored packaging {}: {e}",
                        stack.provider().label(),
                        group.path.display()
                    ),
                );
                tracing::debug!(error = %e, path = %group.path.display(), "packaging failed");
            }
        }
    }

    let mut export_tasks = JoinSet::new();
    for export in group.exports() {
        for stack in stacks.clone() {
            let artifact = artifacts.get(&stack.provider()).cloned();
            let policy = policy.clone();
            let reporter = reporter.clone();
            let export_name = export.export_name.clone();
            export_tasks
                .spawn(async move { deploy_export(stack, export_name, artifact, policy, reporter).await });
        }
    }

    let mut results = Vec::new();
    while let Some(joined) = export_tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!(error = %e, "export task panicked"),
        }
    }
    results
}

async fn package(
    stack: &ProviderStack,
    path: &Path,
    policy: &AuthorizationPolicy,
) -> Result<PackageArtifact> {
    let bundled = stack.packager.bundle(path).await?;
    let augmented = codegen::generate(&bundled, policy);
    stack.packager.archive(&augmented).await
}

// ---------------------------------------------------------------------------
// Per-export pipeline
// ---------------------------------------------------------------------------

/// Provision, expose and optionally guard one export on one provider.
///
/// Every failure is caught at this boundary: reported, recorded as a
/// `None` url, never re-thrown upward.
async fn deploy_export(
    stack: ProviderStack,
    export_name: String,
    artifact: Option<Arc<PackageArtifact>>,
    policy: Arc<AuthorizationPolicy>,
    reporter: DynReporter,
) -> DeploymentResult {
    let provider = stack.provider();
    let Some(artifact) = artifact else {
        // Packaging already failed and was reported at the file level.
        return DeploymentResult {
            export_name,
            provider,
            url: None,
        };
    };

    let task_id = format!("{provider}-{export_name}");
    reporter.begin(
        &task_id,
        &format!("{} deploying {export_name}", provider.label()),
    );

    match provision_and_expose(&stack, &export_name, &artifact, &policy).await {
        Ok(url) => {
            reporter.succeed(
                &task_id,
                &format!("{} {export_name} {url}", provider.label()),
            );
            DeploymentResult {
                export_name,
                provider,
                url: Some(url),
            }
        }
        Err(e) => {
            reporter.fail(
                &task_id,
                &format!("{} error deploying {export_name}: {e}", provider.label()),
            );
            tracing::debug!(error = %e, export = %export_name, provider = %provider, "deploy failed");
            DeploymentResult {
                export_name,
                provider,
                url: None,
            }
        }
    }
}

async fn provision_and_expose(
    stack: &ProviderStack,
    export_name: &str,
    artifact: &PackageArtifact,
    policy: &AuthorizationPolicy,
) -> Result<String> {
    let target = &stack.target;
    let spec = FunctionSpec {
        name: export_name.to_string(),
        region: target.region.clone(),
        timeout_secs: FunctionSpec::DEFAULT_TIMEOUT_SECS,
        handler: match target.provider {
            Provider::Amazon => format!("index.{export_name}"),
            Provider::Google => export_name.to_string(),
        },
        role: target.role.clone(),
        project: target.project.clone(),
    };

    let function_id = stack
        .provisioner
        .provision(&artifact.archive_path, &spec)
        .await?;
    let endpoint = stack.exposer.expose(&function_id, &target.region).await?;

    if policy.need_auth {
        if let (Some(manager), Some(bearer)) = (&stack.authorizer, &policy.expected_bearer) {
            let name = authorizer_name(export_name);
            let authorizer_arn = manager.deploy(&name, bearer, &target.region).await?;
            let api_id = endpoint.api_id.as_deref().ok_or_else(|| {
                DeployError::AuthorizerConvergence(
                    "endpoint has no routing resource to guard".into(),
                )
            })?;
            manager
                .attach_to_default_route(api_id, &authorizer_arn, &target.region)
                .await?;
        }
    }

    Ok(endpoint.url)
}
