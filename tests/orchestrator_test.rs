use regex::Regex;
use skylift::authorizer::{
    AuthorizerInfo, AuthorizerManager, CreateOutcome, GatewayApi, RouteAuthorization, RouteInfo,
};
use skylift::packager::{PackageArtifact, Packager, ZipPackager};
use skylift::progress::RecordingReporter;
use skylift::provision::{Endpoint, Exposer, FunctionSpec, Provisioner};
use skylift::runtime::BoxFuture;
use skylift::{
    codegen, DeployConfig, DeployError, DeploymentTarget, Orchestrator, Provider, ProviderStack,
    Result,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Real zip packaging, with every archived code string recorded.
#[derive(Debug)]
struct RecordingPackager {
    inner: ZipPackager,
    archived: Mutex<Vec<String>>,
}

impl RecordingPackager {
    fn new(provider: Provider) -> Self {
        Self {
            inner: ZipPackager::new(provider),
            archived: Mutex::new(Vec::new()),
        }
    }
}

impl Packager for RecordingPackager {
    fn bundle(&self, path: &Path) -> BoxFuture<'_, Result<String>> {
        self.inner.bundle(path)
    }

    fn archive(&self, code: &str) -> BoxFuture<'_, Result<PackageArtifact>> {
        self.archived.lock().unwrap().push(code.to_string());
        self.inner.archive(code)
    }
}

/// Packager whose bundle step always fails.
#[derive(Debug)]
struct FailingPackager(Provider);

impl Packager for FailingPackager {
    fn bundle(&self, _path: &Path) -> BoxFuture<'_, Result<String>> {
        let provider = self.0;
        Box::pin(async move { Err(DeployError::packaging(provider, "simulated bundler crash")) })
    }

    fn archive(&self, _code: &str) -> BoxFuture<'_, Result<PackageArtifact>> {
        let provider = self.0;
        Box::pin(async move { Err(DeployError::packaging(provider, "unreachable")) })
    }
}

/// Provisioner + exposer + gateway rolled into one recording fake.
#[derive(Debug)]
struct FakeCloud {
    provider: Provider,
    provisioned: Mutex<Vec<String>>,
    fail_for: Option<String>,
    authorizers: Mutex<Vec<AuthorizerInfo>>,
    bindings: Mutex<Vec<(String, RouteAuthorization)>>,
}

impl FakeCloud {
    fn new(provider: Provider) -> Self {
        Self {
            provider,
            provisioned: Mutex::new(Vec::new()),
            fail_for: None,
            authorizers: Mutex::new(Vec::new()),
            bindings: Mutex::new(Vec::new()),
        }
    }

    fn failing_for(provider: Provider, name: &str) -> Self {
        Self {
            fail_for: Some(name.to_string()),
            ..Self::new(provider)
        }
    }
}

impl Provisioner for FakeCloud {
    fn provision(&self, _archive: &Path, spec: &FunctionSpec) -> BoxFuture<'_, Result<String>> {
        let name = spec.name.clone();
        let provider = self.provider;
        let fail = self.fail_for.as_deref() == Some(name.as_str());
        if !fail {
            self.provisioned.lock().unwrap().push(name.clone());
        }
        Box::pin(async move {
            if fail {
                Err(DeployError::provisioning(provider, "simulated create failure"))
            } else {
                Ok(format!("arn:aws:lambda:us-east-2:000000000000:function:{name}"))
            }
        })
    }
}

impl Exposer for FakeCloud {
    fn expose(&self, function_id: &str, _region: &str) -> BoxFuture<'_, Result<Endpoint>> {
        let name = function_id.rsplit(':').next().unwrap_or(function_id).to_string();
        let provider = self.provider;
        Box::pin(async move {
            Ok(Endpoint {
                url: format!("https://{provider}.example.com/{name}"),
                api_id: match provider {
                    Provider::Amazon => Some("api-1".to_string()),
                    Provider::Google => None,
                },
            })
        })
    }
}

impl GatewayApi for FakeCloud {
    fn create_authorizer(
        &self,
        _api_id: &str,
        name: &str,
        _function_arn: &str,
        _region: &str,
    ) -> BoxFuture<'_, Result<CreateOutcome>> {
        let mut authorizers = self.authorizers.lock().unwrap();
        let outcome = if authorizers.iter().any(|a| a.name == name) {
            CreateOutcome::AlreadyExists
        } else {
            let id = format!("auth-{}", authorizers.len() + 1);
            authorizers.push(AuthorizerInfo {
                id: id.clone(),
                name: name.to_string(),
            });
            CreateOutcome::Created(id)
        };
        Box::pin(async move { Ok(outcome) })
    }

    fn list_authorizers(
        &self,
        _api_id: &str,
        _region: &str,
    ) -> BoxFuture<'_, Result<Vec<AuthorizerInfo>>> {
        let authorizers = self.authorizers.lock().unwrap().clone();
        Box::pin(async move { Ok(authorizers) })
    }

    fn list_routes(&self, _api_id: &str, _region: &str) -> BoxFuture<'_, Result<Vec<RouteInfo>>> {
        Box::pin(async {
            Ok(vec![RouteInfo {
                id: "route-1".to_string(),
                route_key: "$default".to_string(),
            }])
        })
    }

    fn set_route_authorization(
        &self,
        _api_id: &str,
        route_id: &str,
        mode: RouteAuthorization,
        _region: &str,
    ) -> BoxFuture<'_, Result<()>> {
        self.bindings
            .lock()
            .unwrap()
            .push((route_id.to_string(), mode));
        Box::pin(async { Ok(()) })
    }

    fn grant_invoke(&self, _function_name: &str, _region: &str) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

// ---------------------------------------------------------------------------
// Stack assembly helpers
// ---------------------------------------------------------------------------

fn target(provider: Provider) -> DeploymentTarget {
    DeploymentTarget {
        provider,
        region: "us-east-2".to_string(),
        project: match provider {
            Provider::Google => Some("test-project".to_string()),
            Provider::Amazon => None,
        },
        role: match provider {
            Provider::Amazon => Some("arn:aws:iam::1:role/lambda".to_string()),
            Provider::Google => None,
        },
    }
}

fn amazon_stack(cloud: Arc<FakeCloud>, packager: Arc<RecordingPackager>) -> ProviderStack {
    ProviderStack {
        target: target(Provider::Amazon),
        packager: packager.clone(),
        provisioner: cloud.clone(),
        exposer: cloud.clone(),
        authorizer: Some(AuthorizerManager::new(packager, cloud.clone(), cloud)),
    }
}

fn google_stack(cloud: Arc<FakeCloud>) -> ProviderStack {
    ProviderStack {
        target: target(Provider::Google),
        packager: Arc::new(RecordingPackager::new(Provider::Google)),
        provisioner: cloud.clone(),
        exposer: cloud,
        authorizer: None,
    }
}

fn write_exports(dir: &Path, file: &str, names: &[&str]) {
    let body: String = names
        .iter()
        .map(|name| format!("exports.{name} = async (event) => event\n"))
        .collect();
    std::fs::write(dir.join(file), body).unwrap();
}

fn url_of<'a>(
    outcome: &'a skylift::RunOutcome,
    export: &str,
    provider: Provider,
) -> &'a Option<String> {
    &outcome
        .results
        .iter()
        .find(|r| r.export_name == export && r.provider == provider)
        .unwrap_or_else(|| panic!("missing result for {export} on {provider}"))
        .url
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_failing_export_never_affects_siblings() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(
        dir.path(),
        "api.js",
        &["endpoint_one", "endpoint_two", "endpoint_three"],
    );

    let amazon = Arc::new(FakeCloud::failing_for(Provider::Amazon, "endpoint_two"));
    let google = Arc::new(FakeCloud::new(Provider::Google));
    let reporter = Arc::new(RecordingReporter::new());

    let orchestrator = Orchestrator::new(
        vec![
            amazon_stack(amazon.clone(), Arc::new(RecordingPackager::new(Provider::Amazon))),
            google_stack(google),
        ],
        reporter.clone(),
    );

    let pattern = Regex::new("^endpoint_").unwrap();
    let outcome = orchestrator.run(dir.path(), &pattern, false).await.unwrap();

    assert_eq!(outcome.results.len(), 6);
    assert!(url_of(&outcome, "endpoint_two", Provider::Amazon).is_none());
    assert!(url_of(&outcome, "endpoint_two", Provider::Google).is_some());
    assert!(url_of(&outcome, "endpoint_one", Provider::Amazon).is_some());
    assert!(url_of(&outcome, "endpoint_three", Provider::Amazon).is_some());
    assert_eq!(reporter.failure_count(), 1);
    assert!(outcome.shared_bearer.is_none());
}

#[tokio::test]
async fn packaging_failure_is_isolated_to_one_provider() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path(), "api.js", &["endpoint_one"]);

    let amazon = Arc::new(FakeCloud::new(Provider::Amazon));
    let google = Arc::new(FakeCloud::new(Provider::Google));
    let reporter = Arc::new(RecordingReporter::new());

    let mut broken_amazon =
        amazon_stack(amazon, Arc::new(RecordingPackager::new(Provider::Amazon)));
    broken_amazon.packager = Arc::new(FailingPackager(Provider::Amazon));

    let orchestrator = Orchestrator::new(
        vec![broken_amazon, google_stack(google.clone())],
        reporter.clone(),
    );

    let pattern = Regex::new("^endpoint_").unwrap();
    let outcome = orchestrator.run(dir.path(), &pattern, false).await.unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert!(url_of(&outcome, "endpoint_one", Provider::Amazon).is_none());
    assert!(url_of(&outcome, "endpoint_one", Provider::Google).is_some());
    assert_eq!(google.provisioned.lock().unwrap().len(), 1);
    assert_eq!(reporter.failure_count(), 1);
}

#[tokio::test]
async fn empty_discovery_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path(), "lib.js", &["helper"]);

    let orchestrator = Orchestrator::new(
        vec![amazon_stack(
            Arc::new(FakeCloud::new(Provider::Amazon)),
            Arc::new(RecordingPackager::new(Provider::Amazon)),
        )],
        Arc::new(RecordingReporter::new()),
    );

    let pattern = Regex::new("^endpoint_").unwrap();
    let outcome = orchestrator.run(dir.path(), &pattern, true).await.unwrap();

    assert!(outcome.results.is_empty());
    assert!(outcome.shared_bearer.is_none());
}

#[tokio::test]
async fn one_run_shares_one_secret_across_all_authorizers() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path(), "one.js", &["endpoint_a", "endpoint_b"]);
    write_exports(dir.path(), "two.js", &["endpoint_c"]);

    let cloud = Arc::new(FakeCloud::new(Provider::Amazon));
    let packager = Arc::new(RecordingPackager::new(Provider::Amazon));
    let orchestrator = Orchestrator::new(
        vec![amazon_stack(cloud.clone(), packager.clone())],
        Arc::new(RecordingReporter::new()),
    );

    let pattern = Regex::new("^endpoint_").unwrap();
    let outcome = orchestrator.run(dir.path(), &pattern, true).await.unwrap();

    let bearer = outcome.shared_bearer.as_deref().expect("bearer generated");
    let expected = format!("Bearer {}", codegen::sanitize_bearer(bearer));

    let archived = packager.archived.lock().unwrap();
    let authorizer_sources: Vec<&String> = archived
        .iter()
        .filter(|code| code.contains("isAuthorized"))
        .collect();
    assert_eq!(authorizer_sources.len(), 3);
    assert!(authorizer_sources.iter().all(|code| code.contains(&expected)));

    // Every endpoint got guarded through the default route.
    assert_eq!(cloud.bindings.lock().unwrap().len(), 3);
    // One logical authorizer per export name.
    assert_eq!(cloud.authorizers.lock().unwrap().len(), 3);
    assert!(outcome.results.iter().all(|r| r.url.is_some()));
}

#[tokio::test]
async fn wrapper_is_appended_to_every_user_bundle() {
    let dir = tempfile::tempdir().unwrap();
    write_exports(dir.path(), "api.js", &["endpoint_a"]);

    let packager = Arc::new(RecordingPackager::new(Provider::Amazon));
    let orchestrator = Orchestrator::new(
        vec![amazon_stack(Arc::new(FakeCloud::new(Provider::Amazon)), packager.clone())],
        Arc::new(RecordingReporter::new()),
    );

    let pattern = Regex::new("^endpoint_").unwrap();
    orchestrator.run(dir.path(), &pattern, false).await.unwrap();

    let archived = packager.archived.lock().unwrap();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].contains("exports.endpoint_a"));
    assert!(archived[0].contains(codegen::WRAPPER_MARKER));
}

#[test]
fn invalid_configuration_fails_before_any_side_effect() {
    let config = DeployConfig::default();
    let err = Orchestrator::from_config(&config, Arc::new(RecordingReporter::new())).unwrap_err();
    assert!(matches!(err, DeployError::Configuration(_)));
    assert!(err.is_fatal());
}
