//! Google provisioning: Cloud Functions create-or-update and HTTPS
//! trigger exposure.
//!
//! Thin wrappers over the Cloud Functions v1 REST API, authenticated with
//! an OAuth bearer token. Endpoint URLs follow the standard
//! `https://<region>-<project>.cloudfunctions.net/<name>` form, and new
//! functions are made publicly invocable so the gateway-level authorizer
//! story stays per-provider.

use crate::config::{GoogleConfig, Provider};
use crate::errors::{DeployError, Result};
use crate::provision::{Endpoint, Exposer, FunctionSpec, Provisioner};
use crate::runtime::BoxFuture;
use reqwest::Method;
use serde_json::{json, Value};
use std::path::Path;

const FUNCTIONS_ENDPOINT: &str = "https://cloudfunctions.googleapis.com/v1";

/// Client for the google Cloud Functions management API.
#[derive(Debug, Clone)]
pub struct GoogleApi {
    client: reqwest::Client,
    token: String,
    project: String,
    runtime: String,
}

impl GoogleApi {
    /// Build a client from the google configuration section. The OAuth
    /// token comes from `GOOGLE_OAUTH_TOKEN`.
    pub fn new(config: &GoogleConfig) -> Result<Self> {
        let token = std::env::var("GOOGLE_OAUTH_TOKEN").map_err(|_| {
            DeployError::Configuration("GOOGLE_OAUTH_TOKEN is required for google deploys".into())
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            token,
            project: config.project.clone(),
            runtime: config.runtime.clone(),
        })
    }

    fn location(&self, region: &str) -> String {
        format!("projects/{}/locations/{region}", self.project)
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(u16, Value)> {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Ok((status, value))
    }

    /// Stage the archive behind a one-shot signed upload URL.
    async fn upload_archive(&self, region: &str, archive: &Path) -> Result<String> {
        let url = format!(
            "{FUNCTIONS_ENDPOINT}/{}/functions:generateUploadUrl",
            self.location(region)
        );
        let (status, value) = self.request(Method::POST, &url, Some(&json!({}))).await?;
        if status != 200 {
            return Err(provisioning_error(status, &value));
        }
        let upload_url = value
            .get("uploadUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DeployError::provisioning(Provider::Google, "response carried no uploadUrl")
            })?
            .to_string();

        let bytes = tokio::fs::read(archive).await?;
        let response = self
            .client
            .put(&upload_url)
            .header("Content-Type", "application/zip")
            .header("x-goog-content-length-range", "0,104857600")
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeployError::provisioning(
                Provider::Google,
                format!("archive upload failed: HTTP {}", response.status()),
            ));
        }

        Ok(upload_url)
    }

    /// Allow unauthenticated invocations; authorization is enforced at the
    /// routing layer, not per function.
    async fn allow_all_invokers(&self, region: &str, name: &str) -> Result<()> {
        let url = format!(
            "{FUNCTIONS_ENDPOINT}/{}/functions/{name}:setIamPolicy",
            self.location(region)
        );
        let body = json!({
            "policy": {
                "bindings": [{
                    "role": "roles/cloudfunctions.invoker",
                    "members": ["allUsers"],
                }],
            },
        });
        let (status, value) = self.request(Method::POST, &url, Some(&body)).await?;
        if status == 200 {
            Ok(())
        } else {
            Err(provisioning_error(status, &value))
        }
    }
}

fn provisioning_error(status: u16, detail: &Value) -> DeployError {
    DeployError::provisioning(Provider::Google, format!("HTTP {status}: {detail}"))
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

impl Provisioner for GoogleApi {
    fn provision(&self, archive: &Path, spec: &FunctionSpec) -> BoxFuture<'_, Result<String>> {
        let archive = archive.to_path_buf();
        let spec = spec.clone();
        Box::pin(async move {
            let upload_url = self.upload_archive(&spec.region, &archive).await?;
            let resource_name = format!("{}/functions/{}", self.location(&spec.region), spec.name);

            let function_body = json!({
                "name": resource_name,
                "entryPoint": spec.handler,
                "runtime": self.runtime,
                "timeout": format!("{}s", spec.timeout_secs),
                "sourceUploadUrl": upload_url,
                "httpsTrigger": {},
            });

            let create_url = format!(
                "{FUNCTIONS_ENDPOINT}/{}/functions",
                self.location(&spec.region)
            );
            let (status, value) = self
                .request(Method::POST, &create_url, Some(&function_body))
                .await?;

            match status {
                200 => Ok(resource_name),
                409 => {
                    // Function exists: converge it onto the new source.
                    tracing::debug!(function = %spec.name, "function exists, patching");
                    let patch_url = format!("{FUNCTIONS_ENDPOINT}/{resource_name}");
                    let (status, value) = self
                        .request(Method::PATCH, &patch_url, Some(&function_body))
                        .await?;
                    if status == 200 {
                        Ok(resource_name)
                    } else {
                        Err(provisioning_error(status, &value))
                    }
                }
                _ => Err(provisioning_error(status, &value)),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Exposer
// ---------------------------------------------------------------------------

impl Exposer for GoogleApi {
    fn expose(&self, function_id: &str, region: &str) -> BoxFuture<'_, Result<Endpoint>> {
        let function_id = function_id.to_string();
        let region = region.to_string();
        Box::pin(async move {
            let name = function_id
                .rsplit('/')
                .next()
                .unwrap_or(&function_id)
                .to_string();
            self.allow_all_invokers(&region, &name).await?;

            Ok(Endpoint {
                url: format!("https://{region}-{}.cloudfunctions.net/{name}", self.project),
                api_id: None,
            })
        })
    }
}
