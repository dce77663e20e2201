//! Amazon provisioning: Lambda function create-or-update, HTTP api
//! exposure, and the gateway operations behind the authorizer seam.
//!
//! Thin REST wrappers over the Lambda and API Gateway v2 management
//! endpoints, signed with SigV4. All pipeline-visible behavior lives
//! behind the [`Provisioner`], [`Exposer`] and [`GatewayApi`] traits.

use crate::authorizer::{AuthorizerInfo, CreateOutcome, GatewayApi, RouteAuthorization, RouteInfo};
use crate::config::{AmazonConfig, Provider};
use crate::errors::{DeployError, Result};
use crate::provision::sign::{self, Credentials};
use crate::provision::{Endpoint, Exposer, FunctionSpec, Provisioner};
use crate::runtime::BoxFuture;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};
use std::path::Path;

const LAMBDA_API_VERSION: &str = "2015-03-31";
const NODE_RUNTIME: &str = "nodejs20.x";

/// Client for the amazon management APIs.
#[derive(Debug, Clone)]
pub struct AmazonApi {
    client: reqwest::Client,
    credentials: Credentials,
    default_role: String,
}

impl AmazonApi {
    /// Build a client from the amazon configuration section. Credentials
    /// fall back to the conventional environment variables.
    pub fn new(config: &AmazonConfig) -> Result<Self> {
        let access_key_id = config
            .access_key_id
            .clone()
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok())
            .ok_or_else(|| {
                DeployError::Configuration(
                    "amazon.access_key_id or AWS_ACCESS_KEY_ID is required".into(),
                )
            })?;
        let secret_access_key = config
            .secret_access_key
            .clone()
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok())
            .ok_or_else(|| {
                DeployError::Configuration(
                    "amazon.secret_access_key or AWS_SECRET_ACCESS_KEY is required".into(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            credentials: Credentials {
                access_key_id,
                secret_access_key,
            },
            default_role: config.role.clone(),
        })
    }

    /// Send one signed request and parse the JSON response body, if any.
    async fn request(
        &self,
        method: Method,
        service: &str,
        region: &str,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> Result<(u16, Value)> {
        let host = format!("{service}.{region}.amazonaws.com");
        let payload = match body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };

        let signed = sign::sign(
            &self.credentials,
            method.as_str(),
            &host,
            path,
            query,
            &payload,
            region,
            service,
            chrono::Utc::now(),
        );

        let url = if query.is_empty() {
            format!("https://{host}{path}")
        } else {
            format!("https://{host}{path}?{query}")
        };

        let mut request = self
            .client
            .request(method, &url)
            .header("X-Amz-Date", signed.amz_date)
            .header("Authorization", signed.authorization);
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(payload);
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
}

fn provisioning_error(status: u16, detail: &Value) -> DeployError {
    DeployError::provisioning(Provider::Amazon, format!("HTTP {status}: {detail}"))
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

impl Provisioner for AmazonApi {
    fn provision(&self, archive: &Path, spec: &FunctionSpec) -> BoxFuture<'_, Result<String>> {
        let archive = archive.to_path_buf();
        let spec = spec.clone();
        Box::pin(async move {
            let zip_bytes = tokio::fs::read(&archive).await?;
            let zip_b64 = base64::engine::general_purpose::STANDARD.encode(&zip_bytes);
            let role = spec.role.clone().unwrap_or_else(|| self.default_role.clone());

            let create_body = json!({
                "FunctionName": spec.name,
                "Role": role,
                "Handler": spec.handler,
                "Runtime": NODE_RUNTIME,
                "Timeout": spec.timeout_secs,
                "Code": { "ZipFile": zip_b64 },
            });
            let path = format!("/{LAMBDA_API_VERSION}/functions");
            let (status, value) = self
                .request(Method::POST, "lambda", &spec.region, &path, "", Some(&create_body))
                .await?;

            match status {
                201 => extract_arn(&value),
                409 => {
                    // Function exists: push new code instead.
                    tracing::debug!(function = %spec.name, "function exists, updating code");
                    let update_body = json!({ "ZipFile": zip_b64 });
                    let path =
                        format!("/{LAMBDA_API_VERSION}/functions/{}/code", spec.name);
                    let (status, value) = self
                        .request(Method::PUT, "lambda", &spec.region, &path, "", Some(&update_body))
                        .await?;
                    if status == 200 {
                        extract_arn(&value)
                    } else {
                        Err(provisioning_error(status, &value))
                    }
                }
                _ => Err(provisioning_error(status, &value)),
            }
        })
    }
}

fn extract_arn(value: &Value) -> Result<String> {
    value
        .get("FunctionArn")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            DeployError::provisioning(Provider::Amazon, "response carried no FunctionArn")
        })
}

// ---------------------------------------------------------------------------
// Exposer
// ---------------------------------------------------------------------------

impl Exposer for AmazonApi {
    fn expose(&self, function_id: &str, region: &str) -> BoxFuture<'_, Result<Endpoint>> {
        let function_arn = function_id.to_string();
        let region = region.to_string();
        Box::pin(async move {
            let api_name = function_arn
                .rsplit(':')
                .next()
                .unwrap_or(&function_arn)
                .to_string();

            self.grant_invoke(&api_name, &region).await?;

            // One api per function, by name; reuse an existing one.
            let (status, value) = self
                .request(Method::GET, "apigateway", &region, "/v2/apis", "maxResults=500", None)
                .await?;
            if status != 200 {
                return Err(provisioning_error(status, &value));
            }
            if let Some(api) = items(&value).iter().find(|item| {
                item.get("Name").and_then(Value::as_str) == Some(api_name.as_str())
            }) {
                return endpoint_from_api(api);
            }

            let create_body = json!({
                "Name": api_name,
                "ProtocolType": "HTTP",
                "Target": function_arn,
            });
            let (status, value) = self
                .request(Method::POST, "apigateway", &region, "/v2/apis", "", Some(&create_body))
                .await?;
            if status == 201 {
                endpoint_from_api(&value)
            } else {
                Err(provisioning_error(status, &value))
            }
        })
    }
}

fn items(value: &Value) -> Vec<Value> {
    value
        .get("Items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn endpoint_from_api(api: &Value) -> Result<Endpoint> {
    let url = api
        .get("ApiEndpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            DeployError::provisioning(Provider::Amazon, "api response carried no ApiEndpoint")
        })?;
    let api_id = api.get("ApiId").and_then(Value::as_str).map(str::to_string);
    Ok(Endpoint {
        url: url.to_string(),
        api_id,
    })
}

// ---------------------------------------------------------------------------
// Gateway operations
// ---------------------------------------------------------------------------

impl GatewayApi for AmazonApi {
    fn create_authorizer(
        &self,
        api_id: &str,
        name: &str,
        function_arn: &str,
        region: &str,
    ) -> BoxFuture<'_, Result<CreateOutcome>> {
        let api_id = api_id.to_string();
        let name = name.to_string();
        let function_arn = function_arn.to_string();
        let region = region.to_string();
        Box::pin(async move {
            let authorizer_uri = format!(
                "arn:aws:apigateway:{region}:lambda:path/{LAMBDA_API_VERSION}/functions/{function_arn}/invocations"
            );
            let body = json!({
                "Name": name,
                "AuthorizerType": "REQUEST",
                "IdentitySource": ["$request.header.Authorization"],
                "AuthorizerUri": authorizer_uri,
                "AuthorizerPayloadFormatVersion": "2.0",
                "EnableSimpleResponses": true,
            });
            let path = format!("/v2/apis/{api_id}/authorizers");
            let (status, value) = self
                .request(Method::POST, "apigateway", &region, &path, "", Some(&body))
                .await?;

            Ok(match status {
                201 => match value.get("AuthorizerId").and_then(Value::as_str) {
                    Some(id) => CreateOutcome::Created(id.to_string()),
                    None => CreateOutcome::Failed("response carried no AuthorizerId".into()),
                },
                // The gateway reports a same-named authorizer as a bad request.
                400 => CreateOutcome::AlreadyExists,
                _ => CreateOutcome::Failed(format!("HTTP {status}: {value}")),
            })
        })
    }

    fn list_authorizers(
        &self,
        api_id: &str,
        region: &str,
    ) -> BoxFuture<'_, Result<Vec<AuthorizerInfo>>> {
        let path = format!("/v2/apis/{api_id}/authorizers");
        let region = region.to_string();
        Box::pin(async move {
            let (status, value) = self
                .request(Method::GET, "apigateway", &region, &path, "maxResults=500", None)
                .await?;
            if status != 200 {
                return Err(provisioning_error(status, &value));
            }
            Ok(items(&value)
                .iter()
                .filter_map(|item| {
                    Some(AuthorizerInfo {
                        id: item.get("AuthorizerId")?.as_str()?.to_string(),
                        name: item.get("Name")?.as_str()?.to_string(),
                    })
                })
                .collect())
        })
    }

    fn list_routes(&self, api_id: &str, region: &str) -> BoxFuture<'_, Result<Vec<RouteInfo>>> {
        let path = format!("/v2/apis/{api_id}/routes");
        let region = region.to_string();
        Box::pin(async move {
            let (status, value) = self
                .request(Method::GET, "apigateway", &region, &path, "maxResults=500", None)
                .await?;
            if status != 200 {
                return Err(provisioning_error(status, &value));
            }
            Ok(items(&value)
                .iter()
                .filter_map(|item| {
                    Some(RouteInfo {
                        id: item.get("RouteId")?.as_str()?.to_string(),
                        route_key: item.get("RouteKey")?.as_str()?.to_string(),
                    })
                })
                .collect())
        })
    }

    fn set_route_authorization(
        &self,
        api_id: &str,
        route_id: &str,
        mode: RouteAuthorization,
        region: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let path = format!("/v2/apis/{api_id}/routes/{route_id}");
        let region = region.to_string();
        Box::pin(async move {
            let body = match mode {
                RouteAuthorization::None => json!({ "AuthorizationType": "NONE" }),
                RouteAuthorization::Custom(authorizer_id) => json!({
                    "AuthorizationType": "CUSTOM",
                    "AuthorizerId": authorizer_id,
                }),
            };
            let (status, value) = self
                .request(Method::PATCH, "apigateway", &region, &path, "", Some(&body))
                .await?;
            if status == 200 {
                Ok(())
            } else {
                Err(provisioning_error(status, &value))
            }
        })
    }

    fn grant_invoke(&self, function_name: &str, region: &str) -> BoxFuture<'_, Result<()>> {
        let path = format!("/{LAMBDA_API_VERSION}/functions/{function_name}/policy");
        let region = region.to_string();
        Box::pin(async move {
            let body = json!({
                "StatementId": "skylift-apigateway-invoke",
                "Action": "lambda:InvokeFunction",
                "Principal": "apigateway.amazonaws.com",
            });
            let (status, value) = self
                .request(Method::POST, "lambda", &region, &path, "", Some(&body))
                .await?;
            match status {
                201 => Ok(()),
                // The statement already exists from an earlier run.
                409 => Ok(()),
                _ => Err(provisioning_error(status, &value)),
            }
        })
    }
}
