//! Authorizer lifecycle: deploy a bearer-checking function, converge the
//! gateway authorizer resource onto it, and bind or unbind it on the
//! default route.
//!
//! Convergence is create-or-reuse: the gateway seam reports creation as a
//! closed [`CreateOutcome`] so the algorithm branches on an enum rather
//! than provider error-code sniffing. By convention there is one logical
//! authorizer per name on an api, so an `AlreadyExists` answer resolves to
//! the first same-named resource.

use crate::codegen::{generate_authorizer_source, sanitize_bearer};
use crate::errors::{DeployError, Result};
use crate::packager::DynPackager;
use crate::provision::{DynProvisioner, FunctionSpec};
use crate::runtime::BoxFuture;
use std::fmt::Debug;
use std::sync::Arc;

/// The catch-all route every api carries.
pub const DEFAULT_ROUTE_KEY: &str = "$default";

/// Minimum accepted bearer length after trimming. A security floor, not a
/// cosmetic check.
pub const MIN_BEARER_LEN: usize = 10;

/// Authorizer functions perform a single comparison and no I/O.
const AUTHORIZER_TIMEOUT_SECS: u32 = 1;

// ---------------------------------------------------------------------------
// Gateway seam
// ---------------------------------------------------------------------------

/// Result of attempting to create an authorizer resource.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The resource did not exist; this call created it.
    Created(String),
    /// A resource with the requested name already exists.
    AlreadyExists,
    /// The create failed for an unrelated reason.
    Failed(String),
}

/// A gateway authorizer resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizerInfo {
    pub id: String,
    pub name: String,
}

/// A gateway route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub id: String,
    pub route_key: String,
}

/// Authorization mode of a route binding. Exactly one binding exists per
/// (api, route key); the last write wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAuthorization {
    None,
    Custom(String),
}

/// Gateway operations the authorizer lifecycle needs.
pub trait GatewayApi: Send + Sync + Debug {
    /// Attempt to create an authorizer resource bound to the given
    /// function identifier.
    fn create_authorizer(
        &self,
        api_id: &str,
        name: &str,
        function_arn: &str,
        region: &str,
    ) -> BoxFuture<'_, Result<CreateOutcome>>;

    fn list_authorizers(&self, api_id: &str, region: &str)
        -> BoxFuture<'_, Result<Vec<AuthorizerInfo>>>;

    fn list_routes(&self, api_id: &str, region: &str) -> BoxFuture<'_, Result<Vec<RouteInfo>>>;

    fn set_route_authorization(
        &self,
        api_id: &str,
        route_id: &str,
        mode: RouteAuthorization,
        region: &str,
    ) -> BoxFuture<'_, Result<()>>;

    /// Permit the gateway to invoke the named function.
    fn grant_invoke(&self, function_name: &str, region: &str) -> BoxFuture<'_, Result<()>>;
}

/// A cloneable, type-erased gateway handle.
pub type DynGatewayApi = Arc<dyn GatewayApi>;

// ---------------------------------------------------------------------------
// Reference decision
// ---------------------------------------------------------------------------

/// The decision the generated authorizer makes, host-side.
///
/// True iff the presented header equals `Bearer <sanitized token>` exactly;
/// comparison is case-sensitive and a missing header never authorizes.
pub fn authorizes(sanitized_bearer: &str, authorization_header: Option<&str>) -> bool {
    match authorization_header {
        Some(header) => header == format!("Bearer {sanitized_bearer}"),
        None => false,
    }
}

/// Conventional authorizer name for an exported function.
pub fn authorizer_name(export_name: &str) -> String {
    format!("{export_name}-authorizer")
}

// ---------------------------------------------------------------------------
// Lifecycle manager
// ---------------------------------------------------------------------------

/// Provisions authorizer functions and converges gateway routing onto
/// them.
#[derive(Clone)]
pub struct AuthorizerManager {
    packager: DynPackager,
    provisioner: DynProvisioner,
    gateway: DynGatewayApi,
}

impl Debug for AuthorizerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizerManager").finish_non_exhaustive()
    }
}

impl AuthorizerManager {
    pub fn new(packager: DynPackager, provisioner: DynProvisioner, gateway: DynGatewayApi) -> Self {
        Self {
            packager,
            provisioner,
            gateway,
        }
    }

    /// Create or update the authorizer function named `authorizer_name`
    /// that greenlights requests presenting `expected_bearer`.
    ///
    /// Returns the function identifier of the deployed authorizer. Fails
    /// validation, without any provisioning call, when the bearer is
    /// empty or shorter than [`MIN_BEARER_LEN`] after trimming.
    pub async fn deploy(
        &self,
        authorizer_name: &str,
        expected_bearer: &str,
        region: &str,
    ) -> Result<String> {
        let trimmed = expected_bearer.trim();
        if trimmed.is_empty() {
            return Err(DeployError::Validation(
                "expected bearer token is required".into(),
            ));
        }
        if trimmed.len() < MIN_BEARER_LEN {
            return Err(DeployError::Validation(format!(
                "expected bearer token needs {MIN_BEARER_LEN} or more characters"
            )));
        }

        // The token is generated by this crate, but sanitize regardless so
        // a user-supplied token cannot break the generated literal.
        let sanitized = sanitize_bearer(trimmed);
        let source = generate_authorizer_source(&sanitized);
        let artifact = self.packager.archive(&source).await?;

        let spec = FunctionSpec {
            name: authorizer_name.to_string(),
            region: region.to_string(),
            timeout_secs: AUTHORIZER_TIMEOUT_SECS,
            handler: "index.handler".to_string(),
            role: None,
            project: None,
        };
        let function_id = self
            .provisioner
            .provision(&artifact.archive_path, &spec)
            .await?;

        self.gateway.grant_invoke(authorizer_name, region).await?;

        tracing::info!(authorizer = %authorizer_name, region = %region, "authorizer deployed");
        Ok(function_id)
    }

    /// Guard the api's `$default` route with the given authorizer
    /// function.
    ///
    /// Create-or-reuse: if an authorizer resource with the conventional
    /// name already exists it is reused as-is. The existing resource is
    /// not repointed at `authorizer_arn`, so a stale resource keeps its
    /// previous backing function.
    pub async fn attach_to_default_route(
        &self,
        api_id: &str,
        authorizer_arn: &str,
        api_region: &str,
    ) -> Result<()> {
        let name = function_name_from_arn(authorizer_arn)?;

        let authorizer_id = match self
            .gateway
            .create_authorizer(api_id, &name, authorizer_arn, api_region)
            .await?
        {
            CreateOutcome::Created(id) => id,
            CreateOutcome::AlreadyExists => {
                let existing = self.gateway.list_authorizers(api_id, api_region).await?;
                existing
                    .into_iter()
                    .find(|a| a.name == name)
                    .map(|a| a.id)
                    .ok_or_else(|| {
                        DeployError::AuthorizerConvergence(format!(
                            "authorizer {name} reported as existing but not found on api {api_id}"
                        ))
                    })?
            }
            CreateOutcome::Failed(detail) => {
                return Err(DeployError::AuthorizerConvergence(detail));
            }
        };

        let route_id = self.resolve_route(api_id, DEFAULT_ROUTE_KEY, api_region).await?;
        self.gateway
            .set_route_authorization(
                api_id,
                &route_id,
                RouteAuthorization::Custom(authorizer_id),
                api_region,
            )
            .await?;

        tracing::info!(api_id = %api_id, authorizer = %name, "default route guarded");
        Ok(())
    }

    /// Remove authorization from the api's `$default` route.
    ///
    /// The route becomes publicly invocable. The authorizer resource and
    /// its backing function are left in place; detaching an already
    /// unauthorized route is a no-op effect, not an error.
    pub async fn detach_from_default_route(&self, api_id: &str, api_region: &str) -> Result<()> {
        let route_id = self.resolve_route(api_id, DEFAULT_ROUTE_KEY, api_region).await?;
        self.gateway
            .set_route_authorization(api_id, &route_id, RouteAuthorization::None, api_region)
            .await?;

        tracing::info!(api_id = %api_id, "default route authorization removed");
        Ok(())
    }

    /// Resolve a route id by key. Zero matches is a hard error; several
    /// matches resolve to the first, by the one-resource-per-name
    /// convention.
    async fn resolve_route(&self, api_id: &str, route_key: &str, region: &str) -> Result<String> {
        let routes = self.gateway.list_routes(api_id, region).await?;
        routes
            .into_iter()
            .find(|route| route.route_key == route_key)
            .map(|route| route.id)
            .ok_or_else(|| {
                DeployError::RouteResolution(format!(
                    "no route with key {route_key} on api {api_id}"
                ))
            })
    }
}

/// Extract the function name (last field) from a function ARN.
///
/// The region is the fourth field, the name the last; anything with fewer
/// fields is malformed. A well-formed ARN that references a nonexistent
/// function is accepted here: the create call may still succeed with a
/// dangling reference, which then fails at invocation time rather than at
/// setup time.
fn function_name_from_arn(arn: &str) -> Result<String> {
    let fields: Vec<&str> = arn.split(':').collect();
    if fields.len() < 7 {
        return Err(DeployError::Validation(format!(
            "malformed function identifier: {arn}"
        )));
    }
    Ok(fields[fields.len() - 1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arn_name_is_last_field() {
        let arn = "arn:aws:lambda:us-east-2:123456789012:function:endpoint_hello-authorizer";
        assert_eq!(
            function_name_from_arn(arn).unwrap(),
            "endpoint_hello-authorizer"
        );
    }

    #[test]
    fn short_arn_is_malformed() {
        let err = function_name_from_arn("arn:aws:lambda").unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
    }

    #[test]
    fn decision_requires_exact_match() {
        assert!(authorizes("tok12345678", Some("Bearer tok12345678")));
        assert!(!authorizes("tok12345678", Some("Bearer TOK12345678")));
        assert!(!authorizes("tok12345678", Some("bearer tok12345678")));
        assert!(!authorizes("tok12345678", Some("Bearer tok12345678 ")));
        assert!(!authorizes("tok12345678", None));
    }

    #[test]
    fn conventional_name_appends_suffix() {
        assert_eq!(authorizer_name("endpoint_hello"), "endpoint_hello-authorizer");
    }
}
