use crate::config::Provider;

// ---------------------------------------------------------------------------
// Main error type
// ---------------------------------------------------------------------------

/// Errors produced while deploying functions to serverless runtimes.
///
/// The variants mirror the stages of the deployment pipeline. Only
/// [`DeployError::Configuration`] is fatal to a whole run; packaging,
/// provisioning and authorizer failures are isolated to the
/// (file, export, provider) unit they occur in and surface as a missing URL
/// in that unit's [`DeploymentResult`](crate::orchestrator::DeploymentResult).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The run configuration is invalid. Aborts the run before any cloud
    /// side effect.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Bundling or archiving failed for one file/provider pair.
    #[error("packaging error ({provider}): {message}")]
    Packaging {
        provider: Provider,
        message: String,
    },

    /// A cloud resource create/update call failed.
    #[error("provisioning error ({provider}): {message}")]
    Provisioning {
        provider: Provider,
        message: String,
    },

    /// Neither creating nor looking up an authorizer by name succeeded.
    #[error("authorizer convergence error: {0}")]
    AuthorizerConvergence(String),

    /// A route lookup returned zero matches for the requested route key.
    #[error("route resolution error: {0}")]
    RouteResolution(String),

    /// An input failed a precondition (e.g. bearer token too short).
    #[error("validation error: {0}")]
    Validation(String),

    /// HTTP transport error talking to a provider API.
    #[error("transport error: {0}")]
    Transport(String),

    /// Serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure while reading sources or staging archives.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DeployError {
    fn from(err: reqwest::Error) -> Self {
        DeployError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::Serialization(err.to_string())
    }
}

impl DeployError {
    /// Wrap a message as a packaging failure for the given provider.
    pub fn packaging(provider: Provider, message: impl Into<String>) -> Self {
        DeployError::Packaging {
            provider,
            message: message.into(),
        }
    }

    /// Wrap a message as a provisioning failure for the given provider.
    pub fn provisioning(provider: Provider, message: impl Into<String>) -> Self {
        DeployError::Provisioning {
            provider,
            message: message.into(),
        }
    }

    /// Returns `true` if this error aborts the whole run rather than a
    /// single (file, export, provider) unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeployError::Configuration(_))
    }
}

// ---------------------------------------------------------------------------
// Result type alias
// ---------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, DeployError>;
