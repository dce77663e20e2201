use crate::errors::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// The serverless runtimes a function can be deployed to.
///
/// The set is closed: exactly these two targets are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Amazon,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Amazon => "amazon",
            Provider::Google => "google",
        }
    }

    /// Display label used in progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Amazon => "AWS Lambda",
            Provider::Google => "Google Cloud Functions",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Per-provider configuration sections
// ---------------------------------------------------------------------------

/// Amazon section of `skylift.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmazonConfig {
    /// IAM role ARN assumed by deployed functions.
    pub role: String,
    /// Region functions and gateway resources are created in.
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

/// Google section of `skylift.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleConfig {
    /// Cloud project the functions are created under.
    pub project: String,
    /// Region functions are created in.
    pub region: String,
    /// Node runtime identifier, e.g. `nodejs20`.
    #[serde(default = "default_google_runtime")]
    pub runtime: String,
}

fn default_google_runtime() -> String {
    "nodejs20".to_string()
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// A single deployment destination derived from the configuration.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub provider: Provider,
    pub region: String,
    /// Google project id; `None` for amazon targets.
    pub project: Option<String>,
    /// IAM role ARN; `None` for google targets.
    pub role: Option<String>,
}

/// Top-level run configuration, loaded from `skylift.json`.
///
/// Absence of a provider section means that provider is skipped for the
/// run. A configuration with no section at all is invalid.
///
/// # Example
///
/// ```rust
/// let config: skylift::DeployConfig = serde_json::from_str(
///     r#"{ "amazon": { "role": "arn:aws:iam::1:role/lambda", "region": "us-east-2" } }"#,
/// ).unwrap();
/// config.validate().unwrap();
/// assert_eq!(config.targets().len(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon: Option<AmazonConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleConfig>,
}

impl DeployConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: DeployConfig = serde_json::from_str(&raw)
            .map_err(|e| DeployError::Configuration(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Fails fast, before any provisioning occurs: at least one provider
    /// section must be present and every present section must carry
    /// non-empty required fields.
    pub fn validate(&self) -> Result<()> {
        if self.amazon.is_none() && self.google.is_none() {
            return Err(DeployError::Configuration(
                "no provider configured: add an \"amazon\" or \"google\" section".into(),
            ));
        }

        if let Some(amazon) = &self.amazon {
            if amazon.role.trim().is_empty() {
                return Err(DeployError::Configuration("amazon.role is required".into()));
            }
            if amazon.region.trim().is_empty() {
                return Err(DeployError::Configuration(
                    "amazon.region is required".into(),
                ));
            }
        }

        if let Some(google) = &self.google {
            if google.project.trim().is_empty() {
                return Err(DeployError::Configuration(
                    "google.project is required".into(),
                ));
            }
            if google.region.trim().is_empty() {
                return Err(DeployError::Configuration(
                    "google.region is required".into(),
                ));
            }
        }

        Ok(())
    }

    /// The deployment targets enabled by this configuration.
    pub fn targets(&self) -> Vec<DeploymentTarget> {
        let mut targets = Vec::new();
        if let Some(amazon) = &self.amazon {
            targets.push(DeploymentTarget {
                provider: Provider::Amazon,
                region: amazon.region.clone(),
                project: None,
                role: Some(amazon.role.clone()),
            });
        }
        if let Some(google) = &self.google {
            targets.push(DeploymentTarget {
                provider: Provider::Google,
                region: google.region.clone(),
                project: Some(google.project.clone()),
                role: None,
            });
        }
        targets
    }

    /// Returns `true` if the given provider is enabled.
    pub fn enables(&self, provider: Provider) -> bool {
        match provider {
            Provider::Amazon => self.amazon.is_some(),
            Provider::Google => self.google.is_some(),
        }
    }
}
