//! Configuration scaffolding: infer amazon credentials and region from the
//! conventional CLI files and environment, and write a starter
//! `skylift.json`.

use crate::config::{AmazonConfig, DeployConfig};
use crate::errors::Result;
use std::collections::HashMap;
use std::path::Path;

/// File name of the run configuration.
pub const CONFIG_FILE: &str = "skylift.json";

/// Fields of the `[default]` profile of an `.aws/credentials` or
/// `.aws/config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultProfile {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
}

/// Extract the `[default]` section body: everything below the header and
/// above the next `[...]` header, or an empty string when absent.
fn default_section(contents: &str) -> &str {
    let Some(below) = contents.split("[default]").nth(1) else {
        return "";
    };
    below.split('[').next().unwrap_or("")
}

/// Parse the `[default]` profile of a credentials or config file.
///
/// Tolerates missing fields and malformed lines; returns whatever could be
/// extracted.
pub fn parse_aws_file(contents: &str) -> DefaultProfile {
    let mut profile = DefaultProfile::default();

    for line in default_section(contents).lines() {
        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        let Some(value) = parts.next().map(str::trim) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        match key {
            "aws_access_key_id" => profile.access_key_id = Some(value.to_string()),
            "aws_secret_access_key" => profile.secret_access_key = Some(value.to_string()),
            "region" => profile.region = Some(value.to_string()),
            _ => {}
        }
    }

    profile
}

/// Infer an amazon section from credentials/config files and environment
/// variables. Environment variables take precedence, matching the
/// upstream CLI's lookup order.
pub fn infer_amazon(
    credentials_file: Option<&str>,
    config_file: Option<&str>,
    env: &HashMap<String, String>,
) -> AmazonConfig {
    let mut amazon = AmazonConfig::default();

    if let Some(contents) = credentials_file {
        let parsed = parse_aws_file(contents);
        amazon.access_key_id = parsed.access_key_id;
        amazon.secret_access_key = parsed.secret_access_key;
    }
    if let Some(contents) = config_file {
        if let Some(region) = parse_aws_file(contents).region {
            amazon.region = region;
        }
    }

    let env_value = |key: &str| {
        env.get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    if let Some(key) = env_value("AWS_ACCESS_KEY_ID") {
        amazon.access_key_id = Some(key);
    }
    if let Some(secret) = env_value("AWS_SECRET_ACCESS_KEY") {
        amazon.secret_access_key = Some(secret);
    }
    if let Some(region) = env_value("AWS_DEFAULT_REGION") {
        amazon.region = region;
    }

    amazon
}

/// Create `skylift.json` in `dir` with whatever could be inferred.
///
/// Refuses to overwrite an existing file. Returns `true` when a file was
/// written.
pub fn init(dir: impl AsRef<Path>) -> Result<bool> {
    let destination = dir.as_ref().join(CONFIG_FILE);
    if destination.exists() {
        tracing::info!(path = %destination.display(), "configuration exists already");
        return Ok(false);
    }

    let home = std::env::var("HOME").unwrap_or_default();
    let read = |file: &str| std::fs::read_to_string(Path::new(&home).join(".aws").join(file)).ok();
    let env: HashMap<String, String> = std::env::vars().collect();

    let amazon = infer_amazon(read("credentials").as_deref(), read("config").as_deref(), &env);
    if amazon.access_key_id.is_some() {
        tracing::info!("inferred amazon credentials");
    } else {
        tracing::info!("no amazon credentials found to infer");
    }

    let config = DeployConfig {
        amazon: Some(amazon),
        google: None,
    };
    std::fs::write(&destination, serde_json::to_string_pretty(&config)?)?;
    tracing::info!(path = %destination.display(), "configuration created");
    Ok(true)
}
