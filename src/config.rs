//! Provider configuration: API credentials and the API endpoint.
//!
//! Values set explicitly in the provider block win. Unset or empty values
//! fall back to environment variables; a credential that is still missing
//! after the fallback is an error naming the attribute.

use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::schema::{Attribute, Schema};

/// Environment variable holding the API access key.
pub const ACCESS_KEY_ENV: &str = "BINOCS_ACCESS_KEY";
/// Environment variable holding the API secret key.
pub const SECRET_KEY_ENV: &str = "BINOCS_SECRET_KEY";
/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "BINOCS_API_URL";
/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.binocs.sh";

/// Errors resolving the provider configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No access key in the configuration or the environment.
    #[error("missing access_key: set it in the provider configuration or via BINOCS_ACCESS_KEY")]
    MissingAccessKey,
    /// No secret key in the configuration or the environment.
    #[error("missing secret_key: set it in the provider configuration or via BINOCS_SECRET_KEY")]
    MissingSecretKey,
    /// The API URL is not an absolute http(s) URL.
    #[error("invalid api_url {0:?}: expected an absolute http or https URL")]
    InvalidApiUrl(String),
    /// The configuration block is neither an object nor null.
    #[error("provider configuration must be an object")]
    NotAnObject,
}

impl ConfigError {
    /// The provider attribute the error is about, if any.
    pub fn attribute(&self) -> Option<&'static str> {
        match self {
            Self::MissingAccessKey => Some("access_key"),
            Self::MissingSecretKey => Some("secret_key"),
            Self::InvalidApiUrl(_) => Some("api_url"),
            Self::NotAnObject => None,
        }
    }
}

/// Resolved provider configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API access key.
    pub access_key: String,
    /// API secret key.
    pub secret_key: String,
    /// Base URL without a trailing slash.
    pub api_url: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve configuration from the provider block, falling back to the
    /// process environment.
    pub fn from_value(config: &Value) -> Result<Self, ConfigError> {
        Self::from_value_with_env(config, |name| std::env::var(name).ok())
    }

    /// Resolve configuration with a custom environment lookup.
    pub fn from_value_with_env<F>(config: &Value, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let obj = match config {
            Value::Object(map) => Some(map),
            Value::Null => None,
            _ => return Err(ConfigError::NotAnObject),
        };

        let lookup = |attribute: &str, env_name: &str| -> Option<String> {
            obj.and_then(|map| map.get(attribute))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| env(env_name).filter(|s| !s.is_empty()))
        };

        let access_key = lookup("access_key", ACCESS_KEY_ENV).ok_or(ConfigError::MissingAccessKey)?;
        let secret_key = lookup("secret_key", SECRET_KEY_ENV).ok_or(ConfigError::MissingSecretKey)?;
        let api_url = lookup("api_url", API_URL_ENV).unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            access_key,
            secret_key,
            api_url: normalize_api_url(&api_url)?,
        })
    }

    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Binocs provider configuration")
            .with_attribute(
                "access_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!(
                        "Binocs API access key. Can also be set with {ACCESS_KEY_ENV}."
                    )),
            )
            .with_attribute(
                "secret_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!(
                        "Binocs API secret key. Can also be set with {SECRET_KEY_ENV}."
                    )),
            )
            .with_attribute(
                "api_url",
                Attribute::optional_string().with_description(format!(
                    "Binocs API base URL. Defaults to {DEFAULT_API_URL}, can also be set with {API_URL_ENV}."
                )),
            )
    }
}

fn normalize_api_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidApiUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidApiUrl(raw.to_string()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
