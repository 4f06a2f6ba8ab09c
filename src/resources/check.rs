//! The `binocs_check` resource.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::client::BinocsApi;
use crate::error::ProviderError;
use crate::models::{
    Check, CheckPayload, HttpFields, HttpMethod, Protocol, ProtocolFields, SUPPORTED_HTTP_METHODS,
};
use crate::schema::{has_errors, Attribute, Diagnostic, Schema};
use crate::validation::{validate, AttributeValidator};

/// Configuration and state of a check.
///
/// `None` means "not set". Empty strings are treated the same way when the
/// payload is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Remote identifier, set once the check exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Monitored URL or `tcp://host:port`.
    pub resource: String,
    /// HTTP method, HTTP(S) only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Seconds between runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// Apdex target in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    /// Regions to run from, at least one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    /// Status codes counted as up, HTTP(S) only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_codes: Option<String>,
    /// Successes needed before the check is considered up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_confirmations_threshold: Option<i64>,
    /// Failures needed before the check is considered down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_confirmations_threshold: Option<i64>,
}

impl From<Check> for CheckConfig {
    fn from(check: Check) -> Self {
        let mut regions = check.regions;
        regions.sort();
        Self {
            id: Some(check.ident),
            name: Some(check.name),
            resource: check.resource,
            method: non_empty(check.method),
            interval: Some(i64::from(check.interval)),
            target: Some(check.target),
            regions: Some(regions),
            up_codes: non_empty(check.up_codes),
            up_confirmations_threshold: Some(i64::from(check.up_confirmations_threshold)),
            down_confirmations_threshold: Some(i64::from(check.down_confirmations_threshold)),
        }
    }
}

/// Schema of `binocs_check`.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("A Binocs check: an HTTP(S) or TCP endpoint polled from one or more regions.")
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Identifier assigned by Binocs."),
        )
        .with_attribute(
            "name",
            Attribute::optional_string()
                .with_default(json!(""))
                .with_validator(AttributeValidator::StringLenBetween { min: 0, max: 25 })
                .with_description("Display name, up to 25 characters."),
        )
        .with_attribute(
            "resource",
            Attribute::required_string()
                .with_force_new()
                .with_validator(AttributeValidator::Resource)
                .with_description("An http(s):// URL or tcp://host:port."),
        )
        .with_attribute(
            "method",
            Attribute::optional_string()
                .with_validator(AttributeValidator::one_of(&SUPPORTED_HTTP_METHODS))
                .with_description("HTTP method. Required for HTTP(S) resources, forbidden for TCP."),
        )
        .with_attribute(
            "interval",
            Attribute::optional_int64()
                .with_default(json!(60))
                .with_validator(AttributeValidator::IntBetween { min: 5, max: 900 })
                .with_description("Polling interval in seconds, 5 to 900."),
        )
        .with_attribute(
            "target",
            Attribute::optional_float64()
                .with_default(json!(1.2))
                .with_validator(AttributeValidator::FloatBetween { min: 0.01, max: 10.0 })
                .with_description("Apdex target response time in seconds, 0.01 to 10."),
        )
        .with_attribute(
            "regions",
            Attribute::required_string_set()
                .with_min_items(1)
                .with_validator(AttributeValidator::Region)
                .with_description("Regions to poll from."),
        )
        .with_attribute(
            "up_codes",
            Attribute::optional_string()
                .with_validator(AttributeValidator::UpCodes)
                .with_description(
                    "Response codes considered up, e.g. 200, 2xx, 200-302. Required for HTTP(S) resources, forbidden for TCP.",
                ),
        )
        .with_attribute(
            "up_confirmations_threshold",
            Attribute::optional_int64()
                .with_default(json!(2))
                .with_validator(AttributeValidator::IntBetween { min: 1, max: 10 })
                .with_description("Consecutive up responses before an incident is closed."),
        )
        .with_attribute(
            "down_confirmations_threshold",
            Attribute::optional_int64()
                .with_default(json!(2))
                .with_validator(AttributeValidator::IntBetween { min: 1, max: 10 })
                .with_description("Consecutive down responses before an incident is opened."),
        )
}

/// Static and cross-field validation of a check configuration.
pub fn validate_config(config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = validate(&schema(), config);

    // Unclassifiable resources are already reported by the resource validator.
    if let Ok(config) = serde_json::from_value::<CheckConfig>(config.clone()) {
        if Protocol::from_resource(&config.resource).is_some() {
            if let Err(diagnostic) = protocol_fields(&config) {
                if !diagnostics.iter().any(|d| d.attribute == diagnostic.attribute) {
                    diagnostics.push(diagnostic);
                }
            }
        }
    }
    diagnostics
}

/// Build the outbound payload, rejecting any invalid configuration.
pub fn build_payload(config: &CheckConfig) -> Result<CheckPayload, ProviderError> {
    let diagnostics = validate(&schema(), &serde_json::to_value(config)?);
    if has_errors(&diagnostics) {
        return Err(ProviderError::from_diagnostics(&diagnostics));
    }

    let protocol = protocol_fields(config).map_err(|d| ProviderError::Validation(d.summary))?;

    let mut regions = config.regions.clone().unwrap_or_default();
    regions.sort();
    regions.dedup();

    Ok(CheckPayload {
        name: config.name.clone().and_then(non_empty),
        resource: config.resource.clone(),
        protocol,
        interval: to_u32("interval", config.interval)?,
        target: config.target,
        regions,
        up_confirmations_threshold: to_u32(
            "up_confirmations_threshold",
            config.up_confirmations_threshold,
        )?,
        down_confirmations_threshold: to_u32(
            "down_confirmations_threshold",
            config.down_confirmations_threshold,
        )?,
    })
}

/// Derive the protocol from the resource and check the HTTP-only fields
/// against it.
fn protocol_fields(config: &CheckConfig) -> Result<ProtocolFields, Diagnostic> {
    let protocol = Protocol::from_resource(&config.resource).ok_or_else(|| {
        Diagnostic::error("expected \"resource\" to be either TCP or HTTP(S) resource")
            .with_attribute("resource")
    })?;
    let method = config.method.clone().and_then(non_empty);
    let up_codes = config.up_codes.clone().and_then(non_empty);

    if !protocol.is_http() {
        if method.is_some() {
            return Err(Diagnostic::error(format!(
                "\"method\" cannot be used with a {} resource",
                protocol
            ))
            .with_attribute("method"));
        }
        if up_codes.is_some() {
            return Err(Diagnostic::error(format!(
                "\"up_codes\" cannot be used with a {} resource",
                protocol
            ))
            .with_attribute("up_codes"));
        }
        return Ok(ProtocolFields::Tcp);
    }

    let method: HttpMethod = method
        .as_deref()
        .and_then(|m| m.parse().ok())
        .ok_or_else(|| {
            Diagnostic::error(format!(
                "expected \"method\" to be one of {} for a {} resource",
                SUPPORTED_HTTP_METHODS.join(", "),
                protocol
            ))
            .with_attribute("method")
        })?;
    let up_codes = up_codes.ok_or_else(|| {
        Diagnostic::error(format!(
            "expected \"up_codes\" to be set for a {} resource",
            protocol
        ))
        .with_attribute("up_codes")
    })?;

    let fields = HttpFields { method, up_codes };
    Ok(match protocol {
        Protocol::Http => ProtocolFields::Http(fields),
        _ => ProtocolFields::Https(fields),
    })
}

fn to_u32(field: &str, value: Option<i64>) -> Result<Option<u32>, ProviderError> {
    value
        .map(|v| {
            u32::try_from(v).map_err(|_| {
                ProviderError::Validation(format!("{:?} out of range: {}", field, v))
            })
        })
        .transpose()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn require_id(id: &Option<String>) -> Result<&str, ProviderError> {
    id.as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest("binocs_check state has no id".into()))
}

/// CRUD bridge between check state and the Binocs API.
pub struct CheckResource {
    api: Arc<dyn BinocsApi>,
}

impl CheckResource {
    /// Create a bridge over the given API.
    pub fn new(api: Arc<dyn BinocsApi>) -> Self {
        Self { api }
    }

    /// Create the check remotely and return its state as read back.
    #[instrument(skip(self, config), fields(resource = %config.resource))]
    pub async fn create(&self, config: &CheckConfig) -> Result<CheckConfig, ProviderError> {
        let payload = build_payload(config)?;
        let check = self
            .api
            .create_check(&payload)
            .await
            .map_err(|e| ProviderError::remote("create Binocs check", e))?;
        info!(id = %check.ident, protocol = %payload.protocol.protocol(), "Created Binocs check");

        let mut id = Some(check.ident.clone());
        match self.read(&mut id).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(ProviderError::NotFound(format!(
                "Binocs check {} vanished right after creation",
                check.ident
            ))),
            Err(err) => {
                let state = CheckConfig {
                    id: Some(check.ident),
                    ..config.clone()
                };
                Err(ProviderError::partially_created(&state, err))
            }
        }
    }

    /// Fetch the check.
    ///
    /// Returns `Ok(None)` and clears `id` when the check no longer exists.
    #[instrument(skip(self))]
    pub async fn read(&self, id: &mut Option<String>) -> Result<Option<CheckConfig>, ProviderError> {
        let ident = require_id(id)?.to_string();
        match self.api.read_check(&ident).await {
            Ok(check) => {
                debug!(id = %check.ident, "Read Binocs check");
                Ok(Some(check.into()))
            }
            Err(e) if e.is_not_found() => {
                warn!(id = %ident, "Binocs check no longer exists");
                *id = None;
                Ok(None)
            }
            Err(e) => Err(ProviderError::remote("read Binocs check", e)),
        }
    }

    /// Whether the check still exists. Clears `id` when it does not.
    pub async fn exists(&self, id: &mut Option<String>) -> Result<bool, ProviderError> {
        Ok(self.read(id).await?.is_some())
    }

    /// Push the planned configuration to the existing check.
    #[instrument(skip(self, planned), fields(id = ?planned.id))]
    pub async fn update(&self, planned: &CheckConfig) -> Result<CheckConfig, ProviderError> {
        let ident = require_id(&planned.id)?;
        let payload = build_payload(planned)?;
        self.api
            .update_check(ident, &payload)
            .await
            .map_err(|e| ProviderError::remote("update Binocs check", e))?;
        info!("Updated Binocs check");
        Ok(planned.clone())
    }

    /// Delete the check.
    #[instrument(skip(self, state), fields(id = ?state.id))]
    pub async fn delete(&self, state: &CheckConfig) -> Result<(), ProviderError> {
        let ident = require_id(&state.id)?;
        self.api
            .delete_check(ident)
            .await
            .map_err(|e| ProviderError::remote("remove Binocs check", e))?;
        info!("Removed Binocs check");
        Ok(())
    }

    /// Read an existing check for import. A missing check is an error.
    pub async fn import(&self, ident: &str) -> Result<CheckConfig, ProviderError> {
        let mut id = Some(ident.to_string());
        self.read(&mut id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("Binocs check {}", ident)))
    }
}
