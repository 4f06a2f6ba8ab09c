//! The `binocs_channel` resource.
//!
//! Besides the channel itself, the resource owns the set of checks the
//! channel is attached to. Attachments are reconciled one call per check
//! identifier; a failure part-way leaves earlier calls applied.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::client::BinocsApi;
use crate::error::ProviderError;
use crate::models::{Channel, ChannelPayload, ChannelType, SUPPORTED_CHANNEL_TYPES};
use crate::schema::{has_errors, Attribute, Diagnostic, Schema};
use crate::validation::{validate, AttributeValidator};

/// Configuration and state of a notification channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Remote identifier, set once the channel exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Channel type, e.g. `email`.
    #[serde(rename = "type")]
    pub channel_type: String,
    /// Where notifications are sent.
    pub handle: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Identifiers of the checks the channel is attached to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
}

impl From<Channel> for ChannelConfig {
    fn from(channel: Channel) -> Self {
        let mut checks = channel.checks;
        checks.sort();
        checks.dedup();
        Self {
            id: Some(channel.ident),
            channel_type: channel.channel_type,
            handle: channel.handle,
            alias: Some(channel.alias),
            checks: Some(checks),
        }
    }
}

/// Schema of `binocs_channel`.
pub fn schema() -> Schema {
    Schema::v0()
        .with_description("A Binocs notification channel and the checks it is attached to.")
        .with_attribute("id", Attribute::computed_string())
        .with_attribute(
            "type",
            Attribute::required_string()
                .with_force_new()
                .with_validator(AttributeValidator::one_of(&SUPPORTED_CHANNEL_TYPES))
                .with_description("Channel type. Only email channels can be created; telegram and slack channels can be imported."),
        )
        .with_attribute(
            "handle",
            Attribute::required_string()
                .with_force_new()
                .with_validator(AttributeValidator::Email)
                .with_description("The e-mail address notifications are sent to."),
        )
        .with_attribute(
            "alias",
            Attribute::optional_string()
                .with_default(json!(""))
                .with_validator(AttributeValidator::StringLenBetween { min: 0, max: 25 })
                .with_description("Display name, up to 25 characters."),
        )
        .with_attribute(
            "checks",
            Attribute::optional_computed_string_set()
                .with_description("Identifiers of the checks to attach this channel to."),
        )
}

/// Static validation of a channel configuration.
pub fn validate_config(config: &Value) -> Vec<Diagnostic> {
    validate(&schema(), config)
}

/// Build the outbound payload.
///
/// Only the type must parse here: imported telegram and slack channels keep
/// handles that are not e-mail addresses.
pub fn build_payload(config: &ChannelConfig) -> Result<ChannelPayload, ProviderError> {
    let channel_type: ChannelType = config.channel_type.parse().map_err(|_| {
        ProviderError::Validation(format!(
            "expected \"type\" to be one of {}, got {:?}",
            SUPPORTED_CHANNEL_TYPES.join(", "),
            config.channel_type
        ))
    })?;
    if config.handle.is_empty() {
        return Err(ProviderError::Validation(
            "expected \"handle\" to be set".to_string(),
        ));
    }
    Ok(ChannelPayload {
        channel_type,
        handle: config.handle.clone(),
        alias: config.alias.clone().filter(|a| !a.is_empty()),
    })
}

/// Check associations to remove and to add.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksDiff {
    /// In the prior set only.
    pub detach: Vec<String>,
    /// In the desired set only.
    pub attach: Vec<String>,
}

impl ChecksDiff {
    /// Whether nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.detach.is_empty() && self.attach.is_empty()
    }
}

/// Set difference between the prior and desired check identifiers.
pub fn diff_checks(prior: &[String], desired: &[String]) -> ChecksDiff {
    let prior: BTreeSet<&String> = prior.iter().collect();
    let desired: BTreeSet<&String> = desired.iter().collect();
    ChecksDiff {
        detach: prior.difference(&desired).map(|s| s.to_string()).collect(),
        attach: desired.difference(&prior).map(|s| s.to_string()).collect(),
    }
}

/// Validate planned state before an update.
///
/// Imported telegram and slack channels keep their type and handle, so only
/// the remaining attributes are checked for them.
fn validate_planned(planned: &ChannelConfig) -> Result<(), ProviderError> {
    let mut diagnostics = validate_config(&serde_json::to_value(planned)?);
    let import_only = planned
        .channel_type
        .parse::<ChannelType>()
        .is_ok_and(|t| !t.is_creatable());
    if import_only {
        diagnostics.retain(|d| !matches!(d.attribute.as_deref(), Some("type" | "handle")));
    }
    if has_errors(&diagnostics) {
        return Err(ProviderError::from_diagnostics(&diagnostics));
    }
    Ok(())
}

fn created_state(config: &ChannelConfig, ident: &str, mut attached: Vec<String>) -> ChannelConfig {
    attached.sort();
    ChannelConfig {
        id: Some(ident.to_string()),
        checks: Some(attached),
        ..config.clone()
    }
}

fn require_id(id: &Option<String>) -> Result<&str, ProviderError> {
    id.as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest("binocs_channel state has no id".into()))
}

/// CRUD bridge between channel state and the Binocs API.
pub struct ChannelResource {
    api: Arc<dyn BinocsApi>,
}

impl ChannelResource {
    /// Create a bridge over the given API.
    pub fn new(api: Arc<dyn BinocsApi>) -> Self {
        Self { api }
    }

    /// Create the channel, attach the configured checks and return the
    /// state as read back.
    #[instrument(skip(self, config), fields(channel_type = %config.channel_type))]
    pub async fn create(&self, config: &ChannelConfig) -> Result<ChannelConfig, ProviderError> {
        let diagnostics = validate_config(&serde_json::to_value(config)?);
        if has_errors(&diagnostics) {
            return Err(ProviderError::from_diagnostics(&diagnostics));
        }
        let payload = build_payload(config)?;
        if !payload.channel_type.is_creatable() {
            return Err(ProviderError::Validation(format!(
                "{} channels cannot be created, only imported",
                payload.channel_type
            )));
        }

        let channel = self
            .api
            .create_channel(&payload)
            .await
            .map_err(|e| ProviderError::remote("create Binocs channel", e))?;
        info!(id = %channel.ident, "Created Binocs channel");

        // From here on the channel exists remotely; failures carry its state.
        let desired = config.checks.clone().unwrap_or_default();
        let mut attached = Vec::new();
        if let Err(err) = self
            .reconcile_checks(&channel.ident, &diff_checks(&[], &desired), &mut attached)
            .await
        {
            let state = created_state(config, &channel.ident, attached);
            return Err(ProviderError::partially_created(&state, err));
        }

        let mut id = Some(channel.ident.clone());
        match self.read(&mut id).await {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(ProviderError::NotFound(format!(
                "Binocs channel {} vanished right after creation",
                channel.ident
            ))),
            Err(err) => {
                let state = created_state(config, &channel.ident, attached);
                Err(ProviderError::partially_created(&state, err))
            }
        }
    }

    /// Fetch the channel.
    ///
    /// Returns `Ok(None)` and clears `id` when the channel no longer exists.
    #[instrument(skip(self))]
    pub async fn read(
        &self,
        id: &mut Option<String>,
    ) -> Result<Option<ChannelConfig>, ProviderError> {
        let ident = require_id(id)?.to_string();
        match self.api.read_channel(&ident).await {
            Ok(channel) => {
                debug!(id = %channel.ident, checks = channel.checks.len(), "Read Binocs channel");
                Ok(Some(channel.into()))
            }
            Err(e) if e.is_not_found() => {
                warn!(id = %ident, "Binocs channel no longer exists");
                *id = None;
                Ok(None)
            }
            Err(e) => Err(ProviderError::remote("read Binocs channel", e)),
        }
    }

    /// Whether the channel still exists. Clears `id` when it does not.
    pub async fn exists(&self, id: &mut Option<String>) -> Result<bool, ProviderError> {
        Ok(self.read(id).await?.is_some())
    }

    /// Push the planned settings, then reconcile attachments if the planned
    /// check set differs from the prior one.
    #[instrument(skip(self, prior, planned), fields(id = ?prior.id))]
    pub async fn update(
        &self,
        prior: &ChannelConfig,
        planned: &ChannelConfig,
    ) -> Result<ChannelConfig, ProviderError> {
        let ident = require_id(&prior.id)?;
        validate_planned(planned)?;
        let payload = build_payload(planned)?;
        self.api
            .update_channel(ident, &payload)
            .await
            .map_err(|e| ProviderError::remote("update Binocs channel", e))?;
        info!("Updated Binocs channel");

        if let Some(desired) = &planned.checks {
            let mut current = prior.checks.clone().unwrap_or_default();
            let diff = diff_checks(&current, desired);
            self.reconcile_checks(ident, &diff, &mut current).await?;
        }

        Ok(ChannelConfig {
            id: prior.id.clone(),
            ..planned.clone()
        })
    }

    /// Delete the channel.
    #[instrument(skip(self, state), fields(id = ?state.id))]
    pub async fn delete(&self, state: &ChannelConfig) -> Result<(), ProviderError> {
        let ident = require_id(&state.id)?;
        self.api
            .delete_channel(ident)
            .await
            .map_err(|e| ProviderError::remote("remove Binocs channel", e))?;
        info!("Removed Binocs channel");
        Ok(())
    }

    /// Read an existing channel for import. A missing channel is an error.
    pub async fn import(&self, ident: &str) -> Result<ChannelConfig, ProviderError> {
        let mut id = Some(ident.to_string());
        self.read(&mut id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("Binocs channel {}", ident)))
    }

    /// Detach first, then attach. Stops at the first failure.
    ///
    /// `current` tracks the attached checks as each call succeeds.
    async fn reconcile_checks(
        &self,
        ident: &str,
        diff: &ChecksDiff,
        current: &mut Vec<String>,
    ) -> Result<(), ProviderError> {
        if diff.is_empty() {
            return Ok(());
        }
        debug!(detach = diff.detach.len(), attach = diff.attach.len(), "Reconciling checks");

        for check in &diff.detach {
            self.api.detach(ident, check).await.map_err(|e| {
                ProviderError::remote(
                    format!("detach Binocs channel {:?} from check {:?}", ident, check),
                    e,
                )
            })?;
            current.retain(|c| c != check);
        }
        for check in &diff.attach {
            self.api.attach(ident, check).await.map_err(|e| {
                ProviderError::remote(
                    format!("attach Binocs channel {:?} to check {:?}", ident, check),
                    e,
                )
            })?;
            current.push(check.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiError;
    use crate::models::Check;
    use crate::testing::{ApiCall, RecordingApi};

    fn email_config() -> ChannelConfig {
        ChannelConfig {
            channel_type: "email".to_string(),
            handle: "ops@example.com".to_string(),
            alias: Some("ops".to_string()),
            ..Default::default()
        }
    }

    fn with_checks(checks: &[&str]) -> ChannelConfig {
        ChannelConfig {
            checks: Some(ids(checks)),
            ..email_config()
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn seed_checks(api: &RecordingApi, idents: &[&str]) {
        for ident in idents {
            api.insert_check(Check {
                ident: ident.to_string(),
                resource: "https://example.com".to_string(),
                ..Default::default()
            });
        }
    }

    #[test]
    fn test_diff_checks() {
        let diff = diff_checks(&ids(&["A", "B"]), &ids(&["B", "C"]));
        assert_eq!(diff.detach, ids(&["A"]));
        assert_eq!(diff.attach, ids(&["C"]));

        assert!(diff_checks(&ids(&["A", "B"]), &ids(&["B", "A"])).is_empty());

        let diff = diff_checks(&[], &ids(&["A"]));
        assert!(diff.detach.is_empty());
        assert_eq!(diff.attach, ids(&["A"]));
    }

    #[test]
    fn test_payload_omits_empty_alias() {
        let payload = build_payload(&ChannelConfig {
            alias: Some(String::new()),
            ..email_config()
        })
        .unwrap();
        assert!(payload.alias.is_none());

        let err = build_payload(&ChannelConfig {
            channel_type: "pager".to_string(),
            ..email_config()
        })
        .unwrap_err();
        assert!(err.to_string().contains("pager"));
    }

    #[test]
    fn test_validate_config() {
        assert!(validate_config(&json!({"type": "email", "handle": "ops@example.com"})).is_empty());

        let diagnostics = validate_config(&json!({"type": "slack", "handle": "not-an-address"}));
        assert_eq!(diagnostics.len(), 2);

        let diagnostics = validate_config(&json!({
            "type": "email",
            "handle": "ops@example.com",
            "alias": "a".repeat(26)
        }));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("alias"));
    }

    #[tokio::test]
    async fn test_create_attaches_configured_checks() {
        let api = Arc::new(RecordingApi::new());
        seed_checks(&api, &["B", "A"]);
        let resource = ChannelResource::new(api.clone());

        let state = resource
            .create(&with_checks(&["B", "A"]))
            .await
            .unwrap();
        let id = state.id.clone().unwrap();
        assert_eq!(state.checks, Some(ids(&["A", "B"])));
        assert_eq!(state.alias.as_deref(), Some("ops"));
        assert_eq!(
            api.calls(),
            vec![
                ApiCall::CreateChannel,
                ApiCall::Attach(id.clone(), "A".to_string()),
                ApiCall::Attach(id.clone(), "B".to_string()),
                ApiCall::ReadChannel(id),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_rejects_import_only_types() {
        let api = Arc::new(RecordingApi::new());
        let resource = ChannelResource::new(api.clone());

        let err = resource
            .create(&ChannelConfig {
                channel_type: "slack".to_string(),
                ..email_config()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_attach_failure_names_check() {
        let api = Arc::new(RecordingApi::new());
        let resource = ChannelResource::new(api.clone());

        // Attaching an unknown check fails remotely.
        let err = resource
            .create(&with_checks(&["missing"]))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("unable to attach Binocs channel"), "{message}");
        assert!(message.contains("to check \"missing\""), "{message}");
    }

    #[tokio::test]
    async fn test_create_failure_after_creation_returns_state() {
        let api = Arc::new(RecordingApi::new());
        seed_checks(&api, &["A"]);
        let resource = ChannelResource::new(api.clone());

        let err = resource
            .create(&with_checks(&["A", "missing"]))
            .await
            .unwrap_err();
        let state = err.partial_state().expect("created channel state");
        assert_eq!(state["id"], "ch-1");
        assert_eq!(state["checks"], json!(["A"]));
        assert!(api.channel("ch-1").is_some());

        // Read-back failure after a clean create also keeps the id.
        api.pass_next();
        api.fail_next(ApiError::RateLimited("slow down".to_string()));
        let err = resource.create(&email_config()).await.unwrap_err();
        assert_eq!(err.partial_state().unwrap()["id"], "ch-2");
        assert_eq!(
            api.calls()[api.calls().len() - 2..],
            [ApiCall::CreateChannel, ApiCall::ReadChannel("ch-2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_config_before_any_call() {
        let api = Arc::new(RecordingApi::new());
        let resource = ChannelResource::new(api.clone());
        let prior = resource.create(&email_config()).await.unwrap();
        api.clear_calls();

        let planned = ChannelConfig {
            alias: Some("a".repeat(40)),
            ..prior.clone()
        };
        let err = resource.update(&prior, &planned).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));

        let planned = ChannelConfig {
            handle: "not-an-address".to_string(),
            ..prior.clone()
        };
        assert!(resource.update(&prior, &planned).await.is_err());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_imported_channel_keeps_foreign_handle() {
        let api = Arc::new(RecordingApi::new());
        api.insert_channel(Channel {
            ident: "tg1".to_string(),
            channel_type: "telegram".to_string(),
            handle: "@binocs_alerts".to_string(),
            ..Default::default()
        });
        let resource = ChannelResource::new(api.clone());
        let prior = resource.import("tg1").await.unwrap();
        api.clear_calls();

        let planned = ChannelConfig {
            alias: Some("on-call".to_string()),
            ..prior.clone()
        };
        resource.update(&prior, &planned).await.unwrap();
        assert_eq!(api.calls(), vec![ApiCall::UpdateChannel("tg1".to_string())]);

        let planned = ChannelConfig {
            alias: Some("a".repeat(40)),
            ..prior.clone()
        };
        assert!(resource.update(&prior, &planned).await.is_err());
    }

    #[tokio::test]
    async fn test_update_reconciles_check_set() {
        let api = Arc::new(RecordingApi::new());
        seed_checks(&api, &["A", "B", "C"]);
        let resource = ChannelResource::new(api.clone());

        let prior = resource
            .create(&with_checks(&["A", "B"]))
            .await
            .unwrap();
        let id = prior.id.clone().unwrap();
        api.clear_calls();

        let planned = ChannelConfig {
            checks: Some(ids(&["B", "C"])),
            ..prior.clone()
        };
        let state = resource.update(&prior, &planned).await.unwrap();
        assert_eq!(state.checks, Some(ids(&["B", "C"])));

        assert_eq!(
            api.calls(),
            vec![
                ApiCall::UpdateChannel(id.clone()),
                ApiCall::Detach(id.clone(), "A".to_string()),
                ApiCall::Attach(id.clone(), "C".to_string()),
            ]
        );

        let mut read_id = Some(id);
        let remote = resource.read(&mut read_id).await.unwrap().unwrap();
        assert_eq!(remote.checks, Some(ids(&["B", "C"])));
    }

    #[tokio::test]
    async fn test_update_without_planned_checks_leaves_attachments() {
        let api = Arc::new(RecordingApi::new());
        seed_checks(&api, &["A"]);
        let resource = ChannelResource::new(api.clone());

        let prior = resource.create(&with_checks(&["A"])).await.unwrap();
        api.clear_calls();

        let planned = ChannelConfig {
            alias: Some("on-call".to_string()),
            checks: None,
            ..prior.clone()
        };
        resource.update(&prior, &planned).await.unwrap();
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_update_stops_at_first_failure() {
        let api = Arc::new(RecordingApi::new());
        seed_checks(&api, &["A"]);
        let resource = ChannelResource::new(api.clone());

        let prior = resource.create(&with_checks(&["A"])).await.unwrap();
        let id = prior.id.clone().unwrap();
        api.clear_calls();

        let planned = ChannelConfig {
            checks: Some(ids(&["X", "Y"])),
            ..prior.clone()
        };
        let err = resource.update(&prior, &planned).await.unwrap_err();
        assert!(err.to_string().contains("to check \"X\""));

        // The detach of A went through and is not rolled back; Y was never tried.
        assert_eq!(
            api.calls(),
            vec![
                ApiCall::UpdateChannel(id.clone()),
                ApiCall::Detach(id.clone(), "A".to_string()),
                ApiCall::Attach(id, "X".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_read_and_delete() {
        let api = Arc::new(RecordingApi::new());
        let resource = ChannelResource::new(api.clone());
        let state = resource.create(&email_config()).await.unwrap();
        assert_eq!(state.checks, Some(vec![]));

        resource.delete(&state).await.unwrap();

        let mut id = state.id.clone();
        assert!(!resource.exists(&mut id).await.unwrap());
        assert!(id.is_none());

        api.fail_next(ApiError::RateLimited("slow down".to_string()));
        let err = resource.delete(&state).await.unwrap_err();
        assert!(err.to_string().starts_with("unable to remove Binocs channel: "));
    }

    #[tokio::test]
    async fn test_import_keeps_foreign_channel_types() {
        let api = Arc::new(RecordingApi::new());
        api.insert_channel(Channel {
            ident: "tg1".to_string(),
            channel_type: "telegram".to_string(),
            handle: "@binocs_alerts".to_string(),
            ..Default::default()
        });
        let resource = ChannelResource::new(api);

        let state = resource.import("tg1").await.unwrap();
        assert_eq!(state.channel_type, "telegram");
        assert_eq!(state.handle, "@binocs_alerts");

        assert!(resource.import("nope").await.unwrap_err().is_not_found());
    }
}
