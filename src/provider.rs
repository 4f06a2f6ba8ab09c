//! [`BinocsProvider`]: the [`ProviderService`] for `binocs_check` and
//! `binocs_channel`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{BinocsApi, HttpApiClient};
use crate::config::{ConfigError, ProviderConfig};
use crate::error::ProviderError;
use crate::plan::plan_resource;
use crate::resources::{channel, check, ChannelConfig, ChannelResource, CheckConfig, CheckResource};
use crate::schema::{has_errors, Diagnostic, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

/// Resource type name of checks.
pub const CHECK_RESOURCE: &str = "binocs_check";
/// Resource type name of notification channels.
pub const CHANNEL_RESOURCE: &str = "binocs_channel";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Check,
    Channel,
}

impl ResourceKind {
    fn parse(resource_type: &str) -> Result<Self, ProviderError> {
        match resource_type {
            CHECK_RESOURCE => Ok(Self::Check),
            CHANNEL_RESOURCE => Ok(Self::Channel),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }

    fn schema(self) -> Schema {
        match self {
            Self::Check => check::schema(),
            Self::Channel => channel::schema(),
        }
    }
}

/// The Binocs provider.
///
/// Until [`ProviderService::configure`] succeeds (or an API is injected with
/// [`BinocsProvider::with_api`]) every resource operation fails with a
/// configuration error.
#[derive(Default)]
pub struct BinocsProvider {
    api: RwLock<Option<Arc<dyn BinocsApi>>>,
}

impl BinocsProvider {
    /// Create an unconfigured provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider that talks to the given API instead of connecting
    /// on configure.
    pub fn with_api(api: Arc<dyn BinocsApi>) -> Self {
        Self {
            api: RwLock::new(Some(api)),
        }
    }

    async fn api(&self) -> Result<Arc<dyn BinocsApi>, ProviderError> {
        self.api.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }
}

fn from_state<T: DeserializeOwned>(state: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(state)?)
}

fn to_state<T: Serialize>(value: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(value)?)
}

fn config_diagnostic(err: &ConfigError) -> Diagnostic {
    let diagnostic = Diagnostic::error(err.to_string());
    match err.attribute() {
        Some(attribute) => diagnostic.with_attribute(attribute),
        None => diagnostic,
    }
}

#[async_trait::async_trait]
impl ProviderService for BinocsProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(CHECK_RESOURCE, check::schema())
            .with_resource(CHANNEL_RESOURCE, channel::schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&ProviderConfig::schema(), &config);
        if !has_errors(&diagnostics) {
            if let Err(err) = ProviderConfig::from_value(&config) {
                diagnostics.push(config_diagnostic(&err));
            }
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config))]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = match ProviderConfig::from_value(&config) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "Invalid provider configuration");
                return Ok(vec![config_diagnostic(&err)]);
            }
        };
        debug!(?config, "Configuring provider");

        match HttpApiClient::connect(&config).await {
            Ok(client) => {
                *self.api.write().await = Some(Arc::new(client));
                info!(api_url = %config.api_url, "Provider configured");
                Ok(vec![])
            }
            Err(err) => {
                error!(error = %err, "Unable to authenticate with the Binocs API");
                Ok(vec![Diagnostic::error("Unable to create Binocs client")
                    .with_detail(err.to_string())])
            }
        }
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.api.write().await.take();
        debug!("Provider stopped");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = match ResourceKind::parse(resource_type)? {
            ResourceKind::Check => check::validate_config(&config),
            ResourceKind::Channel => channel::validate_config(&config),
        };
        if has_errors(&diagnostics) {
            warn!(resource_type, diagnostics = diagnostics.len(), "Resource configuration has errors");
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = ResourceKind::parse(resource_type)?.schema();
        let result = plan_resource(&schema, prior_state.as_ref(), &proposed_state)?;
        debug!(
            changes = result.changes.len(),
            requires_replace = result.requires_replace,
            "Plan completed"
        );
        Ok(result)
    }

    #[instrument(skip(self, planned_state))]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let kind = ResourceKind::parse(resource_type)?;
        let api = self.api().await?;
        match kind {
            ResourceKind::Check => {
                let config: CheckConfig = from_state(planned_state)?;
                to_state(&CheckResource::new(api).create(&config).await?)
            }
            ResourceKind::Channel => {
                let config: ChannelConfig = from_state(planned_state)?;
                to_state(&ChannelResource::new(api).create(&config).await?)
            }
        }
    }

    #[instrument(skip(self, current_state))]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError> {
        let kind = ResourceKind::parse(resource_type)?;
        let api = self.api().await?;
        let state = match kind {
            ResourceKind::Check => {
                let mut id = from_state::<CheckConfig>(current_state)?.id;
                CheckResource::new(api)
                    .read(&mut id)
                    .await?
                    .map(|state| to_state(&state))
            }
            ResourceKind::Channel => {
                let mut id = from_state::<ChannelConfig>(current_state)?.id;
                ChannelResource::new(api)
                    .read(&mut id)
                    .await?
                    .map(|state| to_state(&state))
            }
        };
        state.transpose()
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let kind = ResourceKind::parse(resource_type)?;
        let api = self.api().await?;
        match kind {
            ResourceKind::Check => {
                let prior: CheckConfig = from_state(prior_state)?;
                let mut planned: CheckConfig = from_state(planned_state)?;
                planned.id = prior.id;
                to_state(&CheckResource::new(api).update(&planned).await?)
            }
            ResourceKind::Channel => {
                let prior: ChannelConfig = from_state(prior_state)?;
                let planned: ChannelConfig = from_state(planned_state)?;
                to_state(&ChannelResource::new(api).update(&prior, &planned).await?)
            }
        }
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let kind = ResourceKind::parse(resource_type)?;
        let api = self.api().await?;
        match kind {
            ResourceKind::Check => CheckResource::new(api).delete(&from_state(current_state)?).await,
            ResourceKind::Channel => {
                ChannelResource::new(api)
                    .delete(&from_state(current_state)?)
                    .await
            }
        }
    }

    #[instrument(skip(self))]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let kind = ResourceKind::parse(resource_type)?;
        let api = self.api().await?;
        let state = match kind {
            ResourceKind::Check => to_state(&CheckResource::new(api).import(id).await?)?,
            ResourceKind::Channel => to_state(&ChannelResource::new(api).import(id).await?)?,
        };
        info!("Imported resource");
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Check;
    use crate::testing::{
        assert_error_on, assert_no_errors, assert_plan_creates, assert_plan_no_changes,
        assert_plan_replaces, assert_plan_updates_in_place, ApiCall, ProviderTester, RecordingApi,
    };
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tester() -> (Arc<RecordingApi>, ProviderTester<BinocsProvider>) {
        let api = Arc::new(RecordingApi::new());
        let tester = ProviderTester::new(BinocsProvider::with_api(api.clone()));
        (api, tester)
    }

    fn https_check() -> Value {
        json!({
            "name": "homepage",
            "resource": "https://example.com",
            "method": "GET",
            "up_codes": "2xx",
            "regions": ["us-east-1", "eu-west-1"]
        })
    }

    #[test]
    fn test_schema_and_metadata() {
        let provider = BinocsProvider::new();
        assert_eq!(
            provider.metadata().resources,
            vec![CHANNEL_RESOURCE.to_string(), CHECK_RESOURCE.to_string()]
        );
        let schema = provider.schema();
        assert!(schema.resources[CHECK_RESOURCE].attributes["resource"].force_new);
        assert!(schema.resources[CHANNEL_RESOURCE].attributes["handle"].force_new);
        assert!(schema.provider.attributes["secret_key"].flags.sensitive);
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let tester = ProviderTester::new(BinocsProvider::new());
        let err = tester.create(CHECK_RESOURCE, https_check()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        // Planning needs no API.
        assert!(tester.plan_create(CHECK_RESOURCE, https_check()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (_, tester) = tester();
        let err = tester.plan_create("binocs_incident", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(ref t) if t == "binocs_incident"));
        assert!(tester
            .validate_resource_config("binocs_incident", json!({}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let provider = BinocsProvider::new();

        let diagnostics = provider
            .validate_resource_config(CHECK_RESOURCE, https_check())
            .await
            .unwrap();
        assert_no_errors(&diagnostics);

        let diagnostics = provider
            .validate_resource_config(
                CHECK_RESOURCE,
                json!({"resource": "tcp://db.internal:5432", "up_codes": "2xx", "interval": 901, "regions": ["eu-west-1"]}),
            )
            .await
            .unwrap();
        assert_error_on(&diagnostics, "interval", "(5 - 900)");
        assert_error_on(&diagnostics, "up_codes", "cannot be used with a TCP resource");

        let diagnostics = provider
            .validate_resource_config(
                CHANNEL_RESOURCE,
                json!({"type": "email", "handle": "ops@example.com", "checks": ["chk-1"]}),
            )
            .await
            .unwrap();
        assert_no_errors(&diagnostics);
    }

    #[tokio::test]
    async fn test_plan_fills_defaults_and_marks_replacement() {
        let (_, tester) = tester();

        let plan = tester.plan_create(CHECK_RESOURCE, https_check()).await.unwrap();
        assert_plan_creates(&plan);
        assert_eq!(plan.planned_state["interval"], 60);
        assert_eq!(plan.planned_state["target"], 1.2);
        assert_eq!(plan.planned_state["up_confirmations_threshold"], 2);
        assert_eq!(plan.planned_state["regions"], json!(["eu-west-1", "us-east-1"]));

        let state = tester.lifecycle_create(CHECK_RESOURCE, https_check()).await.unwrap();
        let plan = tester.plan_update(CHECK_RESOURCE, state.clone(), https_check()).await.unwrap();
        assert_plan_no_changes(&plan);

        let mut moved = https_check();
        moved["resource"] = json!("https://example.org");
        let plan = tester.plan_update(CHECK_RESOURCE, state.clone(), moved).await.unwrap();
        assert_plan_replaces(&plan);
        assert!(plan.planned_state.get("id").is_none());

        let mut slower = https_check();
        slower["interval"] = json!(300);
        let plan = tester.plan_update(CHECK_RESOURCE, state, slower).await.unwrap();
        assert_plan_updates_in_place(&plan);
        assert_eq!(plan.planned_state["id"], "chk-1");
    }

    #[tokio::test]
    async fn test_check_crud_lifecycle() {
        let (api, tester) = tester();

        let mut updated = https_check();
        updated["interval"] = json!(120);
        let state = tester
            .lifecycle_crud(CHECK_RESOURCE, https_check(), updated)
            .await
            .unwrap();

        assert_eq!(state["id"], "chk-1");
        assert_eq!(state["interval"], 120);
        assert!(state.get("protocol").is_none());
        assert!(api.check("chk-1").is_none());
        assert!(api.calls().contains(&ApiCall::UpdateCheck("chk-1".to_string())));
        assert_eq!(api.calls().last(), Some(&ApiCall::DeleteCheck("chk-1".to_string())));
    }

    #[tokio::test]
    async fn test_read_vanished_resource_is_absent() {
        let (api, tester) = tester();
        let state = tester.lifecycle_create(CHECK_RESOURCE, https_check()).await.unwrap();
        tester.delete(CHECK_RESOURCE, state.clone()).await.unwrap();

        assert_eq!(tester.read(CHECK_RESOURCE, state).await.unwrap(), None);
        assert_eq!(
            api.calls().last(),
            Some(&ApiCall::ReadCheck("chk-1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_channel_checks_reconciled_through_provider() {
        let (api, tester) = tester();
        for ident in ["A", "B", "C"] {
            api.insert_check(Check {
                ident: ident.to_string(),
                ..Default::default()
            });
        }

        let config = json!({"type": "email", "handle": "ops@example.com", "checks": ["A", "B"]});
        let prior = tester.lifecycle_create(CHANNEL_RESOURCE, config).await.unwrap();
        assert_eq!(prior["checks"], json!(["A", "B"]));
        assert_eq!(prior["alias"], "");
        api.clear_calls();

        let proposed = json!({"type": "email", "handle": "ops@example.com", "checks": ["C", "B"]});
        let state = tester
            .lifecycle_update(CHANNEL_RESOURCE, prior, proposed)
            .await
            .unwrap();
        assert_eq!(state["checks"], json!(["B", "C"]));

        let associations: Vec<ApiCall> = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::Attach(..) | ApiCall::Detach(..)))
            .collect();
        assert_eq!(
            associations,
            vec![
                ApiCall::Detach("ch-1".to_string(), "A".to_string()),
                ApiCall::Attach("ch-1".to_string(), "C".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_failure_after_creation_surfaces_state() {
        let (api, tester) = tester();

        let config = json!({"type": "email", "handle": "ops@example.com", "checks": ["missing"]});
        let plan = tester.plan_create(CHANNEL_RESOURCE, config).await.unwrap();
        let err = tester
            .create(CHANNEL_RESOURCE, plan.planned_state)
            .await
            .unwrap_err();

        let state = err.partial_state().unwrap();
        assert_eq!(state["id"], "ch-1");
        assert_eq!(state["checks"], json!([]));
        assert!(api.channel("ch-1").is_some());
    }

    #[tokio::test]
    async fn test_import() {
        let (api, tester) = tester();
        api.insert_check(Check {
            ident: "legacy".to_string(),
            resource: "tcp://10.0.0.7:22".to_string(),
            protocol: "TCP".to_string(),
            regions: vec!["eu-central-1".to_string()],
            interval: 30,
            ..Default::default()
        });

        let imported = tester.import_resource(CHECK_RESOURCE, "legacy").await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, CHECK_RESOURCE);
        assert_eq!(imported[0].state["id"], "legacy");
        assert_eq!(imported[0].state["interval"], 30);
        assert!(imported[0].state.get("method").is_none());

        let err = tester.import_resource(CHANNEL_RESOURCE, "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_validate_provider_config_names_missing_field() {
        let provider = BinocsProvider::new();
        let diagnostics = provider
            .validate_provider_config(json!({"access_key": "ak", "secret_key": "sk", "api_url": "ftp://x"}))
            .await
            .unwrap();
        assert_error_on(&diagnostics, "api_url", "invalid api_url");

        let diagnostics = provider
            .validate_provider_config(json!({"access_key": 12}))
            .await
            .unwrap();
        assert_error_on(&diagnostics, "access_key", "Invalid type");
    }

    #[tokio::test]
    async fn test_configure_connects_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/checks/chk-7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tester = ProviderTester::new(BinocsProvider::new());
        tester
            .configure(json!({"access_key": "ak", "secret_key": "sk", "api_url": server.uri()}))
            .await
            .unwrap();

        let state = tester
            .read(CHECK_RESOURCE, json!({"id": "chk-7", "resource": "https://example.com"}))
            .await
            .unwrap();
        assert!(state.is_none());

        tester.stop().await.unwrap();
        let err = tester
            .read(CHECK_RESOURCE, json!({"id": "chk-7"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_configure_reports_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = BinocsProvider::new();
        let diagnostics = provider
            .configure(json!({"access_key": "ak", "secret_key": "sk", "api_url": server.uri()}))
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].detail.as_deref().unwrap_or_default().contains("403"));
    }
}
