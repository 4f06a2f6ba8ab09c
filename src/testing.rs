//! Test support: a harness around [`ProviderService`], plan and diagnostic
//! assertions, and [`RecordingApi`], an in-memory Binocs API that logs
//! every call.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use binocs_provider::testing::{ProviderTester, RecordingApi};
//! use binocs_provider::BinocsProvider;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let api = Arc::new(RecordingApi::new());
//! let tester = ProviderTester::new(BinocsProvider::with_api(api.clone()));
//!
//! let state = tester
//!     .lifecycle_create(
//!         "binocs_check",
//!         json!({"resource": "tcp://db.internal:5432", "regions": ["eu-west-1"]}),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(state["interval"], 60);
//! assert_eq!(api.calls().len(), 3);
//! # });
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::client::{ApiError, BinocsApi};
use crate::error::ProviderError;
use crate::models::{Channel, ChannelPayload, Check, CheckPayload};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

/// A test harness for provider implementations.
///
/// Wraps a [`ProviderService`] and turns diagnostics into errors so tests
/// can use `?` and `unwrap()` throughout.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration; error diagnostics become `Err`.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider; error diagnostics become `Err`.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration; error diagnostics become `Err`.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider.plan(resource_type, None, proposed_state).await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed_state)
            .await
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource; `None` if it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read_existing(resource_type, created).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read_existing(resource_type, updated).await
    }

    /// Run create → update → delete and return the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }

    async fn read_existing(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        let id = state["id"].as_str().unwrap_or_default().to_string();
        self.read(resource_type, state)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} {}", resource_type, id)))
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug, Error)]
pub enum TestError {
    /// The operation returned error diagnostics.
    #[error("{}", describe(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn describe(diagnostics: &[Diagnostic]) -> String {
    let mut out = format!("Operation failed with {} diagnostic(s):", diagnostics.len());
    for diag in diagnostics {
        out.push_str(&format!("\n  [{:?}] {}", diag.severity, diag.summary));
        if let Some(detail) = &diag.detail {
            out.push_str(&format!(": {}", detail));
        }
        if let Some(attr) = &diag.attribute {
            out.push_str(&format!(" (at {})", attr));
        }
    }
    out
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes a specific attribute.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error on `attribute` whose summary
/// contains `substring`.
///
/// # Panics
///
/// Panics if no such error exists.
pub fn assert_error_on(diagnostics: &[Diagnostic], attribute: &str, substring: &str) {
    assert!(
        diagnostics.iter().any(|d| d.is_error()
            && d.attribute.as_deref() == Some(attribute)
            && d.summary.contains(substring)),
        "Expected an error on '{}' containing '{}'. Errors: {:?}",
        attribute,
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| (&d.attribute, &d.summary))
            .collect::<Vec<_>>()
    );
}

// =========================================================================
// In-memory API
// =========================================================================

/// A call made against [`RecordingApi`], with the identifiers it addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `create_check`
    CreateCheck,
    /// `read_check(ident)`
    ReadCheck(String),
    /// `update_check(ident)`
    UpdateCheck(String),
    /// `delete_check(ident)`
    DeleteCheck(String),
    /// `create_channel`
    CreateChannel,
    /// `read_channel(ident)`
    ReadChannel(String),
    /// `update_channel(ident)`
    UpdateChannel(String),
    /// `delete_channel(ident)`
    DeleteChannel(String),
    /// `attach(channel, check)`
    Attach(String, String),
    /// `detach(channel, check)`
    Detach(String, String),
}

#[derive(Default)]
struct Store {
    checks: BTreeMap<String, Check>,
    channels: BTreeMap<String, Channel>,
    calls: Vec<ApiCall>,
    failures: VecDeque<Option<ApiError>>,
    next_id: u64,
}

impl Store {
    /// Log the call, then hand out a queued failure if there is one.
    fn record(&mut self, call: ApiCall) -> Result<(), ApiError> {
        self.calls.push(call);
        match self.failures.pop_front() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn next_ident(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// An in-memory Binocs API.
///
/// Behaves like the real service for the operations the provider uses:
/// identifiers are assigned on create, unknown identifiers yield
/// [`ApiError::NotFound`], omitted check settings get the service defaults.
/// Every call is logged, including failed ones.
#[derive(Default)]
pub struct RecordingApi {
    store: Mutex<Store>,
}

impl RecordingApi {
    /// Create an empty API.
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an existing check.
    pub fn insert_check(&self, check: Check) {
        self.store().checks.insert(check.ident.clone(), check);
    }

    /// Seed an existing channel.
    pub fn insert_channel(&self, channel: Channel) {
        self.store().channels.insert(channel.ident.clone(), channel);
    }

    /// Make the next call fail with `error`. Failures queue up in order.
    pub fn fail_next(&self, error: ApiError) {
        self.store().failures.push_back(Some(error));
    }

    /// Let the next call through, so a following [`fail_next`] hits the
    /// call after it.
    ///
    /// [`fail_next`]: RecordingApi::fail_next
    pub fn pass_next(&self) {
        self.store().failures.push_back(None);
    }

    /// The calls made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.store().calls.clone()
    }

    /// Forget the calls made so far.
    pub fn clear_calls(&self) {
        self.store().calls.clear();
    }

    /// The stored check, if any.
    pub fn check(&self, ident: &str) -> Option<Check> {
        self.store().checks.get(ident).cloned()
    }

    /// The stored channel, if any.
    pub fn channel(&self, ident: &str) -> Option<Channel> {
        self.store().channels.get(ident).cloned()
    }
}

fn not_found(path: String) -> ApiError {
    ApiError::NotFound(path)
}

fn check_from_payload(ident: String, payload: &CheckPayload) -> Check {
    let http = payload.protocol.http();
    Check {
        ident,
        name: payload.name.clone().unwrap_or_default(),
        resource: payload.resource.clone(),
        protocol: payload.protocol.protocol().as_str().to_string(),
        method: http.map(|h| h.method.as_str().to_string()).unwrap_or_default(),
        interval: payload.interval.unwrap_or(60),
        target: payload.target.unwrap_or(1.2),
        regions: payload.regions.clone(),
        up_codes: http.map(|h| h.up_codes.clone()).unwrap_or_default(),
        up_confirmations_threshold: payload.up_confirmations_threshold.unwrap_or(2),
        down_confirmations_threshold: payload.down_confirmations_threshold.unwrap_or(2),
    }
}

#[async_trait]
impl BinocsApi for RecordingApi {
    async fn create_check(&self, payload: &CheckPayload) -> Result<Check, ApiError> {
        let mut store = self.store();
        store.record(ApiCall::CreateCheck)?;
        let ident = store.next_ident("chk");
        let check = check_from_payload(ident.clone(), payload);
        store.checks.insert(ident, check.clone());
        Ok(check)
    }

    async fn read_check(&self, ident: &str) -> Result<Check, ApiError> {
        let mut store = self.store();
        store.record(ApiCall::ReadCheck(ident.to_string()))?;
        store
            .checks
            .get(ident)
            .cloned()
            .ok_or_else(|| not_found(format!("/checks/{}", ident)))
    }

    async fn update_check(&self, ident: &str, payload: &CheckPayload) -> Result<(), ApiError> {
        let mut store = self.store();
        store.record(ApiCall::UpdateCheck(ident.to_string()))?;
        let check = store
            .checks
            .get_mut(ident)
            .ok_or_else(|| not_found(format!("/checks/{}", ident)))?;
        *check = check_from_payload(ident.to_string(), payload);
        Ok(())
    }

    async fn delete_check(&self, ident: &str) -> Result<(), ApiError> {
        let mut store = self.store();
        store.record(ApiCall::DeleteCheck(ident.to_string()))?;
        store
            .checks
            .remove(ident)
            .ok_or_else(|| not_found(format!("/checks/{}", ident)))?;
        for channel in store.channels.values_mut() {
            channel.checks.retain(|c| c != ident);
        }
        Ok(())
    }

    async fn create_channel(&self, payload: &ChannelPayload) -> Result<Channel, ApiError> {
        let mut store = self.store();
        store.record(ApiCall::CreateChannel)?;
        let ident = store.next_ident("ch");
        let channel = Channel {
            ident: ident.clone(),
            channel_type: payload.channel_type.as_str().to_string(),
            handle: payload.handle.clone(),
            alias: payload.alias.clone().unwrap_or_default(),
            checks: Vec::new(),
        };
        store.channels.insert(ident, channel.clone());
        Ok(channel)
    }

    async fn read_channel(&self, ident: &str) -> Result<Channel, ApiError> {
        let mut store = self.store();
        store.record(ApiCall::ReadChannel(ident.to_string()))?;
        store
            .channels
            .get(ident)
            .cloned()
            .ok_or_else(|| not_found(format!("/channels/{}", ident)))
    }

    async fn update_channel(&self, ident: &str, payload: &ChannelPayload) -> Result<(), ApiError> {
        let mut store = self.store();
        store.record(ApiCall::UpdateChannel(ident.to_string()))?;
        let channel = store
            .channels
            .get_mut(ident)
            .ok_or_else(|| not_found(format!("/channels/{}", ident)))?;
        channel.channel_type = payload.channel_type.as_str().to_string();
        channel.handle = payload.handle.clone();
        channel.alias = payload.alias.clone().unwrap_or_default();
        Ok(())
    }

    async fn delete_channel(&self, ident: &str) -> Result<(), ApiError> {
        let mut store = self.store();
        store.record(ApiCall::DeleteChannel(ident.to_string()))?;
        store
            .channels
            .remove(ident)
            .map(drop)
            .ok_or_else(|| not_found(format!("/channels/{}", ident)))
    }

    async fn attach(&self, channel_ident: &str, check_ident: &str) -> Result<(), ApiError> {
        let mut store = self.store();
        store.record(ApiCall::Attach(
            channel_ident.to_string(),
            check_ident.to_string(),
        ))?;
        let path = format!("/channels/{}/check/{}", channel_ident, check_ident);
        if !store.checks.contains_key(check_ident) {
            return Err(not_found(path));
        }
        let channel = store
            .channels
            .get_mut(channel_ident)
            .ok_or_else(|| not_found(path))?;
        if !channel.checks.iter().any(|c| c == check_ident) {
            channel.checks.push(check_ident.to_string());
        }
        Ok(())
    }

    async fn detach(&self, channel_ident: &str, check_ident: &str) -> Result<(), ApiError> {
        let mut store = self.store();
        store.record(ApiCall::Detach(
            channel_ident.to_string(),
            check_ident.to_string(),
        ))?;
        let channel = store.channels.get_mut(channel_ident).ok_or_else(|| {
            not_found(format!("/channels/{}/check/{}", channel_ident, check_ident))
        })?;
        channel.checks.retain(|c| c != check_ident);
        Ok(())
    }
}
