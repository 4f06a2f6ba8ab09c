//! Binocs Provider
//!
//! Manages [Binocs](https://binocs.sh) uptime checks and notification
//! channels through a declarative create/read/update/delete/import
//! lifecycle. A host transport drives the [`ProviderService`] trait; this
//! crate validates configuration, builds API payloads and bridges state to
//! the Binocs API.
//!
//! # Overview
//!
//! - **Schema types**: the provider and resource schemas, with declarative
//!   attribute validators
//! - **Validation**: schema walk plus field validators for resources
//!   (URLs, `tcp://host:port`), up codes, regions and e-mail handles
//! - **Planning**: defaults, carried computed values, set normalisation and
//!   replacement detection
//! - **Resources**: `binocs_check` and `binocs_channel`, including check
//!   attachment reconciliation for channels
//! - **API client**: the [`BinocsApi`] trait and its HTTP implementation
//! - **Logging**: `tracing` spans on every operation, stderr subscriber helpers
//!
//! # Quick Start
//!
//! ```no_run
//! use binocs_provider::{init_logging, BinocsProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = BinocsProvider::new();
//!     // Keys fall back to BINOCS_ACCESS_KEY / BINOCS_SECRET_KEY.
//!     let diagnostics = provider.configure(json!({})).await?;
//!     assert!(diagnostics.is_empty(), "{diagnostics:?}");
//!
//!     let proposed = json!({
//!         "name": "homepage",
//!         "resource": "https://example.com",
//!         "method": "GET",
//!         "up_codes": "2xx",
//!         "regions": ["eu-west-1", "us-east-1"]
//!     });
//!     let plan = provider.plan("binocs_check", None, proposed).await?;
//!     let state = provider.create("binocs_check", plan.planned_state).await?;
//!     println!("created check {}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Operations
//!
//! - **Schema / Metadata**: provider config and resource schemas
//! - **ValidateProviderConfig / Configure**: resolve credentials, authenticate
//! - **ValidateResourceConfig**: static and cross-field rules
//! - **Plan**: planned state, attribute changes, replacement
//! - **Create/Read/Update/Delete**: CRUD against the Binocs API
//! - **ImportResource**: adopt an existing check or channel by identifier

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::{ApiError, BinocsApi, HttpApiClient};
pub use config::{ConfigError, ProviderConfig};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use plan::plan_resource;
pub use provider::{BinocsProvider, CHANNEL_RESOURCE, CHECK_RESOURCE};
pub use schema::{Diagnostic, ProviderSchema};
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
