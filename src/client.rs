//! Binocs API client.
//!
//! [`BinocsApi`] is the seam between the CRUD bridge and the network:
//! resources only ever talk to the trait, so they can be driven by the
//! in-memory fake in [`crate::testing`]. [`HttpApiClient`] is the real
//! implementation over JSON/HTTP.

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ProviderConfig;
use crate::models::{Channel, ChannelPayload, Check, CheckPayload};

/// Errors returned by the Binocs API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed entity does not exist (HTTP 404).
    #[error("404 Not Found: {0}")]
    NotFound(String),

    /// Credentials were rejected (HTTP 401 or 403).
    #[error("{status} Unauthorized: {body}")]
    Unauthorized {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },

    /// The API is throttling requests (HTTP 429).
    #[error("429 Too Many Requests: {0}")]
    RateLimited(String),

    /// Any other non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },

    /// The request could not be sent or the response could not be decoded.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API base URL cannot address resources.
    #[error("invalid API endpoint: {0}")]
    Endpoint(String),
}

impl ApiError {
    /// Whether the error means the entity no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Operations the provider needs from the Binocs API.
#[async_trait]
pub trait BinocsApi: Send + Sync {
    /// Create a check, returning it with its assigned identifier.
    async fn create_check(&self, payload: &CheckPayload) -> Result<Check, ApiError>;

    /// Fetch a check by identifier.
    async fn read_check(&self, ident: &str) -> Result<Check, ApiError>;

    /// Replace a check's settings.
    async fn update_check(&self, ident: &str, payload: &CheckPayload) -> Result<(), ApiError>;

    /// Delete a check.
    async fn delete_check(&self, ident: &str) -> Result<(), ApiError>;

    /// Create a channel, returning it with its assigned identifier.
    async fn create_channel(&self, payload: &ChannelPayload) -> Result<Channel, ApiError>;

    /// Fetch a channel by identifier.
    async fn read_channel(&self, ident: &str) -> Result<Channel, ApiError>;

    /// Replace a channel's settings.
    async fn update_channel(&self, ident: &str, payload: &ChannelPayload) -> Result<(), ApiError>;

    /// Delete a channel.
    async fn delete_channel(&self, ident: &str) -> Result<(), ApiError>;

    /// Associate a check with a channel.
    async fn attach(&self, channel_ident: &str, check_ident: &str) -> Result<(), ApiError>;

    /// Remove the association between a check and a channel.
    async fn detach(&self, channel_ident: &str, check_ident: &str) -> Result<(), ApiError>;
}

#[derive(Serialize)]
struct Credentials<'a> {
    access_key: &'a str,
    secret_key: &'a str,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

/// HTTP implementation of [`BinocsApi`].
///
/// Authenticates once on [`HttpApiClient::connect`] and sends the token as
/// a bearer header on every later request.
#[derive(Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl std::fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpApiClient {
    /// Exchange the configured keys for an access token.
    #[instrument(skip(config), fields(api_url = %config.api_url))]
    pub async fn connect(config: &ProviderConfig) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(&config.api_url).map_err(|_| ApiError::Endpoint(config.api_url.clone()))?;
        let http = reqwest::Client::new();

        let url = endpoint(&base_url, &["authenticate"])?;
        let response = http
            .post(url)
            .json(&Credentials {
                access_key: &config.access_key,
                secret_key: &config.secret_key,
            })
            .send()
            .await?;
        let token: AccessToken = check_status("/authenticate", response).await?.json().await?;
        debug!("authenticated with the Binocs API");

        Ok(Self {
            http,
            base_url,
            token: token.access_token,
        })
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = endpoint(&self.base_url, segments)?;
        let path = url.path().to_string();
        debug!(%method, %path, "sending request");

        let mut request = self.http.request(method, url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        check_status(&path, request.send().await?).await
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        Ok(self.send::<()>(Method::GET, segments, None).await?.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        Ok(self.send(Method::POST, segments, Some(body)).await?.json().await?)
    }
}

#[async_trait]
impl BinocsApi for HttpApiClient {
    async fn create_check(&self, payload: &CheckPayload) -> Result<Check, ApiError> {
        self.post_json(&["checks"], payload).await
    }

    async fn read_check(&self, ident: &str) -> Result<Check, ApiError> {
        self.get_json(&["checks", ident]).await
    }

    async fn update_check(&self, ident: &str, payload: &CheckPayload) -> Result<(), ApiError> {
        self.send(Method::PUT, &["checks", ident], Some(payload))
            .await
            .map(drop)
    }

    async fn delete_check(&self, ident: &str) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, &["checks", ident], None)
            .await
            .map(drop)
    }

    async fn create_channel(&self, payload: &ChannelPayload) -> Result<Channel, ApiError> {
        self.post_json(&["channels"], payload).await
    }

    async fn read_channel(&self, ident: &str) -> Result<Channel, ApiError> {
        self.get_json(&["channels", ident]).await
    }

    async fn update_channel(&self, ident: &str, payload: &ChannelPayload) -> Result<(), ApiError> {
        self.send(Method::PUT, &["channels", ident], Some(payload))
            .await
            .map(drop)
    }

    async fn delete_channel(&self, ident: &str) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, &["channels", ident], None)
            .await
            .map(drop)
    }

    async fn attach(&self, channel_ident: &str, check_ident: &str) -> Result<(), ApiError> {
        self.send::<()>(
            Method::POST,
            &["channels", channel_ident, "check", check_ident],
            None,
        )
        .await
        .map(drop)
    }

    async fn detach(&self, channel_ident: &str, check_ident: &str) -> Result<(), ApiError> {
        self.send::<()>(
            Method::DELETE,
            &["channels", channel_ident, "check", check_ident],
            None,
        )
        .await
        .map(drop)
    }
}

/// Append percent-encoded path segments to the base URL.
fn endpoint(base_url: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::Endpoint(base_url.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check_status(path: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized {
            status: status.as_u16(),
            body,
        },
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited(body),
        _ => ApiError::Status {
            status: status.as_u16(),
            body,
        },
    })
}
