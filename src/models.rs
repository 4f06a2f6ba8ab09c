//! Binocs domain types: the fixed value tables, outbound payloads and the
//! entities returned by the API.
//!
//! Outbound check payloads carry their protocol-specific fields in a tagged
//! union, so an HTTP check without a method or a TCP check with up codes
//! cannot be built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Regions Binocs polls from.
pub const SUPPORTED_REGIONS: [&str; 11] = [
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "eu-central-1",
    "eu-west-1",
    "sa-east-1",
    "us-east-1",
    "us-west-1",
];

/// HTTP methods a check may use.
pub const SUPPORTED_HTTP_METHODS: [&str; 5] = ["GET", "HEAD", "POST", "PUT", "DELETE"];

/// Channel types that can be created through the provider.
pub const SUPPORTED_CHANNEL_TYPES: [&str; 1] = ["email"];

/// Channel types that need interactive setup and can only be imported.
pub const IMPORT_ONLY_CHANNEL_TYPES: [&str; 2] = ["telegram", "slack"];

/// The protocol of a checked resource, derived from its scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// `http://...`
    Http,
    /// `https://...`
    Https,
    /// `tcp://host:port`
    Tcp,
}

impl Protocol {
    /// Classify a resource by upper-casing the token before its first colon.
    ///
    /// Returns `None` for anything that is not cleanly HTTP, HTTPS or TCP.
    pub fn from_resource(resource: &str) -> Option<Self> {
        let scheme = resource.split(':').next()?;
        match scheme.to_uppercase().as_str() {
            "HTTP" => Some(Self::Http),
            "HTTPS" => Some(Self::Https),
            "TCP" => Some(Self::Tcp),
            _ => None,
        }
    }

    /// The wire name of the protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
        }
    }

    /// Whether checks over this protocol carry a method and up codes.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The HTTP method of an HTTP(S) check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// The wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    /// Method names are matched case-sensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!(
                "expected one of {}, got {:?}",
                SUPPORTED_HTTP_METHODS.join(", "),
                other
            )),
        }
    }
}

/// Fields only HTTP(S) checks have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpFields {
    /// The request method.
    pub method: HttpMethod,
    /// Response codes considered "up", e.g. `2xx` or `200-302`.
    pub up_codes: String,
}

/// Protocol-dependent part of a check payload, serialized with a `protocol` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol")]
pub enum ProtocolFields {
    /// Plain HTTP check.
    #[serde(rename = "HTTP")]
    Http(HttpFields),
    /// HTTPS check.
    #[serde(rename = "HTTPS")]
    Https(HttpFields),
    /// TCP connect check; has no method or up codes.
    #[serde(rename = "TCP")]
    Tcp,
}

impl ProtocolFields {
    /// The protocol these fields belong to.
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http(_) => Protocol::Http,
            Self::Https(_) => Protocol::Https,
            Self::Tcp => Protocol::Tcp,
        }
    }

    /// The HTTP fields, if any.
    pub fn http(&self) -> Option<&HttpFields> {
        match self {
            Self::Http(fields) | Self::Https(fields) => Some(fields),
            Self::Tcp => None,
        }
    }
}

/// A validated check, ready to be sent on create or update.
///
/// Absent optional fields are omitted so the API applies its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckPayload {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The checked URL or `tcp://host:port`.
    pub resource: String,
    /// Protocol tag plus the fields legal for it.
    #[serde(flatten)]
    pub protocol: ProtocolFields,
    /// Polling interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Apdex target response time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    /// Polling regions, sorted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
    /// Consecutive "up" observations before the state flips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_confirmations_threshold: Option<u32>,
    /// Consecutive "down" observations before the state flips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_confirmations_threshold: Option<u32>,
}

/// A check as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Check {
    /// Remote identifier.
    pub ident: String,
    /// Display name.
    pub name: String,
    /// Monitored URL or `tcp://host:port`.
    pub resource: String,
    /// `HTTP`, `HTTPS` or `TCP`.
    pub protocol: String,
    /// Empty for TCP checks.
    pub method: String,
    /// Seconds between runs.
    pub interval: u32,
    /// Apdex target in seconds.
    pub target: f64,
    /// Regions the check runs from.
    pub regions: Vec<String>,
    /// Empty for TCP checks.
    pub up_codes: String,
    /// Successes needed before the check is considered up.
    pub up_confirmations_threshold: u32,
    /// Failures needed before the check is considered down.
    pub down_confirmations_threshold: u32,
}

/// The kind of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// E-mail address, verified by Binocs.
    Email,
    /// Telegram chat; import-only.
    Telegram,
    /// Slack webhook; import-only.
    Slack,
}

impl ChannelType {
    /// The wire name of the channel type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Telegram => "telegram",
            Self::Slack => "slack",
        }
    }

    /// Whether channels of this type can be created (rather than only imported).
    pub fn is_creatable(&self) -> bool {
        SUPPORTED_CHANNEL_TYPES.contains(&self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "telegram" => Ok(Self::Telegram),
            "slack" => Ok(Self::Slack),
            other => Err(format!("unknown channel type {:?}", other)),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated channel, ready to be sent on create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelPayload {
    /// The channel type.
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// The address notifications go to.
    pub handle: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// A notification channel as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    /// Remote identifier.
    pub ident: String,
    /// Kept as a string: the API may know types this provider does not.
    #[serde(rename = "type")]
    pub channel_type: String,
    /// Where notifications are sent.
    pub handle: String,
    /// Display name.
    pub alias: String,
    /// Identifiers of the attached checks.
    pub checks: Vec<String>,
}
