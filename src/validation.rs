//! Configuration validation.
//!
//! Two layers live here:
//!
//! - [`validate`] walks a `serde_json::Value` against a [`Schema`], checking
//!   presence, types, set sizes, and every [`AttributeValidator`] attached to
//!   an attribute.
//! - Field validators ([`validate_resource`], [`validate_up_codes`],
//!   [`validate_region`], ...) check a single value and report a
//!   [`Diagnostic`] naming the field and the violated constraint.
//!
//! # Example
//!
//! ```
//! use binocs_provider::schema::{Attribute, Schema};
//! use binocs_provider::validation::{validate, AttributeValidator};
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute(
//!     "interval",
//!     Attribute::optional_int64().with_validator(AttributeValidator::IntBetween { min: 5, max: 900 }),
//! );
//!
//! assert!(validate(&schema, &json!({"interval": 900})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"interval": 901}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("interval".to_string()));
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, Ipv6Addr};
use url::Url;

use crate::models::SUPPORTED_REGIONS;
use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

static DNS_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z0-9_]{1}[a-zA-Z0-9_-]{0,62}){1}(\.[a-zA-Z0-9_]{1}[a-zA-Z0-9_-]{0,62})*[\._]?$")
        .expect("DNS name pattern is valid")
});

static UP_CODES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([1-5]{1}[0-9]{2}-[1-5]{1}[0-9]{2}|([1-5]{1}(([0-9]{2}|[0-9]{1}x)|xx))){1}(,([1-5]{1}[0-9]{2}-[1-5]{1}[0-9]{2}|([1-5]{1}(([0-9]{2}|[0-9]{1}x)|xx))))*$")
        .expect("up codes pattern is valid")
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:[a-z0-9!#$%&'*+/=?^_{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_{|}~-]+)*|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*")@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?|\[(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?|[a-z0-9-]*[a-z0-9]:(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21-\x5a\x53-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])+)\])$"#)
        .expect("e-mail pattern is valid")
});

const TCP_PREFIX: &str = "tcp://";

/// Maximum length of a DNS name, not counting dots.
const MAX_DNS_NAME_LEN: usize = 255;

/// A declarative constraint on an attribute value.
///
/// Validators run only after the value passed its type check. On set
/// attributes they run once per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeValidator {
    /// String length (in characters) within `[min, max]`.
    StringLenBetween {
        /// Inclusive lower bound.
        min: usize,
        /// Inclusive upper bound.
        max: usize,
    },
    /// Integer within `[min, max]`.
    IntBetween {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Float within `[min, max]`.
    FloatBetween {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// String equal to one of `values` (case-sensitive).
    OneOf {
        /// Accepted values.
        values: Vec<String>,
    },
    /// A supported polling region.
    Region,
    /// An HTTP(S) URL or `tcp://host:port`.
    Resource,
    /// An up-codes expression such as `200,3xx` or `200-302`.
    UpCodes,
    /// An e-mail address.
    Email,
}

impl AttributeValidator {
    /// Build a [`AttributeValidator::OneOf`] from a constant table.
    pub fn one_of(values: &[&str]) -> Self {
        Self::OneOf {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Check `value`, reporting under the attribute `name` at `path`.
    ///
    /// Values of the wrong JSON type are skipped; the type check reports them.
    pub fn check(&self, name: &str, path: &str, value: &Value) -> Option<Diagnostic> {
        let result = match self {
            Self::StringLenBetween { min, max } => value
                .as_str()
                .map(|s| validate_string_len_between(name, s, *min, *max)),
            Self::IntBetween { min, max } => {
                as_int64(value).map(|i| validate_int_between(name, i, *min, *max))
            }
            Self::FloatBetween { min, max } => value
                .as_f64()
                .map(|f| validate_float_between(name, f, *min, *max)),
            Self::OneOf { values } => value.as_str().map(|s| validate_one_of(name, s, values)),
            Self::Region => value.as_str().map(|s| validate_region(name, s)),
            Self::Resource => value.as_str().map(|s| validate_resource(name, s)),
            Self::UpCodes => value.as_str().map(|s| validate_up_codes(name, s)),
            Self::Email => value.as_str().map(|s| validate_email(name, s)),
        };
        match result {
            Some(Err(diagnostic)) => Some(diagnostic.with_attribute(path)),
            _ => None,
        }
    }
}

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (the provider sets these)
/// - Attribute types must match the schema
/// - Sets must hold at least `min_items` elements
/// - Attribute validators must accept the value (or each set element)
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        }
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(name, attr, obj.get(name), &mut diagnostics);
    }
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_attribute(
    name: &str,
    attr: &Attribute,
    value: Option<&Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    let value = match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", name))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(name),
                );
            }
            return;
        }
        Some(v) => v,
    };

    match &attr.attr_type {
        AttributeType::Set(element_type) => {
            let Some(elements) = value.as_array() else {
                diagnostics.push(type_error(name, "set", value));
                return;
            };
            if (elements.len() as u32) < attr.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Attribute '{}' requires at least {} item(s), got {}",
                        name,
                        attr.min_items,
                        elements.len()
                    ))
                    .with_attribute(name),
                );
            }
            for (i, element) in elements.iter().enumerate() {
                let path = format!("{}.{}", name, i);
                if let Some(diagnostic) = type_check(element_type, element, &path) {
                    diagnostics.push(diagnostic);
                    continue;
                }
                run_validators(attr, name, &path, element, diagnostics);
            }
        }
        scalar => {
            if let Some(diagnostic) = type_check(scalar, value, name) {
                diagnostics.push(diagnostic);
                return;
            }
            run_validators(attr, name, name, value, diagnostics);
        }
    }
}

fn run_validators(
    attr: &Attribute,
    name: &str,
    path: &str,
    value: &Value,
    diagnostics: &mut Vec<Diagnostic>,
) {
    diagnostics.extend(
        attr.validators
            .iter()
            .filter_map(|validator| validator.check(name, path, value)),
    );
}

fn type_check(attr_type: &AttributeType, value: &Value, path: &str) -> Option<Diagnostic> {
    let (ok, expected) = match attr_type {
        AttributeType::String => (value.is_string(), "string"),
        AttributeType::Int64 => (as_int64(value).is_some(), "int64"),
        AttributeType::Float64 => (value.is_number(), "float64"),
        AttributeType::Set(_) => (value.is_array(), "set"),
    };
    if ok {
        None
    } else {
        Some(type_error(path, expected, value))
    }
}

// Field validators

/// Validate a checked resource: an HTTP(S) URL or `tcp://HOST:PORT`.
pub fn validate_resource(field: &str, value: &str) -> Result<(), Diagnostic> {
    if let Some(rest) = value.strip_prefix(TCP_PREFIX) {
        return validate_tcp_resource(field, rest);
    }
    if value.starts_with("http") {
        return validate_http_url(field, value);
    }
    Err(field_error(
        field,
        format!("expected {:?} to be either TCP or HTTP(S) resource", field),
    ))
}

fn validate_tcp_resource(field: &str, host_port: &str) -> Result<(), Diagnostic> {
    // Split on the last colon so unbracketed IPv6 hosts keep their colons.
    let Some((host, port)) = host_port.rsplit_once(':') else {
        return Err(field_error(
            field,
            format!("expected {:?} tcp resource to contain host and port components", field),
        ));
    };

    let host_ok = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(bracketed) => bracketed.parse::<Ipv6Addr>().is_ok(),
        None => is_host(host),
    };
    if !host_ok {
        return Err(field_error(
            field,
            format!("expected {:?} tcp resource to contain a valid host", field),
        ));
    }

    let Ok(port) = port.parse::<i64>() else {
        return Err(field_error(
            field,
            format!("expected {:?} tcp resource to contain a port number", field),
        ));
    };
    if !(1..=65535).contains(&port) {
        return Err(field_error(
            field,
            format!("expected {:?} tcp resource to contain a valid port number", field),
        ));
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), Diagnostic> {
    // Url::parse fills in a host for `http:host` and `http:\\host`; require
    // an explicit authority.
    let has_authority = value
        .find(':')
        .is_some_and(|i| value[i..].starts_with("://"));
    if !has_authority {
        return Err(field_error(
            field,
            format!("{:?} url has no host: {:?}", field, value),
        ));
    }
    let url = Url::parse(value).map_err(|err| {
        field_error(field, format!("{:?} url is in an invalid format", field))
            .with_detail(format!("{:?}: {}", value, err))
    })?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(field_error(
            field,
            format!("{:?} url has no host: {:?}", field, value),
        ));
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(field_error(
            field,
            format!(
                "expected {:?} url {:?} to have a schema of: \"http,https\"",
                field, value
            ),
        ));
    }
    Ok(())
}

/// Validate an up-codes expression: comma-separated `NNN`, `Nxx`, `NNx` or
/// `NNN-NNN` entries with the leading digit in 1–5.
pub fn validate_up_codes(field: &str, value: &str) -> Result<(), Diagnostic> {
    if UP_CODES.is_match(value) {
        Ok(())
    } else {
        Err(field_error(
            field,
            format!(
                "{} must be of a format such as \"200, 2xx, 200-302, 200,301\", got {:?}",
                field, value
            ),
        ))
    }
}

/// Validate a single polling region against the supported table.
pub fn validate_region(field: &str, value: &str) -> Result<(), Diagnostic> {
    if SUPPORTED_REGIONS.contains(&value) {
        Ok(())
    } else {
        Err(field_error(
            field,
            format!(
                "expected {:?} to be any of {:?}, got {:?}",
                field,
                SUPPORTED_REGIONS.join(", "),
                value
            ),
        ))
    }
}

/// Validate an e-mail address.
pub fn validate_email(field: &str, value: &str) -> Result<(), Diagnostic> {
    if EMAIL.is_match(value) {
        Ok(())
    } else {
        Err(field_error(
            field,
            format!("expected {:?} to be a valid e-mail address, got {:?}", field, value),
        ))
    }
}

/// Validate that `value` is one of `values`.
pub fn validate_one_of(field: &str, value: &str, values: &[String]) -> Result<(), Diagnostic> {
    if values.iter().any(|v| v == value) {
        Ok(())
    } else {
        Err(field_error(
            field,
            format!("expected {:?} to be one of {:?}, got {:?}", field, values, value),
        ))
    }
}

/// Validate that an integer lies in `[min, max]`.
pub fn validate_int_between(field: &str, value: i64, min: i64, max: i64) -> Result<(), Diagnostic> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(field_error(
            field,
            format!("expected {:?} to be in the range ({} - {}), got {}", field, min, max, value),
        ))
    }
}

/// Validate that a float lies in `[min, max]`.
pub fn validate_float_between(
    field: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), Diagnostic> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(field_error(
            field,
            format!("expected {:?} to be in the range ({} - {}), got {}", field, min, max, value),
        ))
    }
}

/// Validate that a string has between `min` and `max` characters.
pub fn validate_string_len_between(
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), Diagnostic> {
    let len = value.chars().count();
    if (min..=max).contains(&len) {
        Ok(())
    } else {
        Err(field_error(
            field,
            format!(
                "expected length of {:?} to be in the range ({} - {}), got {}",
                field, min, max, len
            ),
        ))
    }
}

/// Whether `s` is an IP literal or a DNS name.
pub fn is_host(s: &str) -> bool {
    is_ip(s) || is_dns_name(s)
}

/// Whether `s` is an IPv4 or IPv6 literal.
pub fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// Whether `s` is a syntactically valid DNS name (and not an IP literal).
pub fn is_dns_name(s: &str) -> bool {
    if s.is_empty() || s.replace('.', "").len() > MAX_DNS_NAME_LEN {
        return false;
    }
    !is_ip(s) && DNS_NAME.is_match(s)
}

// Helper functions

fn field_error(field: &str, summary: String) -> Diagnostic {
    Diagnostic::error(summary).with_attribute(field)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integers, including floats without a fractional part.
fn as_int64(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource_ok(value: &str) -> bool {
        validate_resource("resource", value).is_ok()
    }

    #[test]
    fn test_tcp_resources() {
        assert!(resource_ok("tcp://db.internal:5432"));
        assert!(resource_ok("tcp://10.0.0.7:22"));
        assert!(resource_ok("tcp://example.com:1"));
        assert!(resource_ok("tcp://example.com:65535"));
        assert!(resource_ok("tcp://[::1]:6379"));
        assert!(resource_ok("tcp://::1:6379"));
        assert!(resource_ok("tcp://_service.example.com:443"));

        assert!(!resource_ok("tcp://example.com"));
        assert!(!resource_ok("tcp://example.com:0"));
        assert!(!resource_ok("tcp://example.com:65536"));
        assert!(!resource_ok("tcp://example.com:http"));
        assert!(!resource_ok("tcp://:80"));
        assert!(!resource_ok("tcp://bad host:80"));
        assert!(!resource_ok("tcp://[db.internal]:80"));
        assert!(!resource_ok("tcp://-leading.example.com:80"));
    }

    #[test]
    fn test_tcp_resource_messages() {
        let err = validate_resource("resource", "tcp://example.com").unwrap_err();
        assert!(err.summary.contains("host and port components"));
        assert_eq!(err.attribute.as_deref(), Some("resource"));

        let err = validate_resource("resource", "tcp://example.com:abc").unwrap_err();
        assert!(err.summary.contains("contain a port number"));

        let err = validate_resource("resource", "tcp://example.com:70000").unwrap_err();
        assert!(err.summary.contains("valid port number"));

        let err = validate_resource("resource", "tcp://exa mple.com:80").unwrap_err();
        assert!(err.summary.contains("valid host"));
    }

    #[test]
    fn test_http_resources() {
        assert!(resource_ok("http://example.com"));
        assert!(resource_ok("https://example.com/health?full=1"));
        assert!(resource_ok("https://10.0.0.1:8443/"));

        assert!(!resource_ok("https://"));
        assert!(!resource_ok("httpexample.com"));
        assert!(!resource_ok("http-check://example.com"));
        assert!(!resource_ok("http:example.com"));
        assert!(!resource_ok("https:/example.com"));
        assert!(!resource_ok("http:\\\\example.com"));
    }

    #[test]
    fn test_other_resources_rejected() {
        for value in ["ftp://example.com", "example.com", "", "HTTP://example.com", "udp://x:1"] {
            let err = validate_resource("resource", value).unwrap_err();
            assert!(
                err.summary.contains("either TCP or HTTP(S)"),
                "unexpected message for {value:?}: {}",
                err.summary
            );
        }
    }

    #[test]
    fn test_up_codes() {
        for valid in ["200", "2xx", "20x", "200-302", "200,301", "2xx,301,400-404", "599"] {
            assert!(validate_up_codes("up_codes", valid).is_ok(), "{valid} should pass");
        }
        for invalid in ["abc", "600", "200-", "099", "2x0", "200,", ",200", "200 ,301", ""] {
            assert!(validate_up_codes("up_codes", invalid).is_err(), "{invalid} should fail");
        }
    }

    #[test]
    fn test_regions() {
        for region in SUPPORTED_REGIONS {
            assert!(validate_region("regions", region).is_ok());
        }
        let err = validate_region("regions", "mars-north-1").unwrap_err();
        assert!(err.summary.contains("mars-north-1"));
        assert!(err.summary.contains("regions"));
    }

    #[test]
    fn test_email() {
        assert!(validate_email("handle", "ops@example.com").is_ok());
        assert!(validate_email("handle", "first.last+alerts@mail.example.co").is_ok());
        assert!(validate_email("handle", "not-an-email").is_err());
        assert!(validate_email("handle", "ops@").is_err());
    }

    #[test]
    fn test_numeric_ranges() {
        assert!(validate_int_between("interval", 4, 5, 900).is_err());
        assert!(validate_int_between("interval", 5, 5, 900).is_ok());
        assert!(validate_int_between("interval", 900, 5, 900).is_ok());
        let err = validate_int_between("interval", 901, 5, 900).unwrap_err();
        assert!(err.summary.contains("interval"));
        assert!(err.summary.contains("900"));

        assert!(validate_float_between("target", 0.01, 0.01, 10.0).is_ok());
        assert!(validate_float_between("target", 10.0, 0.01, 10.0).is_ok());
        assert!(validate_float_between("target", 0.0, 0.01, 10.0).is_err());
        assert!(validate_float_between("target", 10.5, 0.01, 10.0).is_err());
    }

    #[test]
    fn test_string_length() {
        assert!(validate_string_len_between("name", "", 0, 25).is_ok());
        assert!(validate_string_len_between("name", &"a".repeat(25), 0, 25).is_ok());
        assert!(validate_string_len_between("name", &"a".repeat(26), 0, 25).is_err());
        // Characters, not bytes.
        assert!(validate_string_len_between("name", &"é".repeat(25), 0, 25).is_ok());
    }

    #[test]
    fn test_hosts() {
        assert!(is_ip("192.168.1.1"));
        assert!(is_ip("2001:db8::1"));
        assert!(is_dns_name("example.com."));
        assert!(!is_dns_name("192.168.1.1"));
        assert!(!is_dns_name(""));
        assert!(!is_dns_name(&format!("{}.com", "a".repeat(63).repeat(5))));
        assert!(is_host("localhost"));
    }

    #[test]
    fn test_validate_required_and_types() {
        let schema = Schema::v0()
            .with_attribute("resource", Attribute::required_string())
            .with_attribute("interval", Attribute::optional_int64());

        assert!(validate(&schema, &json!({"resource": "https://example.com"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("resource"));

        let diagnostics = validate(&schema, &json!({"resource": 1, "interval": "60"}));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.summary.contains("Invalid type")));

        // Whole floats count as integers.
        assert!(validate(&schema, &json!({"resource": "x", "interval": 60.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"resource": "x", "interval": 60.5})).len(), 1);
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_runs_attribute_validators() {
        let schema = Schema::v0().with_attribute(
            "interval",
            Attribute::optional_int64()
                .with_validator(AttributeValidator::IntBetween { min: 5, max: 900 }),
        );

        assert!(is_valid(&schema, &json!({"interval": 5})));
        assert!(is_valid(&schema, &json!({"interval": 900})));
        assert!(!is_valid(&schema, &json!({"interval": 4})));
        assert!(!is_valid(&schema, &json!({"interval": 901})));

        // Type errors are reported once, without running validators.
        let diagnostics = validate(&schema, &json!({"interval": "often"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_set_elements_individually() {
        let schema = Schema::v0().with_attribute(
            "regions",
            Attribute::required_string_set()
                .with_min_items(1)
                .with_validator(AttributeValidator::Region),
        );

        assert!(is_valid(&schema, &json!({"regions": ["eu-west-1", "us-east-1"]})));

        let diagnostics = validate(
            &schema,
            &json!({"regions": ["eu-west-1", "moon-1", "us-east-1", "mars-2"]}),
        );
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("regions.1"));
        assert!(diagnostics[0].summary.contains("moon-1"));
        assert_eq!(diagnostics[1].attribute.as_deref(), Some("regions.3"));
        assert!(diagnostics[1].summary.contains("mars-2"));

        let diagnostics = validate(&schema, &json!({"regions": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(&schema, &json!({"regions": "eu-west-1"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("handle", Attribute::required_string());

        assert!(validate_result(&schema, &json!({"handle": "ops@example.com"})).is_ok());

        let result = validate_result(&schema, &json!({}));
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::optional_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }

    #[test]
    fn test_validator_check_sets_path() {
        let diagnostic = AttributeValidator::one_of(&["GET", "HEAD"])
            .check("method", "method", &json!("PATCH"))
            .unwrap();
        assert_eq!(diagnostic.attribute.as_deref(), Some("method"));
        assert!(diagnostic.summary.contains("PATCH"));

        assert!(AttributeValidator::UpCodes
            .check("up_codes", "up_codes", &json!("2xx"))
            .is_none());
        // Non-string values are left to the type check.
        assert!(AttributeValidator::Email.check("handle", "handle", &json!(3)).is_none());
    }
}
