//! Sandbox identity and the metadata record stored on each container.
//!
//! A sandbox is addressed by a deterministic container name derived from its owner and
//! application; the runtime rejects a second container with the same name, so the name doubles
//! as the primary key. The small [`SandboxRecord`] attached as a label is the only durable state
//! the system has, and is how sandboxes are recognized again after a restart.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{TidepoolError, TidepoolResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The longest application name or routing key accepted.
const MAX_SEGMENT_LENGTH: usize = 63;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The metadata attached to every sandbox container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRecord {
    /// The owner of the sandbox.
    pub user: u64,

    /// The application the sandbox runs.
    #[serde(alias = "challenge")]
    pub app: String,

    /// How long the sandbox lives after its container was created.
    #[serde(with = "tidepool_utils::duration_string")]
    pub lifetime: Duration,

    /// The routing key the ingress router serves this sandbox under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// The container port ingress traffic is relayed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_port: Option<u16>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxRecord {
    /// Creates a record for a port-addressed sandbox.
    pub fn new(user: u64, app: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            user,
            app: app.into(),
            lifetime,
            hostname: None,
            backend_port: None,
        }
    }

    /// Routes ingress traffic for `hostname` to `backend_port` inside the sandbox.
    pub fn with_route(mut self, hostname: impl Into<String>, backend_port: u16) -> Self {
        self.hostname = Some(hostname.into());
        self.backend_port = Some(backend_port);
        self
    }

    /// Renders the record as the label value stored on the container.
    pub fn encode(&self) -> TidepoolResult<String> {
        serde_json::to_string(self).map_err(TidepoolError::RecordEncoding)
    }

    /// Parses a label value written by [`SandboxRecord::encode`].
    pub fn decode(label: &str) -> TidepoolResult<Self> {
        serde_json::from_str(label).map_err(TidepoolError::MalformedRecord)
    }

    /// The record substituted for a label that cannot be decoded: it has already expired.
    pub fn expired() -> Self {
        Self::new(0, String::new(), Duration::ZERO)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The container name of the sandbox `app` owned by `owner`.
pub fn sandbox_name(namespace: &str, owner: u64, app: &str) -> String {
    format!("{}_{}_{}_1", namespace, owner, app)
}

/// The default routing key of a hostname-addressed sandbox: the sandbox name as a DNS label.
pub fn default_routing_key(namespace: &str, owner: u64, app: &str) -> String {
    format!("{}-{}-{}", namespace, owner, app)
        .to_ascii_lowercase()
        .replace(['_', '.'], "-")
}

/// Extracts the routing key from a `Host` header value: the part before the first `.`, without
/// any `:port` suffix, lower-cased. Returns `None` when nothing is left.
pub fn routing_key_from_host(host: &str) -> Option<String> {
    let host = host.trim();
    let label = host.split('.').next().unwrap_or_default();
    let label = label.split(':').next().unwrap_or_default();
    if label.is_empty() {
        None
    } else {
        Some(label.to_ascii_lowercase())
    }
}

/// Checks that `app` can be embedded into a container name.
pub fn validate_app_name(app: &str) -> TidepoolResult<()> {
    if app.is_empty() {
        return Err(TidepoolError::InvalidArgument(
            "application name cannot be empty".to_string(),
        ));
    }

    if app.len() > MAX_SEGMENT_LENGTH {
        return Err(TidepoolError::InvalidArgument(format!(
            "application name cannot exceed {} characters",
            MAX_SEGMENT_LENGTH
        )));
    }

    if !app
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(TidepoolError::InvalidArgument(
            "application name can only contain alphanumeric characters, dots, hyphens, or underscores"
                .to_string(),
        ));
    }

    if !app.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(TidepoolError::InvalidArgument(
            "application name must start with an alphanumeric character".to_string(),
        ));
    }

    Ok(())
}

/// Checks that `key` is a single lower-case DNS label.
pub fn validate_routing_key(key: &str) -> TidepoolResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_SEGMENT_LENGTH
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !key.starts_with('-')
        && !key.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(TidepoolError::InvalidArgument(format!(
            "hostname {:?} is not a valid DNS label",
            key
        )))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_name_is_deterministic() {
        assert_eq!(sandbox_name("tidepool", 5, "web"), "tidepool_5_web_1");
        assert_eq!(sandbox_name("tidepool", 5, "web"), sandbox_name("tidepool", 5, "web"));
        assert_ne!(sandbox_name("tidepool", 5, "web"), sandbox_name("tidepool", 6, "web"));
        assert_ne!(sandbox_name("tidepool", 5, "web"), sandbox_name("other", 5, "web"));
    }

    #[test]
    fn test_record_round_trip() {
        let cases = [
            SandboxRecord::new(0, "a", Duration::ZERO),
            SandboxRecord::new(5, "web", Duration::from_secs(60)),
            SandboxRecord::new(u64::MAX, "x.y-z_1", Duration::new(5_400, 250_000_000)),
            SandboxRecord::new(9, "api", Duration::from_secs(30)).with_route("demo", 8080),
        ];

        for record in cases {
            let decoded = SandboxRecord::decode(&record.encode().unwrap()).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn test_record_encoding_shape() {
        let label = SandboxRecord::new(5, "web", Duration::from_secs(90))
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&label).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"user": 5, "app": "web", "lifetime": "1m30s"})
        );
    }

    #[test]
    fn test_record_decodes_legacy_field_name() {
        let record =
            SandboxRecord::decode(r#"{"user":3,"challenge":"pwn","lifetime":"1h0m0s"}"#).unwrap();
        assert_eq!(record, SandboxRecord::new(3, "pwn", Duration::from_secs(3600)));
    }

    #[test]
    fn test_record_decode_failures() {
        for label in [
            "",
            "not json",
            r#"{"user":1,"app":"x"}"#,
            r#"{"user":1,"app":"x","lifetime":"forever"}"#,
            r#"{"user":1,"app":"x","lifetime":60}"#,
        ] {
            assert!(
                matches!(
                    SandboxRecord::decode(label),
                    Err(TidepoolError::MalformedRecord(_))
                ),
                "{:?} should not decode",
                label
            );
        }
    }

    #[test]
    fn test_routing_key_from_host() {
        assert_eq!(routing_key_from_host("demo.sandbox.example.com"), Some("demo".into()));
        assert_eq!(routing_key_from_host(" Demo:8080 "), Some("demo".into()));
        assert_eq!(routing_key_from_host("demo"), Some("demo".into()));
        assert_eq!(routing_key_from_host(".example.com"), None);
        assert_eq!(routing_key_from_host(""), None);
    }

    #[test]
    fn test_default_routing_key_is_a_valid_label() {
        let key = default_routing_key("tidepool", 12, "My_App.v2");
        assert_eq!(key, "tidepool-12-my-app-v2");
        validate_routing_key(&key).unwrap();
    }

    #[test]
    fn test_validate_app_name() {
        validate_app_name("web").unwrap();
        validate_app_name("web-2_b.c").unwrap();
        assert!(validate_app_name("").is_err());
        assert!(validate_app_name("-web").is_err());
        assert!(validate_app_name("we b").is_err());
        assert!(validate_app_name("web/../x").is_err());
        assert!(validate_app_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_routing_key() {
        validate_routing_key("demo-1").unwrap();
        assert!(validate_routing_key("Demo").is_err());
        assert!(validate_routing_key("-demo").is_err());
        assert!(validate_routing_key("de_mo").is_err());
        assert!(validate_routing_key("").is_err());
    }
}
