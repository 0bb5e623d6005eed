//! Request and result types exchanged with the control plane.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tidepool_utils::parse_duration;

use crate::{token, TidepoolError, TidepoolResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A request to create, remove or list sandboxes.
///
/// Not every field is meaningful for every operation: `image` is only read by create, and for
/// list every non-zero field acts as a filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxRequest {
    /// The owner id. Zero when the owner is given by `token` instead.
    pub user: u64,

    /// An access token of the form `<owner>:<secret>`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token: String,

    /// The application name.
    #[serde(alias = "challenge")]
    pub app: String,

    /// The image to run.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// The port the sandbox listens on inside the container. For list, the published host port
    /// to filter by.
    pub port: u16,

    /// The routing key requested for a hostname-addressed sandbox.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// How long the sandbox should live. Zero or absent selects the server default.
    #[serde(
        serialize_with = "serialize_lifetime",
        deserialize_with = "deserialize_lifetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub lifetime: Option<Duration>,
}

/// A sandbox as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxInfo {
    /// The container name.
    pub name: String,

    /// The runtime-assigned container identifier.
    pub id: String,

    /// The published host port, 0 when the sandbox is not port-addressed.
    #[serde(default)]
    pub port: u16,

    /// The routing key, when the sandbox is hostname-addressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// When the sandbox expires.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub deadline: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LifetimeValue {
    Seconds(u64),
    Fractional(f64),
    Text(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxRequest {
    /// Builds a request addressing `app` of `user`.
    pub fn new(user: u64, app: impl Into<String>) -> Self {
        Self {
            user,
            app: app.into(),
            ..Default::default()
        }
    }

    /// Resolves the owner named by the request, if any.
    ///
    /// The token wins when present, and must agree with `user` if that is set too.
    pub fn resolve_owner(&self) -> TidepoolResult<Option<u64>> {
        if self.token.is_empty() {
            return Ok((self.user != 0).then_some(self.user));
        }

        let owner = token::parse_owner_id(&self.token)?;
        if self.user != 0 && self.user != owner {
            return Err(TidepoolError::InvalidToken(format!(
                "token belongs to owner {}, not {}",
                owner, self.user
            )));
        }

        Ok(Some(owner))
    }

    /// The owner the request acts for. Fails when the request names none.
    pub fn owner(&self) -> TidepoolResult<u64> {
        self.resolve_owner()?.ok_or_else(|| {
            TidepoolError::InvalidArgument("request names neither user nor token".to_string())
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn serialize_lifetime<S: Serializer>(
    lifetime: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match lifetime {
        Some(lifetime) => serializer.serialize_u64(lifetime.as_secs()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_lifetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    use serde::de::Error;

    let lifetime = match Option::<LifetimeValue>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(LifetimeValue::Seconds(secs)) => Duration::from_secs(secs),
        Some(LifetimeValue::Fractional(secs)) => Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid lifetime {}: {}", secs, e)))?,
        Some(LifetimeValue::Text(text)) => match text.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => parse_duration(&text).map_err(D::Error::custom)?,
        },
    };

    Ok(Some(lifetime))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lifetime_of(value: serde_json::Value) -> Result<Option<Duration>, serde_json::Error> {
        serde_json::from_value::<SandboxRequest>(json!({ "app": "web", "lifetime": value }))
            .map(|request| request.lifetime)
    }

    #[test]
    fn test_request_lifetime_accepts_numbers_and_strings() {
        assert_eq!(lifetime_of(json!(90)).unwrap(), Some(Duration::from_secs(90)));
        assert_eq!(lifetime_of(json!(1.5)).unwrap(), Some(Duration::from_millis(1500)));
        assert_eq!(lifetime_of(json!("2m")).unwrap(), Some(Duration::from_secs(120)));
        assert_eq!(lifetime_of(json!("1h30m")).unwrap(), Some(Duration::from_secs(5400)));
        assert_eq!(lifetime_of(json!("45")).unwrap(), Some(Duration::from_secs(45)));
        assert_eq!(lifetime_of(json!(null)).unwrap(), None);

        assert!(lifetime_of(json!(-5)).is_err());
        assert!(lifetime_of(json!("soon")).is_err());
        assert!(lifetime_of(json!([1])).is_err());
    }

    #[test]
    fn test_request_lifetime_serializes_as_seconds() {
        let request = SandboxRequest {
            lifetime: Some(Duration::from_millis(90_400)),
            ..SandboxRequest::new(5, "web")
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["lifetime"], json!(90));
        assert_eq!(value["user"], json!(5));
        assert!(value.get("token").is_none());
    }

    #[test]
    fn test_request_defaults_missing_fields() {
        let request: SandboxRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, SandboxRequest::default());

        let request: SandboxRequest =
            serde_json::from_str(r#"{"user":3,"challenge":"pwn"}"#).unwrap();
        assert_eq!(request.app, "pwn");
    }

    #[test]
    fn test_request_owner_resolution() {
        assert_eq!(SandboxRequest::new(7, "a").owner().unwrap(), 7);

        let by_token = SandboxRequest {
            token: "9:secret".into(),
            ..SandboxRequest::new(0, "a")
        };
        assert_eq!(by_token.owner().unwrap(), 9);

        let agreeing = SandboxRequest {
            token: "9:secret".into(),
            ..SandboxRequest::new(9, "a")
        };
        assert_eq!(agreeing.owner().unwrap(), 9);

        let disagreeing = SandboxRequest {
            token: "9:secret".into(),
            ..SandboxRequest::new(8, "a")
        };
        assert!(matches!(
            disagreeing.owner(),
            Err(TidepoolError::InvalidToken(_))
        ));

        assert!(SandboxRequest::default().owner().is_err());
        assert_eq!(SandboxRequest::default().resolve_owner().unwrap(), None);
    }

    #[test]
    fn test_info_deadline_is_unix_seconds() {
        let info = SandboxInfo {
            name: "tidepool_1_web_1".into(),
            id: "abc".into(),
            port: 10000,
            hostname: None,
            deadline: DateTime::from_timestamp(1_700_000_060, 0).unwrap(),
        };

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "tidepool_1_web_1",
                "id": "abc",
                "port": 10000,
                "deadline": 1_700_000_060
            })
        );
        assert_eq!(serde_json::from_value::<SandboxInfo>(value).unwrap(), info);
    }
}
