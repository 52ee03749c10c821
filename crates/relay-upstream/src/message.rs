//! Wire shapes for the auto-config upstream protocol (spec §6): consumed,
//! never produced. SSE `event:`/`data:` pairs decode into `AutoConfigMessage`.

use relay_core::credential::FilterKey;
use relay_core::model::{EnvironmentIdentifiers, EnvironmentParams, ExpiringKeyRep};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SdkKeyRep {
    pub value: String,
    #[serde(default)]
    pub expiring: Option<ExpiringKeyRep>,
}

/// One environment as carried by the upstream protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvRep {
    #[serde(rename = "envID")]
    pub env_id: String,
    #[serde(rename = "envKey")]
    pub env_key: String,
    #[serde(rename = "envName")]
    pub env_name: String,
    #[serde(rename = "projKey")]
    pub proj_key: String,
    #[serde(rename = "projName")]
    pub proj_name: String,
    #[serde(rename = "mobKey", default)]
    pub mob_key: Option<String>,
    #[serde(rename = "sdkKey")]
    pub sdk_key: SdkKeyRep,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub ttl_secs: u64,
    #[serde(default)]
    pub secure_mode: bool,
    #[serde(default)]
    pub filter_key: FilterKey,
}

impl EnvRep {
    pub fn into_params(self) -> EnvironmentParams {
        EnvironmentParams {
            identifiers: EnvironmentIdentifiers {
                project_key: self.proj_key,
                project_name: self.proj_name,
                environment_key: self.env_key,
                environment_name: self.env_name,
                filter_key: self.filter_key,
            },
            env_id: self.env_id,
            server_sdk_key: Some(self.sdk_key.value),
            mobile_key: self.mob_key,
            expiring_sdk_key: self.sdk_key.expiring,
            ttl_secs: self.ttl_secs,
            secure_mode: self.secure_mode,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PutPayload {
    environments: std::collections::HashMap<String, EnvRep>,
}

#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    path: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    version: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum AutoConfigMessage {
    Put { environments: Vec<EnvRep> },
    Patch { env: EnvRep },
    Delete { env_id: String, version: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized auto-config event type: {0}")]
    UnknownEvent(String),
    #[error("malformed auto-config envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("patch/delete path must be /environments/<envId>, got {0}")]
    BadPath(String),
    #[error("delete message missing version")]
    MissingVersion,
}

/// Parses one SSE `(event, data)` pair into a typed message.
pub fn decode(event: &str, data: &str) -> Result<AutoConfigMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(data)?;
    match event {
        "put" => {
            let payload: PutPayload = serde_json::from_value(
                envelope.data.ok_or_else(|| DecodeError::BadPath(envelope.path.clone()))?,
            )?;
            Ok(AutoConfigMessage::Put {
                environments: payload.environments.into_values().collect(),
            })
        }
        "patch" => {
            let env_id = path_env_id(&envelope.path)?;
            let mut env: EnvRep = serde_json::from_value(
                envelope.data.ok_or_else(|| DecodeError::BadPath(envelope.path.clone()))?,
            )?;
            if env.env_id.is_empty() {
                env.env_id = env_id;
            }
            Ok(AutoConfigMessage::Patch { env })
        }
        "delete" => {
            let env_id = path_env_id(&envelope.path)?;
            let version = envelope.version.ok_or(DecodeError::MissingVersion)?;
            Ok(AutoConfigMessage::Delete { env_id, version })
        }
        other => Err(DecodeError::UnknownEvent(other.to_string())),
    }
}

fn path_env_id(path: &str) -> Result<String, DecodeError> {
    path.strip_prefix("/environments/")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DecodeError::BadPath(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_put() {
        let data = r#"{"path":"/","data":{"environments":{"env-A":{"envID":"env-A","envKey":"prod","envName":"Production","projKey":"p","projName":"Proj","sdkKey":{"value":"sdk-A"}}}}}"#;
        let msg = decode("put", data).unwrap();
        match msg {
            AutoConfigMessage::Put { environments } => assert_eq!(environments.len(), 1),
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn decodes_patch() {
        let data = r#"{"path":"/environments/env-A","data":{"envID":"env-A","envKey":"prod","envName":"Production","projKey":"p","projName":"Proj","sdkKey":{"value":"sdk-A"}}}"#;
        let msg = decode("patch", data).unwrap();
        match msg {
            AutoConfigMessage::Patch { env } => assert_eq!(env.env_id, "env-A"),
            _ => panic!("expected patch"),
        }
    }

    #[test]
    fn decodes_delete() {
        let data = r#"{"path":"/environments/env-A","version":7}"#;
        let msg = decode("delete", data).unwrap();
        match msg {
            AutoConfigMessage::Delete { env_id, version } => {
                assert_eq!(env_id, "env-A");
                assert_eq!(version, 7);
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn decodes_expiring_sdk_key() {
        let data = r#"{"path":"/environments/env-A","data":{"envID":"env-A","envKey":"prod","envName":"Production","projKey":"p","projName":"Proj","sdkKey":{"value":"sdk-new","expiring":{"value":"sdk-old","timestamp":1234}}}}"#;
        let msg = decode("patch", data).unwrap();
        match msg {
            AutoConfigMessage::Patch { env } => {
                let expiring = env.sdk_key.expiring.unwrap();
                assert_eq!(expiring.value, "sdk-old");
                assert_eq!(expiring.timestamp, 1234);
            }
            _ => panic!("expected patch"),
        }
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(decode("frobnicate", "{}").is_err());
    }

    #[test]
    fn rejects_malformed_delete_path() {
        let data = r#"{"path":"/bogus","version":1}"#;
        assert!(decode("delete", data).is_err());
    }
}
