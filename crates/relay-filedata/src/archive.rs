//! Archive file wire shape: one JSON document describing every offline
//! environment plus its flag/segment data.

use relay_core::model::EnvironmentParams;
use relay_store::{FlagRep, SegmentRep};
use serde::Deserialize;
use sha2::Digest;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SdkData {
    #[serde(default)]
    pub flags: Vec<FlagRep>,
    #[serde(default)]
    pub segments: Vec<SegmentRep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveEnvironment {
    #[serde(flatten)]
    pub params: EnvironmentParams,
    /// `None` when this update only changed metadata (identity/TTL/secure
    /// mode), not flag/segment contents — the archive manager sets this
    /// to signal "do not re-init the store" (spec §4.7).
    #[serde(default)]
    pub sdk_data: Option<SdkData>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArchiveFile {
    pub environments: HashMap<String, ArchiveEnvironment>,
}

impl ArchiveFile {
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }
}

/// A stable hash of an environment's archive record, used to detect
/// "nothing actually changed" on reload.
pub fn record_hash(env: &ArchiveEnvironment) -> [u8; 32] {
    let mut hasher = sha2::Sha256::new();
    if let Ok(bytes) = serde_json::to_vec(&env.params.env_id) {
        hasher.update(&bytes);
    }
    if let Some(data) = &env.sdk_data
        && let Ok(bytes) = serde_json::to_vec(data.as_canonical())
    {
        hasher.update(&bytes);
    }
    hasher.finalize().into()
}

impl SdkData {
    /// Sorted-by-key view so the hash is independent of archive field order.
    fn as_canonical(&self) -> (Vec<&FlagRep>, Vec<&SegmentRep>) {
        let mut flags: Vec<_> = self.flags.iter().collect();
        flags.sort_by(|a, b| a.key.cmp(&b.key));
        let mut segments: Vec<_> = self.segments.iter().collect();
        segments.sort_by(|a, b| a.key.cmp(&b.key));
        (flags, segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_archive_with_sdk_data() {
        let json = r#"{
            "environments": {
                "env-A": {
                    "identifiers": {"project_key":"p","project_name":"P","environment_key":"e","environment_name":"E","filter_key":""},
                    "env_id": "env-A",
                    "server_sdk_key": "sdk-A",
                    "sdk_data": {"flags": [{"key":"flag1","version":1,"value":true,"variation":0}], "segments": []}
                }
            }
        }"#;
        let archive = ArchiveFile::parse(json).unwrap();
        let env = &archive.environments["env-A"];
        assert_eq!(env.params.env_id, "env-A");
        assert_eq!(env.sdk_data.as_ref().unwrap().flags.len(), 1);
    }

    #[test]
    fn metadata_only_update_has_no_sdk_data() {
        let json = r#"{
            "environments": {
                "env-A": {
                    "identifiers": {"project_key":"p","project_name":"P","environment_key":"e","environment_name":"E","filter_key":""},
                    "env_id": "env-A",
                    "server_sdk_key": "sdk-A"
                }
            }
        }"#;
        let archive = ArchiveFile::parse(json).unwrap();
        assert!(archive.environments["env-A"].sdk_data.is_none());
    }

    #[test]
    fn hash_changes_when_flag_value_changes() {
        let env_v1 = ArchiveEnvironment {
            params: EnvironmentParams {
                identifiers: relay_core::model::EnvironmentIdentifiers {
                    project_key: "p".into(),
                    project_name: "P".into(),
                    environment_key: "e".into(),
                    environment_name: "E".into(),
                    filter_key: String::new(),
                },
                env_id: "env-A".into(),
                server_sdk_key: Some("sdk".into()),
                mobile_key: None,
                expiring_sdk_key: None,
                ttl_secs: 0,
                secure_mode: false,
            },
            sdk_data: Some(SdkData {
                flags: vec![FlagRep {
                    key: "f".into(),
                    version: 1,
                    value: serde_json::json!(true),
                    variation: 0,
                    track_events: false,
                    is_experiment: false,
                    debug_events_until_date: None,
                    client_side_availability: Default::default(),
                }],
                segments: vec![],
            }),
        };
        let mut env_v2 = env_v1.clone();
        env_v2.sdk_data.as_mut().unwrap().flags[0].version = 2;

        assert_ne!(record_hash(&env_v1), record_hash(&env_v2));
    }
}
