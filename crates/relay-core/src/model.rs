//! Configuration-facing data shapes: environment identity and desired state.

use crate::credential::FilterKey;
use serde::{Deserialize, Serialize};

/// Identity of an environment. Mutable; changing these never affects
/// routing, which is keyed by credential, not identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentIdentifiers {
    pub project_key: String,
    pub project_name: String,
    pub environment_key: String,
    pub environment_name: String,
    #[serde(default)]
    pub filter_key: FilterKey,
}

impl EnvironmentIdentifiers {
    /// `{project_name} {environment_name}`, or with the filter key
    /// appended in parens when a payload filter is in effect.
    pub fn display_name(&self) -> String {
        if self.filter_key.is_empty() {
            format!("{} {}", self.project_name, self.environment_name)
        } else {
            format!(
                "{} {} ({})",
                self.project_name, self.environment_name, self.filter_key
            )
        }
    }
}

/// An expiring SDK key as carried in configuration messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpiringKeyRep {
    pub value: String,
    /// Unix millis timestamp at which `value` is revoked.
    pub timestamp: i64,
}

/// The desired state of an environment as received from a configuration
/// source (auto-config message, archive record, or static config entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentParams {
    pub identifiers: EnvironmentIdentifiers,
    pub env_id: String,
    #[serde(default)]
    pub server_sdk_key: Option<String>,
    #[serde(default)]
    pub mobile_key: Option<String>,
    #[serde(default)]
    pub expiring_sdk_key: Option<ExpiringKeyRep>,
    #[serde(default)]
    pub ttl_secs: u64,
    #[serde(default)]
    pub secure_mode: bool,
}

impl EnvironmentParams {
    pub fn filter(&self) -> FilterKey {
        self.identifiers.filter_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_without_filter() {
        let ids = EnvironmentIdentifiers {
            project_key: "p".into(),
            project_name: "My Project".into(),
            environment_key: "e".into(),
            environment_name: "Production".into(),
            filter_key: String::new(),
        };
        assert_eq!(ids.display_name(), "My Project Production");
    }

    #[test]
    fn display_name_with_filter() {
        let ids = EnvironmentIdentifiers {
            project_key: "p".into(),
            project_name: "My Project".into(),
            environment_key: "e".into(),
            environment_name: "Production".into(),
            filter_key: "beta".into(),
        };
        assert_eq!(ids.display_name(), "My Project Production (beta)");
    }
}
