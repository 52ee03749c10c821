//! Relay configuration: static environment list, server knobs, and the
//! file-watching hot-reload loop (grounded on the teacher's `ConfigWatcher`).

use arc_swap::ArcSwap;
use notify::{RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,

    /// Static environments, used when neither auto-config nor file-data
    /// mode is active.
    #[serde(default)]
    pub environment: Vec<StaticEnvironment>,

    /// Auto-config upstream key; when set, the relay drives its
    /// environment set from the auto-config stream instead of `environment`.
    #[serde(default)]
    pub auto_config_key: Option<String>,

    /// Auto-config stream URL. Required alongside `auto_config_key`; the
    /// wire protocol served at this URL is an external collaborator (see
    /// `relay-upstream`).
    #[serde(default)]
    pub auto_config_stream_url: Option<String>,

    /// Path to a local archive file; when set, the relay drives its
    /// environment set from the archive instead of auto-config/static.
    #[serde(default)]
    pub archive_file: Option<String>,

    /// Grace period (seconds) before a stuck upstream flips an environment
    /// to `disconnected` in `/status`.
    pub disconnected_status_time_secs: u64,

    /// Best-effort interval for sweeping expired deprecated credentials.
    pub expired_credential_cleanup_interval_secs: u64,

    /// `maxClientConnectionTime`: forces stream reconnection after this
    /// many seconds elapsed, 0 disables.
    pub max_client_connection_time_secs: u64,

    /// Abort the process on the first initial-environment failure instead
    /// of merely reporting it.
    pub exit_on_error: bool,

    /// Base URL the `/sdk/goals/{envId}` passthrough forwards to. `None`
    /// disables the endpoint (501) since the upstream dashboard API isn't
    /// otherwise modeled here.
    #[serde(default)]
    pub goals_base_url: Option<String>,

    pub daemon: DaemonConfig,

    pub logging_to_file: bool,
    pub log_dir: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8030,
            environment: Vec::new(),
            auto_config_key: None,
            auto_config_stream_url: None,
            archive_file: None,
            disconnected_status_time_secs: 20,
            expired_credential_cleanup_interval_secs: 60,
            max_client_connection_time_secs: 0,
            exit_on_error: false,
            goals_base_url: None,
            daemon: DaemonConfig::default(),
            logging_to_file: false,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct DaemonConfig {
    pub pid_file: String,
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticEnvironment {
    pub project_key: String,
    #[serde(default)]
    pub project_name: String,
    pub environment_key: String,
    #[serde(default)]
    pub environment_name: String,
    pub env_id: String,
    #[serde(default)]
    pub sdk_key: Option<String>,
    #[serde(default)]
    pub mobile_key: Option<String>,
    #[serde(default)]
    pub ttl_secs: u64,
    #[serde(default)]
    pub secure_mode: bool,
}

impl RelayConfig {
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml_ng::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), anyhow::Error> {
        if self.daemon.pid_file.is_empty() {
            self.daemon.pid_file = "./relay-proxy.pid".to_string();
        }
        if self.daemon.shutdown_timeout == 0 {
            self.daemon.shutdown_timeout = 5;
        }
        let sources = [
            !self.environment.is_empty(),
            self.auto_config_key.is_some(),
            self.archive_file.is_some(),
        ];
        anyhow::ensure!(
            sources.iter().any(|&s| s),
            "no environments configured: set `environment`, `auto-config-key`, or `archive-file`"
        );
        if self.auto_config_key.is_some() {
            anyhow::ensure!(
                self.auto_config_stream_url.is_some(),
                "auto-config-stream-url is required alongside auto-config-key"
            );
        }
        Ok(())
    }
}

/// Watches the config file on disk and invokes `on_reload` with the parsed
/// config whenever its contents genuinely change (debounced, content-hash
/// deduplicated).
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn start(
        path: String,
        config: Arc<ArcSwap<RelayConfig>>,
        on_reload: impl Fn(&RelayConfig) + Send + Sync + 'static,
    ) -> Result<Self, anyhow::Error> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(16);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res
                && (event.kind.is_modify() || event.kind.is_create())
            {
                let _ = tx.blocking_send(());
            }
        })?;
        watcher.watch(Path::new(&path), RecursiveMode::NonRecursive)?;

        let path_clone = path.clone();
        tokio::spawn(async move {
            let mut last_hash: Option<[u8; 32]> = None;
            let mut debounce: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    Some(()) = rx.recv() => {
                        debounce = Some(tokio::time::Instant::now() + Duration::from_millis(150));
                    }
                    _ = async {
                        match debounce {
                            Some(deadline) => tokio::time::sleep_until(deadline).await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        debounce = None;
                        match std::fs::read(&path_clone) {
                            Ok(contents) => {
                                let hash: [u8; 32] = sha2::Sha256::digest(&contents).into();
                                if last_hash.as_ref() == Some(&hash) {
                                    continue;
                                }
                                last_hash = Some(hash);

                                match RelayConfig::load(&path_clone) {
                                    Ok(new_cfg) => {
                                        tracing::info!("configuration reloaded successfully");
                                        on_reload(&new_cfg);
                                        config.store(Arc::new(new_cfg));
                                    }
                                    Err(e) => tracing::error!("config reload failed: {e}"),
                                }
                            }
                            Err(e) => tracing::error!("config file read failed: {e}"),
                        }
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8030);
        assert_eq!(cfg.disconnected_status_time_secs, 20);
        assert_eq!(cfg.expired_credential_cleanup_interval_secs, 60);
    }

    #[test]
    fn validate_rejects_no_sources() {
        let mut cfg = RelayConfig {
            environment: Vec::new(),
            auto_config_key: None,
            archive_file: None,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_static_environment() {
        let mut cfg = RelayConfig {
            environment: vec![StaticEnvironment {
                project_key: "p".into(),
                project_name: "P".into(),
                environment_key: "e".into(),
                environment_name: "E".into(),
                env_id: "id".into(),
                sdk_key: Some("sdk".into()),
                mobile_key: None,
                ttl_secs: 0,
                secure_mode: false,
            }],
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
