//! Watches an archive file on disk and reconciles it through a
//! `FileDataHandler` whenever its contents genuinely change — debounced and
//! content-hash deduplicated, adapted from `relay_core::config::ConfigWatcher`.

use crate::archive::ArchiveFile;
use crate::handler::FileDataHandler;
use notify::{RecursiveMode, Watcher};
use sha2::Digest;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct ArchiveWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ArchiveWatcher {
    pub fn start(path: String, handler: Arc<FileDataHandler>) -> Result<Self, anyhow::Error> {
        // Initial load happens synchronously so the environment set exists
        // before the relay reports itself ready.
        load_and_reconcile(&path, &handler);

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
                                match std::str::from_utf8(&contents).map(ArchiveFile::parse) {
                                    Ok(Ok(archive)) => {
                                        tracing::info!("archive file reloaded successfully");
                                        handler.reconcile(archive);
                                    }
                                    Ok(Err(e)) => tracing::error!("archive parse failed: {e}"),
                                    Err(e) => tracing::error!("archive file is not valid UTF-8: {e}"),
                                }
                            }
                            Err(e) => tracing::error!("archive file read failed: {e}"),
                        }
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

fn load_and_reconcile(path: &str, handler: &FileDataHandler) {
    match std::fs::read_to_string(path).map(|c| ArchiveFile::parse(&c)) {
        Ok(Ok(archive)) => handler.reconcile(archive),
        Ok(Err(e)) => tracing::error!("archive parse failed on initial load: {e}"),
        Err(e) => tracing::error!("archive file read failed on initial load: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::credential::Credential;
    use relay_core::model::EnvironmentParams;
    use relay_store::DataStore;
    use relay_upstream::EnvironmentSink;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingSink {
        added: Mutex<Vec<String>>,
        stores: Mutex<HashMap<String, Arc<DataStore>>>,
    }

    impl EnvironmentSink for RecordingSink {
        fn add_environment(&self, params: EnvironmentParams) {
            self.added.lock().unwrap().push(params.env_id.clone());
            self.stores
                .lock()
                .unwrap()
                .insert(params.env_id, Arc::new(DataStore::new()));
        }
        fn update_environment(&self, _params: EnvironmentParams) {}
        fn delete_environment(&self, _env_id: &str, _filter: &str) {}
        fn received_all_environments(&self) {}
        fn holds_credential(&self, _credential: &Credential) -> bool {
            false
        }
        fn deprecate_additional_credential(&self, _env_id: &str, _credential: Credential, _expiry: Instant) {}
        fn store_for(&self, env_id: &str) -> Option<Arc<DataStore>> {
            self.stores.lock().unwrap().get(env_id).cloned()
        }
    }

    #[tokio::test]
    async fn initial_load_reconciles_before_watch_starts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");
        std::fs::write(
            &path,
            r#"{"environments": {"env-A": {
                "identifiers": {"project_key":"p","project_name":"P","environment_key":"e","environment_name":"E","filter_key":""},
                "env_id": "env-A",
                "server_sdk_key": "sdk",
                "sdk_data": {"flags": [], "segments": []}
            }}}"#,
        )
        .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let handler = Arc::new(FileDataHandler::new(sink.clone()));
        let _watcher = ArchiveWatcher::start(path.to_string_lossy().to_string(), handler).unwrap();

        assert_eq!(sink.added.lock().unwrap().len(), 1);
    }
}
