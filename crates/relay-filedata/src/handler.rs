//! The file-data handler (spec §4.7): same four conceptual callbacks as the
//! auto-config handler, but driven by full-archive reconciliation instead
//! of a per-message stream, and writing straight into each environment's
//! store instead of going through a live upstream connection.

use crate::archive::{ArchiveFile, record_hash};
use relay_upstream::EnvironmentSink;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub struct FileDataHandler {
    sink: Arc<dyn EnvironmentSink>,
    known: Mutex<HashMap<String, [u8; 32]>>,
}

impl FileDataHandler {
    pub fn new(sink: Arc<dyn EnvironmentSink>) -> Self {
        Self {
            sink,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciles the full archive contents against what's currently known.
    /// New environments are added, changed ones updated (store re-init only
    /// when `sdk_data` is present and the hash actually changed), and
    /// environments no longer in the archive are deleted.
    pub fn reconcile(&self, archive: ArchiveFile) {
        let archive_ids: HashSet<String> = archive.environments.keys().cloned().collect();

        let stale: Vec<String> = {
            let known = self.known.lock().unwrap();
            known
                .keys()
                .filter(|id| !archive_ids.contains(*id))
                .cloned()
                .collect()
        };
        for env_id in stale {
            self.known.lock().unwrap().remove(&env_id);
            self.sink.delete_environment(&env_id, "");
        }

        for (env_id, env) in archive.environments {
            let hash = record_hash(&env);
            let previously_known = self.known.lock().unwrap().get(&env_id).copied();

            match previously_known {
                Some(prev_hash) if prev_hash == hash => continue,
                Some(_) => {
                    self.sink.update_environment(env.params.clone());
                    if let Some(data) = &env.sdk_data
                        && let Some(store) = self.sink.store_for(&env_id)
                    {
                        store.init(data.flags.clone(), data.segments.clone());
                    }
                }
                None => {
                    self.sink.add_environment(env.params.clone());
                    if let Some(data) = &env.sdk_data
                        && let Some(store) = self.sink.store_for(&env_id)
                    {
                        store.init(data.flags.clone(), data.segments.clone());
                    }
                }
            }
            self.known.lock().unwrap().insert(env_id, hash);
        }

        self.sink.received_all_environments();
    }
}
