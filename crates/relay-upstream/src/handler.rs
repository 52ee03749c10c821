//! The auto-config handler (spec §4.6): four callbacks invoked by a single
//! upstream stream collaborator, sequentially, so no lock beyond what the
//! sink itself holds is needed here.

use crate::message::{AutoConfigMessage, EnvRep};
use relay_core::credential::Credential;
use relay_core::model::EnvironmentParams;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// What the handler calls back into. Implemented by the relay core
/// (`relay-engine`); kept as a trait here so this crate never depends on
/// the engine crate.
pub trait EnvironmentSink: Send + Sync {
    fn add_environment(&self, params: EnvironmentParams);
    fn update_environment(&self, params: EnvironmentParams);
    fn delete_environment(&self, env_id: &str, filter: &str);
    fn received_all_environments(&self);

    /// True if some already-known environment currently holds `credential`.
    fn holds_credential(&self, credential: &Credential) -> bool;

    /// Registers `credential` as an additional credential on `env_id`,
    /// already deprecated with the given expiry.
    fn deprecate_additional_credential(&self, env_id: &str, credential: Credential, expiry: Instant);

    /// The environment's flag/segment store, for collaborators (the
    /// file-data handler) that populate it directly instead of through a
    /// live upstream connection.
    fn store_for(&self, env_id: &str) -> Option<Arc<relay_store::DataStore>>;
}

/// Converts a upstream-protocol Unix-millis timestamp to a local monotonic
/// `Instant`, anchored to the current wall/monotonic clock pair.
pub fn millis_to_instant(ts_millis: i64) -> Instant {
    let now_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let delta = ts_millis - now_millis;
    if delta <= 0 {
        Instant::now()
    } else {
        Instant::now() + Duration::from_millis(delta as u64)
    }
}

pub struct AutoConfigHandler {
    sink: Arc<dyn EnvironmentSink>,
    known_envs: Mutex<HashSet<String>>,
}

impl AutoConfigHandler {
    pub fn new(sink: Arc<dyn EnvironmentSink>) -> Self {
        Self {
            sink,
            known_envs: Mutex::new(HashSet::new()),
        }
    }

    pub fn handle_message(&self, msg: AutoConfigMessage) {
        match msg {
            AutoConfigMessage::Put { environments } => self.handle_put(environments),
            AutoConfigMessage::Patch { env } => self.handle_patch(env),
            AutoConfigMessage::Delete { env_id, version: _ } => self.handle_delete(&env_id),
        }
    }

    fn handle_put(&self, environments: Vec<EnvRep>) {
        for env in environments {
            self.add_environment(env);
        }
        self.sink.received_all_environments();
    }

    fn handle_patch(&self, env: EnvRep) {
        let known = self.known_envs.lock().unwrap().contains(&env.env_id);
        if known {
            self.sink.update_environment(env.into_params());
        } else {
            self.add_environment(env);
        }
    }

    fn handle_delete(&self, env_id: &str) {
        self.known_envs.lock().unwrap().remove(env_id);
        // Filter is routing state the sink already tracks per environment;
        // the handler only knows the env_id the upstream named.
        self.sink.delete_environment(env_id, "");
    }

    /// Shared by `put`'s per-environment population and `patch`'s
    /// first-sighting-of-an-env path (spec §4.6 `addEnvironment`).
    fn add_environment(&self, env: EnvRep) {
        self.known_envs.lock().unwrap().insert(env.env_id.clone());
        let env_id = env.env_id.clone();
        let expiring = env.sdk_key.expiring.clone();
        let params = env.into_params();
        self.sink.add_environment(params);

        if let Some(expiring) = expiring {
            let credential = Credential::ServerKey(expiring.value);
            if !self.sink.holds_credential(&credential) {
                let expiry = millis_to_instant(expiring.timestamp);
                self.sink
                    .deprecate_additional_credential(&env_id, credential, expiry);
            }
        }
    }
}
