//! Live per-environment state (spec §3 `EnvironmentContext`).

use relay_core::credential::Credential;
use relay_core::model::EnvironmentIdentifiers;
use relay_core::upstream_status::{UpstreamState, UpstreamStatus};
use relay_store::DataStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use arc_swap::ArcSwap;

/// A credential accepted for reads only, expiring at a known instant.
#[derive(Debug, Clone)]
pub struct DeprecatedCredential {
    pub credential: Credential,
    pub expiry: Instant,
}

#[derive(Debug, Default)]
struct CredentialState {
    current: Vec<Credential>,
    deprecated: Vec<DeprecatedCredential>,
}

/// Live representation of a single environment: identity, credential sets,
/// local store, upstream status. Stream fan-out is not owned per-context —
/// `relay-stream`'s providers are shared across environments and scoped by
/// `env_id`, so a context only needs to know its own `env_id` to ask a
/// provider to drop its subscribers.
pub struct EnvironmentContext {
    env_id: String,
    identifiers: ArcSwap<EnvironmentIdentifiers>,
    ttl_secs: AtomicU64,
    secure_mode: AtomicBool,
    credentials: RwLock<CredentialState>,
    store: Arc<DataStore>,
    upstream: RwLock<UpstreamStatus>,
    created_at: Instant,
}

impl EnvironmentContext {
    pub fn new(
        env_id: impl Into<String>,
        identifiers: EnvironmentIdentifiers,
        ttl_secs: u64,
        secure_mode: bool,
    ) -> Self {
        Self {
            env_id: env_id.into(),
            identifiers: ArcSwap::from_pointee(identifiers),
            ttl_secs: AtomicU64::new(ttl_secs),
            secure_mode: AtomicBool::new(secure_mode),
            credentials: RwLock::new(CredentialState::default()),
            store: Arc::new(DataStore::new()),
            upstream: RwLock::new(UpstreamStatus::initializing()),
            created_at: Instant::now(),
        }
    }

    pub fn env_id(&self) -> &str {
        &self.env_id
    }

    pub fn identifiers(&self) -> Arc<EnvironmentIdentifiers> {
        self.identifiers.load_full()
    }

    pub fn filter(&self) -> String {
        self.identifiers.load().filter_key.clone()
    }

    pub fn set_identifiers(&self, identifiers: EnvironmentIdentifiers) {
        self.identifiers.store(Arc::new(identifiers));
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs.load(Ordering::Relaxed)
    }

    pub fn set_ttl(&self, ttl_secs: u64) {
        self.ttl_secs.store(ttl_secs, Ordering::Relaxed);
    }

    pub fn secure_mode(&self) -> bool {
        self.secure_mode.load(Ordering::Relaxed)
    }

    pub fn set_secure_mode(&self, secure_mode: bool) {
        self.secure_mode.store(secure_mode, Ordering::Relaxed);
    }

    /// Adds a credential to the current set. Per spec §4.2, callers adding a
    /// *routable* credential must call this before mapping it in the
    /// registry, so evaluation pipelines accept it before the router does.
    pub fn add_credential(&self, credential: Credential) {
        let mut state = self.credentials.write().unwrap();
        if !state.current.iter().any(|c| c == &credential) {
            state.current.push(credential);
        }
    }

    /// Removes a credential from both the current and deprecated sets.
    pub fn remove_credential(&self, credential: &Credential) -> bool {
        let mut state = self.credentials.write().unwrap();
        let before = state.current.len() + state.deprecated.len();
        state.current.retain(|c| c != credential);
        state.deprecated.retain(|d| &d.credential != credential);
        before != state.current.len() + state.deprecated.len()
    }

    /// Moves `credential` from current to deprecated, accepted for reads
    /// until `expiry`.
    pub fn deprecate_credential(&self, credential: Credential, expiry: Instant) {
        let mut state = self.credentials.write().unwrap();
        state.current.retain(|c| c != &credential);
        state.deprecated.retain(|d| d.credential != credential);
        state.deprecated.push(DeprecatedCredential { credential, expiry });
    }

    pub fn get_credentials(&self) -> Vec<Credential> {
        self.credentials.read().unwrap().current.clone()
    }

    pub fn get_deprecated_credentials(&self) -> Vec<DeprecatedCredential> {
        self.credentials.read().unwrap().deprecated.clone()
    }

    pub fn has_credential(&self, credential: &Credential) -> bool {
        let state = self.credentials.read().unwrap();
        state.current.iter().any(|c| c == credential)
            || state.deprecated.iter().any(|d| &d.credential == credential)
    }

    /// Removes and returns every deprecated credential whose expiry has
    /// passed as of `now`. Called by the registry's periodic sweep.
    pub fn take_expired(&self, now: Instant) -> Vec<Credential> {
        let mut state = self.credentials.write().unwrap();
        let (expired, remaining): (Vec<_>, Vec<_>) =
            state.deprecated.drain(..).partition(|d| now >= d.expiry);
        state.deprecated = remaining;
        expired.into_iter().map(|d| d.credential).collect()
    }

    pub fn store(&self) -> Arc<DataStore> {
        self.store.clone()
    }

    pub fn upstream_status(&self) -> UpstreamStatus {
        self.upstream.read().unwrap().clone()
    }

    pub fn set_upstream_state(&self, state: UpstreamState, last_error: Option<String>) {
        self.upstream.write().unwrap().transition(state, last_error);
    }

    pub fn is_connected(&self, disconnected_status_time: std::time::Duration) -> bool {
        self.upstream
            .read()
            .unwrap()
            .is_connected(disconnected_status_time)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Marks the environment closed: upstream handle off. Dropping stream
    /// subscribers and unmapping registry entries is the caller's job (the
    /// registry/engine), which have the wider context this method lacks.
    pub fn close(&self) {
        self.set_upstream_state(UpstreamState::Off, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> EnvironmentIdentifiers {
        EnvironmentIdentifiers {
            project_key: "p".into(),
            project_name: "Proj".into(),
            environment_key: "e".into(),
            environment_name: "Prod".into(),
            filter_key: String::new(),
        }
    }

    #[test]
    fn add_and_remove_credential() {
        let ctx = EnvironmentContext::new("env-1", ids(), 0, false);
        let c = Credential::ServerKey("sdk-1".into());
        ctx.add_credential(c.clone());
        assert_eq!(ctx.get_credentials(), vec![c.clone()]);
        assert!(ctx.remove_credential(&c));
        assert!(ctx.get_credentials().is_empty());
    }

    #[test]
    fn deprecate_then_expire() {
        let ctx = EnvironmentContext::new("env-1", ids(), 0, false);
        let c = Credential::ServerKey("sdk-old".into());
        ctx.add_credential(c.clone());
        let expiry = Instant::now();
        ctx.deprecate_credential(c.clone(), expiry);
        assert!(ctx.get_credentials().is_empty());
        assert_eq!(ctx.get_deprecated_credentials().len(), 1);

        let expired = ctx.take_expired(Instant::now() + std::time::Duration::from_millis(1));
        assert_eq!(expired, vec![c]);
        assert!(ctx.get_deprecated_credentials().is_empty());
    }

    #[test]
    fn not_yet_expired_credential_stays() {
        let ctx = EnvironmentContext::new("env-1", ids(), 0, false);
        let c = Credential::ServerKey("sdk-old".into());
        let expiry = Instant::now() + std::time::Duration::from_secs(60);
        ctx.deprecate_credential(c, expiry);
        assert!(ctx.take_expired(Instant::now()).is_empty());
    }
}
