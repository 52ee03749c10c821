//! The environment registry: routing index plus iteration index behind a
//! single `RwLock`, mirroring `CredentialRouter`'s single-lock
//! `HashMap<Format, Vec<AuthRecord>>` shape.

use crate::context::EnvironmentContext;
use relay_core::credential::{Credential, ScopedCredential};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

struct RegistryInner {
    /// Routing index: scoped credential -> env_id.
    mapping: HashMap<ScopedCredential, String>,
    /// Iteration index: env_id -> context.
    environments: HashMap<String, Arc<EnvironmentContext>>,
}

pub struct EnvironmentRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                mapping: HashMap::new(),
                environments: HashMap::new(),
            }),
        }
    }

    /// Adds `ctx` to the iteration index and maps every one of its current
    /// credentials (current and deprecated) into the routing index.
    pub fn insert(&self, ctx: Arc<EnvironmentContext>) {
        let mut inner = self.inner.write().unwrap();
        let filter = ctx.filter();
        for c in ctx.get_credentials() {
            inner
                .mapping
                .insert(ScopedCredential::new(filter.clone(), c), ctx.env_id().to_string());
        }
        for d in ctx.get_deprecated_credentials() {
            inner.mapping.insert(
                ScopedCredential::new(filter.clone(), d.credential),
                ctx.env_id().to_string(),
            );
        }
        inner.environments.insert(ctx.env_id().to_string(), ctx);
    }

    /// Adds or overwrites a single routing entry. `env_id` must already be
    /// present in the iteration index.
    pub fn map(&self, scoped: ScopedCredential, env_id: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.mapping.insert(scoped, env_id.to_string());
    }

    /// Deletes a single routing entry without touching the iteration index.
    pub fn unmap(&self, scoped: &ScopedCredential) -> Option<String> {
        let mut inner = self.inner.write().unwrap();
        inner.mapping.remove(scoped)
    }

    pub fn lookup(&self, scoped: &ScopedCredential) -> Option<Arc<EnvironmentContext>> {
        let inner = self.inner.read().unwrap();
        let env_id = inner.mapping.get(scoped)?;
        inner.environments.get(env_id).cloned()
    }

    /// True iff `scoped.credential` is known for `scoped`'s environment
    /// under the empty filter (used to disambiguate unrecognized-credential
    /// from unknown-filter, spec §4.5's `PayloadFilterNotFound`).
    pub fn credential_known_unscoped(&self, scoped: &ScopedCredential) -> bool {
        let unscoped = scoped.unscope();
        self.lookup(&unscoped).is_some()
    }

    /// Removes `E` identified by `scoped` entirely: every mapping entry
    /// pointing at it, and `E` itself from the iteration index.
    pub fn delete(&self, scoped: &ScopedCredential) -> Option<Arc<EnvironmentContext>> {
        let mut inner = self.inner.write().unwrap();
        let env_id = inner.mapping.get(scoped)?.clone();
        inner.mapping.retain(|_, v| v != &env_id);
        inner.environments.remove(&env_id)
    }

    /// Removes `E` by env_id directly (used by the engine/auto-config path
    /// which already tracks the environment by id).
    pub fn delete_by_env_id(&self, env_id: &str) -> Option<Arc<EnvironmentContext>> {
        let mut inner = self.inner.write().unwrap();
        inner.mapping.retain(|_, v| v != env_id);
        inner.environments.remove(env_id)
    }

    pub fn get_by_env_id(&self, env_id: &str) -> Option<Arc<EnvironmentContext>> {
        self.inner.read().unwrap().environments.get(env_id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<EnvironmentContext>> {
        self.inner.read().unwrap().environments.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort periodic cleanup (spec §9 Open Question 2: a configurable
    /// interval rather than one timer per deprecated credential). Returns
    /// every `(env_id, credential)` pair that expired this sweep, having
    /// already unmapped their routing entries — callers are responsible for
    /// telling the stream providers to drop subscribers of each credential.
    pub fn sweep_expired(&self, now: Instant) -> Vec<(String, Credential)> {
        let contexts: Vec<Arc<EnvironmentContext>> = self.list();
        let mut removed = Vec::new();
        for ctx in contexts {
            let expired = ctx.take_expired(now);
            if expired.is_empty() {
                continue;
            }
            let filter = ctx.filter();
            for credential in expired {
                self.unmap(&ScopedCredential::new(filter.clone(), credential.clone()));
                tracing::info!(env = ctx.env_id(), credential = %credential, "deprecated credential expired, unmapped");
                removed.push((ctx.env_id().to_string(), credential));
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::model::EnvironmentIdentifiers;

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
    fn insert_then_lookup() {
        let registry = EnvironmentRegistry::new();
        let ctx = Arc::new(EnvironmentContext::new("env-1", ids(), 0, false));
        ctx.add_credential(Credential::ServerKey("sdk-1".into()));
        registry.insert(ctx.clone());

        let scoped = ScopedCredential::new(String::new(), Credential::ServerKey("sdk-1".into()));
        let found = registry.lookup(&scoped).unwrap();
        assert_eq!(found.env_id(), "env-1");
    }

    #[test]
    fn delete_removes_all_entries_for_env() {
        let registry = EnvironmentRegistry::new();
        let ctx = Arc::new(EnvironmentContext::new("env-1", ids(), 0, false));
        let server = Credential::ServerKey("sdk-1".into());
        let mobile = Credential::MobileKey("mob-1".into());
        ctx.add_credential(server.clone());
        ctx.add_credential(mobile.clone());
        registry.insert(ctx.clone());

        let scoped_server = ScopedCredential::new(String::new(), server.clone());
        registry.delete(&scoped_server);

        assert!(registry.lookup(&scoped_server).is_none());
        assert!(
            registry
                .lookup(&ScopedCredential::new(String::new(), mobile))
                .is_none()
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn sweep_expired_unmaps_routing_entry() {
        let registry = EnvironmentRegistry::new();
        let ctx = Arc::new(EnvironmentContext::new("env-1", ids(), 0, false));
        let old = Credential::ServerKey("sdk-old".into());
        ctx.add_credential(old.clone());
        registry.insert(ctx.clone());
        ctx.deprecate_credential(old.clone(), Instant::now());

        let scoped = ScopedCredential::new(String::new(), old.clone());
        assert!(registry.lookup(&scoped).is_some());

        let removed = registry.sweep_expired(Instant::now() + std::time::Duration::from_millis(1));
        assert_eq!(removed, vec![("env-1".to_string(), old)]);
        assert!(registry.lookup(&scoped).is_none());
        // Environment itself stays; only the expired credential's mapping is gone.
        assert!(registry.get_by_env_id("env-1").is_some());
    }

    #[test]
    fn unscoped_lookup_disambiguates_filter_not_found() {
        let registry = EnvironmentRegistry::new();
        let ctx = Arc::new(EnvironmentContext::new("env-1", ids(), 0, false));
        let server = Credential::ServerKey("sdk-1".into());
        ctx.add_credential(server.clone());
        registry.insert(ctx);

        let wrong_filter = ScopedCredential::new("beta".into(), server);
        assert!(registry.lookup(&wrong_filter).is_none());
        assert!(registry.credential_known_unscoped(&wrong_filter));
    }
}
