//! The relay core (spec §4.5): constructs environments, owns the registry,
//! and drives credential rotation. Grounded on `Application::build`
//! (`src/app.rs`) for the construct/wire/wait-for-ready shape.

use relay_core::credential::{Credential, DesiredCredentials, ScopedCredential};
use relay_core::error::RelayError;
use relay_core::model::EnvironmentParams;
use relay_core::upstream_status::UpstreamState;
use relay_registry::{EnvironmentContext, EnvironmentRegistry};
use relay_stream::StreamProviders;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

pub struct RelayConfig {
    pub disconnected_status_time: Duration,
    pub max_client_connection_time: Duration,
    pub exit_on_error: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            disconnected_status_time: Duration::from_secs(20),
            max_client_connection_time: Duration::ZERO,
            exit_on_error: false,
        }
    }
}

/// Owns the registry and stream providers; the single root object whose
/// `close()` reclaims everything (spec §9 "static global state: none is
/// required").
pub struct Relay {
    registry: Arc<EnvironmentRegistry>,
    streams: Arc<StreamProviders>,
    config: RelayConfig,
    fully_configured: AtomicBool,
    closed: AtomicBool,
    pending_inits: Mutex<HashSet<String>>,
    init_notify: Notify,
    any_init_failed: AtomicBool,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        let streams = Arc::new(StreamProviders::new(config.max_client_connection_time));
        Self {
            registry: Arc::new(EnvironmentRegistry::new()),
            streams,
            config,
            fully_configured: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pending_inits: Mutex::new(HashSet::new()),
            init_notify: Notify::new(),
            any_init_failed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<EnvironmentRegistry> {
        &self.registry
    }

    pub fn streams(&self) -> &Arc<StreamProviders> {
        &self.streams
    }

    /// Allocates and registers a new environment. Returns the context
    /// immediately; callers that need to know when its upstream connection
    /// settles should also call `mark_initialized` once it does, and may
    /// track the outcome via `wait_for_all_clients`.
    pub fn add_environment(&self, params: EnvironmentParams) -> Result<Arc<EnvironmentContext>, RelayError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::AlreadyClosed);
        }
        let env_id = params.env_id.clone();
        let ctx = Arc::new(EnvironmentContext::new(
            env_id.clone(),
            params.identifiers,
            params.ttl_secs,
            params.secure_mode,
        ));
        if let Some(key) = &params.server_sdk_key {
            ctx.add_credential(Credential::ServerKey(key.clone()));
        }
        if let Some(key) = &params.mobile_key {
            ctx.add_credential(Credential::MobileKey(key.clone()));
        }
        ctx.add_credential(Credential::EnvId(env_id.clone()));

        self.registry.insert(ctx.clone());
        self.pending_inits.lock().unwrap().insert(env_id);

        Ok(ctx)
    }

    /// Reports that `env_id`'s initial upstream connection attempt settled
    /// (success or failure), unblocking `wait_for_all_clients` once every
    /// initially-known environment has reported.
    pub fn mark_initialized(&self, env_id: &str, success: bool) {
        if !success {
            self.any_init_failed.store(true, Ordering::Relaxed);
        }
        self.pending_inits.lock().unwrap().remove(env_id);
        self.init_notify.notify_waiters();
    }

    /// Blocks until every environment registered so far has reported its
    /// initial connection outcome, or `timeout` elapses.
    pub async fn wait_for_all_clients(&self, timeout: Duration) -> Result<(), RelayError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_inits.lock().unwrap().is_empty() {
                return if self.any_init_failed.load(Ordering::Relaxed) {
                    Err(RelayError::SomeEnvironmentFailed)
                } else {
                    Ok(())
                };
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RelayError::InitializationTimeout);
            }
            let _ = tokio::time::timeout(remaining, self.init_notify.notified()).await;
        }
    }

    pub fn get_environment(&self, scoped: &ScopedCredential) -> Result<Arc<EnvironmentContext>, RelayError> {
        if !self.fully_configured.load(Ordering::Acquire) {
            return Err(RelayError::NotReady);
        }
        if let Some(ctx) = self.registry.lookup(scoped) {
            return Ok(ctx);
        }
        if self.registry.credential_known_unscoped(scoped) {
            return Err(RelayError::PayloadFilterNotFound);
        }
        Err(RelayError::UnrecognizedEnvironment)
    }

    pub fn remove_environment(&self, scoped: &ScopedCredential) -> Option<Arc<EnvironmentContext>> {
        let removed = self.registry.delete(scoped)?;
        removed.close();
        self.streams.drop_all_for_environment(removed.env_id());
        Some(removed)
    }

    pub fn remove_environment_by_id(&self, env_id: &str) -> Option<Arc<EnvironmentContext>> {
        let removed = self.registry().delete_by_env_id(env_id)?;
        removed.close();
        self.streams.drop_all_for_environment(removed.env_id());
        Some(removed)
    }

    /// Drives `setCredentials` (spec §4.5): compares every credential the
    /// environment holds against `updated` and applies the resulting
    /// rotation, disconnecting streams for any credential the rotation
    /// removed outright.
    pub fn set_credentials(&self, ctx: &Arc<EnvironmentContext>, updated: &EnvironmentParams) {
        ctx.set_identifiers(updated.identifiers.clone());
        ctx.set_ttl(updated.ttl_secs);
        ctx.set_secure_mode(updated.secure_mode);

        let desired = DesiredCredentials {
            server_key: updated.server_sdk_key.clone(),
            mobile_key: updated.mobile_key.clone(),
            expiring_server_key: updated
                .expiring_sdk_key
                .as_ref()
                .map(|e| (e.value.clone(), relay_upstream::millis_to_instant(e.timestamp))),
        };

        let outcomes = relay_registry::set_credentials(&self.registry, ctx, &desired, Instant::now());
        for outcome in outcomes {
            if let Some(removed) = outcome.removed {
                self.streams.drop_for_credential(ctx.env_id(), &removed);
            }
        }
    }

    pub fn set_fully_configured(&self, value: bool) {
        self.fully_configured.store(value, Ordering::Release);
    }

    pub fn is_fully_configured(&self) -> bool {
        self.fully_configured.load(Ordering::Acquire)
    }

    /// Overall health per spec §4.3: healthy iff every environment is
    /// connected and the relay is fully configured.
    pub fn is_healthy(&self) -> bool {
        self.is_fully_configured()
            && self
                .registry
                .list()
                .iter()
                .all(|ctx| ctx.is_connected(self.config.disconnected_status_time))
    }

    /// Best-effort sweep of expired deprecated credentials (spec §9 Open
    /// Question 2): unmaps routing entries, then disconnects streams.
    /// Intended to be called on a periodic timer owned by the binary.
    pub fn sweep_expired_credentials(&self) {
        for (env_id, credential) in self.registry.sweep_expired(Instant::now()) {
            self.streams.drop_for_credential(&env_id, &credential);
        }
    }

    /// Idempotent: closes every environment, drops all stream subscribers,
    /// and marks the relay as no longer accepting new environments.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for ctx in self.registry.list() {
            ctx.close();
            self.streams.drop_all_for_environment(ctx.env_id());
        }
    }
}

impl relay_upstream::EnvironmentSink for Relay {
    fn add_environment(&self, params: EnvironmentParams) {
        if let Err(e) = Relay::add_environment(self, params) {
            tracing::warn!(error = %e, "failed to add environment");
        }
    }

    fn update_environment(&self, params: EnvironmentParams) {
        let Some(ctx) = self.registry.get_by_env_id(&params.env_id) else {
            // Spec §4.6: unknown env on update is log-and-return, never
            // auto-create (see design notes on the two historical
            // behaviors).
            tracing::info!(env = %params.env_id, "updateEnvironment for unknown environment, ignoring");
            return;
        };
        self.set_credentials(&ctx, &params);
    }

    fn delete_environment(&self, env_id: &str, _filter: &str) {
        self.remove_environment_by_id(env_id);
    }

    fn received_all_environments(&self) {
        self.set_fully_configured(true);
    }

    fn holds_credential(&self, credential: &Credential) -> bool {
        self.registry
            .list()
            .iter()
            .any(|ctx| ctx.has_credential(credential))
    }

    fn deprecate_additional_credential(&self, env_id: &str, credential: Credential, expiry: Instant) {
        if let Some(ctx) = self.registry.get_by_env_id(env_id) {
            ctx.add_credential(credential.clone());
            let scoped = ScopedCredential::new(ctx.filter(), credential.clone());
            self.registry.map(scoped, env_id);
            ctx.deprecate_credential(credential, expiry);
        }
    }

    fn store_for(&self, env_id: &str) -> Option<Arc<relay_store::DataStore>> {
        self.registry.get_by_env_id(env_id).map(|ctx| ctx.store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::model::EnvironmentIdentifiers;
    use relay_stream::StreamEvent;
    use relay_upstream::EnvironmentSink;

    fn params(env_id: &str, server_key: &str) -> EnvironmentParams {
        EnvironmentParams {
            identifiers: EnvironmentIdentifiers {
                project_key: "p".into(),
                project_name: "Proj".into(),
                environment_key: "e".into(),
                environment_name: "Prod".into(),
                filter_key: String::new(),
            },
            env_id: env_id.into(),
            server_sdk_key: Some(server_key.into()),
            mobile_key: None,
            expiring_sdk_key: None,
            ttl_secs: 0,
            secure_mode: false,
        }
    }

    #[test]
    fn add_then_get_environment_round_trips() {
        let relay = Relay::new(RelayConfig::default());
        relay.add_environment(params("env-1", "sdk-1")).unwrap();
        relay.set_fully_configured(true);

        let scoped = ScopedCredential::new(String::new(), Credential::ServerKey("sdk-1".into()));
        let ctx = relay.get_environment(&scoped).unwrap();
        assert_eq!(ctx.env_id(), "env-1");
    }

    #[test]
    fn get_environment_before_fully_configured_is_not_ready() {
        let relay = Relay::new(RelayConfig::default());
        relay.add_environment(params("env-1", "sdk-1")).unwrap();

        let scoped = ScopedCredential::new(String::new(), Credential::ServerKey("sdk-1".into()));
        assert!(matches!(relay.get_environment(&scoped), Err(RelayError::NotReady)));
    }

    #[tokio::test]
    async fn wait_for_all_clients_times_out_when_nothing_reports() {
        let relay = Relay::new(RelayConfig::default());
        relay.add_environment(params("env-1", "sdk-1")).unwrap();

        let result = relay.wait_for_all_clients(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(RelayError::InitializationTimeout)));
    }

    #[tokio::test]
    async fn wait_for_all_clients_resolves_once_all_report() {
        let relay = Arc::new(Relay::new(RelayConfig::default()));
        relay.add_environment(params("env-1", "sdk-1")).unwrap();

        let waiter = relay.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_all_clients(Duration::from_secs(5)).await });
        relay.mark_initialized("env-1", true);

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn set_credentials_disconnects_streams_for_superseded_credential() {
        let relay = Relay::new(RelayConfig::default());
        let ctx = relay.add_environment(params("env-1", "sdk-old")).unwrap();
        relay.set_fully_configured(true);

        let old = Credential::ServerKey("sdk-old".into());
        let sub = relay
            .streams()
            .server_all
            .subscribe("env-1", old.clone(), StreamEvent::ping());
        assert_eq!(relay.streams().server_all.subscriber_count(), 1);

        relay.set_credentials(&ctx, &params("env-1", "sdk-new"));
        assert_eq!(relay.streams().server_all.subscriber_count(), 0);
        drop(sub);
    }

    #[test]
    fn environment_sink_update_for_unknown_env_is_a_noop() {
        let relay = Relay::new(RelayConfig::default());
        EnvironmentSink::update_environment(&relay, params("env-missing", "sdk-x"));
        assert!(relay.registry().get_by_env_id("env-missing").is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drops_all_streams() {
        let relay = Relay::new(RelayConfig::default());
        let _ctx = relay.add_environment(params("env-1", "sdk-1")).unwrap();
        relay.set_fully_configured(true);

        let _sub = relay.streams().server_all.subscribe(
            "env-1",
            Credential::ServerKey("sdk-1".into()),
            StreamEvent::ping(),
        );
        relay.close();
        relay.close();
        assert_eq!(relay.streams().server_all.subscriber_count(), 0);
    }
}
