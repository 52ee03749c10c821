//! Applies a `RotationStatus` verdict to a registry + context pair,
//! honoring the strict add-then-map / unmap-then-remove ordering from
//! spec §4.2 so a request is never accepted by one side and rejected by
//! the other.

use crate::context::EnvironmentContext;
use crate::registry::EnvironmentRegistry;
use relay_core::credential::{Credential, CredentialKind, RotationStatus, ScopedCredential};
use std::sync::Arc;
use std::time::Instant;

/// What changed as a result of applying a rotation status. The caller uses
/// `removed` to tell the stream providers to drop that credential's
/// subscribers (spec §4.4 `dropForCredential`).
#[derive(Debug, Clone, Default)]
pub struct RotationOutcome {
    pub added: Option<Credential>,
    pub removed: Option<Credential>,
}

fn same_kind_credential(kind: CredentialKind, value: String) -> Credential {
    match kind {
        CredentialKind::ServerKey => Credential::ServerKey(value),
        CredentialKind::MobileKey => Credential::MobileKey(value),
        CredentialKind::EnvId => Credential::EnvId(value),
    }
}

pub fn apply_rotation(
    registry: &EnvironmentRegistry,
    ctx: &Arc<EnvironmentContext>,
    prev: &Credential,
    status: RotationStatus,
) -> RotationOutcome {
    let filter = ctx.filter();
    match status {
        RotationStatus::Unchanged => RotationOutcome::default(),
        RotationStatus::Superseded { new_value } => {
            let new_cred = same_kind_credential(prev.kind(), new_value);
            ctx.add_credential(new_cred.clone());
            registry.map(ScopedCredential::new(filter.clone(), new_cred.clone()), ctx.env_id());

            registry.unmap(&ScopedCredential::new(filter, prev.clone()));
            ctx.remove_credential(prev);

            RotationOutcome {
                added: Some(new_cred),
                removed: Some(prev.clone()),
            }
        }
        RotationStatus::Deprecated { new_value, expiry } => {
            let new_cred = same_kind_credential(prev.kind(), new_value);
            ctx.add_credential(new_cred.clone());
            registry.map(ScopedCredential::new(filter, new_cred.clone()), ctx.env_id());

            // `prev` stays mapped (read-only, grace period) until expiry
            // sweep unmaps and disconnects it.
            ctx.deprecate_credential(prev.clone(), expiry);

            RotationOutcome {
                added: Some(new_cred),
                removed: None,
            }
        }
        RotationStatus::Expired => {
            registry.unmap(&ScopedCredential::new(filter, prev.clone()));
            ctx.remove_credential(prev);
            RotationOutcome {
                added: None,
                removed: Some(prev.clone()),
            }
        }
    }
}

/// Drives `setCredentials` (spec §4.5): compares every currently-held
/// credential of `ctx` against `desired` and applies the resulting status.
pub fn set_credentials(
    registry: &EnvironmentRegistry,
    ctx: &Arc<EnvironmentContext>,
    desired: &relay_core::credential::DesiredCredentials,
    now: Instant,
) -> Vec<RotationOutcome> {
    let mut outcomes = Vec::new();
    for prev in ctx.get_credentials() {
        let status = relay_core::credential::compare(&prev, None, desired, now);
        outcomes.push(apply_rotation(registry, ctx, &prev, status));
    }
    for deprecated in ctx.get_deprecated_credentials() {
        let status =
            relay_core::credential::compare(&deprecated.credential, Some(deprecated.expiry), desired, now);
        if status != RotationStatus::Unchanged {
            outcomes.push(apply_rotation(registry, ctx, &deprecated.credential, status));
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::credential::DesiredCredentials;
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
    fn superseded_rotation_swaps_routing_atomically() {
        let registry = EnvironmentRegistry::new();
        let ctx = Arc::new(EnvironmentContext::new("env-1", ids(), 0, false));
        let old = Credential::ServerKey("sdk-old".into());
        ctx.add_credential(old.clone());
        registry.insert(ctx.clone());

        let desired = DesiredCredentials {
            server_key: Some("sdk-new".into()),
            ..Default::default()
        };
        let status = relay_core::credential::compare(&old, None, &desired, Instant::now());
        let outcome = apply_rotation(&registry, &ctx, &old, status);

        assert_eq!(outcome.added, Some(Credential::ServerKey("sdk-new".into())));
        assert_eq!(outcome.removed, Some(old.clone()));
        assert!(
            registry
                .lookup(&ScopedCredential::new(String::new(), old))
                .is_none()
        );
        assert!(
            registry
                .lookup(&ScopedCredential::new(
                    String::new(),
                    Credential::ServerKey("sdk-new".into())
                ))
                .is_some()
        );
    }

    #[test]
    fn deprecated_rotation_keeps_old_credential_routable() {
        let registry = EnvironmentRegistry::new();
        let ctx = Arc::new(EnvironmentContext::new("env-1", ids(), 0, false));
        let old = Credential::ServerKey("sdk-old".into());
        ctx.add_credential(old.clone());
        registry.insert(ctx.clone());

        let expiry = Instant::now() + std::time::Duration::from_secs(60);
        let desired = DesiredCredentials {
            server_key: Some("sdk-new".into()),
            expiring_server_key: Some(("sdk-old".into(), expiry)),
            ..Default::default()
        };
        let status = relay_core::credential::compare(&old, None, &desired, Instant::now());
        apply_rotation(&registry, &ctx, &old, status);

        assert!(
            registry
                .lookup(&ScopedCredential::new(String::new(), old))
                .is_some(),
            "deprecated credential must remain routable until expiry"
        );
        assert_eq!(ctx.get_deprecated_credentials().len(), 1);
    }
}
