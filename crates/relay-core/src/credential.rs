//! Credential model and the rotation comparison that drives atomic key updates.

use std::fmt;
use std::time::Instant;

/// The three credential kinds accepted by the relay. Kind is known from the
/// request's origin (header vs. URL path segment), never guessed from the
/// string's shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Credential {
    ServerKey(String),
    MobileKey(String),
    EnvId(String),
}

impl Credential {
    /// True iff the inner string is non-empty.
    pub fn is_defined(&self) -> bool {
        !self.value().is_empty()
    }

    pub fn value(&self) -> &str {
        match self {
            Self::ServerKey(s) | Self::MobileKey(s) | Self::EnvId(s) => s,
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::ServerKey(_) => CredentialKind::ServerKey,
            Self::MobileKey(_) => CredentialKind::MobileKey,
            Self::EnvId(_) => CredentialKind::EnvId,
        }
    }

    /// Value to send as the `Authorization` header. Env IDs travel in the
    /// URL, not a header, so this is empty for that kind.
    pub fn authorization_header_value(&self) -> &str {
        match self {
            Self::ServerKey(s) | Self::MobileKey(s) => s,
            Self::EnvId(_) => "",
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    ServerKey,
    MobileKey,
    EnvId,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ServerKey => "server",
            Self::MobileKey => "mobile",
            Self::EnvId => "env-id",
        };
        f.write_str(s)
    }
}

/// A credential paired with a monotonic expiry. Defined iff the inner
/// credential is defined.
#[derive(Debug, Clone)]
pub struct ExpiringCredential {
    pub credential: Credential,
    pub expiry: Instant,
}

impl ExpiringCredential {
    pub fn is_defined(&self) -> bool {
        self.credential.is_defined()
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }
}

/// Empty denotes "no payload filter".
pub type FilterKey = String;

/// Composite routing key: `(filter, credential)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedCredential {
    pub filter: FilterKey,
    pub credential: Credential,
}

impl ScopedCredential {
    pub fn new(filter: FilterKey, credential: Credential) -> Self {
        Self { filter, credential }
    }

    /// Same credential, empty filter. Used to disambiguate "unrecognized
    /// credential" (401/404) from "credential ok, filter unknown" (404).
    pub fn unscope(&self) -> Self {
        Self {
            filter: FilterKey::new(),
            credential: self.credential.clone(),
        }
    }
}

/// The desired-state credential set for a single environment, as received
/// from a configuration source. `compare` consults exactly these three
/// fields; nothing else may drive a rotation decision.
#[derive(Debug, Clone, Default)]
pub struct DesiredCredentials {
    pub server_key: Option<String>,
    pub mobile_key: Option<String>,
    pub expiring_server_key: Option<(String, Instant)>,
}

/// Outcome of comparing a previously-known credential against the desired
/// state. This is the only source of truth for when a credential change
/// occurs — callers must never pattern-match on the strings themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationStatus {
    /// `desired` names a credential of the same kind with the same value.
    Unchanged,
    /// `desired` names a credential of the same kind with a different
    /// value, and no expiry was specified for `prev`.
    Superseded { new_value: String },
    /// `desired` names both a new credential of the same kind AND `prev` as
    /// an expiring credential.
    Deprecated { new_value: String, expiry: Instant },
    /// `prev`'s deprecation expiry has passed.
    Expired,
}

/// The rotation comparison: the heart of atomic key updates (spec §4.1).
///
/// `prev_expiry` is `Some` when `prev` is currently held as a deprecated
/// credential (so an `Expired` verdict can be produced independent of what
/// `desired` says); it is `None` for a currently-active credential.
pub fn compare(
    prev: &Credential,
    prev_expiry: Option<Instant>,
    desired: &DesiredCredentials,
    now: Instant,
) -> RotationStatus {
    if let Some(expiry) = prev_expiry
        && now >= expiry
    {
        return RotationStatus::Expired;
    }

    match prev.kind() {
        CredentialKind::ServerKey => {
            if let Some((expiring_value, expiry)) = &desired.expiring_server_key
                && expiring_value == prev.value()
                && let Some(new_value) = &desired.server_key
            {
                return RotationStatus::Deprecated {
                    new_value: new_value.clone(),
                    expiry: *expiry,
                };
            }
            match &desired.server_key {
                Some(new_value) if new_value == prev.value() => RotationStatus::Unchanged,
                Some(new_value) => RotationStatus::Superseded {
                    new_value: new_value.clone(),
                },
                None => RotationStatus::Unchanged,
            }
        }
        CredentialKind::MobileKey => match &desired.mobile_key {
            Some(new_value) if new_value == prev.value() => RotationStatus::Unchanged,
            Some(new_value) => RotationStatus::Superseded {
                new_value: new_value.clone(),
            },
            None => RotationStatus::Unchanged,
        },
        // Environment IDs never rotate independently of the environment
        // they identify; the comparison is a no-op for this kind.
        CredentialKind::EnvId => RotationStatus::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unchanged_when_same_value() {
        let prev = Credential::ServerKey("sdk-A".into());
        let desired = DesiredCredentials {
            server_key: Some("sdk-A".into()),
            ..Default::default()
        };
        assert_eq!(
            compare(&prev, None, &desired, Instant::now()),
            RotationStatus::Unchanged
        );
    }

    #[test]
    fn superseded_without_expiry() {
        let prev = Credential::ServerKey("sdk-old".into());
        let desired = DesiredCredentials {
            server_key: Some("sdk-new".into()),
            ..Default::default()
        };
        assert_eq!(
            compare(&prev, None, &desired, Instant::now()),
            RotationStatus::Superseded {
                new_value: "sdk-new".into()
            }
        );
    }

    #[test]
    fn deprecated_with_expiry() {
        let prev = Credential::ServerKey("sdk-old".into());
        let expiry = Instant::now() + Duration::from_secs(100);
        let desired = DesiredCredentials {
            server_key: Some("sdk-new".into()),
            expiring_server_key: Some(("sdk-old".into(), expiry)),
            ..Default::default()
        };
        assert_eq!(
            compare(&prev, None, &desired, Instant::now()),
            RotationStatus::Deprecated {
                new_value: "sdk-new".into(),
                expiry,
            }
        );
    }

    #[test]
    fn expired_after_deadline() {
        let prev = Credential::ServerKey("sdk-old".into());
        let expiry = Instant::now() - Duration::from_secs(1);
        let desired = DesiredCredentials {
            server_key: Some("sdk-new".into()),
            ..Default::default()
        };
        assert_eq!(
            compare(&prev, Some(expiry), &desired, Instant::now()),
            RotationStatus::Expired
        );
    }

    #[test]
    fn scoped_credential_unscope_clears_filter() {
        let sc = ScopedCredential::new("foo".into(), Credential::ServerKey("k".into()));
        let unscoped = sc.unscope();
        assert_eq!(unscoped.filter, "");
        assert_eq!(unscoped.credential, sc.credential);
    }

    #[test]
    fn env_id_credential_has_empty_auth_header() {
        let c = Credential::EnvId("env-123".into());
        assert_eq!(c.authorization_header_value(), "");
        assert!(c.is_defined());
    }
}
