//! Decoding of evaluation contexts. Both the old-shape "user" JSON and the
//! new-shape "context" JSON must parse (spec §4.9); this module only
//! distinguishes the shape and extracts the fields the relay itself needs
//! (the `key`, for secure-mode hashing) — the evaluation algorithm itself
//! is a non-goal collaborator (spec §1).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextShape {
    /// New-shape context: has a top-level `kind` (single) or `kind: "multi"`.
    Context,
    /// Legacy user object: no `kind` field.
    LegacyUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalContext {
    pub raw: serde_json::Value,
    pub shape: ContextShapeSerde,
    pub key: Option<String>,
}

// serde can't derive on the plain enum above without round-tripping through
// a string; keep the wire-friendly copy separate from the Copy enum used in
// code so call sites can match on `ContextShape` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextShapeSerde {
    Context,
    LegacyUser,
}

impl From<ContextShapeSerde> for ContextShape {
    fn from(s: ContextShapeSerde) -> Self {
        match s {
            ContextShapeSerde::Context => ContextShape::Context,
            ContextShapeSerde::LegacyUser => ContextShape::LegacyUser,
        }
    }
}

/// Parse a request body as either shape. Fails with a human-readable reason
/// suitable for `RelayError::MalformedContext`.
pub fn parse_context(body: &[u8]) -> Result<EvalContext, String> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| format!("invalid JSON: {e}"))?;

    if !value.is_object() {
        return Err("context must be a JSON object".to_string());
    }

    let shape = if value.get("kind").is_some() {
        ContextShapeSerde::Context
    } else {
        ContextShapeSerde::LegacyUser
    };

    let key = extract_key(&value, shape);
    if key.is_none() {
        return Err("context is missing a `key`".to_string());
    }

    Ok(EvalContext {
        raw: value,
        shape,
        key,
    })
}

/// Decode a context carried as a base64 URL path segment (GET-style eval).
pub fn parse_context_base64(segment: &str) -> Result<EvalContext, String> {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(segment))
        .map_err(|e| format!("invalid base64: {e}"))?;
    parse_context(&decoded)
}

fn extract_key(value: &serde_json::Value, shape: ContextShapeSerde) -> Option<String> {
    match shape {
        ContextShapeSerde::LegacyUser => value.get("key")?.as_str().map(str::to_string),
        ContextShapeSerde::Context => {
            if value.get("kind").and_then(|k| k.as_str()) == Some("multi") {
                // Multi-context: use the first nested context's key for
                // secure-mode hashing, matching the canonical single-key
                // convention used by SDKs for multi-kind contexts.
                value
                    .as_object()?
                    .iter()
                    .find(|(k, _)| k.as_str() != "kind")
                    .and_then(|(_, v)| v.get("key"))
                    .and_then(|k| k.as_str())
                    .map(str::to_string)
            } else {
                value.get("key")?.as_str().map(str::to_string)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_user_shape() {
        let body = br#"{"key":"user-1","name":"Alice"}"#;
        let ctx = parse_context(body).unwrap();
        assert_eq!(ctx.key.as_deref(), Some("user-1"));
        assert_eq!(ContextShape::from(ctx.shape), ContextShape::LegacyUser);
    }

    #[test]
    fn parses_new_context_shape() {
        let body = br#"{"kind":"user","key":"user-2"}"#;
        let ctx = parse_context(body).unwrap();
        assert_eq!(ctx.key.as_deref(), Some("user-2"));
        assert_eq!(ContextShape::from(ctx.shape), ContextShape::Context);
    }

    #[test]
    fn parses_multi_context_shape() {
        let body = br#"{"kind":"multi","user":{"key":"user-3"},"org":{"key":"org-1"}}"#;
        let ctx = parse_context(body).unwrap();
        assert_eq!(ctx.key.as_deref(), Some("user-3"));
    }

    #[test]
    fn rejects_missing_key() {
        let body = br#"{"kind":"user"}"#;
        assert!(parse_context(body).is_err());
    }

    #[test]
    fn rejects_non_object() {
        let body = br#"[1,2,3]"#;
        assert!(parse_context(body).is_err());
    }

    #[test]
    fn decodes_base64_segment() {
        use base64::Engine;
        let json = br#"{"key":"user-1"}"#;
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json);
        let ctx = parse_context_base64(&encoded).unwrap();
        assert_eq!(ctx.key.as_deref(), Some("user-1"));
    }
}
