//! The flag-evaluation algorithm is an external collaborator (spec §1): this
//! crate defines the trait the rest of the relay calls through, plus a
//! reference implementation sufficient for the bundled binary and tests.
//! A production deployment is expected to swap in a real evaluation engine.

use crate::context::EvalContext;
use crate::store::FlagRep;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reason {
    Off,
    Fallthrough,
    TargetMatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub value: serde_json::Value,
    pub variation: u64,
    pub reason: Reason,
}

pub trait Evaluator: Send + Sync {
    fn evaluate(&self, flag: &FlagRep, context: &EvalContext) -> EvalResult;
}

/// Reference evaluator: always returns the flag's configured value/variation
/// with a `Fallthrough` reason. Real targeting (rules, segments, rollout
/// buckets) is the evaluation engine's job, not the relay's.
pub struct BasicEvaluator;

impl Evaluator for BasicEvaluator {
    fn evaluate(&self, flag: &FlagRep, _context: &EvalContext) -> EvalResult {
        EvalResult {
            value: flag.value.clone(),
            variation: flag.variation,
            reason: Reason::Fallthrough,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::parse_context;
    use crate::store::ClientSideAvailability;

    #[test]
    fn basic_evaluator_returns_flag_value() {
        let flag = FlagRep {
            key: "flag1".into(),
            version: 1,
            value: serde_json::json!("on"),
            variation: 1,
            track_events: false,
            is_experiment: false,
            debug_events_until_date: None,
            client_side_availability: ClientSideAvailability::default(),
        };
        let ctx = parse_context(br#"{"key":"u1"}"#).unwrap();
        let result = BasicEvaluator.evaluate(&flag, &ctx);
        assert_eq!(result.value, serde_json::json!("on"));
        assert_eq!(result.variation, 1);
    }
}
