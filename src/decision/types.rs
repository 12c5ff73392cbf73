//! Decision value objects (spec §3, Design Notes §9): a single `Decision`
//! record replaces the original's mixed `(value, reasons)` tuple returns.

use serde::Serialize;

use crate::config::datafile::{Experiment, Variation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionSource {
    FeatureTest,
    Rollout,
    Holdout,
    Experiment,
}

/// The outcome of `decide(flag, user, options)` (spec §3, §4.5). A decision
/// with `variation: None` is a "null decision" — the flag resolves to its
/// off/default state.
#[derive(Debug, Clone)]
pub struct Decision {
    pub experiment: Option<Experiment>,
    pub variation: Option<Variation>,
    pub source: DecisionSource,
    pub reasons: Vec<String>,
}

impl Decision {
    pub fn null(source: DecisionSource) -> Self {
        Decision {
            experiment: None,
            variation: None,
            source,
            reasons: Vec::new(),
        }
    }

    pub fn variation(experiment: Experiment, variation: Variation, source: DecisionSource) -> Self {
        Decision {
            experiment: Some(experiment),
            variation: Some(variation),
            source,
            reasons: Vec::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.variation.is_none()
    }

    pub fn with_reason(mut self, include_reasons: bool, reason: impl Into<String>) -> Self {
        if include_reasons {
            self.reasons.push(reason.into());
        }
        self
    }
}
