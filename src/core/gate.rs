//! The call-site guard.
//!
//! A gate evaluates a context, records the aggregate, and only then lets the
//! caller near the protected action. On denial the action is never invoked.
//! Evaluation errors propagate: a gate that cannot decide does not open.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::context::Context;
use crate::core::decision::AggregateDecision;
use crate::core::decision_log::{DecisionLog, DecisionRecord, DisabledDecisionLog, Recorded};
use crate::core::error::TribunalError;
use crate::core::orchestrator::Orchestrator;

#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    Approved(AggregateDecision),
    Denied(AggregateDecision),
}

impl GateVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, GateVerdict::Approved(_))
    }

    pub fn decision(&self) -> &AggregateDecision {
        match self {
            GateVerdict::Approved(d) | GateVerdict::Denied(d) => d,
        }
    }

    pub fn into_decision(self) -> AggregateDecision {
        match self {
            GateVerdict::Approved(d) | GateVerdict::Denied(d) => d,
        }
    }
}

/// Result of [`Gate::guard`].
#[derive(Debug)]
pub enum Guarded<T> {
    Denied(AggregateDecision),
    Proceeded {
        governance: AggregateDecision,
        output: T,
    },
}

pub struct Gate {
    orchestrator: Arc<Orchestrator>,
    log: Arc<dyn DecisionLog>,
    default_evaluators: Vec<String>,
}

impl Gate {
    pub fn new(orchestrator: Arc<Orchestrator>, log: Arc<dyn DecisionLog>) -> Self {
        Self {
            orchestrator,
            log,
            default_evaluators: Vec::new(),
        }
    }

    /// Gate that keeps no decision record.
    pub fn unlogged(orchestrator: Arc<Orchestrator>) -> Self {
        Self::new(orchestrator, Arc::new(DisabledDecisionLog))
    }

    /// Panel used when a request names no evaluators. Empty means all.
    pub fn with_default_evaluators(mut self, names: Vec<String>) -> Self {
        self.default_evaluators = names;
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn check(
        &self,
        ctx: &Context,
        evaluators: Option<&[String]>,
    ) -> Result<GateVerdict, TribunalError> {
        let requested = match evaluators {
            Some(names) if !names.is_empty() => Some(names),
            _ if !self.default_evaluators.is_empty() => Some(self.default_evaluators.as_slice()),
            _ => None,
        };
        let decision = self.orchestrator.evaluate_all(ctx, requested)?;

        match self.log.record(&DecisionRecord::new(ctx, &decision)) {
            Recorded::Stored { event_id } => debug!(%event_id, "decision recorded"),
            Recorded::Unavailable(reason) => {
                warn!(context_type = %ctx.context_type, %reason, "decision not recorded")
            }
        }

        Ok(if decision.overall_allowed {
            GateVerdict::Approved(decision)
        } else {
            GateVerdict::Denied(decision)
        })
    }

    /// Runs `action` only when the panel approves. The action receives the
    /// approving aggregate; its error is returned unchanged.
    pub fn guard<T, F>(
        &self,
        ctx: &Context,
        evaluators: Option<&[String]>,
        action: F,
    ) -> Result<Guarded<T>, TribunalError>
    where
        F: FnOnce(&AggregateDecision) -> Result<T, TribunalError>,
    {
        match self.check(ctx, evaluators)? {
            GateVerdict::Denied(decision) => Ok(Guarded::Denied(decision)),
            GateVerdict::Approved(governance) => {
                let output = action(&governance)?;
                Ok(Guarded::Proceeded { governance, output })
            }
        }
    }
}
