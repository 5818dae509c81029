//! Orchestrator: runs a panel of evaluators over one context and reduces
//! their decisions to a single verdict.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::context::Context;
use crate::core::decision::{AggregateDecision, CheckResult};
use crate::core::error::TribunalError;
use crate::core::evaluator::EvaluatorInfo;
use crate::core::policy::{PolicyPatch, PolicyRecord, PolicyRevision};
use crate::core::policy_store::PolicyStore;
use crate::core::registry::EvaluatorRegistry;

pub struct Orchestrator {
    registry: EvaluatorRegistry,
    store: Arc<dyn PolicyStore>,
}

impl Orchestrator {
    /// Seeds default policies for evaluators the store has not seen yet.
    pub fn new(
        registry: EvaluatorRegistry,
        store: Arc<dyn PolicyStore>,
    ) -> Result<Self, TribunalError> {
        store.seed_defaults(&registry.defaults())?;
        Ok(Self { registry, store })
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    pub fn evaluators(&self) -> Vec<EvaluatorInfo> {
        self.registry.infos()
    }

    /// Evaluates `ctx` with `requested` evaluators (all when `None` or empty).
    ///
    /// Input problems (unknown or repeated evaluator, malformed context,
    /// missing policy) are reported before any evaluator runs. An evaluator
    /// error or contract breach fails the whole call; there is no partial
    /// aggregate.
    pub fn evaluate_all(
        &self,
        ctx: &Context,
        requested: Option<&[String]>,
    ) -> Result<AggregateDecision, TribunalError> {
        let evaluators = self.registry.resolve(requested)?;
        let typed = self.registry.schema_for(&evaluators)?.validate(ctx)?;

        // Fresh read on every call; a committed patch applies to the next evaluation.
        let policies = evaluators
            .iter()
            .map(|e| self.store.get(e.name()))
            .collect::<Result<Vec<PolicyRecord>, _>>()?;

        let mut checks = Vec::with_capacity(evaluators.len());
        for (evaluator, policy) in evaluators.iter().zip(&policies) {
            let name = evaluator.name();
            let decision = evaluator
                .evaluate(&typed, &policy.body)
                .map_err(|e| match e {
                    TribunalError::EvaluatorFailure { .. } => e,
                    other => TribunalError::evaluator(name, other.to_string()),
                })?;
            decision
                .check_contract()
                .map_err(|msg| TribunalError::evaluator(name, msg))?;
            debug!(
                evaluator = name,
                policy_version = policy.version,
                allowed = decision.allowed,
                severity = %decision.severity,
                "evaluator decided"
            );
            checks.push(CheckResult {
                evaluator: name.to_string(),
                decision,
            });
        }

        let aggregate = AggregateDecision::from_checks(checks);
        info!(
            context_type = %ctx.context_type,
            overall_allowed = aggregate.overall_allowed,
            worst_severity = %aggregate.worst_severity,
            blocked_by = ?aggregate.blocked_by,
            "evaluation complete"
        );
        Ok(aggregate)
    }

    pub fn list_policies(&self) -> Result<BTreeMap<String, PolicyRecord>, TribunalError> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|r| self.registry.get(&r.evaluator).is_some())
            .map(|r| (r.evaluator.clone(), r))
            .collect())
    }

    pub fn get_policy(&self, evaluator: &str) -> Result<PolicyRecord, TribunalError> {
        if self.registry.get(evaluator).is_none() {
            return Err(TribunalError::PolicyNotFound(evaluator.to_string()));
        }
        self.store.get(evaluator)
    }

    /// Partial patch of one evaluator's policy; returns the committed record.
    pub fn patch_policy(
        &self,
        evaluator: &str,
        patch: &PolicyPatch,
    ) -> Result<PolicyRecord, TribunalError> {
        let owner = self
            .registry
            .get(evaluator)
            .ok_or_else(|| TribunalError::PolicyNotFound(evaluator.to_string()))?;
        let record = self
            .store
            .patch(evaluator, patch, &|body: &Value| owner.check_policy(body))?;
        info!(
            evaluator,
            version = record.version,
            actor = %patch.actor,
            "policy patched"
        );
        Ok(record)
    }

    pub fn policy_history(&self, evaluator: &str) -> Result<Vec<PolicyRevision>, TribunalError> {
        if self.registry.get(evaluator).is_none() {
            return Err(TribunalError::PolicyNotFound(evaluator.to_string()));
        }
        self.store.history(evaluator)
    }
}
