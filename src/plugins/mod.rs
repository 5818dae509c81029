//! Subsystems: the standard evaluator panel, the two gated call sites and
//! the command groups that drive them.

pub mod build;
pub mod capacity;
pub mod downside;
pub mod evaluate;
pub mod financial;
pub mod legal;
pub mod pipeline;
pub mod policy;
pub mod strategy;

use std::sync::Arc;

use crate::core::error::TribunalError;
use crate::core::registry::EvaluatorRegistry;

/// The five evaluators shipped with the crate, in panel order.
pub fn standard_registry() -> Result<EvaluatorRegistry, TribunalError> {
    EvaluatorRegistry::new()
        .with(Arc::new(financial::FinancialRisk))?
        .with(Arc::new(capacity::Capacity))?
        .with(Arc::new(strategy::StrategicFit))?
        .with(Arc::new(downside::DownsideRisk))?
        .with(Arc::new(legal::LegalEthics))
}
