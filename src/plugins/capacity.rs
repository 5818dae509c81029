//! Capacity and sustainability evaluator.
//!
//! Two bands per workload measure: a preferred band whose edge warns, and a
//! higher hard cap that denies once crossed. Emotional chaos on its own
//! warns; chaos on top of stress above comfort denies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::context::{FieldDefault, FieldSpec, TypedContext};
use crate::core::decision::Decision;
use crate::core::error::TribunalError;
use crate::core::evaluator::{Evaluator, Findings, Notes};
use crate::core::policy;

pub const NAME: &str = "capacity";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Energy {
    /// Preferred weekly ceiling; reaching it warns.
    pub max_hours_per_week: i64,
    /// Going beyond this denies.
    pub hard_cap_hours_per_week: i64,
    pub max_parallel_projects: i64,
}

impl Default for Energy {
    fn default() -> Self {
        Self {
            max_hours_per_week: 40,
            hard_cap_hours_per_week: 55,
            max_parallel_projects: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Family {
    pub protect_evenings: bool,
    pub protect_weekends: bool,
    /// When set, sprints longer than `max_sprint_weeks` are flagged.
    pub allow_short_sprints: bool,
    pub max_sprint_weeks: i64,
}

impl Default for Family {
    fn default() -> Self {
        Self {
            protect_evenings: true,
            protect_weekends: true,
            allow_short_sprints: true,
            max_sprint_weeks: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stress {
    pub max_stress_level: i64,
    pub hard_cap_stress_level: i64,
    pub chaos_alarm_level: f64,
}

impl Default for Stress {
    fn default() -> Self {
        Self {
            max_stress_level: 7,
            hard_cap_stress_level: 9,
            chaos_alarm_level: 8.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapacityPolicy {
    pub energy: Energy,
    pub family: Family,
    pub stress: Stress,
}

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("hours_per_week", FieldDefault::Integer(0), "Planned weekly hours"),
    FieldSpec::new("parallel_projects", FieldDefault::Integer(0), "Major projects active at once"),
    FieldSpec::new("uses_evenings", FieldDefault::Bool(false), "Plan consumes most evenings"),
    FieldSpec::new("uses_weekends", FieldDefault::Bool(false), "Plan consumes weekends"),
    FieldSpec::new("sprint_weeks", FieldDefault::Integer(0), "Length of an intense sprint"),
    FieldSpec::new("stress_level", FieldDefault::Integer(0), "Stress, 0-10"),
    FieldSpec::new("chaos_factor", FieldDefault::Number(0.0), "Emotional chaos, 0-10"),
];

const NOTES: Notes = Notes {
    approve: "Plan is sustainable.",
    warn: "Allowed with capacity warnings.",
    deny: "Denied; plan is not sustainable.",
};

pub struct Capacity;

impl Evaluator for Capacity {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Workload, family time and stress against preferred bands and hard caps"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn default_policy(&self) -> Value {
        policy::to_body(&CapacityPolicy::default())
    }

    fn check_policy(&self, body: &Value) -> Result<(), TribunalError> {
        let p: CapacityPolicy = policy::typed_patch(NAME, body)?;
        if p.energy.hard_cap_hours_per_week < p.energy.max_hours_per_week {
            return Err(TribunalError::ValidationError(format!(
                "energy.hard_cap_hours_per_week ({}) is below energy.max_hours_per_week ({})",
                p.energy.hard_cap_hours_per_week, p.energy.max_hours_per_week
            )));
        }
        if p.stress.hard_cap_stress_level < p.stress.max_stress_level {
            return Err(TribunalError::ValidationError(format!(
                "stress.hard_cap_stress_level ({}) is below stress.max_stress_level ({})",
                p.stress.hard_cap_stress_level, p.stress.max_stress_level
            )));
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &TypedContext, body: &Value) -> Result<Decision, TribunalError> {
        let p: CapacityPolicy = policy::typed(NAME, body)?;
        let hours = ctx.integer("hours_per_week")?;
        let parallel = ctx.integer("parallel_projects")?;
        let sprint_weeks = ctx.integer("sprint_weeks")?;
        let stress = ctx.integer("stress_level")?;
        let chaos = ctx.number("chaos_factor")?;

        let mut findings = Findings::new();

        if hours > p.energy.hard_cap_hours_per_week {
            findings.block(format!(
                "Requested {}h/week exceeds HARD cap of {}h/week.",
                hours, p.energy.hard_cap_hours_per_week
            ));
        } else if hours >= p.energy.max_hours_per_week {
            findings.warn(format!(
                "Requested {}h/week reaches preferred max of {}h/week.",
                hours, p.energy.max_hours_per_week
            ));
        }
        if parallel > p.energy.max_parallel_projects {
            findings.warn(format!(
                "{} parallel projects exceeds the limit of {}.",
                parallel, p.energy.max_parallel_projects
            ));
        }

        if p.family.protect_evenings && ctx.flag("uses_evenings")? {
            findings.warn("Work plan consumes most evenings; evenings are protected.");
        }
        if p.family.protect_weekends && ctx.flag("uses_weekends")? {
            findings.warn("Work plan consumes weekends; weekends are protected.");
        }
        if p.family.allow_short_sprints && sprint_weeks > p.family.max_sprint_weeks {
            findings.warn(format!(
                "Sprint of {} weeks is longer than the {} weeks allowed.",
                sprint_weeks, p.family.max_sprint_weeks
            ));
        }

        let over_comfort = stress > p.stress.max_stress_level;
        if stress > p.stress.hard_cap_stress_level {
            findings.block(format!(
                "Stress level {}/10 exceeds HARD cap {}/10.",
                stress, p.stress.hard_cap_stress_level
            ));
        } else if over_comfort {
            findings.warn(format!(
                "Stress level {}/10 exceeds comfort level {}/10.",
                stress, p.stress.max_stress_level
            ));
        }
        if chaos >= p.stress.chaos_alarm_level {
            if over_comfort {
                findings.block(format!(
                    "Chaos factor {}/10 on top of stress {}/10 indicates unstable conditions.",
                    chaos, stress
                ));
            } else {
                findings.warn(format!(
                    "Chaos factor {}/10 is at or above the alarm level {}/10.",
                    chaos, p.stress.chaos_alarm_level
                ));
            }
        }

        Ok(findings.into_decision(NOTES))
    }
}
