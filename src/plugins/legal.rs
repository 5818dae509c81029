//! Legal and ethical red-lines.
//!
//! A pure boolean scan: every enabled guard whose violation flag is set adds
//! a reason and any reason denies. This evaluator never warns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::context::{FieldDefault, FieldSpec, TypedContext};
use crate::core::decision::Decision;
use crate::core::error::TribunalError;
use crate::core::evaluator::{Evaluator, Findings, Notes};
use crate::core::policy;

pub const NAME: &str = "legal";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegalGuards {
    pub forbid_unlicensed_practice: bool,
    pub forbid_tax_evasion: bool,
    pub forbid_fraudulent_misrepresentation: bool,
    pub require_written_consent_for_recording: bool,
}

impl Default for LegalGuards {
    fn default() -> Self {
        Self {
            forbid_unlicensed_practice: true,
            forbid_tax_evasion: true,
            forbid_fraudulent_misrepresentation: true,
            require_written_consent_for_recording: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EthicsGuards {
    pub forbid_exploiting_vulnerable: bool,
    pub forbid_misleading_marketing: bool,
    pub require_clear_disclosures: bool,
}

impl Default for EthicsGuards {
    fn default() -> Self {
        Self {
            forbid_exploiting_vulnerable: true,
            forbid_misleading_marketing: true,
            require_clear_disclosures: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegalPolicy {
    pub legal: LegalGuards,
    pub ethics: EthicsGuards,
}

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new(
        "requires_license_without_having_it",
        FieldDefault::Bool(false),
        "Action needs a license nobody holds",
    ),
    FieldSpec::new("tax_evasion", FieldDefault::Bool(false), "Hides income or fabricates expenses"),
    FieldSpec::new(
        "fraudulent_misrepresentation",
        FieldDefault::Bool(false),
        "Misstates material facts",
    ),
    FieldSpec::new(
        "recording_without_consent",
        FieldDefault::Bool(false),
        "Records people without required consent",
    ),
    FieldSpec::new(
        "exploits_vulnerable",
        FieldDefault::Bool(false),
        "Preys on vulnerable parties",
    ),
    FieldSpec::new(
        "misleading_marketing",
        FieldDefault::Bool(false),
        "Deceptive advertising claims",
    ),
    FieldSpec::new(
        "missing_disclosures",
        FieldDefault::Bool(false),
        "Required risk/terms/conflict disclosures absent",
    ),
];

const NOTES: Notes = Notes {
    approve: "No legal or ethical red-lines crossed.",
    warn: "No legal or ethical red-lines crossed.",
    deny: "Denied; legal or ethical red-line crossed.",
};

pub struct LegalEthics;

impl LegalEthics {
    /// `(context flag, guard enabled, reason)` for every red-line.
    fn red_lines(p: &LegalPolicy) -> [(&'static str, bool, &'static str); 7] {
        [
            (
                "requires_license_without_having_it",
                p.legal.forbid_unlicensed_practice,
                "Action requires a license that is not held.",
            ),
            (
                "tax_evasion",
                p.legal.forbid_tax_evasion,
                "Plan involves tax evasion.",
            ),
            (
                "fraudulent_misrepresentation",
                p.legal.forbid_fraudulent_misrepresentation,
                "Plan involves fraudulent misrepresentation of material facts.",
            ),
            (
                "recording_without_consent",
                p.legal.require_written_consent_for_recording,
                "Recording without required consent.",
            ),
            (
                "exploits_vulnerable",
                p.ethics.forbid_exploiting_vulnerable,
                "Plan exploits vulnerable people.",
            ),
            (
                "misleading_marketing",
                p.ethics.forbid_misleading_marketing,
                "Marketing is misleading.",
            ),
            (
                "missing_disclosures",
                p.ethics.require_clear_disclosures,
                "Required disclosures are missing.",
            ),
        ]
    }
}

impl Evaluator for LegalEthics {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Non-negotiable legal and ethical red-lines"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn default_policy(&self) -> Value {
        policy::to_body(&LegalPolicy::default())
    }

    fn check_policy(&self, body: &Value) -> Result<(), TribunalError> {
        policy::typed_patch::<LegalPolicy>(NAME, body).map(|_| ())
    }

    fn evaluate(&self, ctx: &TypedContext, body: &Value) -> Result<Decision, TribunalError> {
        let p: LegalPolicy = policy::typed(NAME, body)?;
        let mut findings = Findings::new();
        for (flag, guarded, reason) in Self::red_lines(&p) {
            if guarded && ctx.flag(flag)? {
                findings.block(reason);
            }
        }
        Ok(findings.into_decision(NOTES))
    }
}
