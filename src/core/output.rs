//! Terminal rendering for CLI surfaces.
//!
//! Text output is for people; anything scripted should use `--format json`,
//! which goes through [`crate::core::time::command_envelope`] instead.

use colored::Colorize;

use crate::core::decision::{AggregateDecision, Severity};

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Info => "info".green(),
        Severity::Warn => "warn".yellow(),
        Severity::Critical => "critical".red().bold(),
    }
}

/// Verdict header, one line per check, reasons indented beneath.
pub fn render_aggregate(decision: &AggregateDecision) -> String {
    let mut out = Vec::new();
    let verdict = if decision.overall_allowed {
        "ALLOWED".green().bold()
    } else {
        "DENIED".red().bold()
    };
    out.push(format!(
        "{} ({}) {}",
        verdict,
        severity_label(decision.worst_severity),
        decision.summary
    ));
    for check in &decision.checks {
        let d = &check.decision;
        let marker = if d.is_hard_block() {
            "✗".red()
        } else if d.severity == Severity::Info {
            "✓".green()
        } else {
            "!".yellow()
        };
        let notes = d.notes.as_deref().map(|n| compact_line(n, 80)).unwrap_or_default();
        out.push(format!(
            "  {} {:<10} {:<8} {}",
            marker,
            check.evaluator,
            severity_label(d.severity),
            notes
        ));
        for reason in &d.reasons {
            out.push(format!("      - {}", compact_line(reason, 120)));
        }
    }
    out.join("\n")
}
