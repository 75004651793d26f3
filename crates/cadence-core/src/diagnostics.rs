//! Advisory invariant checks over a snapshot.
//!
//! Findings are reported and logged, never acted on. The snapshot is not
//! modified.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::dedupe::duplicate_keys;
use crate::model::{OccurrenceStatus, Snapshot, TimeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    DuplicateKey,
    UnknownAction,
    UnknownRule,
    OrphanRule,
    UnboundedPastRow,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub kind: FindingKind,
    /// Occurrence or rule id the finding is about.
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.subject, self.message)
    }
}

/// Check `snapshot` for:
/// - duplicate `(action, date, slot)` keys
/// - occurrences referencing unknown actions or rules
/// - rules referencing unknown actions
/// - planned rows dated before `now` with no resolvable end
/// - conflict-flagged rows (informational)
pub fn audit(snapshot: &Snapshot, now: NaiveDateTime) -> Vec<Finding> {
    let action_ids: HashSet<&str> = snapshot.actions.iter().map(|a| a.id.as_str()).collect();
    let rule_ids: HashSet<&str> = snapshot.rules.iter().map(|r| r.id.as_str()).collect();
    let mut findings = Vec::new();

    for (key, ids) in duplicate_keys(&snapshot.occurrences) {
        findings.push(Finding {
            severity: Severity::Warning,
            kind: FindingKind::DuplicateKey,
            subject: ids.join(","),
            message: format!("{} rows share {} {} {}", ids.len(), key.action_id, key.date, key.slot),
        });
    }

    for occ in &snapshot.occurrences {
        if !action_ids.contains(occ.action_id.as_str()) {
            findings.push(Finding {
                severity: Severity::Warning,
                kind: FindingKind::UnknownAction,
                subject: occ.id.clone(),
                message: format!("references unknown action '{}'", occ.action_id),
            });
        }
        if let Some(rule_id) = occ.rule_id.as_deref() {
            if !rule_ids.contains(rule_id) {
                findings.push(Finding {
                    severity: Severity::Warning,
                    kind: FindingKind::UnknownRule,
                    subject: occ.id.clone(),
                    message: format!("references unknown rule '{rule_id}'"),
                });
            }
        }
        let has_bounds = occ.effective_start().is_some() || occ.window_end.is_some();
        let expects_time =
            matches!(occ.time_type, Some(TimeType::Fixed | TimeType::Window)) || occ.window_start.is_some();
        if occ.status == OccurrenceStatus::Planned && occ.date < now.date() && !has_bounds && expects_time {
            findings.push(Finding {
                severity: Severity::Warning,
                kind: FindingKind::UnboundedPastRow,
                subject: occ.id.clone(),
                message: format!("planned row on past date {} has no resolvable end", occ.date),
            });
        }
        if occ.conflict {
            findings.push(Finding {
                severity: Severity::Info,
                kind: FindingKind::Conflict,
                subject: occ.id.clone(),
                message: format!("placement conflict on {}", occ.date),
            });
        }
    }

    for rule in &snapshot.rules {
        if !action_ids.contains(rule.action_id.as_str()) {
            findings.push(Finding {
                severity: Severity::Warning,
                kind: FindingKind::OrphanRule,
                subject: rule.id.clone(),
                message: format!("rule belongs to unknown action '{}'", rule.action_id),
            });
        }
    }

    for finding in &findings {
        match finding.severity {
            Severity::Warning => tracing::warn!(kind = ?finding.kind, subject = %finding.subject, "{}", finding.message),
            Severity::Info => tracing::debug!(kind = ?finding.kind, subject = %finding.subject, "{}", finding.message),
        }
    }
    findings
}
