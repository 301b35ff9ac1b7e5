//! Bundle submission types.
//!
//! A bundle is a set of per-section patches applied together in one request
//! to the persistence backend. The backend reports which sections it actually
//! applied; the client must not assume partial success beyond that list.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ids::{AuthorId, DocumentId};
use crate::patch::SectionPatch;

/// Composite identity of a pending local draft:
/// (project, document, section title, author).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftKey {
    pub project_slug: String,
    pub document_id: DocumentId,
    pub section_title: String,
    pub author_id: AuthorId,
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.project_slug,
            self.document_id.short(),
            self.section_title,
            self.author_id.short()
        )
    }
}

/// Quality gate verdict for one section submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Fail,
}

/// Severity of a quality gate issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GateSeverity {
    Blocker,
    Warning,
}

/// One issue raised by a quality gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateIssue {
    pub gate_id: String,
    pub severity: GateSeverity,
    pub message: String,
}

impl QualityGateIssue {
    pub fn blocker(gate_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            severity: GateSeverity::Blocker,
            message: message.into(),
        }
    }

    pub fn warning(gate_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            severity: GateSeverity::Warning,
            message: message.into(),
        }
    }
}

/// Quality gate report attached to a bundle submission.
///
/// Status is `Fail` iff any issue is a blocker; warnings alone still pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateReport {
    pub status: GateStatus,
    #[serde(default)]
    pub issues: Vec<QualityGateIssue>,
}

impl QualityGateReport {
    /// Build a report from issues, deriving the status.
    pub fn from_issues(issues: Vec<QualityGateIssue>) -> Self {
        let status = if issues.iter().any(|i| i.severity == GateSeverity::Blocker) {
            GateStatus::Fail
        } else {
            GateStatus::Pass
        };
        Self { status, issues }
    }

    pub fn passing() -> Self {
        Self {
            status: GateStatus::Pass,
            issues: Vec::new(),
        }
    }
}

/// One section's contribution to a bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftBundleSubmission {
    pub draft_key: DraftKey,
    /// Slash-separated path of the section within the document outline.
    pub section_path: String,
    /// Patch against the named baseline revision.
    pub patch: SectionPatch,
    /// Baseline label, e.g. `rev-6`.
    pub baseline_version: String,
    pub quality_gate_report: QualityGateReport,
}

/// Full bundle request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    pub submitted_by: AuthorId,
    pub sections: Vec<DraftBundleSubmission>,
}

/// Backend's answer: which sections were actually applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleOutcome {
    pub document_id: DocumentId,
    #[serde(default)]
    pub applied_sections: Vec<DraftKey>,
}

impl BundleOutcome {
    /// Whether every submitted key appears in the applied set.
    pub fn covers<'a>(&self, keys: impl IntoIterator<Item = &'a DraftKey>) -> bool {
        keys.into_iter()
            .all(|k| self.applied_sections.contains(k))
    }
}

/// Baseline label for a given approved version, e.g. `rev-6`.
pub fn baseline_label(version: u64) -> String {
    format!("rev-{version}")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(title: &str) -> DraftKey {
        DraftKey {
            project_slug: "atlas".to_string(),
            document_id: DocumentId::nil(),
            section_title: title.to_string(),
            author_id: AuthorId::nil(),
        }
    }

    #[test]
    fn test_gate_report_fails_on_blocker() {
        let report = QualityGateReport::from_issues(vec![
            QualityGateIssue::warning("retention", "policy active"),
            QualityGateIssue::blocker("conflict", "unresolved conflict"),
        ]);
        assert_eq!(report.status, GateStatus::Fail);
    }

    #[test]
    fn test_gate_report_warnings_still_pass() {
        let report =
            QualityGateReport::from_issues(vec![QualityGateIssue::warning("retention", "x")]);
        assert_eq!(report.status, GateStatus::Pass);

        assert_eq!(QualityGateReport::from_issues(Vec::new()).status, GateStatus::Pass);
    }

    #[test]
    fn test_outcome_coverage() {
        let outcome = BundleOutcome {
            document_id: DocumentId::nil(),
            applied_sections: vec![key("scope"), key("terms")],
        };
        assert!(outcome.covers([&key("scope")]));
        assert!(outcome.covers([&key("scope"), &key("terms")]));
        assert!(!outcome.covers([&key("scope"), &key("appendix")]));
    }

    #[test]
    fn test_baseline_label() {
        assert_eq!(baseline_label(6), "rev-6");
    }

    #[test]
    fn test_submission_json_roundtrip() {
        let sub = DraftBundleSubmission {
            draft_key: key("scope"),
            section_path: "contract/scope".to_string(),
            patch: SectionPatch::replace("new body"),
            baseline_version: baseline_label(6),
            quality_gate_report: QualityGateReport::passing(),
        };
        let json = serde_json::to_string(&sub).unwrap();
        let parsed: DraftBundleSubmission = serde_json::from_str(&json).unwrap();
        assert_eq!(sub, parsed);
        assert!(json.contains("qualityGateReport"));
    }
}
