//! Conflict resolution protocol — the save / conflict-check wire contract.
//!
//! Shared between the client engine and the remote section service. A save
//! either succeeds with a [`SaveDraftResponse`] or is rejected at the
//! transport level (409) with a [`ConflictPayload`]. Conflict checks return
//! the same conflict-shaped payload unconditionally; `status: clean` is a
//! valid answer, not an error.
//!
//! Requests MAY be correlated by a client-generated request id header.
//! Servers SHOULD echo a correlation id back; the client adopts a differing
//! server-assigned id for subsequent requests.

use serde::{Deserialize, Serialize};

use crate::draft::{
    ConflictEvent, ConflictState, ConflictTrigger, FormattingAnnotation, RebasedDraft,
    ServerSnapshot,
};
use crate::ids::{DraftId, RequestId, SectionId};

/// Body of a draft save request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraftRequest {
    pub content_markdown: String,
    /// Version the client intends this save to become (current + 1).
    pub draft_version: u64,
    /// Approved version the draft was forked from.
    pub draft_base_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formatting_annotations: Vec<FormattingAnnotation>,
}

/// Successful save response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraftResponse {
    pub draft_id: DraftId,
    pub section_id: SectionId,
    /// Server-confirmed draft version (equals the requested version).
    pub draft_version: u64,
    pub conflict_state: ConflictState,
    #[serde(default)]
    pub formatting_annotations: Vec<FormattingAnnotation>,
    /// Server timestamp of the save (Unix millis).
    pub saved_at: u64,
    pub saved_by: String,
    #[serde(default)]
    pub summary_note: String,
}

/// Conflict-shaped response body (HTTP 409 on save, 200 on explicit check).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPayload {
    pub status: ConflictState,
    /// The server's current approved version.
    pub latest_approved_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebased_draft: Option<RebasedDraft>,
    /// Approved content at `latest_approved_version`, when the server chose
    /// to include it. Cached client-side keyed by version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_snapshot: Option<ServerSnapshot>,
    #[serde(default)]
    pub events: Vec<ConflictEvent>,
}

impl ConflictPayload {
    /// A clean result for `version` — the "no conflict" answer of an
    /// explicit conflict check.
    pub fn clean(latest_approved_version: u64) -> Self {
        Self {
            status: ConflictState::Clean,
            latest_approved_version,
            conflict_reason: None,
            rebased_draft: None,
            server_snapshot: None,
            events: Vec::new(),
        }
    }
}

/// Body of an explicit pre-save conflict probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictCheckRequest {
    pub draft_version: u64,
    pub draft_base_version: u64,
    /// Approved version the client last observed.
    pub approved_version: u64,
    pub request_id: RequestId,
    pub triggered_by: ConflictTrigger,
}

/// Kind of a diff segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Unchanged,
    Added,
    Removed,
}

/// One run of a precomputed draft-vs-approved diff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSegment {
    pub kind: DiffKind,
    pub text: String,
}

/// Server-computed diff between a draft and the approved content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDiff {
    pub approved_version: u64,
    pub draft_version: u64,
    #[serde(default)]
    pub segments: Vec<DiffSegment>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_request_omits_empty_optionals() {
        let req = SaveDraftRequest {
            content_markdown: "body".to_string(),
            draft_version: 2,
            draft_base_version: 5,
            summary_note: None,
            formatting_annotations: Vec::new(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("summaryNote"));
        assert!(!json.contains("formattingAnnotations"));
        assert!(json.contains("draftBaseVersion"));
    }

    #[test]
    fn test_save_response_roundtrip() {
        let resp = SaveDraftResponse {
            draft_id: DraftId::new(),
            section_id: SectionId::new(),
            draft_version: 3,
            conflict_state: ConflictState::Clean,
            formatting_annotations: Vec::new(),
            saved_at: 1_700_000_000_000,
            saved_by: "imani".to_string(),
            summary_note: String::new(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: SaveDraftResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, parsed);
    }

    #[test]
    fn test_conflict_payload_clean_constructor() {
        let payload = ConflictPayload::clean(9);
        assert!(payload.status.is_clean());
        assert_eq!(payload.latest_approved_version, 9);
        assert!(payload.rebased_draft.is_none());
        assert!(payload.events.is_empty());
    }

    #[test]
    fn test_conflict_payload_parses_sparse_body() {
        // Minimal server body: just status and version
        let json = r#"{"status":"blocked","latestApprovedVersion":12}"#;
        let parsed: ConflictPayload = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, ConflictState::Blocked);
        assert_eq!(parsed.latest_approved_version, 12);
        assert!(parsed.server_snapshot.is_none());
    }

    #[test]
    fn test_conflict_check_request_wire_names() {
        let req = ConflictCheckRequest {
            draft_version: 1,
            draft_base_version: 5,
            approved_version: 5,
            request_id: RequestId::new(),
            triggered_by: ConflictTrigger::Entry,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"triggeredBy\":\"entry\""));
        assert!(json.contains("approvedVersion"));
    }

    #[test]
    fn test_section_diff_roundtrip() {
        let diff = SectionDiff {
            approved_version: 6,
            draft_version: 2,
            segments: vec![
                DiffSegment {
                    kind: DiffKind::Unchanged,
                    text: "intro ".to_string(),
                },
                DiffSegment {
                    kind: DiffKind::Added,
                    text: "new clause".to_string(),
                },
            ],
        };
        let json = serde_json::to_string(&diff).unwrap();
        let parsed: SectionDiff = serde_json::from_str(&json).unwrap();
        assert_eq!(diff, parsed);
    }
}
