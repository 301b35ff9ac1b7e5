//! Draft and conflict model types.
//!
//! A draft is forked from an approved section revision (`draft_base_version`)
//! and carries its own monotonic `draft_version`. When the server's approved
//! version moves past the base, the draft enters a conflict state and must be
//! rebased before it can be published again.
//!
//! # Conflict state machine
//!
//! ```text
//! +-------+  save rejected: base < approved   +------------------------+
//! | clean | --------------------------------> | rebase_required        |
//! |       |                                   | (or blocked, server's  |
//! +---+---+                                   |  call)                 |
//!     ^                                       +-----------+------------+
//!     |                                                   | author reapplies
//!     | next successful manual save                       | rebased draft
//!     |                                       +-----------v------------+
//!     +-------------------------------------- | rebased                |
//!                                             +------------------------+
//! ```

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Conflict status of a draft relative to the server's approved version.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictState {
    /// Draft base matches the approved version; saves go through.
    #[default]
    Clean,
    /// Approved version moved ahead; the server produced a rebased draft the
    /// author must review and reapply.
    RebaseRequired,
    /// Approved version moved ahead and no automatic rebase was possible;
    /// the author must reconcile manually.
    Blocked,
    /// The author reapplied a rebased draft locally. Reset to `Clean` by the
    /// next successful manual save.
    Rebased,
}

impl ConflictState {
    /// Whether the draft is publishable without rebase negotiation.
    pub fn is_clean(&self) -> bool {
        matches!(self, ConflictState::Clean)
    }
}

/// Severity of a formatting annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnnotationSeverity {
    Info,
    Warning,
    Error,
}

/// A warning about markup the section pipeline cannot represent.
///
/// Produced by the (external) formatting detector; carried opaquely through
/// save requests and responses so the server can persist them with the draft.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattingAnnotation {
    /// Stable annotation identifier within the draft.
    pub id: String,
    /// Byte offset where the flagged span starts.
    pub start: usize,
    /// Byte offset one past the end of the flagged span.
    pub end: usize,
    /// Which mark triggered the warning (e.g. "table", "footnote").
    pub mark_type: String,
    pub message: String,
    pub severity: AnnotationSeverity,
}

/// What the client was doing when a conflict was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictTrigger {
    /// Pre-edit probe when the section was opened.
    Entry,
    /// A save request was rejected with a version mismatch.
    Save,
}

/// How a conflict was ultimately resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictResolution {
    /// Server rebased the draft automatically; author accepted it.
    AutoRebase,
    /// Author reapplied their edit against the newer approved content.
    ManualReapply,
    /// Author discarded the draft.
    Abandoned,
}

/// Append-only audit log entry for a detected conflict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEvent {
    /// When the conflict was detected (Unix millis).
    pub detected_at: u64,
    pub detected_during: ConflictTrigger,
    /// Approved version the draft believed it was forked from.
    pub previous_approved_version: u64,
    /// Approved version the server actually holds.
    pub latest_approved_version: u64,
    pub resolved_by: Option<ConflictResolution>,
    pub resolution_note: Option<String>,
}

/// Approved section content as the server last reported it.
///
/// Cached client-side keyed by approved version number whenever a conflict
/// response includes one; never evicted within a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshot {
    pub content: String,
    /// When the snapshot was captured (Unix millis).
    pub captured_at: u64,
}

/// Server-reconciled draft content accompanying a conflict response.
///
/// Presence of this payload is what turns a bare conflict into a rebase
/// offer: the client replaces local content with it and waits for the author
/// to confirm.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebasedDraft {
    pub draft_version: u64,
    pub content_markdown: String,
    #[serde(default)]
    pub formatting_annotations: Vec<FormattingAnnotation>,
}

/// Data-retention policy attached to a project.
///
/// Any non-null policy means drafts under the project require review before
/// long-term storage, which the client surfaces as a compliance warning on
/// every persisted snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub policy_id: String,
    /// Human-readable summary shown next to the compliance warning.
    pub description: String,
    /// Days after which retained drafts fall due for review.
    pub review_after_days: Option<u32>,
}

// ============================================================================
// Tests
// ============================================================================
