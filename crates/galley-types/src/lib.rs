//! Shared draft, conflict, and bundle types for Galley.
//!
//! This crate is the wire-contract foundation: typed IDs, the draft/conflict
//! data model, the save / conflict-check protocol, section patches, and
//! bundle submission shapes. It has **no internal galley dependencies** — a
//! pure leaf crate that other crates build on, with no I/O.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Project (slug)
//!     └── Document (DocumentId)
//!             └── Section (SectionId, approved version per section)
//!                     └── Draft (DraftId, forked at draft_base_version)
//!                             └── authored by Author (AuthorId)
//!
//! Draft ──rejected save──▶ ConflictPayload (latest approved version,
//!                           optional RebasedDraft, ConflictEvent log)
//! Draft ──manual save────▶ DraftBundleSubmission (DraftKey + SectionPatch)
//! ```
//!
//! # Key Types
//!
//! |------------------------|---------------------------------------------|
//! | Type                   | Purpose                                     |
//! |------------------------|---------------------------------------------|
//! | [`ConflictState`]      | clean / rebase_required / rebased / blocked |
//! | [`ConflictPayload`]    | Conflict-shaped server response             |
//! | [`RebasedDraft`]       | Server-reconciled content offer             |
//! | [`ConflictEvent`]      | Audit log entry for a detected conflict     |
//! | [`SaveDraftRequest`]   | Save wire request                           |
//! | [`SaveDraftResponse`]  | Save wire response                          |
//! | [`SectionPatch`]       | Ordered ops against a baseline revision     |
//! | [`DraftKey`]           | (project, document, section, author)        |
//! | [`DraftBundleSubmission`] | One section's slice of a bundle          |
//! |------------------------|---------------------------------------------|

pub mod bundle;
pub mod draft;
pub mod ids;
pub mod patch;
pub mod protocol;

// Re-export primary types at crate root for convenience.
pub use bundle::{
    BundleOutcome, BundleRequest, DraftBundleSubmission, DraftKey, GateSeverity, GateStatus,
    QualityGateIssue, QualityGateReport, baseline_label,
};
pub use draft::{
    AnnotationSeverity, ConflictEvent, ConflictResolution, ConflictState, ConflictTrigger,
    FormattingAnnotation, RebasedDraft, RetentionPolicy, ServerSnapshot,
};
pub use ids::{AuthorId, DocumentId, DraftId, RequestId, SectionId};
pub use patch::{PatchError, PatchOp, SectionPatch};
pub use protocol::{
    ConflictCheckRequest, ConflictPayload, DiffKind, DiffSegment, SaveDraftRequest,
    SaveDraftResponse, SectionDiff,
};

/// Current time as Unix milliseconds. Used by constructors throughout the
/// workspace.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
