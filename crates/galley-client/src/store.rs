//! Local draft persistence seam.
//!
//! Pending drafts are stored per (document, section, author) — one author
//! per browser tab, so the store is plain overwrite-by-key with no client
//! locking. The engine persists the current content alongside its compact
//! patch form on every autosave flush, and retires entries only once a
//! bundle confirms the section was applied.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use galley_types::{AuthorId, DocumentId, DraftId, DraftKey, SectionId, SectionPatch};

/// Status tag a pending draft is persisted under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    /// Clean draft awaiting publication.
    Draft,
    /// Draft carrying an unresolved or freshly-rebased conflict.
    Conflict,
}

/// One persisted pending draft.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDraft {
    pub key: DraftKey,
    pub section_id: SectionId,
    /// Outline path, carried so bundle assembly doesn't need a section
    /// lookup.
    pub section_path: String,
    /// Server-assigned draft id, when the draft has been saved remotely.
    pub draft_id: Option<DraftId>,
    /// Draft version at persistence time (restored on recovery).
    pub draft_version: u64,
    /// Approved version this draft is forked from at persistence time.
    pub draft_base_version: u64,
    pub status: DraftStatus,
    /// True iff a retention policy is active for the owning project OR a
    /// conflict reason is currently set.
    pub compliance_warning: bool,
    pub content_markdown: String,
    /// Compact patch form against the baseline revision.
    pub patch: SectionPatch,
    pub summary_note: String,
    pub conflict_reason: Option<String>,
    /// When this snapshot was persisted (Unix millis).
    pub updated_at: u64,
}

impl StoredDraft {
    /// Compact binary encoding for storage backends that take bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        postcard::to_stdvec(self).map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// Decode from the compact binary form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        postcard::from_bytes(bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

/// Errors from the local draft store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend ran out of space. Carries the keys it pruned trying to
    /// make room, so the UI can prompt the author instead of silently
    /// dropping the newest draft.
    #[error("draft storage quota exceeded ({} entries pruned)", pruned.len())]
    QuotaExceeded { pruned: Vec<DraftKey> },
    /// Encode/decode failure of the compact form.
    #[error("draft codec error: {0}")]
    Codec(String),
    /// Any other backend failure.
    #[error("draft storage error: {0}")]
    Backend(String),
}

/// Per-(document, section, author) pending draft storage.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Insert or overwrite the draft at its key.
    async fn save_draft(&self, draft: StoredDraft) -> Result<(), StoreError>;

    /// Load the pending draft at `key`, if any.
    async fn load_draft(&self, key: &DraftKey) -> Result<Option<StoredDraft>, StoreError>;

    /// Remove the pending draft at `key`. Removing a missing key is not an
    /// error.
    async fn delete_draft(&self, key: &DraftKey) -> Result<(), StoreError>;

    /// All pending drafts of one author within a document — the bundle
    /// assembly enumeration.
    async fn list_drafts(
        &self,
        document_id: DocumentId,
        author_id: AuthorId,
    ) -> Result<Vec<StoredDraft>, StoreError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredDraft {
        StoredDraft {
            key: DraftKey {
                project_slug: "atlas".to_string(),
                document_id: DocumentId::new(),
                section_title: "Scope".to_string(),
                author_id: AuthorId::new(),
            },
            section_id: SectionId::new(),
            section_path: "contract/scope".to_string(),
            draft_id: None,
            draft_version: 1,
            draft_base_version: 5,
            status: DraftStatus::Draft,
            compliance_warning: false,
            content_markdown: "## Scope\n\nEverything.".to_string(),
            patch: SectionPatch::replace("## Scope\n\nEverything."),
            summary_note: "tightened wording".to_string(),
            conflict_reason: None,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_compact_roundtrip() {
        let draft = sample();
        let bytes = draft.to_bytes().unwrap();
        let parsed = StoredDraft::from_bytes(&bytes).unwrap();
        assert_eq!(draft, parsed);
    }

    #[test]
    fn test_corrupt_bytes_surface_codec_error() {
        let err = StoredDraft::from_bytes(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }

    #[test]
    fn test_quota_error_names_pruned_count() {
        let err = StoreError::QuotaExceeded {
            pruned: vec![sample().key, sample().key],
        };
        assert!(err.to_string().contains("2 entries pruned"));
    }
}
