//! Draft state container — one section's authoritative local view.
//!
//! This module holds all draft metadata and conflict status for a single
//! open section, independent of any transport or UI. Every operation is
//! synchronous and side-effect-free beyond the container itself, which is
//! what makes the stale-response guard tractable to unit test.
//!
//! # Stale-response guard
//!
//! `begin_save` records the correlation id of the most recently initiated
//! save. `complete_save` and `fail_save` mutate the container **only** when
//! their correlation id equals the recorded one; anything older is silently
//! dropped. The guard is a plain equality check on a stored token — no
//! reflection, no timestamps.
//!
//! `apply_conflict` is deliberately *not* guarded: conflicts can arrive out
//! of band (push notification, entry probe) and must always be reflected.
//!
//! # State Machine
//!
//! ```text
//! +-------+  save rejected / probe:            +-----------------------+
//! | clean |  base < approved                   | rebase_required       |
//! |       | ---------------------------------> |   or blocked          |
//! +---+---+                                    +-----------+-----------+
//!     ^                                                    | mark_rebased()
//!     | complete_save(conflict_state = clean)              v
//!     |                                        +-----------------------+
//!     +--------------------------------------- | rebased               |
//!                                              +-----------------------+
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use galley_types::{
    ConflictEvent, ConflictPayload, ConflictResolution, ConflictState, DraftId,
    FormattingAnnotation, RebasedDraft, RequestId, SaveDraftResponse, SectionId, ServerSnapshot,
};

use crate::api::SaveFailure;
use crate::store::DraftStatus;

/// Fields applied on top of defaults by [`DraftState::initialize`].
///
/// Used on section open and when hydrating a recovered local draft.
#[derive(Clone, Debug, Default)]
pub struct DraftSeed {
    pub draft_id: Option<DraftId>,
    pub draft_version: u64,
    pub draft_base_version: u64,
    pub summary_note: String,
    pub conflict_state: ConflictState,
    pub conflict_reason: Option<String>,
    pub formatting_annotations: Vec<FormattingAnnotation>,
}

/// Correlation context for applying a save response.
#[derive(Clone, Copy, Debug)]
pub struct SaveContext {
    /// Correlation id of the save this response belongs to.
    pub request_id: RequestId,
    /// Base version the draft should adopt if the response is accepted.
    /// The orchestrator advances this only once the bundle confirmed the
    /// section was applied.
    pub draft_base_version: u64,
}

/// One section's draft metadata and conflict status.
#[derive(Clone, Debug, Default)]
pub struct DraftState {
    section_id: SectionId,
    draft_id: Option<DraftId>,
    /// Monotonic per successful save; never advances speculatively.
    draft_version: u64,
    /// Approved version the draft was forked from.
    draft_base_version: u64,
    /// Server's current approved version — set only while a conflict is
    /// active.
    latest_approved_version: Option<u64>,
    conflict_state: ConflictState,
    conflict_reason: Option<String>,
    rebased_draft: Option<RebasedDraft>,
    summary_note: String,
    formatting_annotations: Vec<FormattingAnnotation>,
    is_saving: bool,
    save_error: Option<SaveFailure>,
    /// Correlation token of the in-flight save.
    last_request_id: Option<RequestId>,
    /// Server-confirmed save metadata.
    last_saved_at: Option<u64>,
    last_saved_by: Option<String>,
    /// Client timestamp of the last local commit.
    last_manual_save_at: Option<u64>,
    /// Conflict audit log; the server is authoritative for its contents.
    conflict_events: Vec<ConflictEvent>,
    /// Approved content cache, keyed by approved version. Populated
    /// opportunistically from conflict responses; never evicted in-session.
    snapshots: BTreeMap<u64, ServerSnapshot>,
}

impl DraftState {
    /// Fresh container for a just-opened section.
    pub fn new(section_id: SectionId) -> Self {
        Self {
            section_id,
            ..Self::default()
        }
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    pub fn section_id(&self) -> SectionId {
        self.section_id
    }

    pub fn draft_id(&self) -> Option<DraftId> {
        self.draft_id
    }

    pub fn draft_version(&self) -> u64 {
        self.draft_version
    }

    pub fn draft_base_version(&self) -> u64 {
        self.draft_base_version
    }

    pub fn latest_approved_version(&self) -> Option<u64> {
        self.latest_approved_version
    }

    pub fn conflict_state(&self) -> ConflictState {
        self.conflict_state
    }

    pub fn conflict_reason(&self) -> Option<&str> {
        self.conflict_reason.as_deref()
    }

    pub fn rebased_draft(&self) -> Option<&RebasedDraft> {
        self.rebased_draft.as_ref()
    }

    pub fn summary_note(&self) -> &str {
        &self.summary_note
    }

    pub fn formatting_annotations(&self) -> &[FormattingAnnotation] {
        &self.formatting_annotations
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn save_error(&self) -> Option<&SaveFailure> {
        self.save_error.as_ref()
    }

    pub fn last_request_id(&self) -> Option<RequestId> {
        self.last_request_id
    }

    pub fn last_saved_at(&self) -> Option<u64> {
        self.last_saved_at
    }

    pub fn last_saved_by(&self) -> Option<&str> {
        self.last_saved_by.as_deref()
    }

    pub fn last_manual_save_at(&self) -> Option<u64> {
        self.last_manual_save_at
    }

    pub fn conflict_events(&self) -> &[ConflictEvent] {
        &self.conflict_events
    }

    /// Cached approved content for `version`, if a conflict response carried
    /// it.
    pub fn server_snapshot(&self, version: u64) -> Option<&ServerSnapshot> {
        self.snapshots.get(&version)
    }

    /// Status tag a local persistence snapshot should carry right now.
    pub fn storage_status(&self) -> DraftStatus {
        if self.conflict_state.is_clean() {
            DraftStatus::Draft
        } else {
            DraftStatus::Conflict
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Reset to defaults, then apply the supplied fields.
    pub fn initialize(&mut self, seed: DraftSeed) {
        let section_id = self.section_id;
        *self = Self::new(section_id);
        self.draft_id = seed.draft_id;
        self.draft_version = seed.draft_version;
        self.draft_base_version = seed.draft_base_version;
        self.summary_note = seed.summary_note;
        self.conflict_state = seed.conflict_state;
        self.conflict_reason = seed.conflict_reason;
        self.formatting_annotations = seed.formatting_annotations;
        debug!(
            "initialized draft state for section {}: v{} (base v{}, {})",
            self.section_id.short(),
            self.draft_version,
            self.draft_base_version,
            self.conflict_state
        );
    }

    pub fn set_summary(&mut self, text: impl Into<String>) {
        self.summary_note = text.into();
    }

    /// Record the start of a save attempt. Clears any prior error and makes
    /// `request_id` the one correlation token responses must match.
    pub fn begin_save(&mut self, request_id: RequestId) {
        self.is_saving = true;
        self.save_error = None;
        self.last_request_id = Some(request_id);
        trace!("save started, correlation {:?}", request_id);
    }

    /// Apply a successful save response. No-op unless `ctx.request_id`
    /// matches the tracked in-flight save.
    ///
    /// Returns whether the response was applied.
    pub fn complete_save(&mut self, response: &SaveDraftResponse, ctx: SaveContext) -> bool {
        if self.last_request_id != Some(ctx.request_id) {
            trace!(
                "dropping stale save response, correlation {:?} (current {:?})",
                ctx.request_id, self.last_request_id
            );
            return false;
        }

        self.is_saving = false;
        self.save_error = None;
        self.draft_id = Some(response.draft_id);
        self.draft_version = response.draft_version;
        self.draft_base_version = ctx.draft_base_version;
        self.conflict_state = response.conflict_state;
        self.formatting_annotations = response.formatting_annotations.clone();
        self.last_saved_at = Some(response.saved_at);
        self.last_saved_by = Some(response.saved_by.clone());
        self.summary_note = response.summary_note.clone();
        self.last_manual_save_at = Some(galley_types::now_millis());

        if response.conflict_state.is_clean() {
            self.latest_approved_version = None;
            self.conflict_reason = None;
            self.rebased_draft = None;
        }

        info!(
            "save applied for section {}: v{} (base v{}, {})",
            self.section_id.short(),
            self.draft_version,
            self.draft_base_version,
            self.conflict_state
        );
        true
    }

    /// Record a failed save. Same correlation guard as [`complete_save`].
    ///
    /// Returns whether the failure was recorded.
    pub fn fail_save(&mut self, failure: SaveFailure, request_id: RequestId) -> bool {
        if self.last_request_id != Some(request_id) {
            trace!(
                "dropping stale save failure, correlation {:?} (current {:?})",
                request_id, self.last_request_id
            );
            return false;
        }
        self.is_saving = false;
        self.save_error = Some(failure);
        true
    }

    /// Reflect a conflict payload. Unconditional: conflicts may arrive out
    /// of band and are never correlation-guarded.
    pub fn apply_conflict(&mut self, payload: &ConflictPayload) {
        self.is_saving = false;
        self.conflict_state = payload.status;

        if payload.status.is_clean() {
            self.latest_approved_version = None;
            self.conflict_reason = None;
            self.rebased_draft = None;
        } else {
            self.latest_approved_version = Some(payload.latest_approved_version);
            self.conflict_reason = payload.conflict_reason.clone();
            self.rebased_draft = payload.rebased_draft.clone();
            if let Some(rebased) = &payload.rebased_draft
                && !rebased.formatting_annotations.is_empty()
            {
                self.formatting_annotations = rebased.formatting_annotations.clone();
            }
        }

        if let Some(snapshot) = &payload.server_snapshot {
            self.snapshots
                .insert(payload.latest_approved_version, snapshot.clone());
        }

        info!(
            "conflict applied for section {}: {} (approved v{})",
            self.section_id.short(),
            payload.status,
            payload.latest_approved_version
        );
    }

    /// Replace the conflict event log wholesale — the server is
    /// authoritative for history.
    pub fn record_conflict_events(&mut self, events: Vec<ConflictEvent>) {
        self.conflict_events = events;
    }

    /// The author reapplied the rebased draft locally. Moves
    /// `rebase_required`/`blocked` to `rebased` and stamps the resolution on
    /// the newest unresolved event.
    pub fn mark_rebased(&mut self, resolution: ConflictResolution, note: Option<String>) {
        self.conflict_state = ConflictState::Rebased;
        if let Some(event) = self
            .conflict_events
            .iter_mut()
            .rev()
            .find(|e| e.resolved_by.is_none())
        {
            event.resolved_by = Some(resolution);
            event.resolution_note = note;
        }
        info!(
            "section {} rebased locally ({})",
            self.section_id.short(),
            resolution
        );
    }

    /// Tear down to defaults (section close / switch). Keeps the section id.
    pub fn reset(&mut self) {
        let section_id = self.section_id;
        *self = Self::new(section_id);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use galley_types::ConflictTrigger;

    use crate::api::{ApiError, SaveFailureKind};

    fn response(version: u64, state: ConflictState) -> SaveDraftResponse {
        SaveDraftResponse {
            draft_id: DraftId::nil(),
            section_id: SectionId::nil(),
            draft_version: version,
            conflict_state: state,
            formatting_annotations: Vec::new(),
            saved_at: 1_700_000_000_000,
            saved_by: "imani".to_string(),
            summary_note: "note".to_string(),
        }
    }

    fn conflict(latest: u64) -> ConflictPayload {
        ConflictPayload {
            status: ConflictState::RebaseRequired,
            latest_approved_version: latest,
            conflict_reason: Some("approved version moved".to_string()),
            rebased_draft: None,
            server_snapshot: None,
            events: Vec::new(),
        }
    }

    fn event(latest: u64) -> ConflictEvent {
        ConflictEvent {
            detected_at: 1,
            detected_during: ConflictTrigger::Save,
            previous_approved_version: latest - 1,
            latest_approved_version: latest,
            resolved_by: None,
            resolution_note: None,
        }
    }

    // =========================================================================
    // Stale-response guard
    // =========================================================================

    #[test]
    fn test_stale_response_is_dropped() {
        let mut state = DraftState::new(SectionId::new());
        state.initialize(DraftSeed {
            draft_base_version: 5,
            ..Default::default()
        });

        let s1 = RequestId::new();
        let s2 = RequestId::new();

        state.begin_save(s1);
        state.begin_save(s2); // S2 becomes current before S1 resolves

        // S1's response arrives late: must not mutate anything
        let applied = state.complete_save(
            &response(99, ConflictState::Clean),
            SaveContext {
                request_id: s1,
                draft_base_version: 99,
            },
        );
        assert!(!applied);
        assert_eq!(state.draft_version(), 0);
        assert!(state.is_saving());

        // S2's response applies
        let applied = state.complete_save(
            &response(1, ConflictState::Clean),
            SaveContext {
                request_id: s2,
                draft_base_version: 1,
            },
        );
        assert!(applied);
        assert_eq!(state.draft_version(), 1);
        assert_eq!(state.draft_base_version(), 1);
        assert!(!state.is_saving());
    }

    #[test]
    fn test_stale_state_equals_newer_save_alone() {
        // Container after S1-late-then-S2 must equal container after S2 alone
        let s1 = RequestId::new();
        let s2 = RequestId::new();

        let mut racy = DraftState::new(SectionId::nil());
        racy.begin_save(s1);
        racy.begin_save(s2);
        racy.complete_save(
            &response(7, ConflictState::Blocked),
            SaveContext {
                request_id: s1,
                draft_base_version: 7,
            },
        );
        racy.complete_save(
            &response(1, ConflictState::Clean),
            SaveContext {
                request_id: s2,
                draft_base_version: 1,
            },
        );

        let mut straight = DraftState::new(SectionId::nil());
        straight.begin_save(s2);
        straight.complete_save(
            &response(1, ConflictState::Clean),
            SaveContext {
                request_id: s2,
                draft_base_version: 1,
            },
        );

        assert_eq!(racy.draft_version(), straight.draft_version());
        assert_eq!(racy.draft_base_version(), straight.draft_base_version());
        assert_eq!(racy.conflict_state(), straight.conflict_state());
        assert_eq!(racy.is_saving(), straight.is_saving());
    }

    #[test]
    fn test_stale_failure_is_dropped() {
        let mut state = DraftState::new(SectionId::new());
        let s1 = RequestId::new();
        let s2 = RequestId::new();
        state.begin_save(s1);
        state.begin_save(s2);

        let failure = SaveFailure::from(&ApiError::transport("gone"));
        assert!(!state.fail_save(failure.clone(), s1));
        assert!(state.save_error().is_none());

        assert!(state.fail_save(failure, s2));
        assert_eq!(state.save_error().unwrap().kind, SaveFailureKind::Transport);
        assert!(!state.is_saving());
    }

    // =========================================================================
    // Version accounting
    // =========================================================================

    #[test]
    fn test_version_monotonicity() {
        let mut state = DraftState::new(SectionId::new());
        state.initialize(DraftSeed {
            draft_base_version: 5,
            ..Default::default()
        });

        for i in 1..=4u64 {
            let rid = RequestId::new();
            state.begin_save(rid);
            state.complete_save(
                &response(i, ConflictState::Clean),
                SaveContext {
                    request_id: rid,
                    draft_base_version: i,
                },
            );
            assert_eq!(state.draft_version(), i);
        }
    }

    #[test]
    fn test_version_not_advanced_on_failure() {
        let mut state = DraftState::new(SectionId::new());
        let rid = RequestId::new();
        state.begin_save(rid);
        state.fail_save(SaveFailure::from(&ApiError::transport("down")), rid);
        assert_eq!(state.draft_version(), 0);
        assert_eq!(state.draft_base_version(), 0);
    }

    #[test]
    fn test_base_version_follows_context_not_response() {
        // Bundle failed: orchestrator passes the old base version
        let mut state = DraftState::new(SectionId::new());
        state.initialize(DraftSeed {
            draft_base_version: 5,
            draft_version: 1,
            ..Default::default()
        });

        let rid = RequestId::new();
        state.begin_save(rid);
        state.complete_save(
            &response(2, ConflictState::Clean),
            SaveContext {
                request_id: rid,
                draft_base_version: 5, // held back
            },
        );
        assert_eq!(state.draft_version(), 2);
        assert_eq!(state.draft_base_version(), 5);
    }

    // =========================================================================
    // Conflict application
    // =========================================================================

    #[test]
    fn test_apply_conflict_is_unguarded() {
        let mut state = DraftState::new(SectionId::new());
        // No save in flight at all
        state.apply_conflict(&conflict(7));
        assert_eq!(state.conflict_state(), ConflictState::RebaseRequired);
        assert_eq!(state.latest_approved_version(), Some(7));
        assert_eq!(state.conflict_reason(), Some("approved version moved"));
    }

    #[test]
    fn test_apply_conflict_caches_snapshot() {
        let mut state = DraftState::new(SectionId::new());
        let mut payload = conflict(7);
        payload.server_snapshot = Some(ServerSnapshot {
            content: "approved body".to_string(),
            captured_at: 9,
        });
        state.apply_conflict(&payload);
        assert_eq!(state.server_snapshot(7).unwrap().content, "approved body");
        assert!(state.server_snapshot(6).is_none());
    }

    #[test]
    fn test_apply_conflict_replaces_annotations_from_rebase() {
        let mut state = DraftState::new(SectionId::new());
        let mut payload = conflict(7);
        payload.rebased_draft = Some(RebasedDraft {
            draft_version: 2,
            content_markdown: "X".to_string(),
            formatting_annotations: vec![FormattingAnnotation {
                id: "a1".to_string(),
                start: 0,
                end: 1,
                mark_type: "table".to_string(),
                message: "tables unsupported".to_string(),
                severity: galley_types::AnnotationSeverity::Warning,
            }],
        });
        state.apply_conflict(&payload);
        assert_eq!(state.formatting_annotations().len(), 1);
        assert_eq!(state.rebased_draft().unwrap().content_markdown, "X");
    }

    #[test]
    fn test_clean_check_clears_conflict_fields() {
        let mut state = DraftState::new(SectionId::new());
        state.apply_conflict(&conflict(7));
        assert!(state.latest_approved_version().is_some());

        state.apply_conflict(&ConflictPayload::clean(7));
        assert_eq!(state.conflict_state(), ConflictState::Clean);
        assert!(state.latest_approved_version().is_none());
        assert!(state.conflict_reason().is_none());
        assert!(state.rebased_draft().is_none());
    }

    #[test]
    fn test_clean_save_resets_rebased() {
        let mut state = DraftState::new(SectionId::new());
        state.apply_conflict(&conflict(7));
        state.mark_rebased(ConflictResolution::ManualReapply, None);
        assert_eq!(state.conflict_state(), ConflictState::Rebased);

        let rid = RequestId::new();
        state.begin_save(rid);
        state.complete_save(
            &response(3, ConflictState::Clean),
            SaveContext {
                request_id: rid,
                draft_base_version: 7,
            },
        );
        assert_eq!(state.conflict_state(), ConflictState::Clean);
        assert!(state.latest_approved_version().is_none());
        assert!(state.rebased_draft().is_none());
    }

    #[test]
    fn test_mark_rebased_stamps_latest_unresolved_event() {
        let mut state = DraftState::new(SectionId::new());
        let mut resolved = event(6);
        resolved.resolved_by = Some(ConflictResolution::Abandoned);
        state.record_conflict_events(vec![resolved, event(7)]);

        state.mark_rebased(ConflictResolution::ManualReapply, Some("redid edit".to_string()));

        let events = state.conflict_events();
        assert_eq!(events[0].resolved_by, Some(ConflictResolution::Abandoned));
        assert_eq!(events[1].resolved_by, Some(ConflictResolution::ManualReapply));
        assert_eq!(events[1].resolution_note.as_deref(), Some("redid edit"));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn test_initialize_resets_then_applies() {
        let section = SectionId::new();
        let mut state = DraftState::new(section);
        state.apply_conflict(&conflict(7));
        state.set_summary("old");

        state.initialize(DraftSeed {
            draft_version: 3,
            draft_base_version: 6,
            conflict_state: ConflictState::Rebased,
            conflict_reason: Some("recovered".to_string()),
            ..Default::default()
        });

        assert_eq!(state.section_id(), section);
        assert_eq!(state.draft_version(), 3);
        assert_eq!(state.draft_base_version(), 6);
        assert_eq!(state.conflict_state(), ConflictState::Rebased);
        assert_eq!(state.conflict_reason(), Some("recovered"));
        // Reset wiped the unrelated leftovers
        assert_eq!(state.summary_note(), "");
        assert!(state.latest_approved_version().is_none());
    }

    #[test]
    fn test_reset_returns_to_defaults() {
        let section = SectionId::new();
        let mut state = DraftState::new(section);
        state.begin_save(RequestId::new());
        state.apply_conflict(&conflict(7));

        state.reset();
        assert_eq!(state.section_id(), section);
        assert_eq!(state.conflict_state(), ConflictState::Clean);
        assert!(!state.is_saving());
        assert!(state.last_request_id().is_none());
        assert!(state.conflict_events().is_empty());
    }

    #[test]
    fn test_storage_status_derivation() {
        let mut state = DraftState::new(SectionId::new());
        assert_eq!(state.storage_status(), DraftStatus::Draft);
        state.apply_conflict(&conflict(7));
        assert_eq!(state.storage_status(), DraftStatus::Conflict);
        state.mark_rebased(ConflictResolution::ManualReapply, None);
        assert_eq!(state.storage_status(), DraftStatus::Conflict);
    }

    #[test]
    fn test_begin_save_clears_previous_error() {
        let mut state = DraftState::new(SectionId::new());
        let rid = RequestId::new();
        state.begin_save(rid);
        state.fail_save(SaveFailure::from(&ApiError::transport("down")), rid);
        assert!(state.save_error().is_some());

        state.begin_save(RequestId::new());
        assert!(state.save_error().is_none());
        assert!(state.is_saving());
    }
}
