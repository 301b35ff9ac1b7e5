//! Draft orchestrator — the stateful control unit of the engine.
//!
//! Wires local edit events, the debounced autosave scheduler, manual-save
//! requests, conflict responses, and real-time/poll-based diff notifications
//! into calls against the [`DraftState`] container and the remote
//! collaborators. One orchestrator owns one open section.
//!
//! ```text
//!   edits ──▶ update_draft ──▶ DebounceTimer (750ms) ──▶ DraftStore
//!                                      ▲ cancelled by
//!   manual_save ──▶ SectionApi.save_draft ──┬─ clean ──▶ BundleClient
//!                                           └─ 409 ────▶ conflict flow
//!   SectionChannel ──▶ conflict / diff events (push)
//!        └─ degraded ──▶ diff poll loop (cancelled on recovery)
//! ```
//!
//! Concurrency is logical, not threaded: overlapping async operations are
//! serialized through short-lived locks, and the container's correlation
//! guard is the sole ordering primitive for save responses.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use galley_types::{
    AuthorId, BundleRequest, ConflictCheckRequest, ConflictEvent, ConflictPayload,
    ConflictResolution, ConflictState, ConflictTrigger, DocumentId, DraftBundleSubmission,
    DraftKey, QualityGateIssue, QualityGateReport, RequestId, RetentionPolicy, SaveDraftRequest,
    SaveDraftResponse, SectionDiff, SectionId, baseline_label, now_millis,
};

use crate::api::{
    ApiError, BundleClient, RetentionPolicyProvider, SaveFailure, SaveFailureKind, SectionApi,
};
use crate::constants::{AUTOSAVE_DEBOUNCE, DIFF_POLL_INTERVAL, GATE_CONFLICT, GATE_RETENTION};
use crate::events::{SectionChannel, SectionEventPayload};
use crate::patch::compute_patch;
use crate::scheduler::DebounceTimer;
use crate::state::{DraftSeed, DraftState, SaveContext};
use crate::store::{DraftStatus, DraftStore, StoreError, StoredDraft};

/// Identity of the section an orchestrator drives.
#[derive(Clone, Debug)]
pub struct SectionContext {
    pub project_slug: String,
    pub document_id: DocumentId,
    pub section_id: SectionId,
    pub section_title: String,
    /// Slash-separated outline path, e.g. `contract/scope`.
    pub section_path: String,
    pub author_id: AuthorId,
}

impl SectionContext {
    /// Composite key this section's pending draft is stored under.
    pub fn draft_key(&self) -> DraftKey {
        DraftKey {
            project_slug: self.project_slug.clone(),
            document_id: self.document_id,
            section_title: self.section_title.clone(),
            author_id: self.author_id,
        }
    }
}

/// Tuning knobs. Defaults come from [`crate::constants`].
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub autosave_debounce: Duration,
    pub diff_poll_interval: Duration,
    /// Master switch for the degraded-channel diff poll loop.
    pub diff_poll_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            autosave_debounce: AUTOSAVE_DEBOUNCE,
            diff_poll_interval: DIFF_POLL_INTERVAL,
            diff_poll_enabled: true,
        }
    }
}

/// The injected collaborator set.
///
/// `bundles` and `retention` are optional: without a bundle client the
/// primary save alone decides success; without a retention provider the
/// compliance flag follows conflict state only.
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn SectionApi>,
    pub store: Arc<dyn DraftStore>,
    pub bundles: Option<Arc<dyn BundleClient>>,
    pub retention: Option<Arc<dyn RetentionPolicyProvider>>,
}

/// Primary result of a manual save.
#[derive(Clone, Debug)]
pub enum SaveResult {
    /// The server accepted the draft revision.
    Saved(SaveDraftResponse),
    /// The server rejected it with a structured conflict; the rebase flow
    /// has already been applied locally.
    Conflicted(ConflictPayload),
}

/// What happened to the bundle accompanying a manual save.
#[derive(Clone, Debug)]
pub enum BundleDisposition {
    /// Every submitted section was confirmed applied.
    Applied { sections: Vec<DraftKey> },
    /// No bundle client configured, or the primary response was not clean.
    NotAttempted,
    /// Soft failure: local drafts retained, guidance recorded.
    Failed(BundleFailure),
}

/// Guidance payload of a soft bundle failure. The author's draft is still
/// safe in local storage; nothing was reverted.
#[derive(Clone, Debug)]
pub struct BundleFailure {
    /// Submitted keys the backend did not confirm.
    pub missing: Vec<DraftKey>,
    pub message: String,
}

/// Outcome of [`DraftOrchestrator::manual_save`]: the primary response plus
/// the bundle disposition, so a caller sees both the accepted save and any
/// guidance error in one value.
#[derive(Clone, Debug)]
pub struct ManualSaveOutcome {
    pub result: SaveResult,
    pub bundle: BundleDisposition,
}

/// Errors surfaced by orchestrator operations.
#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Background task handles for one section.
#[derive(Default)]
struct Tasks {
    autosave: DebounceTimer,
    listener: Option<JoinHandle<()>>,
    health: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
    retention: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        self.autosave.cancel();
        for handle in [
            self.listener.take(),
            self.health.take(),
            self.poll.take(),
            self.retention.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// The stateful control unit for one open section.
pub struct DraftOrchestrator {
    ctx: SectionContext,
    config: OrchestratorConfig,
    collab: Collaborators,
    /// Handle to ourselves for spawned timers and listeners; they upgrade on
    /// fire and no-op once the section is gone.
    self_weak: Weak<Self>,

    state: Mutex<DraftState>,
    /// Hot cell: current editor content. Updated on every keystroke without
    /// driving any re-render.
    content: Mutex<String>,
    /// Content at the draft's fork point — the patch baseline.
    baseline: Mutex<String>,
    /// Last snapshot written to the local store.
    last_persisted: Mutex<Option<StoredDraft>>,
    retention_policy: Mutex<Option<RetentionPolicy>>,
    latest_diff: Mutex<Option<SectionDiff>>,
    /// Correlation id adopted from server response headers.
    correlation: Mutex<Option<String>>,
    /// Sections retired by a fully-applied bundle (idempotent UI marker).
    cleared: Mutex<HashSet<DraftKey>>,
    /// Sections whose last manual save came back clean (idempotent UI marker).
    recent_clean: Mutex<HashSet<DraftKey>>,
    tasks: Mutex<Tasks>,
}

impl DraftOrchestrator {
    pub fn new(ctx: SectionContext, collab: Collaborators, config: OrchestratorConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(DraftState::new(ctx.section_id)),
            ctx,
            config,
            collab,
            self_weak: weak.clone(),
            content: Mutex::new(String::new()),
            baseline: Mutex::new(String::new()),
            last_persisted: Mutex::new(None),
            retention_policy: Mutex::new(None),
            latest_diff: Mutex::new(None),
            correlation: Mutex::new(None),
            cleared: Mutex::new(HashSet::new()),
            recent_clean: Mutex::new(HashSet::new()),
            tasks: Mutex::new(Tasks::default()),
        })
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    pub fn context(&self) -> &SectionContext {
        &self.ctx
    }

    /// Snapshot of the draft state container.
    pub fn state(&self) -> DraftState {
        self.state.lock().clone()
    }

    /// Current editor content.
    pub fn content(&self) -> String {
        self.content.lock().clone()
    }

    /// Latest known draft-vs-approved diff (push or poll).
    pub fn latest_diff(&self) -> Option<SectionDiff> {
        self.latest_diff.lock().clone()
    }

    /// Correlation id adopted from the server, for hosts building request
    /// headers.
    pub fn correlation_id(&self) -> Option<String> {
        self.correlation.lock().clone()
    }

    pub fn retention_policy(&self) -> Option<RetentionPolicy> {
        self.retention_policy.lock().clone()
    }

    /// Whether `key` was retired by a fully-applied bundle this session.
    pub fn is_cleared(&self, key: &DraftKey) -> bool {
        self.cleared.lock().contains(key)
    }

    /// Whether this section's last manual save came back clean.
    pub fn is_recently_clean(&self) -> bool {
        self.recent_clean.lock().contains(&self.ctx.draft_key())
    }

    /// True iff a retention policy is active OR a conflict reason is set —
    /// the compliance flag persisted snapshots carry.
    pub fn compliance_flag(&self) -> bool {
        let policy_active = self.retention_policy.lock().is_some();
        policy_active || self.state.lock().conflict_reason().is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the section: hydrate a recovered pending draft if one exists,
    /// kick off the retention policy fetch, and run the entry conflict probe.
    ///
    /// Returns the probe result (`status: clean` is the no-conflict answer).
    pub async fn open(
        &self,
        approved_version: u64,
        approved_content: &str,
    ) -> Result<ConflictPayload, OrchestratorError> {
        *self.baseline.lock() = approved_content.to_string();
        *self.content.lock() = approved_content.to_string();

        match self.collab.store.load_draft(&self.ctx.draft_key()).await {
            Ok(Some(stored)) => {
                info!(
                    "recovered pending draft for {} (base v{}, {:?})",
                    stored.key, stored.draft_base_version, stored.status
                );
                *self.content.lock() = stored.content_markdown.clone();
                self.state.lock().initialize(DraftSeed {
                    draft_id: stored.draft_id,
                    draft_version: stored.draft_version,
                    draft_base_version: stored.draft_base_version,
                    summary_note: stored.summary_note.clone(),
                    conflict_state: match stored.status {
                        DraftStatus::Draft => ConflictState::Clean,
                        DraftStatus::Conflict => ConflictState::RebaseRequired,
                    },
                    conflict_reason: stored.conflict_reason.clone(),
                    formatting_annotations: Vec::new(),
                });
                *self.last_persisted.lock() = Some(stored);
            }
            Ok(None) => {
                // Draft versions share the approved numbering: a draft forked
                // at approved v5 saves as v6.
                self.state.lock().initialize(DraftSeed {
                    draft_version: approved_version,
                    draft_base_version: approved_version,
                    ..Default::default()
                });
            }
            Err(e) => {
                // A broken local store must not block editing; start fresh.
                warn!("failed to load pending draft for {}: {e}", self.ctx.draft_key());
                self.state.lock().initialize(DraftSeed {
                    draft_version: approved_version,
                    draft_base_version: approved_version,
                    ..Default::default()
                });
            }
        }

        self.spawn_retention_fetch();
        self.resolve_conflicts(ConflictTrigger::Entry).await
    }

    /// Tear the section down: cancel every timer and subscription, reset the
    /// container. No orphaned timer may fire against a torn-down state.
    pub fn close(&self) {
        self.tasks.lock().abort_all();
        self.state.lock().reset();
        self.content.lock().clear();
        self.baseline.lock().clear();
        *self.latest_diff.lock() = None;
        *self.last_persisted.lock() = None;
        debug!("section {} closed", self.ctx.section_id.short());
    }

    // =========================================================================
    // Local edits + autosave
    // =========================================================================

    /// Record a local edit. Content lands in the hot cell immediately; if it
    /// differs from the last persisted snapshot, the single autosave timer is
    /// (re)armed — rescheduling cancels the previous one.
    pub fn update_draft(&self, content: impl Into<String>) {
        let content = content.into();
        {
            let mut cell = self.content.lock();
            if *cell == content {
                return;
            }
            *cell = content.clone();
        }

        let differs_from_persisted = self
            .last_persisted
            .lock()
            .as_ref()
            .is_none_or(|d| d.content_markdown != content);
        if !differs_from_persisted {
            return;
        }

        let weak = self.self_weak.clone();
        self.tasks
            .lock()
            .autosave
            .arm(self.config.autosave_debounce, async move {
                let Some(orch) = weak.upgrade() else { return };
                if let Err(e) = orch.persist_snapshot(None).await {
                    error!(
                        "autosave flush failed for {}: {e}",
                        orch.ctx.draft_key()
                    );
                }
            });
    }

    pub fn set_summary(&self, text: impl Into<String>) {
        self.state.lock().set_summary(text);
    }

    /// Persist the current content to the local draft store.
    ///
    /// `base_override` pins the persisted base version (used when a conflict
    /// response re-bases the draft onto the latest approved version before
    /// the container itself advances).
    async fn persist_snapshot(&self, base_override: Option<u64>) -> Result<(), StoreError> {
        let content = self.content.lock().clone();
        let baseline = self.baseline.lock().clone();
        let policy_active = self.retention_policy.lock().is_some();

        let draft = {
            let state = self.state.lock();
            StoredDraft {
                key: self.ctx.draft_key(),
                section_id: self.ctx.section_id,
                section_path: self.ctx.section_path.clone(),
                draft_id: state.draft_id(),
                draft_version: state.draft_version(),
                draft_base_version: base_override.unwrap_or(state.draft_base_version()),
                status: state.storage_status(),
                compliance_warning: policy_active || state.conflict_reason().is_some(),
                patch: compute_patch(&baseline, &content),
                content_markdown: content,
                summary_note: state.summary_note().to_string(),
                conflict_reason: state.conflict_reason().map(str::to_string),
                updated_at: now_millis(),
            }
        };

        self.collab.store.save_draft(draft.clone()).await?;
        debug!(
            "persisted draft {} ({:?}, compliance={})",
            draft.key, draft.status, draft.compliance_warning
        );
        *self.last_persisted.lock() = Some(draft);
        Ok(())
    }

    // =========================================================================
    // Manual save + bundle submission
    // =========================================================================

    /// Commit the draft: save it remotely, then submit the bundle of all
    /// pending section edits.
    ///
    /// Transport and generic client failures come back as `Err` after being
    /// recorded on the container. A structured conflict is **not** an error:
    /// it returns `Ok` with [`SaveResult::Conflicted`] after the rebase flow
    /// ran. A bundle soft-failure also returns `Ok` — the primary response is
    /// in `result`, the guidance in `bundle`.
    pub async fn manual_save(&self) -> Result<ManualSaveOutcome, OrchestratorError> {
        // A manual save supersedes any pending autosave timer. An autosave
        // call already in flight is left alone — its response dies on the
        // correlation guard.
        self.tasks.lock().autosave.cancel();

        let request_id = RequestId::new();
        let content = self.content.lock().clone();
        let (request, prior_base) = {
            let mut state = self.state.lock();
            state.begin_save(request_id);
            let request = SaveDraftRequest {
                content_markdown: content.clone(),
                draft_version: state.draft_version() + 1,
                draft_base_version: state.draft_base_version(),
                summary_note: match state.summary_note() {
                    "" => None,
                    note => Some(note.to_string()),
                },
                formatting_annotations: state.formatting_annotations().to_vec(),
            };
            (request, state.draft_base_version())
        };

        let saved = self
            .collab
            .api
            .save_draft(self.ctx.section_id, request_id, request)
            .await;

        match saved {
            Ok(envelope) => {
                self.adopt_correlation(envelope.correlation_id.as_deref());
                let response = envelope.body;
                let outcome = self
                    .finish_save(request_id, prior_base, content, response)
                    .await;
                Ok(outcome)
            }
            Err(ApiError::Conflict {
                correlation_id,
                payload,
                ..
            }) => {
                self.adopt_correlation(correlation_id.as_deref());
                self.handle_conflict(&payload, ConflictTrigger::Save).await;
                Ok(ManualSaveOutcome {
                    result: SaveResult::Conflicted(*payload),
                    bundle: BundleDisposition::NotAttempted,
                })
            }
            Err(err) => {
                warn!(
                    "save failed for {} (request {:?}): {err}",
                    self.ctx.draft_key(),
                    request_id
                );
                self.state.lock().fail_save(SaveFailure::from(&err), request_id);
                Err(err.into())
            }
        }
    }

    /// Post-save bundle submission and state reconciliation.
    async fn finish_save(
        &self,
        request_id: RequestId,
        prior_base: u64,
        saved_content: String,
        response: SaveDraftResponse,
    ) -> ManualSaveOutcome {
        let is_clean = response.conflict_state.is_clean();
        let disposition = self.submit_bundle().await;

        let bundle_ok = matches!(
            disposition,
            BundleDisposition::Applied { .. } | BundleDisposition::NotAttempted
        );

        // The base version advances only when the response is clean AND the
        // bundle confirmed this section was applied.
        let next_base = if is_clean && bundle_ok {
            response.draft_version
        } else {
            prior_base
        };
        self.state.lock().complete_save(
            &response,
            SaveContext {
                request_id,
                draft_base_version: next_base,
            },
        );

        if is_clean && bundle_ok {
            self.retire_drafts(&disposition).await;
            *self.baseline.lock() = saved_content;
            let key = self.ctx.draft_key();
            self.recent_clean.lock().insert(key);
        } else if is_clean {
            // Soft failure: version numbering succeeded, only bundle
            // application failed. Keep the draft locally and tell the author
            // nothing was lost.
            if let BundleDisposition::Failed(failure) = &disposition {
                warn!(
                    "bundle not applied for {} ({} missing): {}",
                    self.ctx.draft_key(),
                    failure.missing.len(),
                    failure.message
                );
                let recorded = SaveFailure {
                    kind: SaveFailureKind::Bundle,
                    status: None,
                    correlation_id: self.correlation.lock().clone(),
                    message: failure.message.clone(),
                };
                self.state.lock().fail_save(recorded, request_id);
                if let Err(e) = self.persist_snapshot(None).await {
                    warn!("failed to re-persist draft after bundle failure: {e}");
                }
            }
        }
        // Non-clean primary response: the bundle outcome does not block the
        // conflict-bearing response; local drafts are retained regardless.

        ManualSaveOutcome {
            result: SaveResult::Saved(response),
            bundle: disposition,
        }
    }

    /// Assemble and send the bundle for every pending section edit.
    async fn submit_bundle(&self) -> BundleDisposition {
        let Some(client) = self.collab.bundles.clone() else {
            return BundleDisposition::NotAttempted;
        };

        let (sections, keys) = match self.assemble_bundle().await {
            Ok(assembled) => assembled,
            Err(e) => {
                return BundleDisposition::Failed(BundleFailure {
                    missing: vec![self.ctx.draft_key()],
                    message: format!(
                        "could not enumerate pending drafts ({e}); your draft is still \
                         saved locally — retry the save when ready"
                    ),
                });
            }
        };

        let request = BundleRequest {
            submitted_by: self.ctx.author_id,
            sections,
        };
        match client
            .apply_draft_bundle(&self.ctx.project_slug, self.ctx.document_id, request)
            .await
        {
            Ok(outcome) if outcome.covers(keys.iter()) => BundleDisposition::Applied {
                sections: outcome.applied_sections,
            },
            Ok(outcome) => {
                let missing: Vec<DraftKey> = keys
                    .into_iter()
                    .filter(|k| !outcome.applied_sections.contains(k))
                    .collect();
                BundleDisposition::Failed(BundleFailure {
                    message: format!(
                        "{} section(s) were not applied; your draft is still saved \
                         locally — retry the save when ready",
                        missing.len()
                    ),
                    missing,
                })
            }
            Err(e) => BundleDisposition::Failed(BundleFailure {
                missing: keys,
                message: format!(
                    "bundle submission failed ({e}); your draft is still saved \
                     locally — retry the save when ready"
                ),
            }),
        }
    }

    /// Build the submission set: this section first, then every other
    /// pending draft of this author in the document.
    async fn assemble_bundle(
        &self,
    ) -> Result<(Vec<DraftBundleSubmission>, Vec<DraftKey>), StoreError> {
        let content = self.content.lock().clone();
        let baseline = self.baseline.lock().clone();
        let policy_active = self.retention_policy.lock().is_some();
        let own_key = self.ctx.draft_key();

        let own = {
            let state = self.state.lock();
            let mut issues = Vec::new();
            if state.storage_status() == DraftStatus::Conflict {
                issues.push(QualityGateIssue::blocker(
                    GATE_CONFLICT,
                    "section has an unresolved conflict",
                ));
            }
            if policy_active || state.conflict_reason().is_some() {
                issues.push(QualityGateIssue::warning(
                    GATE_RETENTION,
                    "draft falls under a retention policy and needs review",
                ));
            }
            DraftBundleSubmission {
                draft_key: own_key.clone(),
                section_path: self.ctx.section_path.clone(),
                patch: compute_patch(&baseline, &content),
                baseline_version: baseline_label(state.draft_base_version()),
                quality_gate_report: QualityGateReport::from_issues(issues),
            }
        };

        let mut sections = vec![own];
        let mut keys = vec![own_key];

        let pending = self
            .collab
            .store
            .list_drafts(self.ctx.document_id, self.ctx.author_id)
            .await?;
        for stored in pending {
            if keys.contains(&stored.key) {
                continue;
            }
            let mut issues = Vec::new();
            if stored.status == DraftStatus::Conflict {
                issues.push(QualityGateIssue::blocker(
                    GATE_CONFLICT,
                    "section has an unresolved conflict",
                ));
            }
            if stored.compliance_warning {
                issues.push(QualityGateIssue::warning(
                    GATE_RETENTION,
                    "draft falls under a retention policy and needs review",
                ));
            }
            keys.push(stored.key.clone());
            sections.push(DraftBundleSubmission {
                draft_key: stored.key,
                section_path: stored.section_path,
                patch: stored.patch,
                baseline_version: baseline_label(stored.draft_base_version),
                quality_gate_report: QualityGateReport::from_issues(issues),
            });
        }
        Ok((sections, keys))
    }

    /// Retire local drafts the bundle confirmed applied (or this section's
    /// own draft when no bundle client is configured).
    async fn retire_drafts(&self, disposition: &BundleDisposition) {
        let keys: Vec<DraftKey> = match disposition {
            BundleDisposition::Applied { sections } => sections.clone(),
            BundleDisposition::NotAttempted => vec![self.ctx.draft_key()],
            BundleDisposition::Failed(_) => return,
        };
        for key in keys {
            if let Err(e) = self.collab.store.delete_draft(&key).await {
                warn!("failed to retire applied draft {key}: {e}");
            }
            self.cleared.lock().insert(key);
        }
        *self.last_persisted.lock() = None;
    }

    // =========================================================================
    // Conflict flow
    // =========================================================================

    /// Explicit pre-save conflict probe (section entry, manual refresh).
    ///
    /// The result is applied exactly like an out-of-band conflict; `status:
    /// clean` is the no-conflict answer and clears any stale conflict
    /// markers.
    pub async fn resolve_conflicts(
        &self,
        triggered_by: ConflictTrigger,
    ) -> Result<ConflictPayload, OrchestratorError> {
        let request = {
            let state = self.state.lock();
            ConflictCheckRequest {
                draft_version: state.draft_version(),
                draft_base_version: state.draft_base_version(),
                approved_version: state
                    .latest_approved_version()
                    .unwrap_or(state.draft_base_version()),
                request_id: RequestId::new(),
                triggered_by,
            }
        };

        let envelope = self
            .collab
            .api
            .check_conflicts(self.ctx.section_id, request)
            .await?;
        self.adopt_correlation(envelope.correlation_id.as_deref());
        self.handle_conflict(&envelope.body, triggered_by).await;
        Ok(envelope.body)
    }

    /// Apply a conflict payload: container first (never correlation-guarded),
    /// then content replacement and local persistence when a rebased draft is
    /// attached.
    async fn handle_conflict(&self, payload: &ConflictPayload, during: ConflictTrigger) {
        {
            let mut state = self.state.lock();
            let previous_base = state.draft_base_version();
            state.apply_conflict(payload);

            if !payload.events.is_empty() {
                // Server history is authoritative.
                state.record_conflict_events(payload.events.clone());
            } else if !payload.status.is_clean() {
                // Server sent no history: append a locally-detected entry.
                let mut events = state.conflict_events().to_vec();
                events.push(ConflictEvent {
                    detected_at: now_millis(),
                    detected_during: during,
                    previous_approved_version: previous_base,
                    latest_approved_version: payload.latest_approved_version,
                    resolved_by: None,
                    resolution_note: None,
                });
                state.record_conflict_events(events);
            }
        }

        if payload.status.is_clean() {
            return;
        }

        if let Some(rebased) = &payload.rebased_draft {
            info!(
                "replacing local content with rebased draft v{} for {}",
                rebased.draft_version,
                self.ctx.section_id.short()
            );
            *self.content.lock() = rebased.content_markdown.clone();
            if let Some(snapshot) = &payload.server_snapshot {
                // The rebased draft is expressed against the new approved
                // content; future patches use it as baseline.
                *self.baseline.lock() = snapshot.content.clone();
            }
            // Persist under the latest approved version; the container's own
            // base version is untouched until the next clean save.
            if let Err(e) = self
                .persist_snapshot(Some(payload.latest_approved_version))
                .await
            {
                warn!("failed to persist rebased draft locally: {e}");
            }
        }
    }

    /// The author confirmed the rebased draft: move to `rebased` and persist.
    ///
    /// Returns `false` when no rebased draft is pending.
    pub async fn apply_rebased_draft(&self) -> Result<bool, OrchestratorError> {
        let (rebased, resolution) = {
            let state = self.state.lock();
            let Some(rebased) = state.rebased_draft().cloned() else {
                return Ok(false);
            };
            let resolution = match state.conflict_state() {
                ConflictState::Blocked => ConflictResolution::ManualReapply,
                _ => ConflictResolution::AutoRebase,
            };
            (rebased, resolution)
        };

        *self.content.lock() = rebased.content_markdown.clone();
        {
            let mut state = self.state.lock();
            state.mark_rebased(resolution, None);
        }
        let base = self.state.lock().latest_approved_version();
        self.persist_snapshot(base).await?;
        Ok(true)
    }

    /// Refresh the server-side conflict audit log, replacing the local copy
    /// wholesale.
    pub async fn load_conflict_history(&self) -> Result<Vec<ConflictEvent>, OrchestratorError> {
        let envelope = self.collab.api.list_conflict_logs(self.ctx.section_id).await?;
        self.adopt_correlation(envelope.correlation_id.as_deref());
        self.state
            .lock()
            .record_conflict_events(envelope.body.clone());
        Ok(envelope.body)
    }

    // =========================================================================
    // Diff refresh (push + degraded-channel poll)
    // =========================================================================

    /// Fetch the precomputed draft-vs-approved diff.
    pub async fn refresh_diff(&self) -> Result<SectionDiff, OrchestratorError> {
        let draft_version = self.state.lock().draft_version();
        let envelope = self
            .collab
            .api
            .fetch_diff(self.ctx.section_id, draft_version)
            .await?;
        self.adopt_correlation(envelope.correlation_id.as_deref());
        *self.latest_diff.lock() = Some(envelope.body.clone());
        Ok(envelope.body)
    }

    /// Subscribe to the real-time channel: conflict and diff pushes, plus the
    /// health signal that gates the fallback diff poll.
    pub fn attach_channel(&self, channel: &SectionChannel) {
        let mut events = channel.subscribe();
        let weak = self.self_weak.clone();
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(orch) = weak.upgrade() else { break };
                        if event.section_id != orch.ctx.section_id {
                            continue;
                        }
                        match event.payload {
                            SectionEventPayload::Conflict(payload) => {
                                // Out-of-band conflicts are applied
                                // unconditionally, like an entry probe.
                                orch.handle_conflict(&payload, ConflictTrigger::Entry).await;
                            }
                            SectionEventPayload::Diff(diff) => {
                                *orch.latest_diff.lock() = Some(diff);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("section event stream lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut health = channel.watch_health();
        let weak = self.self_weak.clone();
        let health_task = tokio::spawn(async move {
            loop {
                let degraded = health.borrow_and_update().is_degraded();
                let Some(orch) = weak.upgrade() else { break };
                orch.set_poll_active(degraded);
                drop(orch);
                if health.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut tasks = self.tasks.lock();
        if let Some(old) = tasks.listener.replace(listener) {
            old.abort();
        }
        if let Some(old) = tasks.health.replace(health_task) {
            old.abort();
        }
    }

    /// Start or stop the fallback diff poll. Runs only while the channel is
    /// degraded and polling is enabled; never alongside healthy push
    /// delivery.
    fn set_poll_active(&self, degraded: bool) {
        let mut tasks = self.tasks.lock();
        if degraded && self.config.diff_poll_enabled {
            if tasks.poll.as_ref().is_some_and(|h| !h.is_finished()) {
                return;
            }
            info!(
                "channel degraded, starting diff poll every {:?}",
                self.config.diff_poll_interval
            );
            let weak = self.self_weak.clone();
            let interval = self.config.diff_poll_interval;
            tasks.poll = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await; // consume the immediate first tick
                loop {
                    ticker.tick().await;
                    let Some(orch) = weak.upgrade() else { break };
                    if let Err(e) = orch.refresh_diff().await {
                        warn!("diff poll failed: {e}");
                    }
                }
            }));
        } else if let Some(poll) = tasks.poll.take() {
            info!("channel recovered, stopping diff poll");
            poll.abort();
        }
    }

    // =========================================================================
    // Retention / compliance
    // =========================================================================

    /// One-shot, non-blocking retention policy fetch. A policy arriving
    /// after a snapshot was persisted without the compliance flag triggers a
    /// metadata-correcting re-persist (same content, no version bump).
    fn spawn_retention_fetch(&self) {
        let Some(provider) = self.collab.retention.clone() else {
            return;
        };
        let slug = self.ctx.project_slug.clone();
        let weak = self.self_weak.clone();
        let handle = tokio::spawn(async move {
            match provider.fetch_project_retention_policy(&slug).await {
                Ok(Some(policy)) => {
                    let Some(orch) = weak.upgrade() else { return };
                    debug!("retention policy {} active for {slug}", policy.policy_id);
                    *orch.retention_policy.lock() = Some(policy);
                    let needs_reflag = orch
                        .last_persisted
                        .lock()
                        .as_ref()
                        .is_some_and(|d| !d.compliance_warning);
                    if needs_reflag
                        && let Err(e) = orch.persist_snapshot(None).await
                    {
                        warn!("compliance reflag persist failed: {e}");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("retention policy fetch failed for {slug}: {e}"),
            }
        });
        let mut tasks = self.tasks.lock();
        if let Some(old) = tasks.retention.replace(handle) {
            old.abort();
        }
    }

    fn adopt_correlation(&self, echoed: Option<&str>) {
        let Some(id) = echoed else { return };
        let mut current = self.correlation.lock();
        if current.as_deref() != Some(id) {
            debug!("adopting server-assigned correlation id {id}");
            *current = Some(id.to_string());
        }
    }
}
