//! Galley draft engine client library.
//!
//! Implements the client-side optimistic-concurrency and conflict-resolution
//! engine for section drafts: a pure [`DraftState`] container with a
//! correlation-guarded save lifecycle, a deterministic patch computer, and
//! the [`DraftOrchestrator`] that wires edits, debounced autosave, manual
//! saves, bundle submission, and real-time/poll diff delivery together.
//!
//! Remote collaborators (section API, bundle backend, local draft store,
//! retention policy provider) are injected as traits, so the whole engine is
//! testable without a network or a UI runtime.

pub mod api;
pub mod constants;
pub mod events;
pub mod orchestrator;
pub mod patch;
pub mod scheduler;
pub mod state;
pub mod store;

pub use api::{
    ApiError, BundleClient, Enveloped, RetentionPolicyProvider, SaveFailure, SaveFailureKind,
    SectionApi,
};
pub use events::{
    ChannelHealth, SectionChannel, SectionEvent, SectionEventPayload, SectionTopic,
};
pub use orchestrator::{
    BundleDisposition, BundleFailure, Collaborators, DraftOrchestrator, ManualSaveOutcome,
    OrchestratorConfig, OrchestratorError, SaveResult, SectionContext,
};
pub use patch::{compute_patch, serialize_patch};
pub use scheduler::DebounceTimer;
pub use state::{DraftSeed, DraftState, SaveContext};
pub use store::{DraftStatus, DraftStore, StoreError, StoredDraft};
