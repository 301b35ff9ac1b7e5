//! Remote collaborator seams: section API, bundle client, retention provider.
//!
//! The engine never talks HTTP directly — hosts implement these traits over
//! whatever transport they have. Failures surface as [`ApiError`], which
//! distinguishes transport loss, structured conflicts, and generic client
//! errors, each carrying an HTTP-like status, an optional correlation id, and
//! an optional raw body so callers can branch without re-parsing.

use async_trait::async_trait;
use thiserror::Error;

use galley_types::{
    BundleOutcome, BundleRequest, ConflictCheckRequest, ConflictEvent, ConflictPayload,
    DocumentId, RequestId, RetentionPolicy, SaveDraftRequest, SaveDraftResponse, SectionDiff,
    SectionId,
};

/// A response body plus the correlation id the server echoed, if any.
///
/// The orchestrator adopts a server-assigned correlation id that differs from
/// its current one, so later requests stay correlated across server-side
/// reassignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Enveloped<T> {
    pub body: T,
    pub correlation_id: Option<String>,
}

impl<T> Enveloped<T> {
    /// Wrap a body with no correlation echo — the common test shape.
    pub fn bare(body: T) -> Self {
        Self {
            body,
            correlation_id: None,
        }
    }
}

/// Errors from remote collaborators.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No response reached the server. Never retried automatically.
    #[error("transport failure: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// The server rejected a save with a structured conflict (409).
    /// Always recoverable via the rebase flow.
    #[error("version conflict: approved version is {}", payload.latest_approved_version)]
    Conflict {
        status: u16,
        correlation_id: Option<String>,
        payload: Box<ConflictPayload>,
    },
    /// Any other client-visible failure.
    #[error("request failed with status {status}: {message}")]
    Client {
        status: u16,
        correlation_id: Option<String>,
        body: Option<String>,
        message: String,
    },
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn conflict(payload: ConflictPayload) -> Self {
        Self::Conflict {
            status: 409,
            correlation_id: None,
            payload: Box::new(payload),
        }
    }
}

/// A recorded save failure — the serializable, comparable residue of an
/// [`ApiError`] kept on the draft state container.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFailure {
    pub kind: SaveFailureKind,
    pub status: Option<u16>,
    pub correlation_id: Option<String>,
    pub message: String,
}

/// Coarse classification of a recorded save failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFailureKind {
    Transport,
    Client,
    /// Primary save succeeded but the bundle was not (fully) applied.
    Bundle,
}

impl From<&ApiError> for SaveFailure {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Transport { status, message } => Self {
                kind: SaveFailureKind::Transport,
                status: *status,
                correlation_id: None,
                message: message.clone(),
            },
            // Conflicts are not recorded as save failures; they go through
            // the conflict path. Mapping one anyway degrades to Client.
            ApiError::Conflict {
                status,
                correlation_id,
                ..
            } => Self {
                kind: SaveFailureKind::Client,
                status: Some(*status),
                correlation_id: correlation_id.clone(),
                message: "version conflict".to_string(),
            },
            ApiError::Client {
                status,
                correlation_id,
                message,
                ..
            } => Self {
                kind: SaveFailureKind::Client,
                status: Some(*status),
                correlation_id: correlation_id.clone(),
                message: message.clone(),
            },
        }
    }
}

/// Remote section service.
#[async_trait]
pub trait SectionApi: Send + Sync {
    /// Explicit conflict probe. Always answers with a conflict-shaped
    /// payload; `status: clean` is a valid result.
    async fn check_conflicts(
        &self,
        section_id: SectionId,
        req: ConflictCheckRequest,
    ) -> Result<Enveloped<ConflictPayload>, ApiError>;

    /// Persist a draft revision. A version mismatch comes back as
    /// [`ApiError::Conflict`].
    async fn save_draft(
        &self,
        section_id: SectionId,
        request_id: RequestId,
        req: SaveDraftRequest,
    ) -> Result<Enveloped<SaveDraftResponse>, ApiError>;

    /// Fetch the precomputed draft-vs-approved diff.
    async fn fetch_diff(
        &self,
        section_id: SectionId,
        draft_version: u64,
    ) -> Result<Enveloped<SectionDiff>, ApiError>;

    /// Fetch the server-side conflict audit log for a section.
    async fn list_conflict_logs(
        &self,
        section_id: SectionId,
    ) -> Result<Enveloped<Vec<ConflictEvent>>, ApiError>;
}

/// Atomic multi-section persistence backend.
#[async_trait]
pub trait BundleClient: Send + Sync {
    /// Apply a set of per-section patches in one request. Partial success is
    /// only whatever `applied_sections` enumerates.
    async fn apply_draft_bundle(
        &self,
        project_slug: &str,
        document_id: DocumentId,
        req: BundleRequest,
    ) -> Result<BundleOutcome, ApiError>;
}

/// Project retention policy lookup. Consulted asynchronously; never blocks
/// the edit path.
#[async_trait]
pub trait RetentionPolicyProvider: Send + Sync {
    async fn fetch_project_retention_policy(
        &self,
        project_slug: &str,
    ) -> Result<Option<RetentionPolicy>, ApiError>;
}

// ============================================================================
// Tests
// ============================================================================
