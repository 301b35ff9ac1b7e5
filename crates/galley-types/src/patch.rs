//! Serialized section patches.
//!
//! A patch is a small ordered list of operations describing how to turn a
//! named baseline revision of a section into the draft content. In the common
//! case it is a single splice (retain / delete / insert / retain); when
//! finer-grained diffing is unavailable the whole body is carried as one
//! `Replace` op. Patch *computation* lives in `galley-client`; this module
//! owns the wire shape and application.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of a section patch. Offsets and counts are in bytes.
///
/// Externally tagged on the wire (`{"replace": {"text": ...}}`) so the
/// compact binary encoding of stored drafts can carry patches too.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOp {
    /// Keep the next `count` bytes of the baseline unchanged.
    Retain { count: usize },
    /// Drop the next `count` bytes of the baseline.
    Delete { count: usize },
    /// Emit `text` into the output.
    Insert { text: String },
    /// Discard the entire baseline and emit `text`. Only valid as the sole op.
    Replace { text: String },
}

/// An ordered list of [`PatchOp`]s against a named baseline revision.
///
/// An empty op list is the identity patch (content unchanged).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPatch {
    pub ops: Vec<PatchOp>,
}

/// Errors from applying a patch to a baseline.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// An op ran past the end of the baseline.
    #[error("patch op overruns baseline: needed {needed} bytes, {remaining} remain")]
    Overrun { needed: usize, remaining: usize },
    /// The patch consumed less of the baseline than exists.
    #[error("patch left {0} unconsumed baseline bytes")]
    Underrun(usize),
    /// A retain or delete split a UTF-8 character.
    #[error("patch op splits a UTF-8 character at byte {0}")]
    SplitChar(usize),
    /// `Replace` mixed with other ops.
    #[error("replace op must be the only op in a patch")]
    MixedReplace,
}

impl SectionPatch {
    /// A whole-body replacement patch — the graceful-degradation form.
    pub fn replace(text: impl Into<String>) -> Self {
        Self {
            ops: vec![PatchOp::Replace { text: text.into() }],
        }
    }

    /// The identity patch (no changes against the baseline).
    pub fn identity() -> Self {
        Self::default()
    }

    /// Whether this patch changes nothing.
    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply this patch to `baseline`, producing the draft content.
    pub fn apply(&self, baseline: &str) -> Result<String, PatchError> {
        if self.ops.is_empty() {
            return Ok(baseline.to_string());
        }
        if let [PatchOp::Replace { text }] = self.ops.as_slice() {
            return Ok(text.clone());
        }

        let mut out = String::with_capacity(baseline.len());
        let mut cursor = 0usize;
        for op in &self.ops {
            match op {
                PatchOp::Replace { .. } => return Err(PatchError::MixedReplace),
                PatchOp::Retain { count } => {
                    let end = checked_advance(baseline, cursor, *count)?;
                    out.push_str(&baseline[cursor..end]);
                    cursor = end;
                }
                PatchOp::Delete { count } => {
                    cursor = checked_advance(baseline, cursor, *count)?;
                }
                PatchOp::Insert { text } => out.push_str(text),
            }
        }
        if cursor != baseline.len() {
            return Err(PatchError::Underrun(baseline.len() - cursor));
        }
        Ok(out)
    }
}

/// Advance `count` bytes from `cursor`, validating bounds and char boundaries.
fn checked_advance(baseline: &str, cursor: usize, count: usize) -> Result<usize, PatchError> {
    let end = cursor
        .checked_add(count)
        .filter(|&e| e <= baseline.len())
        .ok_or(PatchError::Overrun {
            needed: count,
            remaining: baseline.len() - cursor,
        })?;
    if !baseline.is_char_boundary(end) {
        return Err(PatchError::SplitChar(end));
    }
    Ok(end)
}

// ============================================================================
// Tests
// ============================================================================
