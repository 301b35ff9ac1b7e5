//! Patch computer — turns (baseline, current) content into a serializable
//! section patch.
//!
//! The computed patch is a single splice: retain the common prefix, drop the
//! changed middle of the baseline, insert the replacement, retain the common
//! suffix. Identical inputs always produce byte-identical serialized output
//! (bundle idempotence depends on it). If splice generation fails its own
//! verification for any reason, the whole body is carried as one `Replace`
//! op instead of raising.

use tracing::warn;

use galley_types::{PatchOp, SectionPatch};

/// Compute the patch that turns `baseline` into `current`.
///
/// Deterministic and total: never fails, degrading to a whole-body replace.
pub fn compute_patch(baseline: &str, current: &str) -> SectionPatch {
    if baseline == current {
        return SectionPatch::identity();
    }

    let patch = splice_patch(baseline, current);

    // Self-check before trusting the fine-grained form.
    match patch.apply(baseline) {
        Ok(applied) if applied == current => patch,
        Ok(_) | Err(_) => {
            warn!("splice patch failed verification, falling back to whole-body replace");
            SectionPatch::replace(current)
        }
    }
}

/// Serialize a patch to its canonical JSON form.
///
/// Identical patches serialize to identical bytes, which is what bundle
/// idempotence tests key on.
pub fn serialize_patch(patch: &SectionPatch) -> String {
    serde_json::to_string(patch).unwrap_or_else(|_| "{\"ops\":[]}".to_string())
}

/// Single-splice diff: retain prefix, delete middle, insert middle, retain
/// suffix. Offsets are bytes, backed off to char boundaries shared by both
/// strings.
fn splice_patch(baseline: &str, current: &str) -> SectionPatch {
    let prefix = common_prefix(baseline, current);
    let suffix = common_suffix(&baseline[prefix..], &current[prefix..]);

    let deleted = baseline.len() - prefix - suffix;
    let inserted = &current[prefix..current.len() - suffix];

    let mut ops = Vec::with_capacity(4);
    if prefix > 0 {
        ops.push(PatchOp::Retain { count: prefix });
    }
    if deleted > 0 {
        ops.push(PatchOp::Delete { count: deleted });
    }
    if !inserted.is_empty() {
        ops.push(PatchOp::Insert {
            text: inserted.to_string(),
        });
    }
    if suffix > 0 {
        ops.push(PatchOp::Retain { count: suffix });
    }
    SectionPatch { ops }
}

fn common_prefix(a: &str, b: &str) -> usize {
    let mut n = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while n > 0 && (!a.is_char_boundary(n) || !b.is_char_boundary(n)) {
        n -= 1;
    }
    n
}

fn common_suffix(a: &str, b: &str) -> usize {
    let mut n = a
        .as_bytes()
        .iter()
        .rev()
        .zip(b.as_bytes().iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    while n > 0 && (!a.is_char_boundary(a.len() - n) || !b.is_char_boundary(b.len() - n)) {
        n -= 1;
    }
    n
}

// ============================================================================
// Tests
// ============================================================================
