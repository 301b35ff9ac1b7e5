//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Debounce delay between the last local edit and the autosave flush.
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(750);

/// Interval of the diff poll loop while the real-time channel is degraded.
/// Push delivery is the primary path; polling at 10 seconds keeps the diff
/// viewer usable without duplicating network pressure once push recovers.
pub const DIFF_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Quality gate id raised when a section still carries an unresolved conflict.
pub const GATE_CONFLICT: &str = "section-conflict";

/// Quality gate id raised when a retention policy flags the draft for review.
pub const GATE_RETENTION: &str = "retention-review";
