//! Typed identifiers for authors, documents, sections, drafts, and requests.
//!
//! All ID types wrap UUIDv7 (time-ordered, globally unique). They serialize
//! transparently as UUIDs on the wire and display as standard UUID text for
//! logging. The `short()` form (first 8 hex chars) is for human-facing UI —
//! never used as a lookup key.
//!
//! `RequestId` doubles as the save-correlation token: the state container
//! compares the id carried by a response against the id of the most recently
//! initiated save and silently drops anything older.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An author identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(uuid::Uuid);

/// A document identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(uuid::Uuid);

/// A section identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(uuid::Uuid);

/// A draft identifier (UUIDv7), assigned by the server on first save.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(uuid::Uuid);

/// A request correlation identifier (UUIDv7), generated per save attempt.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters — for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// A nil / zero ID — for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(AuthorId, "AuthorId");
impl_typed_id!(DocumentId, "DocumentId");
impl_typed_id!(SectionId, "SectionId");
impl_typed_id!(DraftId, "DraftId");
impl_typed_id!(RequestId, "RequestId");

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_eight_chars() {
        assert_eq!(SectionId::new().short().len(), 8);
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = DocumentId::new();
        let parsed = DocumentId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);

        let parsed_hex = DocumentId::parse(&id.to_hex()).unwrap();
        assert_eq!(id, parsed_hex);
    }

    #[test]
    fn test_nil_sentinel() {
        let id = DraftId::nil();
        assert!(id.is_nil());
        assert!(!DraftId::new().is_nil());
    }

    #[test]
    fn test_serde_transparent() {
        let id = AuthorId::new();
        let json = serde_json::to_string(&id).unwrap();
        // Serializes as a bare UUID string, not a wrapper object
        assert!(json.starts_with('"'));
        let parsed: AuthorId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_postcard_roundtrip() {
        let id = RequestId::new();
        let bytes = postcard::to_stdvec(&id).unwrap();
        let parsed: RequestId = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(id, parsed);
    }
}
