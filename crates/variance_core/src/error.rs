//! Error classification shared by every layer.
//!
//! # Invariants
//! - Every error type in this crate maps onto exactly one `ErrorKind`.
//! - Neither kind is fatal: the failed operation leaves prior state intact.

use std::fmt::{Display, Formatter};

/// Coarse error class surfaced to callers for user-facing reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation is forbidden by the current state.
    NotAllowed,
    /// Validation failure: missing name, duplicate, bad mode, malformed data.
    Invariant,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAllowed => f.write_str("not_allowed"),
            Self::Invariant => f.write_str("invariant"),
        }
    }
}
