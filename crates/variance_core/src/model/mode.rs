//! Category visibility policies.
//!
//! # Responsibility
//! - Name the four visibility policies plus the unconfigured placeholder.
//! - Own the per-policy invariant check and default flag construction.
//!
//! # Invariants
//! - `All`: every flag is true.
//! - `One`: exactly one flag is true when the member list is non-empty.
//! - `Same`: flags are uniformly true or uniformly false.
//! - `Or`/`Unk`: unconstrained.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Visibility policy of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityMode {
    /// Every member is always visible.
    All,
    /// Members toggle independently.
    Or,
    /// Exactly one member is visible (radio-button semantics).
    One,
    /// All members share one visibility value.
    Same,
    /// Freshly created category whose policy is not chosen yet.
    Unk,
}

impl VisibilityMode {
    /// Modes accepted by an explicit mode change.
    pub const SETTABLE: [VisibilityMode; 4] = [Self::All, Self::Or, Self::One, Self::Same];

    /// Wire name used by the persisted tree format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Or => "or",
            Self::One => "one",
            Self::Same => "same",
            Self::Unk => "unk",
        }
    }

    /// Returns whether this mode may be chosen by `change_mode`.
    pub fn is_settable(self) -> bool {
        self != Self::Unk
    }

    /// Returns whether `flags` satisfies this mode's invariant.
    pub fn accepts(self, flags: &[bool]) -> bool {
        match self {
            Self::All => flags.iter().all(|visible| *visible),
            // An empty `one` category has nothing to show.
            Self::One => flags.is_empty() || flags.iter().filter(|visible| **visible).count() == 1,
            Self::Same => flags.windows(2).all(|pair| pair[0] == pair[1]),
            Self::Or | Self::Unk => true,
        }
    }

    /// Builds the default flag vector for `len` members.
    ///
    /// `All` -> all true, `One` -> only the first true, others all false.
    pub fn default_flags(self, len: usize) -> Vec<bool> {
        match self {
            Self::All => vec![true; len],
            Self::One => (0..len).map(|index| index == 0).collect(),
            Self::Or | Self::Same | Self::Unk => vec![false; len],
        }
    }
}

impl Display for VisibilityMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl Display for UnknownMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown mode `{}`; expected all|or|one|same|unk", self.0)
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for VisibilityMode {
    type Err = UnknownMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "all" => Ok(Self::All),
            "or" => Ok(Self::Or),
            "one" => Ok(Self::One),
            "same" => Ok(Self::Same),
            "unk" => Ok(Self::Unk),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::VisibilityMode;

    #[test]
    fn parse_accepts_wire_names_and_rejects_others() {
        assert_eq!("one".parse::<VisibilityMode>().unwrap(), VisibilityMode::One);
        assert_eq!(" same ".parse::<VisibilityMode>().unwrap(), VisibilityMode::Same);
        let err = "some".parse::<VisibilityMode>().unwrap_err();
        assert!(err.to_string().contains("some"));
    }

    #[test]
    fn same_rejects_mixed_flags() {
        assert!(VisibilityMode::Same.accepts(&[false, false]));
        assert!(VisibilityMode::Same.accepts(&[true, true, true]));
        assert!(!VisibilityMode::Same.accepts(&[true, false]));
    }

    #[test]
    fn one_requires_exactly_one_visible_member() {
        assert!(VisibilityMode::One.accepts(&[]));
        assert!(VisibilityMode::One.accepts(&[false, true]));
        assert!(!VisibilityMode::One.accepts(&[false, false]));
        assert!(!VisibilityMode::One.accepts(&[true, true]));
    }

    #[test]
    fn default_flags_follow_mode() {
        assert_eq!(VisibilityMode::All.default_flags(2), vec![true, true]);
        assert_eq!(VisibilityMode::One.default_flags(3), vec![true, false, false]);
        assert_eq!(VisibilityMode::Same.default_flags(2), vec![false, false]);
        assert!(VisibilityMode::One.default_flags(0).is_empty());
    }
}
