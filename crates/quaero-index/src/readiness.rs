//! Index readiness state machine.
//!
//! ```text
//! Uninitialized --begin--> Loading --publish--> Ready
//!                             |
//!                             +----fail----> Failed --begin (re-init)--> Loading
//! ```
//!
//! `Ready` is terminal for the readiness flag itself: a re-index keeps the
//! index `Ready` and swaps the published snapshot instead.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Uninitialized => "uninitialized",
            Readiness::Loading => "loading",
            Readiness::Ready => "ready",
            Readiness::Failed => "failed",
        }
    }

    /// Whether queries may run.
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    /// Whether the current build attempt has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, Readiness::Ready | Readiness::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: Readiness) -> bool {
        matches!(
            (self, next),
            (Readiness::Uninitialized, Readiness::Loading)
                | (Readiness::Failed, Readiness::Loading)
                | (Readiness::Loading, Readiness::Ready)
                | (Readiness::Loading, Readiness::Failed)
        )
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Readiness; 4] = [
        Readiness::Uninitialized,
        Readiness::Loading,
        Readiness::Ready,
        Readiness::Failed,
    ];

    #[test]
    fn test_default_is_uninitialized() {
        assert_eq!(Readiness::default(), Readiness::Uninitialized);
    }

    #[test]
    fn test_ready_never_transitions() {
        for next in ALL {
            assert!(!Readiness::Ready.can_transition_to(next), "Ready -> {next}");
        }
    }

    #[test]
    fn test_legal_transitions() {
        assert!(Readiness::Uninitialized.can_transition_to(Readiness::Loading));
        assert!(Readiness::Loading.can_transition_to(Readiness::Ready));
        assert!(Readiness::Loading.can_transition_to(Readiness::Failed));
        assert!(Readiness::Failed.can_transition_to(Readiness::Loading));

        assert!(!Readiness::Uninitialized.can_transition_to(Readiness::Ready));
        assert!(!Readiness::Failed.can_transition_to(Readiness::Ready));
        assert!(!Readiness::Loading.can_transition_to(Readiness::Loading));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&Readiness::Loading).unwrap(),
            "\"loading\""
        );
        for state in ALL {
            assert_eq!(serde_json::to_value(state).unwrap(), state.as_str());
        }
    }

    #[test]
    fn test_settled_states() {
        assert!(Readiness::Ready.is_settled());
        assert!(Readiness::Failed.is_settled());
        assert!(!Readiness::Loading.is_settled());
        assert!(!Readiness::Uninitialized.is_settled());
    }
}
