//! Role classification for raw record tags.
//!
//! Canonical mapping, applied uniformly across the crate:
//!
//! | Tag  | Role                 | Field title |
//! |------|----------------------|-------------|
//! | `PM` | `Creator`            | Kerani      |
//! | `P1` | `AssistantVerifier`  | Asisten     |
//! | `P5` | `SupervisorVerifier` | Mandor      |
//!
//! Anything else is `Unknown`.

use serde::{Deserialize, Serialize};

/// Semantic role of the user who entered a record.
///
/// Variant order doubles as the tie-break order when an employee's display
/// role is resolved from equal tag counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Creator,
    AssistantVerifier,
    SupervisorVerifier,
    Unknown,
}

impl Role {
    /// Map a raw record tag to a role. Surrounding whitespace and case are ignored.
    pub fn classify(raw_tag: &str) -> Self {
        let tag = raw_tag.trim();
        if tag.eq_ignore_ascii_case("PM") {
            Self::Creator
        } else if tag.eq_ignore_ascii_case("P1") {
            Self::AssistantVerifier
        } else if tag.eq_ignore_ascii_case("P5") {
            Self::SupervisorVerifier
        } else {
            Self::Unknown
        }
    }

    /// Priority used when several verifier records compete for one group.
    /// Higher wins; zero means the role never verifies.
    pub fn verifier_priority(&self) -> u8 {
        match self {
            Self::AssistantVerifier => 2,
            Self::SupervisorVerifier => 1,
            Self::Creator | Self::Unknown => 0,
        }
    }

    pub fn is_verifier(&self) -> bool {
        self.verifier_priority() > 0
    }

    /// Field title used on printed reports.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Creator => "KERANI",
            Self::AssistantVerifier => "ASISTEN",
            Self::SupervisorVerifier => "MANDOR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The canonical record tag, if the role has one.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::Creator => Some("PM"),
            Self::AssistantVerifier => Some("P1"),
            Self::SupervisorVerifier => Some("P5"),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creator => write!(f, "creator"),
            Self::AssistantVerifier => write!(f, "assistant_verifier"),
            Self::SupervisorVerifier => write!(f, "supervisor_verifier"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
