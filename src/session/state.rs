//! Session lifecycle states

use serde::Serialize;

/// Lifecycle of an authoring session.
///
/// `Open -> Committing -> Closed` on success. A failed commit or an explicit
/// abort ends in `Aborted`. Only `Open` sessions accept commit or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Committing,
    Closed,
    Aborted,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Committing => "committing",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the session has reached a final state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
