//! Load-phase bracket: defer secondary index maintenance across many commits
//!
//! While a load phase is open, committed versions are queued instead of
//! being folded into the secondary index. Closing the outermost phase hands
//! the queue back so the caller can apply it in one pass. Nested `begin`
//! calls only deepen the bracket; nothing is applied until the depth
//! returns to zero.

use crate::graph::Version;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct PhaseState {
    depth: usize,
    queued: Vec<Version>,
    commits: usize,
}

/// What closing a load phase did
#[derive(Debug)]
pub enum PhaseExit {
    /// No load phase was open
    Inactive,
    /// An inner bracket closed; the outer one is still open
    Nested { depth: usize },
    /// The outermost bracket closed; these versions still need indexing
    Closed { queued: Vec<Version>, commits: usize },
}

#[derive(Debug, Default)]
pub struct LoadPhaseCoordinator {
    state: Mutex<PhaseState>,
}

impl LoadPhaseCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PhaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open (or re-enter) a load phase. Returns true for the outermost bracket.
    pub fn begin(&self) -> bool {
        let mut state = self.state();
        state.depth += 1;
        state.depth == 1
    }

    pub fn end(&self) -> PhaseExit {
        let mut state = self.state();
        match state.depth {
            0 => PhaseExit::Inactive,
            1 => {
                state.depth = 0;
                let commits = std::mem::take(&mut state.commits);
                PhaseExit::Closed {
                    queued: std::mem::take(&mut state.queued),
                    commits,
                }
            }
            _ => {
                state.depth -= 1;
                PhaseExit::Nested { depth: state.depth }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.state().depth > 0
    }

    pub fn depth(&self) -> usize {
        self.state().depth
    }

    /// Queue versions if a phase is open; otherwise hand them back.
    pub fn defer(&self, versions: Vec<Version>) -> Option<Vec<Version>> {
        let mut state = self.state();
        if state.depth == 0 {
            return Some(versions);
        }
        state.queued.extend(versions);
        state.commits += 1;
        None
    }

    /// Number of versions waiting for the phase to close
    pub fn queued(&self) -> usize {
        self.state().queued.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptVersion, ResolvedStamp, Status, VersionData};
    use crate::identity::Handle;
    use chrono::Utc;

    fn version() -> Version {
        Version {
            handle: Handle::new(1),
            commit: 1,
            stamp: ResolvedStamp {
                status: Status::Active,
                time: Utc::now(),
                author: Handle::new(1),
                module: Handle::new(1),
                path: Handle::new(1),
            },
            data: VersionData::Concept(ConceptVersion::default()),
        }
    }

    #[test]
    fn test_versions_pass_through_without_phase() {
        let coordinator = LoadPhaseCoordinator::new();
        assert_eq!(coordinator.defer(vec![version()]).map(|v| v.len()), Some(1));
        assert!(matches!(coordinator.end(), PhaseExit::Inactive));
    }

    #[test]
    fn test_nested_phase_applies_only_at_outermost_end() {
        let coordinator = LoadPhaseCoordinator::new();
        assert!(coordinator.begin());
        assert!(!coordinator.begin());
        assert!(coordinator.defer(vec![version(), version()]).is_none());

        assert!(matches!(coordinator.end(), PhaseExit::Nested { depth: 1 }));
        assert!(coordinator.is_active());
        assert_eq!(coordinator.queued(), 2);

        match coordinator.end() {
            PhaseExit::Closed { queued, commits } => {
                assert_eq!(queued.len(), 2);
                assert_eq!(commits, 1);
            }
            other => panic!("expected closed phase, got {:?}", other),
        }
        assert!(!coordinator.is_active());
        assert_eq!(coordinator.queued(), 0);
    }
}
