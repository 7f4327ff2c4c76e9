//! Secondary indexes and the load-phase bracket

mod load_phase;
mod secondary;

pub use load_phase::{LoadPhaseCoordinator, PhaseExit};
pub use secondary::{tokenize, SecondaryIndex, UnconfirmedHint};
