//! Core graph data structures and the engine that versions them

mod engine;
mod stamp;
mod version;


pub use engine::{
    CyclePolicy, Engine, EngineConfig, EngineError, EngineResult, EngineStats, PatternPolicy, SemanticRead,
};
pub use stamp::{ResolvedStamp, Stamp, Status};
pub use version::{
    Acceptability, Chronicle, ConceptVersion, DescriptionType, DescriptionVersion, DialectAcceptability,
    EntityKind, Identifier, PatternVersion, ReadHorizon, SemanticVersion, Version, VersionData,
};
