//! Chronicle: Authoring Sessions for Versioned Terminology Graphs
//!
//! An engine for authoring concepts, descriptions, patterns and semantics as
//! immutable, stamped versions. Entities refer to each other through public
//! references (one or more UUIDs) that are resolved to dense internal handles,
//! so an entity may be mentioned before it is declared.
//!
//! # Core Concepts
//!
//! - **Handles**: Dense integer identities allocated on first mention, pending until defined
//! - **Builders**: Accumulate facets (descriptions, `is-a` axioms, fields...) for one entity
//! - **Sessions**: Commit many builders under one stamp, all or nothing
//! - **Load phases**: Defer secondary index maintenance across bulk imports
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use chronicle::{Engine, PublicId, Stamp, Status};
//!
//! let engine = Engine::new();
//! let stamp = Stamp::new(
//!     Status::Active,
//!     Utc::now(),
//!     PublicId::from_name("author"),
//!     PublicId::from_name("module"),
//!     PublicId::from_name("path"),
//! );
//!
//! let mut session = engine.open_session(stamp);
//! session
//!     .compose_concept(PublicId::from_name("Heart structure"))
//!     .is_a(PublicId::from_name("Body structure"));
//! let receipt = session.commit().unwrap();
//! assert_eq!(receipt.versions, 1);
//! ```

pub mod batch;
pub mod builder;
pub mod export;
mod graph;
pub mod identity;
pub mod index;
pub mod schema;
pub mod session;
pub mod storage;

pub use batch::{BatchDocument, BatchError, BatchReport, Declaration};
pub use builder::{
    Builder, ConceptBuilder, ConceptFacet, DescriptionFacet, Facet, PatternBuilder, PatternFacet,
    SemanticBuilder, SemanticFacet,
};
pub use export::{ExportSummary, GraphExporter, JsonLinesExporter};
pub use graph::{
    Acceptability, Chronicle, ConceptVersion, CyclePolicy, DescriptionType, DescriptionVersion,
    DialectAcceptability, Engine, EngineConfig, EngineError, EngineResult, EngineStats, EntityKind,
    Identifier, PatternPolicy, PatternVersion, ReadHorizon, ResolvedStamp, SemanticRead, SemanticVersion,
    Stamp, Status, Version, VersionData,
};
pub use identity::{Handle, HandleState, PublicId};
pub use schema::{FieldData, FieldDefinition, FieldType, FieldValue};
pub use session::{AuthoringSession, CommitError, CommitReceipt, SessionState};
pub use storage::{MemoryStore, OpenStore, SqliteStore, StorageError, StorageResult, VersionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
