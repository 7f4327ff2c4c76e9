//! Declarative batch documents: many sessions in one JSON or YAML file
//!
//! A document lists sessions in order. Each session carries its stamp and
//! the builders to compose, each builder its facets:
//!
//! ```yaml
//! sessions:
//!   - stamp: { status: active, time: 2024-01-31T00:00:00Z,
//!              author: "user", module: "core", path: "development" }
//!     declarations:
//!       - kind: concept
//!         reference: "Heart structure"
//!         facets:
//!           - { facet: is_a, parents: ["Body structure"] }
//! ```
//!
//! References may be UUIDs, UUID arrays, or names (hashed into stable UUIDs).

use crate::builder::{Builder, ConceptBuilder, ConceptFacet, PatternBuilder, PatternFacet, SemanticBuilder, SemanticFacet};
use crate::graph::{Engine, EngineError, Stamp};
use crate::identity::PublicId;
use crate::session::CommitError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from reading or applying a batch document
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("session {session} failed: {source}")]
    Commit {
        session: usize,
        #[source]
        source: CommitError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// One builder and the facets to attach to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Declaration {
    Concept {
        reference: PublicId,
        #[serde(default)]
        facets: Vec<ConceptFacet>,
    },
    Pattern {
        reference: PublicId,
        #[serde(default)]
        facets: Vec<PatternFacet>,
    },
    Semantic {
        reference: PublicId,
        #[serde(default)]
        facets: Vec<SemanticFacet>,
    },
}

impl Declaration {
    pub fn reference(&self) -> &PublicId {
        match self {
            Self::Concept { reference, .. } | Self::Pattern { reference, .. } | Self::Semantic { reference, .. } => {
                reference
            }
        }
    }

    pub fn into_builder(self) -> Builder {
        match self {
            Self::Concept { reference, facets } => {
                let mut builder = ConceptBuilder::new(reference);
                for facet in facets {
                    builder.attach(facet);
                }
                builder.into()
            }
            Self::Pattern { reference, facets } => {
                let mut builder = PatternBuilder::new(reference);
                for facet in facets {
                    builder.attach(facet);
                }
                builder.into()
            }
            Self::Semantic { reference, facets } => {
                let mut builder = SemanticBuilder::new(reference);
                for facet in facets {
                    builder.attach(facet);
                }
                builder.into()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSession {
    pub stamp: Stamp,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

/// What applying a document committed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub sessions: usize,
    pub versions: usize,
    pub allocated: usize,
    pub last_commit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchDocument {
    #[serde(default)]
    pub sessions: Vec<BatchSession>,
}

impl BatchDocument {
    pub fn from_json(text: &str) -> Result<Self, BatchError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, BatchError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read a document, choosing the format by extension (`.yaml`/`.yml`, otherwise JSON).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if yaml {
            Self::from_yaml(&text)
        } else {
            Self::from_json(&text)
        }
    }

    /// Commit every session in order inside one load phase.
    ///
    /// Stops at the first failing session. Sessions before it stay committed;
    /// the load phase is closed either way.
    pub fn apply(self, engine: &Engine) -> Result<BatchReport, BatchError> {
        engine.begin_load_phase()?;
        let result = self.commit_all(engine);
        engine.end_load_phase()?;
        let report = result?;
        info!(
            sessions = report.sessions,
            versions = report.versions,
            allocated = report.allocated,
            "batch applied"
        );
        Ok(report)
    }

    fn commit_all(self, engine: &Engine) -> Result<BatchReport, BatchError> {
        let mut report = BatchReport::default();
        for (index, batch) in self.sessions.into_iter().enumerate() {
            let mut session = engine.open_session(batch.stamp);
            for declaration in batch.declarations {
                session.add(declaration.into_builder());
            }
            let receipt = session
                .commit()
                .map_err(|source| BatchError::Commit { session: index, source })?;
            debug!(session = index, sequence = receipt.sequence, "batch session committed");
            report.sessions += 1;
            report.versions += receipt.versions;
            report.allocated += receipt.allocated;
            report.last_commit = receipt.sequence;
        }
        Ok(report)
    }
}
