//! Export collaborator interface

use crate::graph::Version;
use crate::identity::IdentityRecord;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What an export contained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub identities: usize,
    pub versions: usize,
    /// Sequence number of the last commit included
    pub last_commit: u64,
}

/// Receives the committed graph, identities first, then versions in commit order.
///
/// The engine only drives an exporter outside load phases, so an exporter
/// never observes a partially indexed graph.
pub trait GraphExporter {
    fn begin(&mut self, _summary: &ExportSummary) -> Result<(), ExportError> {
        Ok(())
    }

    fn identity(&mut self, record: &IdentityRecord) -> Result<(), ExportError>;

    fn version(&mut self, version: &Version) -> Result<(), ExportError>;

    fn finish(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}
