//! Export of the committed graph to interchange formats

mod json;
mod traits;

pub use json::JsonLinesExporter;
pub use traits::{ExportError, ExportSummary, GraphExporter};
