//! JSON-lines exporter

use super::traits::{ExportError, ExportSummary, GraphExporter};
use crate::graph::Version;
use crate::identity::IdentityRecord;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "lowercase")]
enum Line<'a> {
    Header {
        format: &'static str,
        #[serde(flatten)]
        summary: &'a ExportSummary,
    },
    Identity(&'a IdentityRecord),
    Version {
        id: uuid::Uuid,
        stamp_id: uuid::Uuid,
        #[serde(flatten)]
        version: &'a Version,
    },
}

/// Writes one JSON object per line: a header, every identity, every version.
pub struct JsonLinesExporter<W: Write> {
    out: W,
    lines: usize,
}

impl<W: Write> JsonLinesExporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    /// Lines written so far
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &Line<'_>) -> Result<(), ExportError> {
        serde_json::to_writer(&mut self.out, line)?;
        self.out.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }
}

impl<W: Write> GraphExporter for JsonLinesExporter<W> {
    fn begin(&mut self, summary: &ExportSummary) -> Result<(), ExportError> {
        self.write_line(&Line::Header {
            format: "chronicle-jsonl/1",
            summary,
        })
    }

    fn identity(&mut self, record: &IdentityRecord) -> Result<(), ExportError> {
        self.write_line(&Line::Identity(record))
    }

    fn version(&mut self, version: &Version) -> Result<(), ExportError> {
        self.write_line(&Line::Version {
            id: version.content_id(),
            stamp_id: version.stamp.id(),
            version,
        })
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptVersion, EntityKind, ResolvedStamp, Status, VersionData};
    use crate::identity::{Handle, HandleState};
    use chrono::Utc;

    #[test]
    fn test_writes_one_object_per_line() {
        let mut exporter = JsonLinesExporter::new(Vec::new());
        let summary = ExportSummary {
            identities: 1,
            versions: 1,
            last_commit: 1,
        };
        exporter.begin(&summary).unwrap();
        exporter
            .identity(&IdentityRecord {
                handle: Handle::new(1),
                uuids: vec![uuid::Uuid::nil()],
                state: HandleState::Defined(EntityKind::Concept),
            })
            .unwrap();
        exporter
            .version(&Version {
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
            })
            .unwrap();
        exporter.finish().unwrap();
        assert_eq!(exporter.lines(), 3);

        let text = String::from_utf8(exporter.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["record"], "header");
        assert_eq!(lines[0]["versions"], 1);
        assert_eq!(lines[1]["record"], "identity");
        assert_eq!(lines[1]["state"]["kind"], "concept");
        assert_eq!(lines[2]["record"], "version");
        assert_eq!(lines[2]["data"]["kind"], "concept");
    }
}
