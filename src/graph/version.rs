//! Versions and chronicles: immutable entity snapshots and their history

use super::stamp::ResolvedStamp;
use crate::identity::{Handle, CHRONICLE_NAMESPACE};
use crate::schema::{FieldData, ResolvedFieldDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// The kinds of entity the engine versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Concept,
    Description,
    Pattern,
    Semantic,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Description => "description",
            Self::Pattern => "pattern",
            Self::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concept" => Ok(Self::Concept),
            "description" => Ok(Self::Description),
            "pattern" => Ok(Self::Pattern),
            "semantic" => Ok(Self::Semantic),
            _ => Err(format!("unknown entity kind: {}", s)),
        }
    }
}

/// Which textual role a description plays for its concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionType {
    FullyQualifiedName,
    Synonym,
    Definition,
}

impl DescriptionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullyQualifiedName => "fully_qualified_name",
            Self::Synonym => "synonym",
            Self::Definition => "definition",
        }
    }
}

/// Acceptability of a description within a dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acceptability {
    Preferred,
    Acceptable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectAcceptability {
    pub dialect: Handle,
    pub acceptability: Acceptability,
}

/// An external identifier (e.g. a legacy code) recorded on a concept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Concept naming the identifier scheme
    pub source: Handle,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConceptVersion {
    /// Description entities attached to this concept
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<Handle>,
    /// Authoritative `is-a` parents
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub parents: BTreeSet<Handle>,
    /// Children the author listed; a cross-check only, the inverse index is derived from `parents`
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub child_hints: BTreeSet<Handle>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionVersion {
    pub concept: Handle,
    pub description_type: DescriptionType,
    pub text: String,
    pub language: Handle,
    pub case_significance: Handle,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dialects: Vec<DialectAcceptability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVersion {
    pub meaning: Handle,
    pub purpose: Handle,
    /// Ordered; fixed for the life of this version
    pub fields: Vec<ResolvedFieldDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<Handle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub pattern: Handle,
    pub referenced_component: Handle,
    pub fields: Vec<FieldData>,
}

/// Kind-specific payload of a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VersionData {
    Concept(ConceptVersion),
    Description(DescriptionVersion),
    Pattern(PatternVersion),
    Semantic(SemanticVersion),
}

impl VersionData {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Concept(_) => EntityKind::Concept,
            Self::Description(_) => EntityKind::Description,
            Self::Pattern(_) => EntityKind::Pattern,
            Self::Semantic(_) => EntityKind::Semantic,
        }
    }
}

/// One immutable snapshot of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub handle: Handle,
    /// Sequence number of the commit that published this version
    pub commit: u64,
    pub stamp: ResolvedStamp,
    pub data: VersionData,
}

impl Version {
    pub fn kind(&self) -> EntityKind {
        self.data.kind()
    }

    /// Content-derived identity: equal for versions with equal handle, stamp and payload
    pub fn content_id(&self) -> Uuid {
        // Serializing plain data to a Vec cannot fail
        let payload = serde_json::to_vec(&(&self.handle, &self.stamp, &self.data)).unwrap_or_default();
        Uuid::new_v5(&CHRONICLE_NAMESPACE, &payload)
    }

    pub fn as_concept(&self) -> Option<&ConceptVersion> {
        match &self.data {
            VersionData::Concept(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_description(&self) -> Option<&DescriptionVersion> {
        match &self.data {
            VersionData::Description(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_pattern(&self) -> Option<&PatternVersion> {
        match &self.data {
            VersionData::Pattern(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_semantic(&self) -> Option<&SemanticVersion> {
        match &self.data {
            VersionData::Semantic(s) => Some(s),
            _ => None,
        }
    }
}

/// Which versions a read may see
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadHorizon {
    /// Only versions on this path
    pub path: Option<Handle>,
    /// Only versions stamped at or before this time
    pub as_of: Option<DateTime<Utc>>,
}

impl ReadHorizon {
    /// Everything committed, on any path
    pub fn latest() -> Self {
        Self::default()
    }

    pub fn on_path(mut self, path: Handle) -> Self {
        self.path = Some(path);
        self
    }

    pub fn as_of(mut self, time: DateTime<Utc>) -> Self {
        self.as_of = Some(time);
        self
    }

    pub fn admits(&self, stamp: &ResolvedStamp) -> bool {
        stamp.is_visible()
            && self.path.map_or(true, |p| p == stamp.path)
            && self.as_of.map_or(true, |t| stamp.time <= t)
    }
}

/// Ordered history of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chronicle {
    pub handle: Handle,
    pub versions: Vec<Version>,
}

impl Chronicle {
    pub fn new(handle: Handle, mut versions: Vec<Version>) -> Self {
        versions.sort_by_key(|v| v.commit);
        Self { handle, versions }
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.versions.first().map(|v| v.kind())
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// The version a reader at `horizon` sees: latest stamp time, ties broken by commit order
    pub fn latest(&self, horizon: &ReadHorizon) -> Option<&Version> {
        self.versions
            .iter()
            .filter(|v| horizon.admits(&v.stamp))
            .max_by_key(|v| (v.stamp.time, v.commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Status;
    use chrono::{Duration, TimeZone};

    fn stamp(path: u32, offset_days: i64, status: Status) -> ResolvedStamp {
        ResolvedStamp {
            status,
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset_days),
            author: Handle::new(1),
            module: Handle::new(2),
            path: Handle::new(path),
        }
    }

    fn concept(commit: u64, stamp: ResolvedStamp, parent: u32) -> Version {
        Version {
            handle: Handle::new(10),
            commit,
            stamp,
            data: VersionData::Concept(ConceptVersion {
                parents: [Handle::new(parent)].into_iter().collect(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_latest_prefers_later_stamp_time() {
        let chronicle = Chronicle::new(
            Handle::new(10),
            vec![
                concept(2, stamp(3, 0, Status::Active), 20),
                concept(1, stamp(3, 5, Status::Active), 21),
            ],
        );
        assert_eq!(chronicle.versions[0].commit, 1);
        let latest = chronicle.latest(&ReadHorizon::latest()).unwrap();
        assert_eq!(latest.commit, 1);
    }

    #[test]
    fn test_horizon_filters_path_and_time() {
        let base = stamp(3, 0, Status::Active);
        let chronicle = Chronicle::new(
            Handle::new(10),
            vec![
                concept(1, base, 20),
                concept(2, stamp(4, 1, Status::Active), 21),
                concept(3, stamp(3, 10, Status::Active), 22),
            ],
        );
        let on_path = ReadHorizon::latest().on_path(Handle::new(3));
        assert_eq!(chronicle.latest(&on_path).unwrap().commit, 3);

        let early = on_path.as_of(base.time + Duration::days(1));
        assert_eq!(chronicle.latest(&early).unwrap().commit, 1);

        let branch = ReadHorizon::latest().on_path(Handle::new(4));
        assert_eq!(chronicle.latest(&branch).unwrap().commit, 2);
    }

    #[test]
    fn test_cancelled_versions_are_not_latest() {
        let chronicle = Chronicle::new(
            Handle::new(10),
            vec![
                concept(1, stamp(3, 0, Status::Active), 20),
                concept(2, stamp(3, 1, Status::Cancelled), 21),
            ],
        );
        assert_eq!(chronicle.latest(&ReadHorizon::latest()).unwrap().commit, 1);
    }

    #[test]
    fn test_content_id_tracks_payload() {
        let a = concept(1, stamp(3, 0, Status::Active), 20);
        let mut b = a.clone();
        b.commit = 7;
        assert_eq!(a.content_id(), b.content_id());
        let c = concept(1, stamp(3, 0, Status::Active), 21);
        assert_ne!(a.content_id(), c.content_id());
    }

    #[test]
    fn test_version_data_is_tagged_by_kind() {
        let json = serde_json::to_value(VersionData::Concept(ConceptVersion::default())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "concept"}));
    }
}
