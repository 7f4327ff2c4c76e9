//! Derived navigation and text indexes
//!
//! Everything here is computed from committed versions and can be rebuilt
//! from the chronicles at any time. Each entity contributes through its
//! latest visible version only, ordered by (stamp time, commit sequence),
//! so applying the same versions in any grouping or order yields the same
//! index. A description counts only while its owner's latest version lists it.

use crate::graph::{Version, VersionData};
use crate::identity::Handle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// A child hint that the child's own `is-a` axioms do not confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnconfirmedHint {
    pub parent: Handle,
    pub child: Handle,
}

/// Secondary indexes over the latest visible version of every entity
#[derive(Debug, Default)]
pub struct SecondaryIndex {
    latest: HashMap<Handle, (DateTime<Utc>, u64)>,
    parents: HashMap<Handle, BTreeSet<Handle>>,
    children: HashMap<Handle, BTreeSet<Handle>>,
    child_hints: HashMap<Handle, BTreeSet<Handle>>,
    owner: HashMap<Handle, Handle>,
    /// Owner -> descriptions its latest version lists
    attached: HashMap<Handle, BTreeSet<Handle>>,
    descriptions: HashMap<Handle, BTreeSet<Handle>>,
    description_tokens: HashMap<Handle, BTreeSet<String>>,
    tokens: HashMap<String, BTreeSet<Handle>>,
    semantic_target: HashMap<Handle, (Handle, Handle)>,
    by_component: HashMap<Handle, BTreeSet<Handle>>,
    by_pattern: HashMap<Handle, BTreeSet<Handle>>,
}

/// Lowercased alphanumeric words of a description text
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn unlink(map: &mut HashMap<Handle, BTreeSet<Handle>>, key: Handle, value: Handle) {
    if let Some(set) = map.get_mut(&key) {
        set.remove(&value);
        if set.is_empty() {
            map.remove(&key);
        }
    }
}

impl SecondaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold committed versions into the index.
    ///
    /// Returns the concepts whose parents or hints changed, for hint checks.
    pub fn apply<'a>(&mut self, versions: impl IntoIterator<Item = &'a Version>) -> BTreeSet<Handle> {
        let mut touched = BTreeSet::new();
        for version in versions {
            if !version.stamp.is_visible() {
                continue;
            }
            let key = (version.stamp.time, version.commit);
            if self.latest.get(&version.handle).is_some_and(|current| *current >= key) {
                continue;
            }
            self.latest.insert(version.handle, key);
            if self.index(version) {
                touched.insert(version.handle);
            }
        }
        touched
    }

    fn index(&mut self, version: &Version) -> bool {
        let handle = version.handle;
        match &version.data {
            VersionData::Concept(concept) => {
                let old = self.parents.remove(&handle).unwrap_or_default();
                for parent in old.difference(&concept.parents) {
                    unlink(&mut self.children, *parent, handle);
                }
                for parent in &concept.parents {
                    self.children.entry(*parent).or_default().insert(handle);
                }
                if !concept.parents.is_empty() {
                    self.parents.insert(handle, concept.parents.clone());
                }
                if concept.child_hints.is_empty() {
                    self.child_hints.remove(&handle);
                } else {
                    self.child_hints.insert(handle, concept.child_hints.clone());
                }
                self.attach_descriptions(handle, &concept.descriptions);
                true
            }
            VersionData::Description(description) => {
                if let Some(previous) = self.owner.insert(handle, description.concept) {
                    unlink(&mut self.descriptions, previous, handle);
                }
                self.descriptions.entry(description.concept).or_default().insert(handle);

                for token in self.description_tokens.remove(&handle).unwrap_or_default() {
                    let emptied = self.tokens.get_mut(&token).map(|set| {
                        set.remove(&handle);
                        set.is_empty()
                    });
                    if emptied == Some(true) {
                        self.tokens.remove(&token);
                    }
                }
                let tokens = tokenize(&description.text);
                for token in &tokens {
                    self.tokens.entry(token.clone()).or_default().insert(handle);
                }
                self.description_tokens.insert(handle, tokens);
                false
            }
            VersionData::Semantic(semantic) => {
                let target = (semantic.pattern, semantic.referenced_component);
                if let Some((pattern, component)) = self.semantic_target.insert(handle, target) {
                    unlink(&mut self.by_pattern, pattern, handle);
                    unlink(&mut self.by_component, component, handle);
                }
                self.by_pattern.entry(semantic.pattern).or_default().insert(handle);
                self.by_component
                    .entry(semantic.referenced_component)
                    .or_default()
                    .insert(handle);
                false
            }
            VersionData::Pattern(pattern) => {
                self.attach_descriptions(handle, &pattern.descriptions);
                false
            }
        }
    }

    fn attach_descriptions(&mut self, owner: Handle, descriptions: &[Handle]) {
        if descriptions.is_empty() {
            self.attached.remove(&owner);
        } else {
            self.attached.insert(owner, descriptions.iter().copied().collect());
        }
    }

    fn is_attached(&self, description: Handle) -> bool {
        self.owner
            .get(&description)
            .and_then(|owner| self.attached.get(owner))
            .is_some_and(|listed| listed.contains(&description))
    }

    /// Concepts that declare `parent` as an `is-a` parent
    pub fn children(&self, parent: Handle) -> Vec<Handle> {
        self.children
            .get(&parent)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Descriptions of `owner` that its latest version still lists
    pub fn descriptions(&self, owner: Handle) -> Vec<Handle> {
        self.descriptions
            .get(&owner)
            .map(|d| d.iter().copied().filter(|h| self.is_attached(*h)).collect())
            .unwrap_or_default()
    }

    pub fn semantics_for(&self, component: Handle) -> Vec<Handle> {
        self.by_component
            .get(&component)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn semantics_of(&self, pattern: Handle) -> Vec<Handle> {
        self.by_pattern
            .get(&pattern)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Owners (concepts or patterns) of descriptions containing every word of `query`
    pub fn search(&self, query: &str) -> Vec<Handle> {
        let mut words = tokenize(query).into_iter();
        let Some(first) = words.next() else {
            return Vec::new();
        };
        let mut hits: BTreeSet<Handle> = self.tokens.get(&first).cloned().unwrap_or_default();
        for word in words {
            let Some(matching) = self.tokens.get(&word) else {
                return Vec::new();
            };
            hits.retain(|h| matching.contains(h));
        }
        let owners: BTreeSet<Handle> = hits
            .iter()
            .filter(|h| self.is_attached(**h))
            .filter_map(|h| self.owner.get(h).copied())
            .collect();
        owners.into_iter().collect()
    }

    /// Child hints of `parents` not confirmed by the child's indexed parents
    pub fn unconfirmed_hints<'a>(&self, parents: impl IntoIterator<Item = &'a Handle>) -> Vec<UnconfirmedHint> {
        let mut report = Vec::new();
        for parent in parents {
            let Some(hints) = self.child_hints.get(parent) else {
                continue;
            };
            for child in hints {
                let confirmed = self.parents.get(child).is_some_and(|p| p.contains(parent));
                if !confirmed {
                    report.push(UnconfirmedHint {
                        parent: *parent,
                        child: *child,
                    });
                }
            }
        }
        report
    }

    /// Every unconfirmed hint in the index, sorted
    pub fn navigation_report(&self) -> Vec<UnconfirmedHint> {
        let mut report = self.unconfirmed_hints(self.child_hints.keys());
        report.sort();
        report
    }

    /// Number of entities with an indexed latest version
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptVersion, DescriptionType, DescriptionVersion, ResolvedStamp, Status};
    use chrono::{Duration, TimeZone};

    fn stamp(day: i64, status: Status) -> ResolvedStamp {
        ResolvedStamp {
            status,
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            author: Handle::new(1),
            module: Handle::new(1),
            path: Handle::new(1),
        }
    }

    fn concept(handle: u32, commit: u64, day: i64, parents: &[u32], hints: &[u32]) -> Version {
        Version {
            handle: Handle::new(handle),
            commit,
            stamp: stamp(day, Status::Active),
            data: VersionData::Concept(ConceptVersion {
                parents: parents.iter().copied().map(Handle::new).collect(),
                child_hints: hints.iter().copied().map(Handle::new).collect(),
                ..Default::default()
            }),
        }
    }

    fn owner(handle: u32, commit: u64, day: i64, descriptions: &[u32]) -> Version {
        Version {
            handle: Handle::new(handle),
            commit,
            stamp: stamp(day, Status::Active),
            data: VersionData::Concept(ConceptVersion {
                descriptions: descriptions.iter().copied().map(Handle::new).collect(),
                ..Default::default()
            }),
        }
    }

    fn description(handle: u32, owner: u32, text: &str) -> Version {
        Version {
            handle: Handle::new(handle),
            commit: 1,
            stamp: stamp(0, Status::Active),
            data: VersionData::Description(DescriptionVersion {
                concept: Handle::new(owner),
                description_type: DescriptionType::Synonym,
                text: text.to_string(),
                language: Handle::new(2),
                case_significance: Handle::new(2),
                dialects: Vec::new(),
            }),
        }
    }

    #[test]
    fn test_children_follow_latest_parents() {
        let mut index = SecondaryIndex::new();
        index.apply(&[concept(10, 1, 0, &[20], &[])]);
        assert_eq!(index.children(Handle::new(20)), vec![Handle::new(10)]);

        index.apply(&[concept(10, 2, 1, &[21], &[])]);
        assert!(index.children(Handle::new(20)).is_empty());
        assert_eq!(index.children(Handle::new(21)), vec![Handle::new(10)]);
    }

    #[test]
    fn test_order_of_application_does_not_matter() {
        let versions = vec![
            concept(10, 1, 5, &[20], &[]),
            concept(10, 2, 1, &[21], &[]),
            concept(11, 2, 1, &[20], &[]),
        ];
        let mut forward = SecondaryIndex::new();
        forward.apply(&versions);
        let mut backward = SecondaryIndex::new();
        backward.apply(versions.iter().rev());

        // Commit 1 carries the later stamp time, so it stays latest
        for index in [&forward, &backward] {
            assert_eq!(index.children(Handle::new(20)), vec![Handle::new(10), Handle::new(11)]);
            assert!(index.children(Handle::new(21)).is_empty());
        }
    }

    #[test]
    fn test_cancelled_versions_are_ignored() {
        let mut index = SecondaryIndex::new();
        let mut cancelled = concept(10, 1, 0, &[20], &[]);
        cancelled.stamp.status = Status::Cancelled;
        index.apply(&[cancelled]);
        assert!(index.children(Handle::new(20)).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_matches_every_word() {
        let mut index = SecondaryIndex::new();
        index.apply(&[
            description(30, 10, "Heart structure (body structure)"),
            description(31, 11, "Structure of lung"),
            owner(10, 1, 0, &[30]),
            owner(11, 1, 0, &[31]),
        ]);
        assert_eq!(index.search("structure"), vec![Handle::new(10), Handle::new(11)]);
        assert_eq!(index.search("HEART structure"), vec![Handle::new(10)]);
        assert!(index.search("kidney").is_empty());
        assert!(index.search("  ").is_empty());
    }

    #[test]
    fn test_descriptions_follow_the_owner_version() {
        let versions = vec![
            owner(10, 1, 0, &[30]),
            description(30, 10, "Hart"),
            owner(10, 2, 1, &[31]),
            description(31, 10, "Heart"),
        ];
        let mut forward = SecondaryIndex::new();
        forward.apply(&versions);
        let mut backward = SecondaryIndex::new();
        backward.apply(versions.iter().rev());

        for index in [&forward, &backward] {
            assert_eq!(index.descriptions(Handle::new(10)), vec![Handle::new(31)]);
            assert!(index.search("hart").is_empty());
            assert_eq!(index.search("heart"), vec![Handle::new(10)]);
        }
    }

    #[test]
    fn test_unconfirmed_hints() {
        let mut index = SecondaryIndex::new();
        let touched = index.apply(&[concept(20, 1, 0, &[], &[10, 11])]);
        assert_eq!(index.unconfirmed_hints(&touched).len(), 2);

        index.apply(&[concept(10, 2, 0, &[20], &[])]);
        assert_eq!(
            index.navigation_report(),
            vec![UnconfirmedHint {
                parent: Handle::new(20),
                child: Handle::new(11),
            }]
        );
    }
}
