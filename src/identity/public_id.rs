//! Entity references: author-assigned, immutable identity made of one or more UUIDs

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Namespace used to derive name-based references (UUID v5).
pub const CHRONICLE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_9a2e_3b5d_4e07_9c41_2d8b_7a60_e5f3);

/// An author-assigned reference to an entity.
///
/// A reference holds one or more interchangeable UUIDs. Two references denote
/// the same entity iff they share at least one UUID. The UUID list is kept
/// sorted and duplicate-free so equal sets compare equal.
///
/// Serializes as an array of UUIDs. Deserialization also accepts a single
/// string: a UUID in text form, or any other text, which is treated as a
/// name and hashed with [`PublicId::from_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PublicId(Vec<Uuid>);

impl PublicId {
    /// A reference with a single UUID
    pub fn new(uuid: Uuid) -> Self {
        Self(vec![uuid])
    }

    /// A reference with a fresh random UUID
    pub fn random() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// A deterministic reference derived from a name
    pub fn from_name(name: &str) -> Self {
        Self::new(Uuid::new_v5(&CHRONICLE_NAMESPACE, name.as_bytes()))
    }

    /// Build a reference from several UUIDs. Returns `None` for an empty set.
    pub fn from_uuids(uuids: impl IntoIterator<Item = Uuid>) -> Option<Self> {
        let mut uuids: Vec<Uuid> = uuids.into_iter().collect();
        if uuids.is_empty() {
            return None;
        }
        uuids.sort_unstable();
        uuids.dedup();
        Some(Self(uuids))
    }

    /// Add another UUID alias to this reference
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        if let Err(pos) = self.0.binary_search(&uuid) {
            self.0.insert(pos, uuid);
        }
        self
    }

    pub fn uuids(&self) -> &[Uuid] {
        &self.0
    }

    /// The lowest UUID, used when a single representative is needed
    pub fn primary(&self) -> Uuid {
        self.0[0]
    }

    /// True if both references share at least one UUID
    pub fn shares_uuid(&self, other: &PublicId) -> bool {
        self.0.iter().any(|u| other.0.binary_search(u).is_ok())
    }

    /// Derive a child reference, e.g. for a description owned by a concept.
    ///
    /// Deterministic in the parent's primary UUID and the discriminator, so
    /// re-running the same declaration resolves to the same entity.
    pub fn derive(&self, discriminator: &str) -> Self {
        let mut name = self.primary().to_string();
        name.push('/');
        name.push_str(discriminator);
        Self::new(Uuid::new_v5(&CHRONICLE_NAMESPACE, name.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for PublicId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Uuids(Vec<Uuid>),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Uuids(uuids) => PublicId::from_uuids(uuids)
                .ok_or_else(|| D::Error::custom("a reference needs at least one UUID")),
            Repr::Text(text) => Ok(match Uuid::parse_str(&text) {
                Ok(uuid) => PublicId::new(uuid),
                Err(_) => PublicId::from_name(&text),
            }),
        }
    }
}

impl From<Uuid> for PublicId {
    fn from(uuid: Uuid) -> Self {
        Self::new(uuid)
    }
}

impl std::fmt::Display for PublicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.len() == 1 {
            write!(f, "{}", self.0[0])
        } else {
            let parts: Vec<String> = self.0.iter().map(|u| u.to_string()).collect();
            write!(f, "[{}]", parts.join(", "))
        }
    }
}
