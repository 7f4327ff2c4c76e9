//! Stamps: the provenance tuple every committed version carries

use crate::identity::{Handle, PublicId, CHRONICLE_NAMESPACE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status recorded on a stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
    Primordial,
    Withdrawn,
    Cancelled,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Primordial => "primordial",
            Self::Withdrawn => "withdrawn",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "primordial" => Ok(Self::Primordial),
            "withdrawn" => Ok(Self::Withdrawn),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// Provenance a session is opened against.
///
/// Author, module and path are references; they are resolved at commit like
/// any other reference and may name entities that are declared later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub status: Status,
    pub time: DateTime<Utc>,
    pub author: PublicId,
    pub module: PublicId,
    pub path: PublicId,
}

impl Stamp {
    pub fn new(
        status: Status,
        time: DateTime<Utc>,
        author: PublicId,
        module: PublicId,
        path: PublicId,
    ) -> Self {
        Self {
            status,
            time,
            author,
            module,
            path,
        }
    }
}

/// A stamp with its coordinates resolved to handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedStamp {
    pub status: Status,
    pub time: DateTime<Utc>,
    pub author: Handle,
    pub module: Handle,
    pub path: Handle,
}

impl ResolvedStamp {
    /// Content-derived identity of this stamp
    pub fn id(&self) -> Uuid {
        let key = format!(
            "stamp/{}/{}/{}/{}/{}",
            self.status,
            self.time.timestamp_micros(),
            self.author.value(),
            self.module.value(),
            self.path.value()
        );
        Uuid::new_v5(&CHRONICLE_NAMESPACE, key.as_bytes())
    }

    /// Whether versions under this stamp take part in "latest" reads
    pub fn is_visible(&self) -> bool {
        self.status != Status::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn resolved(status: Status) -> ResolvedStamp {
        ResolvedStamp {
            status,
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            author: Handle::new(1),
            module: Handle::new(2),
            path: Handle::new(3),
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("ACTIVE".parse::<Status>().unwrap(), Status::Active);
        assert_eq!("canceled".parse::<Status>().unwrap(), Status::Cancelled);
        assert!("retired".parse::<Status>().is_err());
    }

    #[test]
    fn test_stamp_id_is_content_derived() {
        assert_eq!(resolved(Status::Active).id(), resolved(Status::Active).id());
        assert_ne!(resolved(Status::Active).id(), resolved(Status::Inactive).id());
    }

    #[test]
    fn test_cancelled_stamps_are_hidden() {
        assert!(resolved(Status::Active).is_visible());
        assert!(resolved(Status::Inactive).is_visible());
        assert!(!resolved(Status::Cancelled).is_visible());
    }
}
