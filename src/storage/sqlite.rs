//! SQLite storage backend for chronicle

use super::traits::{CommitBatch, OpenStore, StorageError, StorageResult, VersionStore};
use crate::graph::{Chronicle, EntityKind, ResolvedStamp, Status, Version, VersionData};
use crate::identity::{Handle, HandleState, IdentityDelta, IdentityRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Secondary indexes, dropped for the duration of a bulk load
const SECONDARY_INDEXES: &[(&str, &str)] = &[
    ("idx_versions_kind", "versions(kind)"),
    ("idx_versions_path", "versions(path, time)"),
    ("idx_aliases_handle", "aliases(handle)"),
];

/// Column tuple of one `versions` row
type VersionRow = (i64, i64, String, String, String, i64, i64, i64, String);

/// SQLite-backed version store
///
/// Uses a single SQLite database file with tables for identities, UUID
/// aliases and versions. Thread-safe via internal mutex on the connection.
/// Each commit batch is written in one transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Handle table: one row per handle, kind is NULL while pending
            CREATE TABLE IF NOT EXISTS identities (
                handle INTEGER PRIMARY KEY,
                kind TEXT
            );

            -- Every UUID that resolves to a handle
            CREATE TABLE IF NOT EXISTS aliases (
                uuid TEXT PRIMARY KEY,
                handle INTEGER NOT NULL,
                FOREIGN KEY (handle) REFERENCES identities(handle)
            );

            -- Immutable versions; stamp columns are denormalized for indexing
            CREATE TABLE IF NOT EXISTS versions (
                handle INTEGER NOT NULL,
                commit_seq INTEGER NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                time TEXT NOT NULL,
                author INTEGER NOT NULL,
                module INTEGER NOT NULL,
                path INTEGER NOT NULL,
                data_json TEXT NOT NULL,
                PRIMARY KEY (handle, commit_seq)
            );

            PRAGMA foreign_keys = ON;

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Self::create_secondary_indexes(conn)
    }

    fn create_secondary_indexes(conn: &Connection) -> StorageResult<()> {
        for (name, target) in SECONDARY_INDEXES {
            conn.execute(&format!("CREATE INDEX IF NOT EXISTS {} ON {}", name, target), [])?;
        }
        Ok(())
    }

    fn drop_secondary_indexes(conn: &Connection) -> StorageResult<()> {
        for (name, _) in SECONDARY_INDEXES {
            conn.execute(&format!("DROP INDEX IF EXISTS {}", name), [])?;
        }
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Serialize a version to database columns
    fn version_to_row(version: &Version) -> StorageResult<VersionRow> {
        Ok((
            i64::from(version.handle.value()),
            version.commit as i64,
            version.kind().as_str().to_string(),
            version.stamp.status.as_str().to_string(),
            version.stamp.time.to_rfc3339(),
            i64::from(version.stamp.author.value()),
            i64::from(version.stamp.module.value()),
            i64::from(version.stamp.path.value()),
            serde_json::to_string(&version.data)?,
        ))
    }

    /// Deserialize a version from database columns
    fn row_to_version(row: VersionRow) -> StorageResult<Version> {
        let (handle, commit, _kind, status, time, author, module, path, data_json) = row;
        let status: Status = status.parse().map_err(StorageError::Rejected)?;
        let time = DateTime::parse_from_rfc3339(&time)
            .map_err(|e| StorageError::DateParse(e.to_string()))?
            .with_timezone(&Utc);
        let data: VersionData = serde_json::from_str(&data_json)?;
        Ok(Version {
            handle: Handle::new(handle as u32),
            commit: commit as u64,
            stamp: ResolvedStamp {
                status,
                time,
                author: Handle::new(author as u32),
                module: Handle::new(module as u32),
                path: Handle::new(path as u32),
            },
            data,
        })
    }

    fn insert_version(tx: &Connection, version: &Version) -> StorageResult<()> {
        let (handle, commit, kind, status, time, author, module, path, data) =
            Self::version_to_row(version)?;
        tx.execute(
            r#"
            INSERT INTO versions (handle, commit_seq, kind, status, time, author, module, path, data_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![handle, commit, kind, status, time, author, module, path, data],
        )?;
        Ok(())
    }

    fn apply_identities(tx: &Transaction<'_>, delta: &IdentityDelta) -> StorageResult<()> {
        for record in &delta.allocated {
            let handle = i64::from(record.handle.value());
            tx.execute(
                "INSERT INTO identities (handle, kind) VALUES (?1, ?2)",
                params![handle, record.state.kind().map(EntityKind::as_str)],
            )?;
            for uuid in &record.uuids {
                tx.execute(
                    "INSERT INTO aliases (uuid, handle) VALUES (?1, ?2)",
                    params![uuid.to_string(), handle],
                )?;
            }
        }
        for (handle, uuid) in &delta.aliases {
            tx.execute(
                "INSERT INTO aliases (uuid, handle) VALUES (?1, ?2)",
                params![uuid.to_string(), i64::from(handle.value())],
            )?;
        }
        for (handle, kind) in &delta.defined {
            tx.execute(
                "UPDATE identities SET kind = ?2 WHERE handle = ?1",
                params![i64::from(handle.value()), kind.as_str()],
            )?;
        }
        Ok(())
    }

    fn query_versions(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> StorageResult<Vec<Version>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(Self::row_to_version(row?)?);
        }
        Ok(versions)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

const SELECT_VERSION: &str =
    "SELECT handle, commit_seq, kind, status, time, author, module, path, data_json FROM versions";

impl VersionStore for SqliteStore {
    fn put_version(&self, version: &Version) -> StorageResult<()> {
        let conn = self.conn()?;
        Self::insert_version(&conn, version)
    }

    fn get_chronicle(&self, handle: Handle) -> StorageResult<Chronicle> {
        let conn = self.conn()?;
        let key = i64::from(handle.value());
        let versions = Self::query_versions(
            &conn,
            &format!("{} WHERE handle = ?1 ORDER BY commit_seq", SELECT_VERSION),
            &[&key as &dyn rusqlite::ToSql],
        )?;
        Ok(Chronicle::new(handle, versions))
    }

    fn commit_batch(&self, batch: &CommitBatch) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::apply_identities(&tx, &batch.identities)?;
        for version in &batch.versions {
            Self::insert_version(&tx, version)?;
        }
        // Dropping the transaction on any earlier `?` rolls it back
        tx.commit()?;
        Ok(())
    }

    fn load_identities(&self) -> StorageResult<Vec<IdentityRecord>> {
        let conn = self.conn()?;

        let mut records: BTreeMap<i64, IdentityRecord> = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT handle, kind FROM identities ORDER BY handle")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)))?;
        for row in rows {
            let (handle, kind) = row?;
            let state = match kind {
                Some(kind) => HandleState::Defined(kind.parse().map_err(StorageError::Rejected)?),
                None => HandleState::Pending,
            };
            records.insert(
                handle,
                IdentityRecord {
                    handle: Handle::new(handle as u32),
                    uuids: Vec::new(),
                    state,
                },
            );
        }

        let mut stmt = conn.prepare("SELECT uuid, handle FROM aliases")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (uuid, handle) = row?;
            let uuid = Uuid::parse_str(&uuid).map_err(|e| StorageError::Rejected(e.to_string()))?;
            if let Some(record) = records.get_mut(&handle) {
                record.uuids.push(uuid);
            }
        }

        Ok(records.into_values().collect())
    }

    fn load_all_versions(&self) -> StorageResult<Vec<Version>> {
        let conn = self.conn()?;
        Self::query_versions(&conn, &format!("{} ORDER BY commit_seq, handle", SELECT_VERSION), &[])
    }

    fn version_count(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn begin_bulk_load(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        Self::drop_secondary_indexes(&conn)
    }

    fn end_bulk_load(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        Self::create_secondary_indexes(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptVersion, DescriptionType, DescriptionVersion};

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn stamp() -> ResolvedStamp {
        ResolvedStamp {
            status: Status::Active,
            time: DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            author: Handle::new(1),
            module: Handle::new(2),
            path: Handle::new(3),
        }
    }

    fn create_test_batch() -> CommitBatch {
        let identities = IdentityDelta {
            allocated: (1..=5)
                .map(|h| IdentityRecord {
                    handle: Handle::new(h),
                    uuids: vec![Uuid::new_v4()],
                    state: if h == 4 {
                        HandleState::Defined(EntityKind::Concept)
                    } else if h == 5 {
                        HandleState::Defined(EntityKind::Description)
                    } else {
                        HandleState::Pending
                    },
                })
                .collect(),
            ..Default::default()
        };
        let concept = Version {
            handle: Handle::new(4),
            commit: 1,
            stamp: stamp(),
            data: VersionData::Concept(ConceptVersion {
                descriptions: vec![Handle::new(5)],
                parents: [Handle::new(3)].into_iter().collect(),
                ..Default::default()
            }),
        };
        let description = Version {
            handle: Handle::new(5),
            commit: 1,
            stamp: stamp(),
            data: VersionData::Description(DescriptionVersion {
                concept: Handle::new(4),
                description_type: DescriptionType::Synonym,
                text: "Heart".into(),
                language: Handle::new(2),
                case_significance: Handle::new(2),
                dialects: Vec::new(),
            }),
        };
        CommitBatch {
            sequence: 1,
            versions: vec![concept, description],
            identities,
        }
    }

    #[test]
    fn test_commit_batch_round_trip() {
        let store = create_test_store();
        let batch = create_test_batch();
        store.commit_batch(&batch).unwrap();

        let chronicle = store.get_chronicle(Handle::new(4)).unwrap();
        assert_eq!(chronicle.versions, vec![batch.versions[0].clone()]);
        assert_eq!(store.version_count().unwrap(), 2);

        let identities = store.load_identities().unwrap();
        assert_eq!(identities, batch.identities.allocated);
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let store = create_test_store();
        let mut batch = create_test_batch();
        // Same primary key twice makes the second insert fail
        batch.versions.push(batch.versions[0].clone());

        assert!(store.commit_batch(&batch).is_err());
        assert_eq!(store.version_count().unwrap(), 0);
        assert!(store.load_identities().unwrap().is_empty());
    }

    #[test]
    fn test_aliases_and_definitions_apply_to_existing_handles() {
        let store = create_test_store();
        store.commit_batch(&create_test_batch()).unwrap();

        let extra = Uuid::new_v4();
        let delta = IdentityDelta {
            aliases: vec![(Handle::new(1), extra)],
            defined: vec![(Handle::new(2), EntityKind::Pattern)],
            ..Default::default()
        };
        store
            .commit_batch(&CommitBatch {
                sequence: 2,
                versions: Vec::new(),
                identities: delta,
            })
            .unwrap();

        let identities = store.load_identities().unwrap();
        assert!(identities[0].uuids.contains(&extra));
        assert_eq!(identities[1].state, HandleState::Defined(EntityKind::Pattern));
    }

    #[test]
    fn test_bulk_load_drops_and_restores_indexes() {
        let store = create_test_store();
        let index_count = |store: &SqliteStore| -> i64 {
            store
                .conn
                .lock()
                .unwrap()
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
                    [],
                    |row| row.get(0),
                )
                .unwrap()
        };
        assert_eq!(index_count(&store), SECONDARY_INDEXES.len() as i64);

        store.begin_bulk_load().unwrap();
        assert_eq!(index_count(&store), 0);
        store.commit_batch(&create_test_batch()).unwrap();
        store.end_bulk_load().unwrap();

        assert_eq!(index_count(&store), SECONDARY_INDEXES.len() as i64);
        assert_eq!(store.version_count().unwrap(), 2);
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_reopen_sees_committed_versions() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/chronicle.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.commit_batch(&create_test_batch()).unwrap();
        }
        let store = SqliteStore::open(&db_path).unwrap();
        let versions = store.load_all_versions().unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].stamp, stamp());
    }
}
