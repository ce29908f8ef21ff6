//! Personality registry backed by a persisted SQLite table.
//!
//! ```sql
//! CREATE TABLE mod_ollama_chat_personality (
//!     guid        INTEGER PRIMARY KEY,
//!     personality INTEGER NOT NULL
//! );
//! ```
//!
//! The table is bulk-loaded once at startup and held in memory. A missing
//! table disables personalities for the session; it is never fatal.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, error, info, warn};

use crate::error::{ParleyError, Result};
use crate::types::ParticipantId;

/// Name of the persisted personality table.
pub const PERSONALITY_TABLE: &str = "mod_ollama_chat_personality";

/// In-memory map from participant to personality classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonalityRegistry {
    entries: HashMap<ParticipantId, u32>,
}

impl PersonalityRegistry {
    /// An empty registry; every lookup falls back to the default persona.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from `(participant, classifier)` pairs. Later pairs
    /// win on duplicate participants.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (ParticipantId, u32)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Classifier assigned to `participant`, if any.
    #[must_use]
    pub fn classifier(&self, participant: ParticipantId) -> Option<u32> {
        self.entries.get(&participant).copied()
    }

    /// Number of participants with an assigned personality.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no personalities are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load the table from an SQLite file, opened read-only.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::StorageUnavailable`] if the table does not
    /// exist, or [`ParleyError::Database`] on SQLite failures.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path.as_ref(), flags)?;
        Self::load_from(&conn)
    }

    /// Load the table through an existing connection.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::StorageUnavailable`] if the table does not
    /// exist, or [`ParleyError::Database`] on SQLite failures.
    pub fn load_from(conn: &Connection) -> Result<Self> {
        let start = Instant::now();

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [PERSONALITY_TABLE],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(ParleyError::StorageUnavailable(format!(
                "table `{PERSONALITY_TABLE}` not found"
            )));
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT guid, personality FROM {PERSONALITY_TABLE}"
        ))?;
        let rows = stmt.query_map([], |row| {
            let guid: i64 = row.get(0)?;
            let personality: i64 = row.get(1)?;
            Ok((guid, personality))
        })?;

        let mut entries = HashMap::new();
        for row in rows {
            let (guid, personality) = row?;
            let (Ok(guid), Ok(personality)) = (u64::try_from(guid), u32::try_from(personality))
            else {
                warn!(guid, personality, "Skipping personality row with out-of-range values");
                continue;
            };
            entries.insert(ParticipantId(guid), personality);
        }

        debug!(
            count = entries.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded personality table"
        );

        Ok(Self { entries })
    }

    /// Load personalities for startup, degrading to an empty registry.
    ///
    /// With no path configured, or when the table is missing or unreadable,
    /// the problem is logged and an empty registry is returned.
    #[must_use]
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            warn!("No personality database configured, personalities disabled");
            return Self::empty();
        };

        match Self::load(path) {
            Ok(registry) => {
                info!(
                    path = %path.display(),
                    count = registry.len(),
                    "Fetched bot personality list"
                );
                registry
            }
            Err(ParleyError::StorageUnavailable(reason)) => {
                error!(
                    path = %path.display(),
                    %reason,
                    "Personality table missing, source the required SQL first"
                );
                Self::empty()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load personalities");
                Self::empty()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn seeded_db(path: &Path, rows: &[(i64, i64)]) {
        let conn = Connection::open(path).expect("open");
        conn.execute_batch(&format!(
            "CREATE TABLE {PERSONALITY_TABLE} (guid INTEGER PRIMARY KEY, personality INTEGER NOT NULL);"
        ))
        .expect("schema");
        for (guid, personality) in rows {
            conn.execute(
                &format!("INSERT INTO {PERSONALITY_TABLE} (guid, personality) VALUES (?1, ?2)"),
                params![guid, personality],
            )
            .expect("insert");
        }
    }

    #[test]
    fn loads_rows_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("characters.db");
        seeded_db(&path, &[(1, 3), (2, 7), (5_000_000_000, 1)]);

        let registry = PersonalityRegistry::load(&path).expect("load");
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.classifier(ParticipantId(2)), Some(7));
        // GUIDs above u32::MAX are kept intact.
        assert_eq!(registry.classifier(ParticipantId(5_000_000_000)), Some(1));
        assert_eq!(registry.classifier(ParticipantId(99)), None);
    }

    #[test]
    fn missing_table_is_storage_unavailable() {
        let conn = Connection::open_in_memory().expect("open");
        let err = PersonalityRegistry::load_from(&conn).expect_err("no table");
        assert!(matches!(err, ParleyError::StorageUnavailable(_)));
    }

    #[test]
    fn missing_table_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .expect("create")
            .execute_batch("CREATE TABLE other (x INTEGER);")
            .expect("schema");

        let registry = PersonalityRegistry::load_or_empty(Some(&path));
        assert!(registry.is_empty());
    }

    #[test]
    fn unset_or_unreadable_path_degrades_to_empty() {
        assert!(PersonalityRegistry::load_or_empty(None).is_empty());

        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.db");
        assert!(PersonalityRegistry::load_or_empty(Some(&missing)).is_empty());
    }

    #[test]
    fn out_of_range_rows_are_skipped() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(&format!(
            "CREATE TABLE {PERSONALITY_TABLE} (guid INTEGER, personality INTEGER);
             INSERT INTO {PERSONALITY_TABLE} VALUES (1, 2);
             INSERT INTO {PERSONALITY_TABLE} VALUES (-4, 2);
             INSERT INTO {PERSONALITY_TABLE} VALUES (3, -1);"
        ))
        .expect("seed");

        let registry = PersonalityRegistry::load_from(&conn).expect("load");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.classifier(ParticipantId(1)), Some(2));
    }

    #[test]
    fn from_entries_last_wins() {
        let registry = PersonalityRegistry::from_entries([
            (ParticipantId(1), 1),
            (ParticipantId(1), 4),
        ]);
        assert_eq!(registry.classifier(ParticipantId(1)), Some(4));
    }
}
