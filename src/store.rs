//! SQLite-backed session store for picker snapshots.
//!
//! Each picker node saves its [`PickerSnapshot`] under its node id:
//! - `node_state` holds the active tab and thumbnail size
//! - `source_state` holds one row per tab

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::models::SortOrder;
use crate::picker::PickerSnapshot;
use crate::source::SourceSnapshot;

/// Snapshot storage.
///
/// The database is stored at `XDG_CONFIG_HOME/imgpick/session.sqlite` and
/// uses WAL mode.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Opens or creates the database at the default XDG location.
    pub fn open_default() -> Result<Self> {
        let db_path = Self::default_db_path()?;
        Self::open(&db_path)
    }

    /// Returns the default database path based on XDG directories.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "imgpick")
            .context("Failed to determine project directories")?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        Ok(config_dir.join("session.sqlite"))
    }

    /// Opens or creates the database at the specified path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )
        .context("Failed to configure SQLite pragmas")?;

        let store = Self { conn };
        store.create_tables()?;

        info!("Opened session store at {:?}", path);
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS node_state (
                node_id TEXT PRIMARY KEY NOT NULL,
                active_source INTEGER NOT NULL,
                thumbnail_size INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS source_state (
                node_id TEXT NOT NULL,
                source_index INTEGER NOT NULL,
                selected_index INTEGER,
                current_page INTEGER NOT NULL,
                sort_order TEXT NOT NULL,
                folder_override TEXT NOT NULL,
                selected_filename TEXT NOT NULL,
                PRIMARY KEY (node_id, source_index),
                FOREIGN KEY (node_id) REFERENCES node_state(node_id) ON DELETE CASCADE
            );
            ",
            )
            .context("Failed to create database tables")?;

        debug!("Database tables created/verified");
        Ok(())
    }

    /// Save `snapshot` for `node_id`, replacing any previous one.
    pub fn save_snapshot(&mut self, node_id: &str, snapshot: &PickerSnapshot) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "
            INSERT INTO node_state (node_id, active_source, thumbnail_size, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(node_id) DO UPDATE SET
                active_source = excluded.active_source,
                thumbnail_size = excluded.thumbnail_size,
                updated_at = excluded.updated_at
            ",
            params![
                node_id,
                snapshot.active_source as i64,
                snapshot.thumbnail_size,
                Self::now()
            ],
        )
        .context("Failed to save node state")?;

        tx.execute("DELETE FROM source_state WHERE node_id = ?1", params![node_id])?;
        {
            let mut stmt = tx.prepare_cached(
                "
                INSERT INTO source_state (
                    node_id, source_index, selected_index, current_page,
                    sort_order, folder_override, selected_filename
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;
            for (index, source) in snapshot.sources.iter().enumerate() {
                stmt.execute(params![
                    node_id,
                    index as i64,
                    source.selected_index.map(|i| i as i64),
                    source.current_page as i64,
                    source.sort_order.as_str(),
                    source.folder_override,
                    source.selected_filename,
                ])?;
            }
        }
        tx.commit()?;

        debug!(node_id, sources = snapshot.sources.len(), "Saved snapshot");
        Ok(())
    }

    /// Load the snapshot saved for `node_id`.
    pub fn load_snapshot(&self, node_id: &str) -> Result<Option<PickerSnapshot>> {
        let node = self
            .conn
            .query_row(
                "SELECT active_source, thumbnail_size FROM node_state WHERE node_id = ?1",
                params![node_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()
            .context("Failed to load node state")?;

        let Some((active_source, thumbnail_size)) = node else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare_cached(
            "
            SELECT selected_index, current_page, sort_order, folder_override, selected_filename
            FROM source_state WHERE node_id = ?1 ORDER BY source_index
            ",
        )?;
        let sources = stmt
            .query_map(params![node_id], |row| {
                Ok(SourceSnapshot {
                    selected_index: row.get::<_, Option<i64>>(0)?.map(|i| i.max(0) as usize),
                    current_page: row.get::<_, i64>(1)?.max(0) as usize,
                    sort_order: row
                        .get::<_, String>(2)?
                        .parse::<SortOrder>()
                        .unwrap_or_default(),
                    folder_override: row.get(3)?,
                    selected_filename: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load source state")?;

        Ok(Some(PickerSnapshot {
            active_source: active_source.max(0) as usize,
            thumbnail_size,
            sources,
        }))
    }

    /// Forget everything saved for `node_id`.
    pub fn delete_node(&self, node_id: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM node_state WHERE node_id = ?1", params![node_id])
            .context("Failed to delete node state")?;
        Ok(deleted > 0)
    }

    /// Ids of every node with a saved snapshot.
    pub fn node_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT node_id FROM node_state ORDER BY node_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot() -> PickerSnapshot {
        PickerSnapshot {
            active_source: 2,
            thumbnail_size: 256,
            sources: vec![
                SourceSnapshot::default(),
                SourceSnapshot {
                    selected_index: Some(4),
                    current_page: 1,
                    sort_order: SortOrder::DateDesc,
                    folder_override: "/pics/sub".into(),
                    selected_filename: "cat.png".into(),
                },
            ],
        }
    }

    #[test]
    fn test_open_and_create() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("session.sqlite");

        let store = SessionStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(store.node_ids().unwrap().is_empty());
        assert!(store.load_snapshot("1").unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_snapshot() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::open(&dir.path().join("s.sqlite")).unwrap();

        store.save_snapshot("17", &snapshot()).unwrap();
        assert_eq!(store.load_snapshot("17").unwrap(), Some(snapshot()));

        // Saving again replaces the tab rows.
        let mut smaller = snapshot();
        smaller.sources.truncate(1);
        smaller.active_source = 0;
        store.save_snapshot("17", &smaller).unwrap();
        assert_eq!(store.load_snapshot("17").unwrap(), Some(smaller));
        assert_eq!(store.node_ids().unwrap(), ["17"]);
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("s.sqlite");
        {
            let mut store = SessionStore::open(&db_path).unwrap();
            store.save_snapshot("a", &snapshot()).unwrap();
        }
        let store = SessionStore::open(&db_path).unwrap();
        assert_eq!(store.load_snapshot("a").unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_delete_node_cascades() {
        let dir = tempdir().unwrap();
        let mut store = SessionStore::open(&dir.path().join("s.sqlite")).unwrap();
        store.save_snapshot("a", &snapshot()).unwrap();

        assert!(store.delete_node("a").unwrap());
        assert!(!store.delete_node("a").unwrap());
        assert!(store.load_snapshot("a").unwrap().is_none());

        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM source_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }
}
