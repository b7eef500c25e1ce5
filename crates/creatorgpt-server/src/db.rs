//! SQLite-backed document store

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use creatorgpt::store::{
    apply_write, check_precondition, Commit, DocPath, DocumentStore, Snapshot, Subscription,
    Watchers,
};
use creatorgpt::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

fn storage(e: impl std::fmt::Display) -> Error {
    Error::storage(e.to_string())
}

/// Document store persisted in a single SQLite file.
///
/// Commits run inside one SQLite transaction while the connection lock is
/// held, and subscribers are notified before the lock is released.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    watchers: Watchers,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("watched", &self.watchers.len())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the database
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                fields TEXT NOT NULL,
                version INTEGER NOT NULL,
                update_time TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );",
        )
        .context("Failed to create tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
            watchers: Watchers::default(),
        })
    }

    /// Paths of every document in `collection`, sorted
    pub fn list(&self, collection: &str) -> Result<Vec<DocPath>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(storage)?;

        let ids = stmt
            .query_map([collection], |row| row.get::<_, String>(0))
            .map_err(storage)?;

        let mut paths = Vec::new();
        for id in ids {
            paths.push(DocPath::new(collection, id.map_err(storage)?)?);
        }
        Ok(paths)
    }

    /// Number of documents that currently have live subscribers registered
    pub fn watched_documents(&self) -> usize {
        self.watchers.len()
    }
}

struct Row {
    fields: String,
    version: i64,
    update_time: String,
}

fn read_row(conn: &Connection, path: &DocPath) -> Result<Option<Row>> {
    conn.query_row(
        "SELECT fields, version, update_time FROM documents WHERE collection = ?1 AND id = ?2",
        [path.collection(), path.id()],
        |row| {
            Ok(Row {
                fields: row.get(0)?,
                version: row.get(1)?,
                update_time: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(storage)
}

fn read_snapshot(conn: &Connection, path: &DocPath) -> Result<Option<Snapshot>> {
    let Some(row) = read_row(conn, path)? else {
        return Ok(None);
    };

    let fields: Map<String, Value> = serde_json::from_str(&row.fields)
        .map_err(|e| Error::storage(format!("corrupt fields for {path}: {e}")))?;
    let update_time = DateTime::parse_from_rfc3339(&row.update_time)
        .map_err(|e| Error::storage(format!("corrupt update_time for {path}: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(Snapshot {
        path: path.clone(),
        fields,
        version: row.version as u64,
        update_time,
    }))
}

fn last_version(conn: &Connection) -> Result<u64> {
    let value: Option<i64> = conn
        .query_row("SELECT value FROM meta WHERE key = 'last_version'", [], |row| row.get(0))
        .optional()
        .map_err(storage)?;
    Ok(value.unwrap_or(0) as u64)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock();
        read_snapshot(&conn, path)
    }

    async fn subscribe(&self, path: &DocPath) -> Result<Subscription> {
        let conn = self.conn.lock();
        let current = read_snapshot(&conn, path)?;
        debug!(path = %path, exists = current.is_some(), "Subscribing to document");
        Ok(self.watchers.subscribe(path, current))
    }

    async fn commit(&self, commit: Commit) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(storage)?;

        for precondition in &commit.preconditions {
            let current = read_row(&tx, &precondition.path)?.map(|row| row.version as u64);
            check_precondition(precondition, current)?;
        }

        let now = Utc::now();

        let mut staged: BTreeMap<DocPath, Option<Map<String, Value>>> = BTreeMap::new();
        for write in commit.writes {
            let path = write.path().clone();
            let existing = match staged.remove(&path) {
                Some(fields) => fields,
                None => read_snapshot(&tx, &path)?.map(|snapshot| snapshot.fields),
            };
            staged.insert(path, apply_write(existing, write, now));
        }

        if staged.is_empty() {
            return Ok(());
        }

        let version = last_version(&tx)? + 1;
        tx.execute(
            "INSERT INTO meta (key, value) VALUES ('last_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [version as i64],
        )
        .map_err(storage)?;

        let mut snapshots = Vec::with_capacity(staged.len());
        for (path, fields) in staged {
            let snapshot = match fields {
                Some(fields) => {
                    let encoded = serde_json::to_string(&fields).map_err(storage)?;
                    tx.execute(
                        "INSERT INTO documents (collection, id, fields, version, update_time)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(collection, id) DO UPDATE SET
                            fields = excluded.fields,
                            version = excluded.version,
                            update_time = excluded.update_time",
                        params![path.collection(), path.id(), encoded, version as i64, now.to_rfc3339()],
                    )
                    .map_err(storage)?;
                    Some(Snapshot { path: path.clone(), fields, version, update_time: now })
                }
                None => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        [path.collection(), path.id()],
                    )
                    .map_err(storage)?;
                    None
                }
            };
            snapshots.push((path, snapshot));
        }

        tx.commit().map_err(storage)?;

        for (path, snapshot) in snapshots {
            self.watchers.notify(&path, snapshot);
        }

        debug!(version, "Commit applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creatorgpt::store::{Fields, Precondition, SetMode, Write};
    use tempfile::TempDir;

    fn doc(id: &str) -> DocPath {
        DocPath::new("likes", id).unwrap()
    }

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let version = {
            let store = SqliteStore::open(&db_path).unwrap();
            store
                .set(&doc("shyamchand"), Fields::new().with("count", 3), SetMode::Merge)
                .await
                .unwrap();
            store.get(&doc("shyamchand")).await.unwrap().unwrap().version
        };

        let store = SqliteStore::open(&db_path).unwrap();
        let snapshot = store.get(&doc("shyamchand")).await.unwrap().unwrap();
        assert_eq!(snapshot.get::<u64>("count").unwrap(), Some(3));
        assert_eq!(snapshot.version, version);

        // The version counter also survives
        store
            .set(&doc("rajat"), Fields::new().with("count", 1), SetMode::Merge)
            .await
            .unwrap();
        assert!(store.get(&doc("rajat")).await.unwrap().unwrap().version > version);
    }

    #[tokio::test]
    async fn test_merge_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("test.db")).unwrap();
        let path = doc("suresh");

        store
            .set(&path, Fields::new().with("count", 1).with("label", "Suresh"), SetMode::Overwrite)
            .await
            .unwrap();
        store.set(&path, Fields::new().with("count", 2), SetMode::Merge).await.unwrap();

        let snapshot = store.get(&path).await.unwrap().unwrap();
        assert_eq!(snapshot.get::<u64>("count").unwrap(), Some(2));
        assert_eq!(snapshot.get::<String>("label").unwrap().as_deref(), Some("Suresh"));

        store.delete(&path).await.unwrap();
        assert!(store.get(&path).await.unwrap().is_none());
        assert!(store.list("likes").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_precondition_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("test.db")).unwrap();
        let path = doc("supriyo");

        store.set(&path, Fields::new().with("count", 1), SetMode::Merge).await.unwrap();
        let stale = store.get(&path).await.unwrap().unwrap().version;
        store.set(&path, Fields::new().with("count", 2), SetMode::Merge).await.unwrap();

        let err = store
            .commit(Commit {
                preconditions: vec![Precondition { path: path.clone(), version: Some(stale) }],
                writes: vec![
                    Write::Set { path: path.clone(), fields: Fields::new().with("count", 99), mode: SetMode::Merge },
                    Write::Delete { path: doc("other") },
                ],
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        let snapshot = store.get(&path).await.unwrap().unwrap();
        assert_eq!(snapshot.get::<u64>("count").unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_subscription_sees_commits() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("test.db")).unwrap();
        let path = doc("shyamchand");

        let mut subscription = store.subscribe(&path).await.unwrap();
        assert!(subscription.current().is_none());

        store.set(&path, Fields::new().with("count", 1), SetMode::Merge).await.unwrap();
        let snapshot = subscription.changed().await.unwrap().unwrap();
        assert_eq!(snapshot.get::<u64>("count").unwrap(), Some(1));

        drop(subscription);
        store.set(&path, Fields::new().with("count", 2), SetMode::Merge).await.unwrap();
        assert_eq!(store.watched_documents(), 0);
    }

    #[tokio::test]
    async fn test_add_lists_generated_documents() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("test.db")).unwrap();

        let first = store.add("contactMessages", Fields::new().with("name", "Ada")).await.unwrap();
        let second = store.add("contactMessages", Fields::new().with("name", "Bob")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list("contactMessages").unwrap().len(), 2);
    }
}
