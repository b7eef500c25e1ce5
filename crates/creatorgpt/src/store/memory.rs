//! In-process document store.
//!
//! Everything lives in a single map behind a mutex. Commits are serialized by
//! that mutex, which is also held while subscribers are notified.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    apply_write, check_precondition, Commit, DocPath, DocumentStore, Snapshot, Subscription,
    Watchers,
};
use crate::error::Result;

#[derive(Debug, Clone)]
struct StoredDoc {
    fields: Map<String, Value>,
    version: u64,
    update_time: DateTime<Utc>,
}

impl StoredDoc {
    fn snapshot(&self, path: &DocPath) -> Snapshot {
        Snapshot {
            path: path.clone(),
            fields: self.fields.clone(),
            version: self.version,
            update_time: self.update_time,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    docs: HashMap<DocPath, StoredDoc>,
    /// Last version handed out; shared by every document
    last_version: u64,
}

/// A [`DocumentStore`] held entirely in memory.
///
/// Useful for tests and single-process deployments. Cloning is not supported;
/// share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    watchers: Watchers,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().docs.len()
    }

    /// Whether the store holds no documents
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().docs.is_empty()
    }

    /// Paths of every document in `collection`, sorted
    #[must_use]
    pub fn list(&self, collection: &str) -> Vec<DocPath> {
        let mut paths: Vec<DocPath> = self
            .state
            .lock()
            .docs
            .keys()
            .filter(|path| path.collection() == collection)
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Number of documents that currently have live subscribers registered
    #[must_use]
    pub fn watched_documents(&self) -> usize {
        self.watchers.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Snapshot>> {
        let state = self.state.lock();
        Ok(state.docs.get(path).map(|doc| doc.snapshot(path)))
    }

    async fn subscribe(&self, path: &DocPath) -> Result<Subscription> {
        let state = self.state.lock();
        let current = state.docs.get(path).map(|doc| doc.snapshot(path));
        debug!(path = %path, exists = current.is_some(), "Subscribing to document");
        Ok(self.watchers.subscribe(path, current))
    }

    async fn commit(&self, commit: Commit) -> Result<()> {
        let mut state = self.state.lock();

        for precondition in &commit.preconditions {
            let current = state.docs.get(&precondition.path).map(|doc| doc.version);
            check_precondition(precondition, current)?;
        }

        let now = Utc::now();
        let version = state.last_version + 1;

        // Stage every write first so several writes to one document compose
        let mut staged: BTreeMap<DocPath, Option<Map<String, Value>>> = BTreeMap::new();
        for write in commit.writes {
            let path = write.path().clone();
            let existing = match staged.remove(&path) {
                Some(fields) => fields,
                None => state.docs.get(&path).map(|doc| doc.fields.clone()),
            };
            staged.insert(path, apply_write(existing, write, now));
        }

        if staged.is_empty() {
            return Ok(());
        }
        state.last_version = version;

        for (path, fields) in staged {
            let snapshot = match fields {
                Some(fields) => {
                    let doc = StoredDoc { fields, version, update_time: now };
                    let snapshot = doc.snapshot(&path);
                    state.docs.insert(path.clone(), doc);
                    Some(snapshot)
                }
                None => {
                    state.docs.remove(&path);
                    None
                }
            };
            self.watchers.notify(&path, snapshot);
        }

        debug!(version, "Commit applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{Fields, Precondition, SetMode, Write};

    fn path(collection: &str, id: &str) -> DocPath {
        DocPath::new(collection, id).unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        let likes = path("likes", "rajat");

        assert!(store.get(&likes).await.unwrap().is_none());

        store
            .set(&likes, Fields::new().with("count", 4), SetMode::Merge)
            .await
            .unwrap();

        let snapshot = store.get(&likes).await.unwrap().unwrap();
        assert_eq!(snapshot.get::<u64>("count").unwrap(), Some(4));
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn test_versions_never_repeat_after_delete() {
        let store = MemoryStore::new();
        let doc = path("likes", "suresh");

        store.set(&doc, Fields::new().with("count", 1), SetMode::Overwrite).await.unwrap();
        let first = store.get(&doc).await.unwrap().unwrap().version;

        store.delete(&doc).await.unwrap();
        store.set(&doc, Fields::new().with("count", 1), SetMode::Overwrite).await.unwrap();
        let second = store.get(&doc).await.unwrap().unwrap().version;

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_precondition() {
        let store = MemoryStore::new();
        let doc = path("likes", "supriyo");
        store.set(&doc, Fields::new().with("count", 1), SetMode::Merge).await.unwrap();

        let commit = Commit {
            preconditions: vec![Precondition { path: doc.clone(), version: None }],
            writes: vec![Write::Delete { path: doc.clone() }],
        };
        let err = store.commit(commit).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Nothing was written
        assert!(store.get(&doc).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let a = path("likes", "a");
        let b = path("likes", "b");
        store.set(&a, Fields::new().with("count", 1), SetMode::Merge).await.unwrap();

        let commit = Commit {
            preconditions: vec![Precondition { path: a.clone(), version: Some(99) }],
            writes: vec![
                Write::Set { path: b.clone(), fields: Fields::new().with("count", 1), mode: SetMode::Merge },
                Write::Delete { path: a.clone() },
            ],
        };
        assert!(store.commit(commit).await.is_err());
        assert!(store.get(&a).await.unwrap().is_some());
        assert!(store.get(&b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_generates_unique_ids() {
        let store = MemoryStore::new();
        let first = store.add("contactMessages", Fields::new().with("name", "A")).await.unwrap();
        let second = store.add("contactMessages", Fields::new().with("name", "B")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.list("contactMessages").len(), 2);
    }

    #[tokio::test]
    async fn test_subscription_sees_commits() {
        let store = MemoryStore::new();
        let doc = path("settings", "notice");

        let mut sub = store.subscribe(&doc).await.unwrap();
        assert!(sub.current().is_none());

        store.set(&doc, Fields::new().with("text", "Exams soon"), SetMode::Merge).await.unwrap();
        let update = sub.changed().await.unwrap().unwrap();
        assert_eq!(update.get::<String>("text").unwrap().as_deref(), Some("Exams soon"));

        store.delete(&doc).await.unwrap();
        assert!(sub.changed().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_late_subscriber_starts_at_current_state() {
        let store = MemoryStore::new();
        let doc = path("likes", "shyamchand");

        let _early = store.subscribe(&doc).await.unwrap();
        store.set(&doc, Fields::new().with("count", 7), SetMode::Merge).await.unwrap();

        let late = store.subscribe(&doc).await.unwrap();
        let current = late.current().unwrap();
        assert_eq!(current.get::<u64>("count").unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = MemoryStore::new();
        let doc = path("likes", "rajat");

        let sub = store.subscribe(&doc).await.unwrap();
        assert_eq!(store.watched_documents(), 1);
        drop(sub);

        store.set(&doc, Fields::new().with("count", 1), SetMode::Merge).await.unwrap();
        assert_eq!(store.watched_documents(), 0);
    }
}
