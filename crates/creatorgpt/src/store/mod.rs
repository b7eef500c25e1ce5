//! Document storage with live subscriptions and optimistic transactions.
//!
//! A document lives at a [`DocPath`] (`collection/id`) and holds a JSON object.
//! Every committed write stamps the document with a new version drawn from a
//! store-wide counter that only moves forward, so a version observed by a
//! reader identifies exactly one state of the document.
//!
//! All mutations go through [`DocumentStore::commit`]. A [`Commit`] carries
//! preconditions (the versions a transaction read) and writes; the store applies
//! the writes atomically only if every precondition still holds, and fails with
//! [`Error::Conflict`](crate::Error::Conflict) otherwise. [`run_transaction`]
//! builds the usual read-modify-write-with-retry loop on top of that.
//!
//! ```rust
//! use std::sync::Arc;
//! use creatorgpt::store::{run_transaction, DocPath, DocumentStore, Fields, MemoryStore, SetMode};
//!
//! # async fn example() -> creatorgpt::Result<()> {
//! let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//! let path = DocPath::new("counters", "visits")?;
//!
//! run_transaction(&store, 5, |tx| {
//!     let path = path.clone();
//!     async move {
//!         let current = match tx.get(&path).await? {
//!             Some(snapshot) => snapshot.get::<u64>("value")?.unwrap_or(0),
//!             None => 0,
//!         };
//!         tx.set(&path, Fields::new().with("value", current + 1), SetMode::Merge);
//!         Ok(())
//!     }
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod memory;
mod transaction;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::trace;

use crate::error::{Error, Result};

pub use memory::MemoryStore;
pub use transaction::{run_transaction, Transaction};

/// Location of a document: a collection name and a document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    collection: String,
    id: String,
}

impl DocPath {
    /// Build a path, rejecting empty segments and segments containing `/`
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        let id = id.into();
        validate_segment(&collection)?;
        validate_segment(&id)?;
        Ok(Self { collection, id })
    }

    /// Parse a `collection/id` string
    pub fn parse(path: &str) -> Result<Self> {
        match path.split_once('/') {
            Some((collection, id)) => Self::new(collection, id),
            None => Err(Error::document(format!("path {path:?} is not collection/id"))),
        }
    }

    /// The collection name
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The document id within the collection
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::document("path segment must not be empty"));
    }
    if segment.contains('/') {
        return Err(Error::document(format!("path segment {segment:?} contains '/'")));
    }
    Ok(())
}

/// A committed state of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Where the document lives
    pub path: DocPath,
    /// Document fields
    pub fields: Map<String, Value>,
    /// Version stamped by the commit that produced this state
    pub version: u64,
    /// When that commit happened
    pub update_time: DateTime<Utc>,
}

impl Snapshot {
    /// Get a field decoded as `V`.
    ///
    /// Returns `None` if the field doesn't exist.
    pub fn get<V: DeserializeOwned>(&self, field: &str) -> Result<Option<V>> {
        match self.fields.get(field) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::document(format!("field {field} of {}: {e}", self.path))),
            None => Ok(None),
        }
    }
}

/// A field value in a write.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A literal JSON value
    Value(Value),
    /// Replaced by the commit time (RFC 3339) when the write is applied
    ServerTimestamp,
}

/// Fields of a write, built up with [`Fields::with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    /// An empty field set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a literal field
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), FieldValue::Value(value.into()));
        self
    }

    /// Add a field the store fills with its commit time
    #[must_use]
    pub fn with_server_timestamp(mut self, key: impl Into<String>) -> Self {
        self.0.insert(key.into(), FieldValue::ServerTimestamp);
        self
    }

    /// Whether no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve sentinels against the commit time
    #[must_use]
    pub fn resolve(self, now: DateTime<Utc>) -> Map<String, Value> {
        self.0
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    FieldValue::Value(v) => v,
                    FieldValue::ServerTimestamp => Value::String(now.to_rfc3339()),
                };
                (key, value)
            })
            .collect()
    }
}

/// How a set write treats fields already in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document
    Overwrite,
    /// Replace only the named top-level fields, creating the document if needed
    Merge,
}

/// One mutation inside a [`Commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or update a document
    Set {
        /// Target document
        path: DocPath,
        /// Fields to write
        fields: Fields,
        /// Overwrite or merge
        mode: SetMode,
    },
    /// Remove a document; deleting a missing document is not an error
    Delete {
        /// Target document
        path: DocPath,
    },
}

impl Write {
    /// The document this write targets
    #[must_use]
    pub fn path(&self) -> &DocPath {
        match self {
            Self::Set { path, .. } | Self::Delete { path } => path,
        }
    }
}

/// The version a document must still have for a commit to apply.
///
/// `version: None` means the document must not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    /// Guarded document
    pub path: DocPath,
    /// Expected version, or `None` for "absent"
    pub version: Option<u64>,
}

/// An atomic batch of writes guarded by preconditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Commit {
    /// Every one must hold or nothing is written
    pub preconditions: Vec<Precondition>,
    /// Applied in order
    pub writes: Vec<Write>,
}

/// Apply one write to a document's current fields.
///
/// Returns `None` when the document ends up deleted.
pub fn apply_write(
    existing: Option<Map<String, Value>>,
    write: Write,
    now: DateTime<Utc>,
) -> Option<Map<String, Value>> {
    match write {
        Write::Delete { .. } => None,
        Write::Set { fields, mode: SetMode::Overwrite, .. } => Some(fields.resolve(now)),
        Write::Set { fields, mode: SetMode::Merge, .. } => {
            let mut merged = existing.unwrap_or_default();
            merged.extend(fields.resolve(now));
            Some(merged)
        }
    }
}

/// Check a precondition against the version currently stored.
pub fn check_precondition(precondition: &Precondition, current: Option<u64>) -> Result<()> {
    if precondition.version == current {
        Ok(())
    } else {
        Err(Error::conflict(format!(
            "{} is at version {current:?}, expected {:?}",
            precondition.path, precondition.version
        )))
    }
}

/// A storage backend for documents.
///
/// Backends implement point reads, subscriptions and [`commit`](Self::commit);
/// the plain `set`/`delete`/`add` helpers are expressed as single commits.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document. Returns `None` if it does not exist.
    async fn get(&self, path: &DocPath) -> Result<Option<Snapshot>>;

    /// Subscribe to a document. The subscription starts at the current state
    /// and observes every later commit touching the document.
    async fn subscribe(&self, path: &DocPath) -> Result<Subscription>;

    /// Atomically apply `commit.writes` if every precondition holds.
    async fn commit(&self, commit: Commit) -> Result<()>;

    /// Write a document outside any transaction
    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<()> {
        self.commit(Commit {
            preconditions: Vec::new(),
            writes: vec![Write::Set { path: path.clone(), fields, mode }],
        })
        .await
    }

    /// Delete a document outside any transaction
    async fn delete(&self, path: &DocPath) -> Result<()> {
        self.commit(Commit {
            preconditions: Vec::new(),
            writes: vec![Write::Delete { path: path.clone() }],
        })
        .await
    }

    /// Create a document with a generated id in `collection`
    async fn add(&self, collection: &str, fields: Fields) -> Result<DocPath> {
        let path = DocPath::new(collection, uuid::Uuid::new_v4().simple().to_string())?;
        self.commit(Commit {
            preconditions: vec![Precondition { path: path.clone(), version: None }],
            writes: vec![Write::Set { path: path.clone(), fields, mode: SetMode::Overwrite }],
        })
        .await?;
        Ok(path)
    }
}

/// A live view of one document.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// releases it; stores prune documents nobody watches on their next commit.
#[derive(Debug)]
pub struct Subscription {
    path: DocPath,
    receiver: watch::Receiver<Option<Snapshot>>,
}

impl Subscription {
    /// The watched document
    #[must_use]
    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// The latest delivered state, `None` if the document does not exist
    #[must_use]
    pub fn current(&self) -> Option<Snapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next update and return it.
    ///
    /// Fails once the store backing the subscription has been dropped.
    pub async fn changed(&mut self) -> Result<Option<Snapshot>> {
        self.receiver
            .changed()
            .await
            .map_err(|_| Error::storage(format!("store closed subscription to {}", self.path)))?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Release the subscription
    pub fn unsubscribe(self) {
        trace!(path = %self.path, "Unsubscribed");
    }
}

/// Per-document watch channels shared by store backends.
///
/// Backends must call [`notify`](Self::notify) while still holding whatever
/// lock serializes their commits, so subscribers never observe states out of
/// order.
#[derive(Debug, Default)]
pub struct Watchers {
    senders: Mutex<HashMap<DocPath, watch::Sender<Option<Snapshot>>>>,
}

impl Watchers {
    /// Register a subscriber.
    ///
    /// `current` seeds the channel when nobody watches the document yet; an
    /// existing channel already holds the latest committed state. Channels
    /// whose subscribers have all gone away are swept first, so documents that
    /// are watched once and never written do not accumulate.
    pub fn subscribe(&self, path: &DocPath, current: Option<Snapshot>) -> Subscription {
        let mut senders = self.senders.lock();
        let before = senders.len();
        senders.retain(|_, sender| sender.receiver_count() > 0);
        if senders.len() < before {
            trace!(pruned = before - senders.len(), "Pruned unwatched documents");
        }
        let receiver = match senders.get(path) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(current);
                senders.insert(path.clone(), sender);
                receiver
            }
        };
        Subscription { path: path.clone(), receiver }
    }

    /// Publish a document's new state, dropping channels nobody listens to
    pub fn notify(&self, path: &DocPath, snapshot: Option<Snapshot>) {
        let mut senders = self.senders.lock();
        let Some(sender) = senders.get(path) else {
            return;
        };
        if sender.receiver_count() == 0 {
            trace!(path = %path, "Pruning unwatched document");
            senders.remove(path);
            return;
        }
        sender.send_replace(snapshot);
    }

    /// Number of documents with a registered channel
    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    /// Whether no document is watched
    pub fn is_empty(&self) -> bool {
        self.senders.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_subscriptions_are_swept() {
        let watchers = Watchers::default();
        let unwritten = DocPath::new("likes", "nobody").unwrap();
        let other = DocPath::new("likes", "shyamchand").unwrap();

        drop(watchers.subscribe(&unwritten, None));
        assert_eq!(watchers.len(), 1);

        let live = watchers.subscribe(&other, None);
        assert_eq!(watchers.len(), 1);

        // Many short-lived watchers of distinct documents stay bounded
        for i in 0..100 {
            let path = DocPath::new("likes", format!("nobody-{i}")).unwrap();
            drop(watchers.subscribe(&path, None));
        }
        assert_eq!(watchers.len(), 2);
        live.unsubscribe();
    }

    #[test]
    fn test_doc_path_validation() {
        let path = DocPath::new("likes", "shyamchand").unwrap();
        assert_eq!(path.to_string(), "likes/shyamchand");
        assert_eq!(DocPath::parse("likes/shyamchand").unwrap(), path);

        assert!(DocPath::new("", "x").is_err());
        assert!(DocPath::new("likes", "").is_err());
        assert!(DocPath::new("likes", "a/b").is_err());
        assert!(DocPath::parse("likes").is_err());
    }

    #[test]
    fn test_fields_resolve_server_timestamp() {
        let now = Utc::now();
        let fields = Fields::new()
            .with("count", 3)
            .with_server_timestamp("createdAt")
            .resolve(now);

        assert_eq!(fields["count"], Value::from(3));
        assert_eq!(fields["createdAt"], Value::String(now.to_rfc3339()));
    }

    #[test]
    fn test_apply_write_merge_keeps_other_fields() {
        let now = Utc::now();
        let existing = Fields::new().with("count", 1).with("label", "a").resolve(now);
        let write = Write::Set {
            path: DocPath::new("likes", "x").unwrap(),
            fields: Fields::new().with("count", 2),
            mode: SetMode::Merge,
        };

        let merged = apply_write(Some(existing), write, now).unwrap();
        assert_eq!(merged["count"], Value::from(2));
        assert_eq!(merged["label"], Value::from("a"));
    }

    #[test]
    fn test_apply_write_overwrite_drops_other_fields() {
        let now = Utc::now();
        let existing = Fields::new().with("count", 1).with("label", "a").resolve(now);
        let write = Write::Set {
            path: DocPath::new("likes", "x").unwrap(),
            fields: Fields::new().with("count", 2),
            mode: SetMode::Overwrite,
        };

        let replaced = apply_write(Some(existing), write, now).unwrap();
        assert_eq!(replaced.len(), 1);
    }

    #[test]
    fn test_watchers_prune_dropped_subscriptions() {
        let watchers = Watchers::default();
        let path = DocPath::new("settings", "notice").unwrap();

        let sub = watchers.subscribe(&path, None);
        assert_eq!(watchers.len(), 1);

        sub.unsubscribe();
        watchers.notify(&path, None);
        assert_eq!(watchers.len(), 0);
    }
}
