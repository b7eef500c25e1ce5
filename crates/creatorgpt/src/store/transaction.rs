//! Optimistic read-modify-write transactions.
//!
//! A [`Transaction`] records the version of every document it reads and
//! buffers its writes. When the body finishes, the buffered writes are sent to
//! the store as one [`Commit`] guarded by those versions. If anything read has
//! changed in the meantime the store reports a conflict and
//! [`run_transaction`] runs the body again against fresh data.
//!
//! As with hosted document databases, all reads must happen before the first
//! write.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Commit, DocPath, DocumentStore, Fields, Precondition, SetMode, Snapshot, Write};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct TxnState {
    reads: BTreeMap<DocPath, Option<u64>>,
    writes: Vec<Write>,
}

/// Handle passed to a transaction body.
///
/// Cheap to clone; clones share the same read set and write buffer.
#[derive(Clone)]
pub struct Transaction {
    store: Arc<dyn DocumentStore>,
    state: Arc<Mutex<TxnState>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Transaction")
            .field("reads", &state.reads.len())
            .field("writes", &state.writes.len())
            .finish()
    }
}

impl Transaction {
    fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, state: Arc::new(Mutex::new(TxnState::default())) }
    }

    /// Read a document and add it to the read set.
    ///
    /// Reading the same document twice must observe the same version, otherwise
    /// the attempt fails early with a conflict.
    pub async fn get(&self, path: &DocPath) -> Result<Option<Snapshot>> {
        if !self.state.lock().writes.is_empty() {
            return Err(Error::transaction("all reads must happen before the first write"));
        }

        let snapshot = self.store.get(path).await?;
        let version = snapshot.as_ref().map(|s| s.version);

        let mut state = self.state.lock();
        match state.reads.entry(path.clone()) {
            Entry::Occupied(seen) if *seen.get() != version => {
                return Err(Error::conflict(format!("{path} changed between two reads")));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(version);
            }
        }
        Ok(snapshot)
    }

    /// Buffer a set write
    pub fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) {
        self.state.lock().writes.push(Write::Set { path: path.clone(), fields, mode });
    }

    /// Buffer a delete
    pub fn delete(&self, path: &DocPath) {
        self.state.lock().writes.push(Write::Delete { path: path.clone() });
    }

    fn take_commit(&self) -> Commit {
        let mut state = self.state.lock();
        let reads = std::mem::take(&mut state.reads);
        Commit {
            preconditions: reads
                .into_iter()
                .map(|(path, version)| Precondition { path, version })
                .collect(),
            writes: std::mem::take(&mut state.writes),
        }
    }
}

/// Run `body` as a transaction, re-executing it on conflict.
///
/// The body is called with a fresh [`Transaction`] on every attempt and must
/// not have side effects outside it. Errors other than conflicts abort at once;
/// after `max_attempts` conflicting attempts the result is
/// [`Error::Aborted`].
pub async fn run_transaction<T, F, Fut>(
    store: &Arc<dyn DocumentStore>,
    max_attempts: u32,
    mut body: F,
) -> Result<T>
where
    F: FnMut(Transaction) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let tx = Transaction::new(Arc::clone(store));

        let outcome = match body(tx.clone()).await {
            Ok(value) => store.commit(tx.take_commit()).await.map(|()| value),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                debug!(attempt, "Transaction committed");
                return Ok(value);
            }
            Err(e) if e.is_retryable() => {
                debug!(attempt, max_attempts, error = %e, "Transaction conflict, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    warn!(max_attempts, "Transaction gave up after repeated conflicts");
    Err(Error::aborted(format!("still conflicting after {max_attempts} attempts")))
}
