//! Per-subject like counter.
//!
//! Two kinds of documents back a counter:
//!
//! - `likes/{subject}` holds the aggregate `count`, created on the first like
//!   and never deleted.
//! - `userLikes/{user}_{subject}` exists exactly while that user likes the
//!   subject. Its existence is the only record of the relationship.
//!
//! A toggle mutates both in one transaction whose read set is the aggregate
//! alone, so concurrent togglers on the same subject never lose an increment.
//!
//! # Local state
//!
//! `count` is always read from a live subscription to the aggregate. `is_liked`
//! is fetched once by [`LikeCounter::initialize`] and afterwards flipped
//! optimistically on every successful toggle without re-reading the
//! membership. It can therefore diverge from the store, e.g. when another
//! session unlikes on this user's behalf, and only heals on the next
//! `initialize`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use creatorgpt::{DocumentStore, LikeCounter, MemoryStore, ToggleOutcome};
//!
//! # async fn example() {
//! let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//! let mut likes = LikeCounter::new(store, "shyamchand");
//!
//! likes.initialize(Some("user-1")).await;
//! assert_eq!(likes.toggle(Some("user-1")).await, ToggleOutcome::Liked);
//! assert_eq!(likes.count(), 1);
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{run_transaction, DocPath, DocumentStore, Fields, SetMode, Snapshot, Subscription};
use crate::DEFAULT_TRANSACTION_MAX_ATTEMPTS;

/// Collection holding one aggregate per subject.
pub const LIKES_COLLECTION: &str = "likes";

/// Collection holding one membership per (user, subject) pair.
pub const MEMBERSHIPS_COLLECTION: &str = "userLikes";

/// Path of a subject's aggregate
pub fn aggregate_path(subject_id: &str) -> Result<DocPath> {
    DocPath::new(LIKES_COLLECTION, subject_id)
}

/// Path of a user's membership for a subject
pub fn membership_path(user_id: &str, subject_id: &str) -> Result<DocPath> {
    DocPath::new(MEMBERSHIPS_COLLECTION, format!("{user_id}_{subject_id}"))
}

/// Read a subject's like count once, without subscribing or signing in
pub async fn fetch_count(store: &Arc<dyn DocumentStore>, subject_id: &str) -> Result<u64> {
    let snapshot = store.get(&aggregate_path(subject_id)?).await?;
    Ok(snapshot.map_or(0, |s| stored_count(&s)))
}

/// Point-in-time view of a counter, as shown next to a like button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LikeState {
    /// Total likes for the subject
    pub count: u64,
    /// Whether the current user likes the subject
    pub is_liked: bool,
    /// A toggle is in flight; input should be disabled
    pub pending: bool,
}

/// What a call to [`LikeCounter::toggle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    /// Membership created, count incremented
    Liked,
    /// Membership deleted, count decremented
    Unliked,
    /// Nothing was attempted: no user, or a toggle was already pending
    Skipped,
    /// The transaction failed; local state is unchanged
    Failed,
}

/// Clears the pending flag when a toggle finishes, however it finishes.
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Like/unlike state for one subject, as seen by one user session.
///
/// Counters for different subjects share nothing and may toggle concurrently.
/// The subscription is released when the counter is dropped or
/// [`teardown`](Self::teardown) is called.
pub struct LikeCounter {
    store: Arc<dyn DocumentStore>,
    subject_id: String,
    max_attempts: u32,
    subscription: Option<Subscription>,
    is_liked: AtomicBool,
    pending: AtomicBool,
}

impl std::fmt::Debug for LikeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikeCounter")
            .field("subject_id", &self.subject_id)
            .field("state", &self.state())
            .finish()
    }
}

impl LikeCounter {
    /// Create a counter for `subject_id`. Call [`initialize`](Self::initialize)
    /// before reading it.
    pub fn new(store: Arc<dyn DocumentStore>, subject_id: impl Into<String>) -> Self {
        Self {
            store,
            subject_id: subject_id.into(),
            max_attempts: DEFAULT_TRANSACTION_MAX_ATTEMPTS,
            subscription: None,
            is_liked: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        }
    }

    /// Override how many conflicting attempts a toggle makes
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// The subject this counter tracks
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Subscribe to the aggregate and fetch this user's membership.
    ///
    /// Does nothing when `user_id` is `None`. A previous subscription is
    /// replaced. Store failures are logged and leave the defaults in place;
    /// use [`load`](Self::load) when the caller must not act on them.
    pub async fn initialize(&mut self, user_id: Option<&str>) {
        let Some(user_id) = user_id else {
            debug!(subject = %self.subject_id, "No signed-in user, like counter left idle");
            return;
        };

        if let Err(e) = self.load(user_id).await {
            warn!(subject = %self.subject_id, user = user_id, error = %e, "Failed to initialize like counter");
        }
    }

    /// Like [`initialize`](Self::initialize) for a known user, but reports
    /// store failures. On error `is_liked` is not updated and must not be
    /// trusted for a toggle.
    pub async fn load(&mut self, user_id: &str) -> Result<()> {
        let aggregate = aggregate_path(&self.subject_id)?;
        let membership = membership_path(user_id, &self.subject_id)?;

        self.subscription = Some(self.store.subscribe(&aggregate).await?);

        let liked = self.store.get(&membership).await?.is_some();
        self.is_liked.store(liked, Ordering::Release);

        debug!(subject = %self.subject_id, user = user_id, liked, count = self.count(), "Like counter initialized");
        Ok(())
    }

    /// Total likes, from the latest aggregate update; 0 if none exists yet
    #[must_use]
    pub fn count(&self) -> u64 {
        self.subscription
            .as_ref()
            .and_then(Subscription::current)
            .map_or(0, |snapshot| stored_count(&snapshot))
    }

    /// Whether the current user likes the subject, as far as this counter knows
    #[must_use]
    pub fn is_liked(&self) -> bool {
        self.is_liked.load(Ordering::Acquire)
    }

    /// Whether a toggle is in flight
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Snapshot of the counter for display
    #[must_use]
    pub fn state(&self) -> LikeState {
        LikeState {
            count: self.count(),
            is_liked: self.is_liked(),
            pending: self.is_pending(),
        }
    }

    /// Wait until the aggregate changes, e.g. after another session toggles.
    ///
    /// Returns immediately with the current count when not initialized.
    pub async fn changed(&mut self) -> Result<u64> {
        if let Some(subscription) = self.subscription.as_mut() {
            let snapshot = subscription.changed().await?;
            return Ok(snapshot.map_or(0, |s| stored_count(&s)));
        }
        Ok(0)
    }

    /// Like or unlike the subject for `user_id`.
    ///
    /// Runs one transaction that reads the aggregate and then:
    ///
    /// - when currently liked, deletes the membership and writes
    ///   `count = max(0, current - 1)`;
    /// - otherwise creates the membership (with a server `createdAt`) and writes
    ///   `count = current + 1`.
    ///
    /// The floor at zero masks drift rather than correcting it: unliking when
    /// the aggregate is already 0 leaves it at 0 even though a membership was
    /// deleted.
    ///
    /// Failures are logged and leave local state untouched; nothing is retried
    /// beyond the transaction's own conflict retries.
    pub async fn toggle(&self, user_id: Option<&str>) -> ToggleOutcome {
        let Some(user_id) = user_id else {
            debug!(subject = %self.subject_id, "Toggle ignored, no signed-in user");
            return ToggleOutcome::Skipped;
        };

        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(subject = %self.subject_id, user = user_id, "Toggle ignored, another is pending");
            return ToggleOutcome::Skipped;
        }
        let _pending = PendingGuard(&self.pending);

        let was_liked = self.is_liked();
        match self.commit_toggle(user_id, was_liked).await {
            Ok(()) => {
                self.is_liked.store(!was_liked, Ordering::Release);
                info!(subject = %self.subject_id, user = user_id, liked = !was_liked, "Like toggled");
                if was_liked {
                    ToggleOutcome::Unliked
                } else {
                    ToggleOutcome::Liked
                }
            }
            Err(e) => {
                warn!(subject = %self.subject_id, user = user_id, error = %e, "Like toggle failed");
                ToggleOutcome::Failed
            }
        }
    }

    async fn commit_toggle(&self, user_id: &str, was_liked: bool) -> Result<()> {
        let aggregate = aggregate_path(&self.subject_id)?;
        let membership = membership_path(user_id, &self.subject_id)?;

        run_transaction(&self.store, self.max_attempts, |tx| {
            let aggregate = aggregate.clone();
            let membership = membership.clone();
            let user_id = user_id.to_owned();
            let subject_id = self.subject_id.clone();
            async move {
                let current = tx.get(&aggregate).await?.map_or(0, |s| stored_count(&s));

                if was_liked {
                    tx.delete(&membership);
                    tx.set(
                        &aggregate,
                        Fields::new().with("count", current.saturating_sub(1)),
                        SetMode::Merge,
                    );
                } else {
                    tx.set(
                        &membership,
                        Fields::new()
                            .with("userId", user_id)
                            .with("subjectId", subject_id)
                            .with_server_timestamp("createdAt"),
                        SetMode::Overwrite,
                    );
                    tx.set(&aggregate, Fields::new().with("count", current + 1), SetMode::Merge);
                }
                Ok(())
            }
        })
        .await
    }

    /// Release the aggregate subscription. The counter reads as 0 afterwards
    /// until initialized again.
    pub fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

/// Count stored in an aggregate; missing or malformed counts read as 0.
fn stored_count(snapshot: &Snapshot) -> u64 {
    match snapshot.get::<u64>("count") {
        Ok(Some(count)) => count,
        Ok(None) => 0,
        Err(e) => {
            warn!(path = %snapshot.path, error = %e, "Ignoring malformed like count");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{Commit, MemoryStore};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn new_store() -> (Arc<MemoryStore>, Arc<dyn DocumentStore>) {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = memory.clone();
        (memory, store)
    }

    #[tokio::test]
    async fn test_shyamchand_like_then_unlike() {
        let (_memory, store) = new_store();
        let mut counter = LikeCounter::new(store.clone(), "shyamchand");

        counter.initialize(Some("u1")).await;
        assert_eq!(counter.state(), LikeState { count: 0, is_liked: false, pending: false });

        assert_eq!(counter.toggle(Some("u1")).await, ToggleOutcome::Liked);
        assert_eq!(counter.count(), 1);
        assert!(counter.is_liked());
        let membership = store
            .get(&membership_path("u1", "shyamchand").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.get::<String>("userId").unwrap().as_deref(), Some("u1"));
        assert_eq!(membership.get::<String>("subjectId").unwrap().as_deref(), Some("shyamchand"));
        assert!(membership.get::<String>("createdAt").unwrap().is_some());

        assert_eq!(counter.toggle(Some("u1")).await, ToggleOutcome::Unliked);
        assert_eq!(counter.count(), 0);
        assert!(!counter.is_liked());
        assert!(store
            .get(&membership_path("u1", "shyamchand").unwrap())
            .await
            .unwrap()
            .is_none());

        let aggregate = store.get(&aggregate_path("shyamchand").unwrap()).await.unwrap().unwrap();
        assert_eq!(aggregate.get::<u64>("count").unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_without_user_nothing_happens() {
        let (memory, store) = new_store();
        let mut counter = LikeCounter::new(store, "rajat");

        counter.initialize(None).await;
        assert_eq!(memory.watched_documents(), 0);
        assert_eq!(counter.toggle(None).await, ToggleOutcome::Skipped);
        assert!(memory.is_empty());
        assert_eq!(counter.state(), LikeState::default());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (_memory, store) = new_store();
        store
            .set(&aggregate_path("suresh").unwrap(), Fields::new().with("count", 3), SetMode::Merge)
            .await
            .unwrap();
        store
            .set(
                &membership_path("u1", "suresh").unwrap(),
                Fields::new().with("userId", "u1").with("subjectId", "suresh"),
                SetMode::Overwrite,
            )
            .await
            .unwrap();

        let mut counter = LikeCounter::new(store, "suresh");
        counter.initialize(Some("u1")).await;
        let first = counter.state();
        counter.initialize(Some("u1")).await;

        assert_eq!(first, counter.state());
        assert_eq!(first.count, 3);
        assert!(first.is_liked);
    }

    #[tokio::test]
    async fn test_unlike_floors_count_at_zero() {
        // A membership without a matching increment: the floor hides the drift
        let (_memory, store) = new_store();
        store
            .set(
                &membership_path("u1", "supriyo").unwrap(),
                Fields::new().with("userId", "u1").with("subjectId", "supriyo"),
                SetMode::Overwrite,
            )
            .await
            .unwrap();

        let mut counter = LikeCounter::new(store.clone(), "supriyo");
        counter.initialize(Some("u1")).await;
        assert!(counter.is_liked());
        assert_eq!(counter.count(), 0);

        assert_eq!(counter.toggle(Some("u1")).await, ToggleOutcome::Unliked);
        assert_eq!(counter.count(), 0);
        let aggregate = store.get(&aggregate_path("supriyo").unwrap()).await.unwrap().unwrap();
        assert_eq!(aggregate.get::<u64>("count").unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_count_follows_other_sessions() {
        let (_memory, store) = new_store();
        let mut mine = LikeCounter::new(store.clone(), "rajat");
        let mut theirs = LikeCounter::new(store, "rajat");
        mine.initialize(Some("u1")).await;
        theirs.initialize(Some("u2")).await;

        theirs.toggle(Some("u2")).await;
        assert_eq!(mine.count(), 1);
        assert!(!mine.is_liked());
    }

    #[tokio::test]
    async fn test_teardown_releases_subscription() {
        let (memory, store) = new_store();
        let mut counter = LikeCounter::new(store.clone(), "shyamchand");
        counter.initialize(Some("u1")).await;
        assert_eq!(memory.watched_documents(), 1);

        counter.teardown();
        store
            .set(&aggregate_path("shyamchand").unwrap(), Fields::new().with("count", 5), SetMode::Merge)
            .await
            .unwrap();
        assert_eq!(memory.watched_documents(), 0);
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_count_without_user() {
        let (_memory, store) = new_store();
        assert_eq!(fetch_count(&store, "suresh").await.unwrap(), 0);

        let mut counter = LikeCounter::new(store.clone(), "suresh");
        counter.initialize(Some("u1")).await;
        counter.toggle(Some("u1")).await;
        assert_eq!(fetch_count(&store, "suresh").await.unwrap(), 1);
    }

    /// Delegates reads to a memory store and refuses every commit
    struct ReadOnly {
        inner: MemoryStore,
        error: Error,
    }

    #[async_trait]
    impl DocumentStore for ReadOnly {
        async fn get(&self, path: &DocPath) -> Result<Option<Snapshot>> {
            self.inner.get(path).await
        }

        async fn subscribe(&self, path: &DocPath) -> Result<Subscription> {
            self.inner.subscribe(path).await
        }

        async fn commit(&self, _commit: Commit) -> Result<()> {
            Err(self.error.clone())
        }
    }

    /// Holds the first aggregate read of a toggle until the test releases it
    struct Gated {
        inner: MemoryStore,
        entered: Notify,
        release: Notify,
        held: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for Gated {
        async fn get(&self, path: &DocPath) -> Result<Option<Snapshot>> {
            if path.collection() == LIKES_COLLECTION && !self.held.swap(true, Ordering::AcqRel) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.get(path).await
        }

        async fn subscribe(&self, path: &DocPath) -> Result<Subscription> {
            self.inner.subscribe(path).await
        }

        async fn commit(&self, commit: Commit) -> Result<()> {
            self.inner.commit(commit).await
        }
    }

    async fn assert_failed_toggle_keeps_state(error: Error) {
        let memory = MemoryStore::new();
        memory
            .set(&aggregate_path("rajat").unwrap(), Fields::new().with("count", 4), SetMode::Merge)
            .await
            .unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(ReadOnly { inner: memory, error });

        let mut counter = LikeCounter::new(store.clone(), "rajat").with_max_attempts(3);
        counter.load("u1").await.unwrap();
        let before = counter.state();
        assert_eq!(before, LikeState { count: 4, is_liked: false, pending: false });

        assert_eq!(counter.toggle(Some("u1")).await, ToggleOutcome::Failed);
        assert_eq!(counter.state(), before);
        assert!(!counter.is_pending());
        assert!(store.get(&membership_path("u1", "rajat").unwrap()).await.unwrap().is_none());

        // Still usable: a later toggle is attempted again rather than skipped
        assert_eq!(counter.toggle(Some("u1")).await, ToggleOutcome::Failed);
    }

    #[tokio::test]
    async fn test_toggle_failure_leaves_state_unchanged() {
        assert_failed_toggle_keeps_state(Error::storage("disk full")).await;
    }

    #[tokio::test]
    async fn test_toggle_aborted_after_conflicts_leaves_state_unchanged() {
        // Every attempt conflicts, so the retry budget runs out
        assert_failed_toggle_keeps_state(Error::conflict("likes/rajat changed")).await;
    }

    #[tokio::test]
    async fn test_toggle_while_pending_is_skipped() {
        let gated = Arc::new(Gated {
            inner: MemoryStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
            held: AtomicBool::new(false),
        });
        let store: Arc<dyn DocumentStore> = gated.clone();
        let mut counter = LikeCounter::new(store.clone(), "shyamchand");
        counter.load("u1").await.unwrap();
        // The subscription read above does not go through `get`
        assert!(!gated.held.load(Ordering::Acquire));

        let first = counter.toggle(Some("u1"));
        let second = async {
            gated.entered.notified().await;
            assert!(counter.is_pending());
            assert!(counter.state().pending);
            let outcome = counter.toggle(Some("u1")).await;
            gated.release.notify_one();
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, ToggleOutcome::Liked);
        assert_eq!(second, ToggleOutcome::Skipped);
        assert!(!counter.is_pending());
        assert_eq!(counter.count(), 1);
        assert!(counter.is_liked());
    }

    #[tokio::test]
    async fn test_load_reports_store_errors() {
        let (_memory, store) = new_store();
        let mut counter = LikeCounter::new(store, "suresh");
        assert!(counter.load("bad/user").await.is_err());
        assert_eq!(counter.state(), LikeState::default());
    }

    #[test]
    fn test_malformed_count_reads_as_zero() {
        let snapshot = Snapshot {
            path: aggregate_path("x").unwrap(),
            fields: Fields::new().with("count", -4).resolve(chrono::Utc::now()),
            version: 1,
            update_time: chrono::Utc::now(),
        };
        assert_eq!(stored_count(&snapshot), 0);
    }
}
