//! Live notice banner stored at `settings/notice`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::store::{DocPath, DocumentStore, Fields, SetMode, Snapshot, Subscription};

/// Collection holding app-wide settings documents.
pub const SETTINGS_COLLECTION: &str = "settings";

/// Id of the notice document inside [`SETTINGS_COLLECTION`].
pub const NOTICE_DOCUMENT: &str = "notice";

fn notice_path() -> Result<DocPath> {
    DocPath::new(SETTINGS_COLLECTION, NOTICE_DOCUMENT)
}

fn notice_text(snapshot: Option<&Snapshot>) -> Option<String> {
    snapshot
        .and_then(|snapshot| snapshot.get::<String>("text").ok().flatten())
        .filter(|text| !text.trim().is_empty())
}

/// A subscription to the notice banner. Dropping it releases the subscription.
#[derive(Debug)]
pub struct NoticeBoard {
    subscription: Subscription,
}

impl NoticeBoard {
    /// Subscribe to the notice document
    pub async fn open(store: &Arc<dyn DocumentStore>) -> Result<Self> {
        let subscription = store.subscribe(&notice_path()?).await?;
        debug!(has_notice = notice_text(subscription.current().as_ref()).is_some(), "Notice board opened");
        Ok(Self { subscription })
    }

    /// The notice to show, `None` if absent or blank
    #[must_use]
    pub fn text(&self) -> Option<String> {
        notice_text(self.subscription.current().as_ref())
    }

    /// Wait until the notice document changes and return the new notice
    pub async fn changed(&mut self) -> Result<Option<String>> {
        let snapshot = self.subscription.changed().await?;
        Ok(notice_text(snapshot.as_ref()))
    }

    /// Replace the notice text. An empty string hides the banner.
    pub async fn publish(store: &Arc<dyn DocumentStore>, text: &str) -> Result<()> {
        store
            .set(&notice_path()?, Fields::new().with("text", text), SetMode::Merge)
            .await?;
        info!(len = text.len(), "Notice published");
        Ok(())
    }

    /// Current notice read once, without subscribing
    pub async fn fetch(store: &Arc<dyn DocumentStore>) -> Result<Option<String>> {
        let snapshot = store.get(&notice_path()?).await?;
        Ok(notice_text(snapshot.as_ref()))
    }
}
