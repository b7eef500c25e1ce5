//! Contact form submission.
//!
//! Each submission appends a `contactMessages` document with a generated id.
//! Nothing is ever read back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::{DocumentStore, Fields};

/// Collection receiving contact messages.
pub const CONTACT_COLLECTION: &str = "contactMessages";

/// Banner shown after a successful submission.
pub const SENT_MESSAGE: &str = "Message sent successfully!";

/// Banner shown after a failed submission.
pub const FAILED_MESSAGE: &str = "Failed to send message. Try again.";

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    /// A field was empty; nothing was written
    Incomplete,
    /// The message was stored
    Sent,
    /// The store rejected the write
    Failed,
}

impl ContactStatus {
    /// Banner text for this status, if any
    #[must_use]
    pub fn banner(self) -> Option<&'static str> {
        match self {
            Self::Incomplete => None,
            Self::Sent => Some(SENT_MESSAGE),
            Self::Failed => Some(FAILED_MESSAGE),
        }
    }
}

/// A contact form being filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    /// Sender name
    #[serde(default)]
    pub name: String,
    /// Sender email
    #[serde(default)]
    pub email: String,
    /// Message body
    #[serde(default)]
    pub message: String,
}

impl ContactForm {
    /// Create a filled-in form
    pub fn new(name: impl Into<String>, email: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), email: email.into(), message: message.into() }
    }

    /// Whether every field has a value
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.email, &self.message]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    /// Store the message. Clears the form on success.
    pub async fn submit(&mut self, store: &Arc<dyn DocumentStore>) -> ContactStatus {
        if !self.is_complete() {
            return ContactStatus::Incomplete;
        }

        let fields = Fields::new()
            .with("name", self.name.clone())
            .with("email", self.email.clone())
            .with("message", self.message.clone())
            .with_server_timestamp("timestamp");

        match store.add(CONTACT_COLLECTION, fields).await {
            Ok(path) => {
                info!(path = %path, "Contact message stored");
                *self = Self::default();
                ContactStatus::Sent
            }
            Err(e) => {
                warn!(error = %e, "Failed to store contact message");
                ContactStatus::Failed
            }
        }
    }
}
