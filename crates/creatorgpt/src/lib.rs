//! # CreatorGpt - AI homework assistant core
//!
//! CreatorGpt lets authenticated users pick a subject, ask a text or image
//! question and get a generated answer. Users can also like team members and
//! leave contact messages.
//!
//! Authentication, persistence and answer generation are external services.
//! This crate puts each one behind a trait and ships working implementations:
//!
//! - **Document store** ([`store::DocumentStore`]): point reads, merge-writes,
//!   live subscriptions and optimistic multi-document transactions.
//!   [`MemoryStore`] is the in-process backend.
//! - **Identity provider** ([`identity::IdentityProvider`]): email/password
//!   accounts kept in the document store.
//! - **Generator** ([`generation::Generator`]): the hosted Gemini REST API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use creatorgpt::{LikeCounter, LocalIdentityProvider, MemoryStore, Session};
//! use creatorgpt::store::DocumentStore;
//!
//! #[tokio::main]
//! async fn main() -> creatorgpt::Result<()> {
//!     let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//!     let provider = Arc::new(LocalIdentityProvider::new(store.clone()));
//!     let session = Session::start(provider);
//!     session.sign_up("ada@example.com", "hunter22").await?;
//!
//!     let mut likes = LikeCounter::new(store, "shyamchand");
//!     likes.initialize(session.user_id().as_deref()).await;
//!     likes.toggle(session.user_id().as_deref()).await;
//!     println!("{} likes", likes.count());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Shared configuration
//! - [`error`]: Error types and Result alias
//! - [`store`]: Document store trait, transactions and the in-memory backend
//! - [`likes`]: Transactional like/unlike counter
//! - [`identity`]: Accounts and the identity provider
//! - [`session`]: Explicit current-user context
//! - [`generation`]: Generation endpoint client
//! - [`solver`]: Subject catalog, prompts, image attachments
//! - [`notice`]: Live notice banner
//! - [`contact`]: Contact form submission
//! - [`team`]: Team roster and like count display

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::all)]

pub mod config;
pub mod contact;
pub mod error;
pub mod generation;
pub mod identity;
pub mod likes;
pub mod notice;
pub mod session;
pub mod solver;
pub mod store;
pub mod team;

pub use config::Config;
pub use contact::{ContactForm, ContactStatus};
pub use error::{AuthError, Error, Result};
pub use generation::{GeminiClient, GenerationRequest, Generator, InlineImage};
pub use identity::{AccountStore, IdentityProvider, LocalIdentityProvider, User};
pub use likes::{LikeCounter, LikeState, ToggleOutcome};
pub use notice::NoticeBoard;
pub use session::Session;
pub use solver::{DetailLevel, ImageAttachment, Solver, Subject, SUBJECTS};
pub use store::{DocPath, DocumentStore, Fields, MemoryStore, SetMode, Snapshot, Subscription};
pub use team::{format_count, TeamMember, TEAM};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Base URL of the Generative Language REST API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Persona sent as the system instruction of every generation request.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are CreatorGpt, an expert AI tutor created by Shyamchand Das. Your goal is to provide clear, accurate, and helpful answers. Format your response with Markdown for better readability.";

/// Largest image attachment accepted for upload (4 MiB).
pub const MAX_IMAGE_BYTES: u64 = 4 * 1024 * 1024;

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Attempts made by a conflicting transaction before it is aborted.
pub const DEFAULT_TRANSACTION_MAX_ATTEMPTS: u32 = 5;
