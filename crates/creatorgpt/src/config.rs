//! Configuration for CreatorGpt components.
//!
//! This module provides the [`Config`] struct shared by the generation client,
//! the solver and the like counter.
//!
//! # Example
//!
//! ```rust
//! use creatorgpt::Config;
//!
//! // Defaults: gemini-2.5-flash, 4 MiB image limit, 5 transaction attempts
//! let config = Config::default();
//!
//! // Builder-style overrides
//! let config = Config::new()
//!     .with_gemini_api_key("secret")
//!     .with_model("gemini-2.5-pro")
//!     .with_transaction_max_attempts(10);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{
    DEFAULT_API_BASE_URL, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION,
    DEFAULT_TRANSACTION_MAX_ATTEMPTS, MAX_IMAGE_BYTES,
};

/// Configuration for CreatorGpt components.
///
/// # Defaults
///
/// - `gemini_api_key`: `None` (generation calls fail until set)
/// - `model`: [`DEFAULT_MODEL`]
/// - `api_base_url`: [`DEFAULT_API_BASE_URL`]
/// - `system_instruction`: [`DEFAULT_SYSTEM_INSTRUCTION`]
/// - `max_image_bytes`: [`MAX_IMAGE_BYTES`] (4 MiB)
/// - `transaction_max_attempts`: [`DEFAULT_TRANSACTION_MAX_ATTEMPTS`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the generation endpoint.
    pub gemini_api_key: Option<String>,

    /// Model identifier sent with every generation request.
    pub model: String,

    /// Base URL of the Generative Language REST API.
    ///
    /// Overridable so tests and proxies can point the client elsewhere.
    pub api_base_url: String,

    /// System instruction sent with every generation request.
    pub system_instruction: String,

    /// Largest image attachment accepted, in bytes.
    pub max_image_bytes: u64,

    /// How many times a conflicting transaction is executed before giving up.
    pub transaction_max_attempts: u32,
}

impl Config {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self {
            gemini_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            max_image_bytes: MAX_IMAGE_BYTES,
            transaction_max_attempts: DEFAULT_TRANSACTION_MAX_ATTEMPTS,
        }
    }

    /// Set the generation API key
    #[must_use]
    pub fn with_gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(key.into());
        self
    }

    /// Set the model identifier
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the API base URL
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the system instruction
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Set the image size limit
    #[must_use]
    pub const fn with_max_image_bytes(mut self, bytes: u64) -> Self {
        self.max_image_bytes = bytes;
        self
    }

    /// Set the transaction attempt budget
    #[must_use]
    pub const fn with_transaction_max_attempts(mut self, attempts: u32) -> Self {
        self.transaction_max_attempts = attempts;
        self
    }

    /// Check the values that would otherwise fail late at call time
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }
        if self.transaction_max_attempts == 0 {
            return Err(Error::config("transaction_max_attempts must be at least 1"));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(Error::config(format!(
                "api_base_url must be an http(s) URL, got {}",
                self.api_base_url
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
