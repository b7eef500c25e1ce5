//! Generation endpoint client.
//!
//! The contract consumed here is deliberately small: send a prompt and an
//! optional inline image, get text back or an error. [`GeminiClient`] speaks
//! the Generative Language REST API; tests and alternative backends implement
//! [`Generator`] directly.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};

/// Returned when the model answers with no text at all.
pub const EMPTY_RESPONSE_MESSAGE: &str = "I couldn't generate a response. Please try again.";

/// Image bytes sent inline with a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// Raw image bytes
    pub data: Vec<u8>,
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
}

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Prompt text
    pub prompt: String,
    /// Optional image for the model to analyze
    pub image: Option<InlineImage>,
}

impl GenerationRequest {
    /// A text-only request
    pub fn text(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), image: None }
    }

    /// Attach an image
    #[must_use]
    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// Something that turns a prompt into an answer.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text for `request`
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

// Wire format of generateContent

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    InlineData(InlineData<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

fn request_body<'a>(system_instruction: &'a str, request: &'a GenerationRequest) -> GenerateContentBody<'a> {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &request.image {
        parts.push(Part::InlineData(InlineData {
            mime_type: &image.mime_type,
            data: base64::engine::general_purpose::STANDARD.encode(&image.data),
        }));
    }
    parts.push(Part::Text(&request.prompt));

    GenerateContentBody {
        system_instruction: Content { role: None, parts: vec![Part::Text(system_instruction)] },
        contents: vec![Content { role: Some("user"), parts }],
    }
}

/// [`Generator`] for the hosted Gemini models.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    system_instruction: String,
}

impl GeminiClient {
    /// Build a client from `config`. Fails if no API key is configured.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let api_key = config
            .gemini_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::config("gemini_api_key is not set"))?;

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            system_instruction: config.system_instruction.clone(),
        })
    }

    /// The model this client calls
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = request_body(&self.system_instruction, request);
        debug!(
            model = %self.model,
            prompt_len = request.prompt.len(),
            has_image = request.image.is_some(),
            "Sending generation request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::generation(format!("failed to reach model endpoint: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "Model endpoint rejected request");
            return Err(Error::generation(format!("model endpoint returned {status}: {text}")));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("invalid response from model endpoint: {e}")))?;

        let text = parsed.text();
        if text.trim().is_empty() {
            return Ok(EMPTY_RESPONSE_MESSAGE.to_string());
        }
        Ok(text)
    }
}
