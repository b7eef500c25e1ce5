//! Question solving: subjects, prompts and image attachments.
//!
//! [`Solver`] holds what the user is currently composing (subject, detail
//! level, question text, optional image) plus the last answer, and turns it
//! into a [`GenerationRequest`]. Generation failures never escape: the answer
//! becomes [`FALLBACK_ANSWER`] instead.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::generation::{GenerationRequest, Generator, InlineImage};
use crate::MAX_IMAGE_BYTES;

/// Shown in place of an answer when generation fails.
pub const FALLBACK_ANSWER: &str = "Sorry, I encountered an error. Please try again.";

/// A subject the user can ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Stable identifier
    pub id: &'static str,
    /// Display name
    pub label: &'static str,
    /// Icon shown next to the label
    pub emoji: &'static str,
    /// Instruction prepended to questions in this subject
    pub prompt_context: &'static str,
}

/// Every subject, in display order. The first one is the default.
pub static SUBJECTS: [Subject; 6] = [
    Subject {
        id: "math",
        label: "Math",
        emoji: "🔢",
        prompt_context: "As a math expert, provide step-by-step solutions.",
    },
    Subject {
        id: "physics",
        label: "Physics",
        emoji: "⚛️",
        prompt_context: "As a physics expert, explain principles and solve.",
    },
    Subject {
        id: "history",
        label: "History",
        emoji: "📜",
        prompt_context: "As a historian, provide concise, factual answers.",
    },
    Subject {
        id: "geography",
        label: "Geography",
        emoji: "🌍",
        prompt_context: "As a geographer, be precise with locations.",
    },
    Subject {
        id: "english",
        label: "English",
        emoji: "⚜️",
        prompt_context: "As an English expert, explain grammar/literature.",
    },
    Subject {
        id: "bengali",
        label: "Bengali",
        emoji: "🌼",
        prompt_context: "Provide the answer entirely in Bengali.",
    },
];

impl Subject {
    /// Look up a subject by id
    #[must_use]
    pub fn find(id: &str) -> Option<&'static Subject> {
        SUBJECTS.iter().find(|subject| subject.id == id)
    }
}

/// How much detail the answer should have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Short answer
    Short,
    /// Medium details
    #[default]
    Medium,
    /// Full details
    Detailed,
}

impl DetailLevel {
    /// Wire name, also used in prompts
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Detailed => "detailed",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetailLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "detailed" => Ok(Self::Detailed),
            other => Err(Error::validation(format!("unknown detail level {other:?}"))),
        }
    }
}

/// Build the prompt sent to the model.
#[must_use]
pub fn compose_prompt(subject: &Subject, detail: DetailLevel, question: &str, has_image: bool, date: &str) -> String {
    let mut prompt = format!(
        "Subject: {}\nContext: {}\nDetail Level: {}\nDate: {}\nQuestion: {}\n",
        subject.label, subject.prompt_context, detail, date, question
    );
    if has_image {
        prompt.push_str("An image is attached for analysis.\n");
    }
    prompt
}

/// MIME type for an image file extension
fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// An image accepted for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    data: Vec<u8>,
    mime_type: String,
}

impl ImageAttachment {
    /// Accept in-memory image bytes if they fit under `limit`
    pub fn from_bytes(data: Vec<u8>, mime_type: impl Into<String>, limit: u64) -> Result<Self> {
        let mime_type = mime_type.into();
        if !mime_type.starts_with("image/") {
            return Err(Error::validation(format!("{mime_type} is not an image type")));
        }
        let size = data.len() as u64;
        if size > limit {
            return Err(Error::ImageTooLarge { size, limit });
        }
        Ok(Self { data, mime_type })
    }

    /// Load an image file.
    ///
    /// The size is checked from file metadata before anything is read, so an
    /// oversize file is rejected without loading it.
    pub async fn load(path: &Path, limit: u64) -> Result<Self> {
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .ok_or_else(|| Error::validation(format!("{} is not a supported image", path.display())))?;

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::validation(format!("cannot stat {}: {e}", path.display())))?
            .len();
        if size > limit {
            return Err(Error::ImageTooLarge { size, limit });
        }

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::validation(format!("cannot read {}: {e}", path.display())))?;
        Self::from_bytes(data, mime_type, limit)
    }

    /// The MIME type
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image has no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn to_inline(&self) -> InlineImage {
        InlineImage { data: self.data.clone(), mime_type: self.mime_type.clone() }
    }
}

/// The question being composed and the last answer.
pub struct Solver {
    generator: Arc<dyn Generator>,
    max_image_bytes: u64,
    subject: &'static Subject,
    detail: DetailLevel,
    question: String,
    image: Option<ImageAttachment>,
    loading: bool,
    result: Option<String>,
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("subject", &self.subject.id)
            .field("detail", &self.detail)
            .field("question", &self.question)
            .field("has_image", &self.image.is_some())
            .field("loading", &self.loading)
            .finish_non_exhaustive()
    }
}

impl Solver {
    /// Create a solver on the default subject with medium detail
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            max_image_bytes: MAX_IMAGE_BYTES,
            subject: &SUBJECTS[0],
            detail: DetailLevel::default(),
            question: String::new(),
            image: None,
            loading: false,
            result: None,
        }
    }

    /// Override the image size limit
    #[must_use]
    pub fn with_max_image_bytes(mut self, bytes: u64) -> Self {
        self.max_image_bytes = bytes;
        self
    }

    /// Switch subject by id
    pub fn select_subject(&mut self, id: &str) -> Result<()> {
        self.subject = Subject::find(id).ok_or_else(|| Error::validation(format!("unknown subject {id:?}")))?;
        Ok(())
    }

    /// The selected subject
    #[must_use]
    pub fn subject(&self) -> &'static Subject {
        self.subject
    }

    /// Set the detail level
    pub fn set_detail(&mut self, detail: DetailLevel) {
        self.detail = detail;
    }

    /// Replace the question text
    pub fn set_question(&mut self, question: impl Into<String>) {
        self.question = question.into();
    }

    /// Attach an image file. On error the current attachment is kept.
    pub async fn attach_image(&mut self, path: &Path) -> Result<()> {
        match ImageAttachment::load(path, self.max_image_bytes).await {
            Ok(image) => {
                debug!(path = %path.display(), bytes = image.len(), "Image attached");
                self.image = Some(image);
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Image rejected");
                Err(e)
            }
        }
    }

    /// Attach an already accepted image
    pub fn set_image(&mut self, image: ImageAttachment) {
        self.image = Some(image);
    }

    /// Drop the current attachment
    pub fn remove_image(&mut self) {
        self.image = None;
    }

    /// The current attachment
    #[must_use]
    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    /// Whether there is anything to send
    #[must_use]
    pub fn can_solve(&self) -> bool {
        !self.question.trim().is_empty() || self.image.is_some()
    }

    /// Whether a generation call is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// The last answer, or the fallback message if it failed
    #[must_use]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// The request [`solve`](Self::solve) would send right now
    #[must_use]
    pub fn request(&self) -> GenerationRequest {
        let date = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let prompt = compose_prompt(self.subject, self.detail, &self.question, self.image.is_some(), &date);
        GenerationRequest {
            prompt,
            image: self.image.as_ref().map(ImageAttachment::to_inline),
        }
    }

    /// Ask the generator. Does nothing if there is neither a question nor an
    /// image. Returns the new result.
    pub async fn solve(&mut self) -> Option<&str> {
        if !self.can_solve() {
            return None;
        }

        self.loading = true;
        self.result = None;
        let request = self.request();

        let answer = match self.generator.generate(&request).await {
            Ok(text) => {
                info!(subject = self.subject.id, answer_len = text.len(), "Question solved");
                text
            }
            Err(e) => {
                warn!(subject = self.subject.id, error = %e, "Generation failed");
                FALLBACK_ANSWER.to_string()
            }
        };

        self.loading = false;
        self.result = Some(answer);
        self.result.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;

    struct Scripted {
        answer: Result<String>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(answer: Result<String>) -> Arc<Self> {
            Arc::new(Self { answer, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    #[test]
    fn test_subject_catalog() {
        assert_eq!(SUBJECTS.len(), 6);
        assert_eq!(Subject::find("bengali").unwrap().label, "Bengali");
        assert!(Subject::find("chemistry").is_none());
    }

    #[test]
    fn test_compose_prompt() {
        let physics = Subject::find("physics").unwrap();
        let prompt = compose_prompt(physics, DetailLevel::Detailed, "Why is the sky blue?", true, "2026-10-18 09:00:00");

        assert!(prompt.contains("Subject: Physics\n"));
        assert!(prompt.contains("Context: As a physics expert, explain principles and solve.\n"));
        assert!(prompt.contains("Detail Level: detailed\n"));
        assert!(prompt.contains("Question: Why is the sky blue?\n"));
        assert!(prompt.ends_with("An image is attached for analysis.\n"));
    }

    #[test]
    fn test_detail_level_parse() {
        assert_eq!("short".parse::<DetailLevel>().unwrap(), DetailLevel::Short);
        assert!("verbose".parse::<DetailLevel>().is_err());
        assert_eq!(DetailLevel::default(), DetailLevel::Medium);
    }

    #[tokio::test]
    async fn test_oversize_image_rejected_before_generation() {
        let dir = TempDir::new().unwrap();
        let small = dir.path().join("small.png");
        let big = dir.path().join("big.jpg");
        tokio::fs::write(&small, vec![1u8; 1024]).await.unwrap();
        tokio::fs::write(&big, vec![0u8; 5 * 1024 * 1024]).await.unwrap();

        let generator = Scripted::new(Ok("unused".into()));
        let mut solver = Solver::new(generator.clone());
        solver.attach_image(&small).await.unwrap();

        let err = solver.attach_image(&big).await.unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { size, limit } if size == 5 * 1024 * 1024 && limit == MAX_IMAGE_BYTES));

        // Previous attachment untouched, nothing sent
        assert_eq!(solver.image().unwrap().len(), 1024);
        assert_eq!(solver.image().unwrap().mime_type(), "image/png");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_image_file_rejected() {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("notes.txt");
        tokio::fs::write(&notes, b"hello").await.unwrap();

        let mut solver = Solver::new(Scripted::new(Ok("unused".into())));
        assert!(matches!(solver.attach_image(&notes).await, Err(Error::Validation(_))));
        assert!(solver.image().is_none());
    }

    #[tokio::test]
    async fn test_solve_success() {
        let generator = Scripted::new(Ok("x = 4".into()));
        let mut solver = Solver::new(generator.clone());
        solver.set_question("2x = 8");

        assert_eq!(solver.solve().await, Some("x = 4"));
        assert!(!solver.is_loading());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_solve_failure_uses_fallback() {
        let generator = Scripted::new(Err(Error::generation("network down")));
        let mut solver = Solver::new(generator);
        solver.set_question("2x = 8");

        assert_eq!(solver.solve().await, Some(FALLBACK_ANSWER));
        assert!(!solver.is_loading());
    }

    #[tokio::test]
    async fn test_empty_question_is_not_sent() {
        let generator = Scripted::new(Ok("unused".into()));
        let mut solver = Solver::new(generator.clone());
        solver.set_question("   ");

        assert!(solver.solve().await.is_none());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_only_question_is_sent() {
        let generator = Scripted::new(Ok("A triangle".into()));
        let mut solver = Solver::new(generator.clone());
        solver.set_image(ImageAttachment::from_bytes(vec![1, 2, 3], "image/png", MAX_IMAGE_BYTES).unwrap());

        let request = solver.request();
        assert!(request.image.is_some());
        assert!(request.prompt.contains("An image is attached for analysis."));
        assert_eq!(solver.solve().await, Some("A triangle"));
    }
}
