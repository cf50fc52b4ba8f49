//! Generation client surface: a trait seam over the external generative
//! service plus the typed failure taxonomy. All calls are single-shot and
//! non-cancellable; retry policy belongs to callers.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generation service returned HTTP {status}: {message}")]
    Service { status: u16, message: String },
    #[error("generation service returned an empty response")]
    EmptyResponse,
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
    #[error("generation response is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Declared shape for a structured response: one required field holding an
/// array of strings. Parsing failures against this shape are hard errors,
/// never silently defaulted.
#[derive(Debug, Clone, Copy)]
pub struct StringListShape {
    pub field: &'static str,
    pub description: &'static str,
}

pub const TITLES_SHAPE: StringListShape = StringListShape {
    field: "titles",
    description: "A list of 5 to 7 documentary titles, each a fluid natural sentence of at most \
                  100 characters.",
};

pub const SCENE_PROMPTS_SHAPE: StringListShape = StringListShape {
    field: "prompts",
    description: "A list of detailed image-generation prompts, in chronological order.",
};

pub const VIDEO_PROMPTS_SHAPE: StringListShape = StringListShape {
    field: "video_prompts",
    description: "A list of detailed video-clip prompts derived from the image prompts, in the \
                  same chronological order.",
};

pub const TRANSLATED_TITLES_SHAPE: StringListShape = StringListShape {
    field: "translated_titles",
    description: "The list of translated titles, in the original order.",
};

/// The external generation capability. `GeminiClient` is the production
/// implementation; tests substitute scripted mocks.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Free-form text generation. An empty response is an error.
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Structured generation constrained to `shape`. The returned payload
    /// must be a JSON object carrying the declared array-of-strings field.
    async fn generate_string_list(
        &self,
        prompt: &str,
        shape: &StringListShape,
    ) -> Result<Vec<String>, GenerationError>;

    /// One JPEG image at 16:9. Returns the raw image bytes.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerationError>;
}
