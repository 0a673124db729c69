//! Generative model access: the transport trait, the Gemini client behind it,
//! tier selection, response extraction and the bot's model-backed tasks.

pub mod extract;
pub mod gemini;
pub mod media;
pub mod policy;
pub mod prompts;
pub mod tasks;
pub mod usage;

use async_trait::async_trait;

use crate::error::BotError;

pub use gemini::GeminiClient;
pub use policy::{select_model, ModelTiers, Task, TaskContext};
pub use usage::UsageTracker;

/// Binary input handed to the model alongside the instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    /// Short label used in logs and timing lines.
    pub operation: &'static str,
    pub instruction: String,
    pub attachments: Vec<Attachment>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the model for `application/json` output.
    pub json_output: bool,
}

impl GenerationRequest {
    pub fn new(model: &str, operation: &'static str, instruction: String) -> Self {
        GenerationRequest {
            model: model.to_string(),
            operation,
            instruction,
            attachments: Vec::new(),
            temperature: 0.1,
            max_output_tokens: 1024,
            json_output: false,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Other,
}

impl FinishReason {
    pub fn from_api(value: Option<&str>) -> Self {
        match value {
            None | Some("STOP") => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") | Some("SPII") => {
                FinishReason::Safety
            }
            Some(_) => FinishReason::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub finish_reason: FinishReason,
}

/// Multi-modal text generation. Quota exhaustion must come back as
/// [`BotError::QuotaExceeded`] so callers can report it distinctly.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, BotError>;
}
