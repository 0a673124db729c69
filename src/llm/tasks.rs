//! The bot's model-backed operations. Each one picks its tier through the
//! selection policy and counts itself in the usage tracker.

use tracing::{info, warn};

use crate::error::{BotError, MediaCategory};
use crate::llm::extract::{extract_json, repair_truncated};
use crate::llm::policy::{select_model, ModelTiers, Task, TaskContext};
use crate::llm::prompts;
use crate::llm::usage::UsageTracker;
use crate::llm::{Attachment, FinishReason, GenerationRequest, GenerativeModel};
use crate::record::AccountingRecord;

pub struct ModelTasks<'a> {
    pub model: &'a dyn GenerativeModel,
    pub tiers: &'a ModelTiers,
    pub usage: &'a UsageTracker,
}

impl<'a> ModelTasks<'a> {
    pub fn new(model: &'a dyn GenerativeModel, tiers: &'a ModelTiers, usage: &'a UsageTracker) -> Self {
        ModelTasks { model, tiers, usage }
    }

    /// Reads a receipt photo. A record with no items is still returned so the
    /// caller can show whatever partial information was recognized.
    pub async fn recognize_receipt(&self, image: Attachment) -> Result<AccountingRecord, BotError> {
        let model = select_model(Task::Receipt, &TaskContext::default(), self.tiers);
        let request = GenerationRequest::new(model, "recognize_receipt", prompts::RECEIPT_PROMPT.to_string())
            .with_attachments(vec![image])
            .with_max_output_tokens(8192)
            .json();
        let generation = self.model.generate(request).await?;
        self.usage.record(Task::Receipt);

        let mut value = None;
        if generation.finish_reason == FinishReason::MaxTokens {
            value = repair_truncated(&generation.text);
        }
        let value = value.or_else(|| extract_json(&generation.text, "receipt"));

        match value.and_then(AccountingRecord::from_value) {
            Some(record) => Ok(record),
            None if generation.finish_reason == FinishReason::MaxTokens => {
                Err(BotError::TruncatedForLength)
            }
            None => Err(BotError::NoStructuredValueFound("receipt".to_string())),
        }
    }

    /// Verbatim transcript of a voice note or clip. Audio follows the audio
    /// tier rule; video follows the fortune rule since clips run long.
    pub async fn transcribe(
        &self,
        media: Attachment,
        category: MediaCategory,
        duration_ms: u64,
    ) -> Result<String, BotError> {
        let (task, instruction, operation, max_tokens) = match category {
            MediaCategory::Video => (
                Task::Fortune,
                prompts::VIDEO_TRANSCRIPTION_PROMPT,
                "transcribe_video",
                8192,
            ),
            _ => (
                Task::Audio,
                prompts::AUDIO_TRANSCRIPTION_PROMPT,
                "transcribe_audio",
                4096,
            ),
        };
        let model = select_model(task, &TaskContext::duration(duration_ms), self.tiers);
        info!(model, duration_ms, "transcribing {category}");

        let request = GenerationRequest::new(model, operation, instruction.to_string())
            .with_attachments(vec![media])
            .with_max_output_tokens(max_tokens);
        let generation = self.model.generate(request).await?;
        self.usage.record(task);
        Ok(generation.text.trim().to_string())
    }

    /// Rewrites a reading in the Taiwanese fortune-teller register.
    pub async fn translate_fortune(&self, transcript: &str, duration_ms: u64) -> Result<String, BotError> {
        let model = select_model(Task::Fortune, &TaskContext::duration(duration_ms), self.tiers);
        let request = GenerationRequest::new(model, "translate_fortune", prompts::fortune_prompt(transcript))
            .with_temperature(0.7)
            .with_max_output_tokens(8192);
        let generation = self.model.generate(request).await?;
        self.usage.record(Task::Fortune);
        if generation.finish_reason == FinishReason::MaxTokens {
            warn!("fortune rewrite stopped at the output limit");
        }
        non_empty(generation.text, "fortune")
    }

    /// Marketing copy from the collected amulet photos and notes.
    pub async fn generate_amulet_copy(
        &self,
        images: Vec<Attachment>,
        description: &str,
    ) -> Result<String, BotError> {
        let context = TaskContext::amulet(images.len(), description);
        let model = select_model(Task::Amulet, &context, self.tiers);
        info!(model, images = images.len(), "generating amulet copy");

        let request = GenerationRequest::new(
            model,
            "generate_amulet_copy",
            prompts::amulet_prompt(images.len(), description),
        )
        .with_attachments(images)
        .with_temperature(0.7)
        .with_max_output_tokens(8192);
        let generation = self.model.generate(request).await?;
        self.usage.record(Task::Amulet);
        non_empty(generation.text, "amulet")
    }

    /// Model fallback for free-form bookkeeping text. `Ok(None)` when the
    /// text is not a bookkeeping entry.
    pub async fn parse_text(&self, text: &str) -> Result<Option<AccountingRecord>, BotError> {
        let model = select_model(Task::Parse, &TaskContext::default(), self.tiers);
        let request = GenerationRequest::new(model, "parse_text", prompts::parse_prompt(text)).json();
        let generation = self.model.generate(request).await?;
        self.usage.record(Task::Parse);

        Ok(extract_json(&generation.text, "text_parse")
            .and_then(AccountingRecord::from_value)
            .filter(AccountingRecord::has_items))
    }
}

fn non_empty(text: String, source: &str) -> Result<String, BotError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BotError::NoStructuredValueFound(source.to_string()));
    }
    Ok(trimmed.to_string())
}
