//! LINE Messaging API: webhook types, signature check, outbound channels
//! and message content download.

pub mod client;
pub mod quick_reply;
pub mod signature;
pub mod types;

use async_trait::async_trait;

use crate::error::{BotError, MediaCategory};
use crate::llm::Attachment;

pub use client::LineClient;
pub use quick_reply::Affordance;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundText {
    pub text: String,
    pub affordance: Affordance,
}

impl OutboundText {
    pub fn new(text: impl Into<String>, affordance: Affordance) -> Self {
        OutboundText {
            text: text.into(),
            affordance,
        }
    }
}

/// The two outbound channels: `reply` consumes a single-use token, `push`
/// addresses a user and may be called any number of times.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn reply(&self, reply_token: &str, message: &OutboundText) -> Result<(), BotError>;
    async fn push(&self, user_id: &str, message: &OutboundText) -> Result<(), BotError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl FetchedMedia {
    pub fn into_attachment(self) -> Attachment {
        Attachment {
            bytes: self.bytes,
            mime_type: self.mime_type,
        }
    }
}

/// Downloads message content; oversize payloads fail with
/// [`BotError::PayloadTooLarge`] for their category.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, message_id: &str, category: MediaCategory) -> Result<FetchedMedia, BotError>;
}
