//! Webhook payload as delivered by the LINE Messaging API.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookDelivery {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Milliseconds; present on audio and video.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Message kinds the router distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Image,
    Text(String),
    Audio,
    Video,
    File(String),
    Other(String),
}

impl EventMessage {
    pub fn kind(&self) -> MessageKind {
        match self.message_type.as_str() {
            "image" => MessageKind::Image,
            "text" => MessageKind::Text(self.text.clone().unwrap_or_default()),
            "audio" => MessageKind::Audio,
            "video" => MessageKind::Video,
            "file" => MessageKind::File(self.file_name.clone().unwrap_or_default()),
            other => MessageKind::Other(other.to_string()),
        }
    }
}
