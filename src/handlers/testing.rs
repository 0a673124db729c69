//! In-memory stand-ins for the external capabilities.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;

use crate::error::{BotError, MediaCategory};
use crate::line::{Affordance, ContentFetcher, FetchedMedia, Messenger, OutboundText};
use crate::llm::{FinishReason, Generation, GenerationRequest, GenerativeModel, UsageTracker};
use crate::record::AccountingRecord;
use crate::session::InMemorySessionStore;
use crate::state::{AppState, RouterSettings};
use crate::storage::RecordSink;

pub fn reply_with(text: &str, finish_reason: FinishReason) -> Result<Generation, BotError> {
    Ok(Generation {
        text: text.to_string(),
        finish_reason,
    })
}

pub fn reply_ok(text: &str) -> Result<Generation, BotError> {
    reply_with(text, FinishReason::Stop)
}

/// Answers with scripted responses in order and records every request.
#[derive(Default)]
pub struct FakeModel {
    responses: Mutex<VecDeque<Result<Generation, BotError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeModel {
    pub fn with_responses(responses: Vec<Result<Generation, BotError>>) -> Self {
        FakeModel {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GenerativeModel for FakeModel {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, BotError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(BotError::UpstreamUnavailable("no scripted response".to_string())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Reply,
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub channel: Channel,
    /// Reply token or user id.
    pub target: String,
    pub text: String,
    pub affordance: Affordance,
}

impl Sent {
    pub fn reply(token: &str, text: &str, affordance: Affordance) -> Self {
        Sent {
            channel: Channel::Reply,
            target: token.to_string(),
            text: text.to_string(),
            affordance,
        }
    }

    pub fn push(user_id: &str, text: &str, affordance: Affordance) -> Self {
        Sent {
            channel: Channel::Push,
            target: user_id.to_string(),
            text: text.to_string(),
            affordance,
        }
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<Sent>>,
    used_tokens: Mutex<Vec<String>>,
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|sent| sent.text.clone()).collect()
    }

    pub fn last_text(&self) -> String {
        self.sent
            .lock()
            .last()
            .map(|sent| sent.text.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn reply(&self, reply_token: &str, message: &OutboundText) -> Result<(), BotError> {
        let mut used = self.used_tokens.lock();
        // A reused token is a routing bug, not a transport hiccup.
        assert!(
            !used.iter().any(|token| token == reply_token),
            "reply token {reply_token} used twice"
        );
        used.push(reply_token.to_string());
        self.sent
            .lock()
            .push(Sent::reply(reply_token, &message.text, message.affordance));
        Ok(())
    }

    async fn push(&self, user_id: &str, message: &OutboundText) -> Result<(), BotError> {
        self.sent
            .lock()
            .push(Sent::push(user_id, &message.text, message.affordance));
        Ok(())
    }
}

/// Serves a tiny JPEG for every message id.
#[derive(Default)]
pub struct FakeFetcher {
    calls: Mutex<usize>,
    fail_next: Mutex<bool>,
}

impl FakeFetcher {
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn fetch(&self, message_id: &str, category: MediaCategory) -> Result<FetchedMedia, BotError> {
        *self.calls.lock() += 1;
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(BotError::DownloadFailed(format!("{category} {message_id}")));
        }
        let mime_type = match category {
            MediaCategory::Image => "image/jpeg",
            MediaCategory::Audio => "audio/mp4",
            MediaCategory::Video => "video/mp4",
        };
        Ok(FetchedMedia {
            bytes: message_id.as_bytes().to_vec(),
            mime_type: mime_type.to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeSink {
    appended: Mutex<Vec<(AccountingRecord, Option<String>)>>,
    upload_url: Mutex<Option<String>>,
    fail_appends: Mutex<bool>,
}

impl FakeSink {
    pub fn appended(&self) -> Vec<(AccountingRecord, Option<String>)> {
        self.appended.lock().clone()
    }

    pub fn set_upload_url(&self, url: &str) {
        *self.upload_url.lock() = Some(url.to_string());
    }

    pub fn fail_appends(&self) {
        *self.fail_appends.lock() = true;
    }
}

#[async_trait]
impl RecordSink for FakeSink {
    async fn append(&self, record: &AccountingRecord, attachment_url: Option<&str>) -> Result<(), BotError> {
        if *self.fail_appends.lock() {
            return Err(BotError::Persistence("sheet unavailable".to_string()));
        }
        self.appended
            .lock()
            .push((record.clone(), attachment_url.map(str::to_string)));
        Ok(())
    }

    async fn upload_attachment(
        &self,
        _image: &FetchedMedia,
        _record: &AccountingRecord,
    ) -> Result<Option<String>, BotError> {
        Ok(self.upload_url.lock().clone())
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub model: Arc<FakeModel>,
    pub messenger: Arc<FakeMessenger>,
    pub fetcher: Arc<FakeFetcher>,
    pub records: Arc<FakeSink>,
}

pub fn test_state(responses: Vec<Result<Generation, BotError>>) -> TestHarness {
    let model = Arc::new(FakeModel::with_responses(responses));
    let messenger = Arc::new(FakeMessenger::default());
    let fetcher = Arc::new(FakeFetcher::default());
    let records = Arc::new(FakeSink::default());

    let state = AppState {
        sessions: Arc::new(InMemorySessionStore::new(Duration::minutes(30))),
        model: model.clone(),
        messenger: messenger.clone(),
        fetcher: fetcher.clone(),
        records: records.clone(),
        usage: Arc::new(UsageTracker::new()),
        settings: Arc::new(RouterSettings::default()),
    };

    TestHarness {
        state,
        model,
        messenger,
        fetcher,
        records,
    }
}
