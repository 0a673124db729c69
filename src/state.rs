use std::sync::Arc;

use crate::config::Config;
use crate::line::{ContentFetcher, Messenger};
use crate::llm::tasks::ModelTasks;
use crate::llm::{GenerativeModel, ModelTiers, UsageTracker};
use crate::session::SessionRepository;
use crate::storage::RecordSink;

/// Routing knobs derived from configuration, kept separate so handlers can
/// be exercised without the process environment.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub tiers: ModelTiers,
    pub channel_secret: String,
    pub max_message_length: usize,
    pub max_amulet_images: usize,
    pub max_audio_duration_ms: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        RouterSettings {
            tiers: ModelTiers::default(),
            channel_secret: String::new(),
            max_message_length: 4500,
            max_amulet_images: 5,
            max_audio_duration_ms: 60_000,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        RouterSettings {
            tiers: ModelTiers::from_config(config),
            channel_secret: config.line_channel_secret.clone(),
            max_message_length: config.line_max_message_length,
            max_amulet_images: config.max_amulet_images,
            max_audio_duration_ms: config.max_audio_duration_ms,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionRepository>,
    pub model: Arc<dyn GenerativeModel>,
    pub messenger: Arc<dyn Messenger>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub records: Arc<dyn RecordSink>,
    pub usage: Arc<UsageTracker>,
    pub settings: Arc<RouterSettings>,
}

impl AppState {
    pub fn tasks(&self) -> ModelTasks<'_> {
        ModelTasks::new(self.model.as_ref(), &self.settings.tiers, self.usage.as_ref())
    }
}
