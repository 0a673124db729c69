//! Per-user conversation state shared across webhook deliveries.
//!
//! Every invocation re-fetches the session it needs; nothing outside the
//! repository keeps a reference between deliveries. Writes are
//! compare-and-swap on [`Session::version`] so overlapping deliveries for the
//! same user cannot silently drop each other's mutations.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::error::BotError;

pub use memory::InMemorySessionStore;

const MAX_UPDATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Idle; media is treated as a receipt.
    #[default]
    Receipt,
    AmuletCollection,
    FortuneTranslation,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Receipt => "receipt",
            Mode::AmuletCollection => "amulet",
            Mode::FortuneTranslation => "fortune",
        }
    }

    pub fn parse(value: &str) -> Mode {
        match value {
            "amulet" => Mode::AmuletCollection,
            "fortune" => Mode::FortuneTranslation,
            _ => Mode::Receipt,
        }
    }
}

/// Modes a user can explicitly enter; idle is only reached by ending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    AmuletCollection,
    FortuneTranslation,
}

impl From<ActiveMode> for Mode {
    fn from(mode: ActiveMode) -> Mode {
        match mode {
            ActiveMode::AmuletCollection => Mode::AmuletCollection,
            ActiveMode::FortuneTranslation => Mode::FortuneTranslation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub mode: Mode,
    pub description: String,
    pub images: Vec<StoredImage>,
    pub created_at: DateTime<Utc>,
    /// Version observed when the session was read; 0 means "not stored".
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAdd {
    Added(usize),
    Full,
}

impl Session {
    pub fn idle(now: DateTime<Utc>) -> Self {
        Session {
            mode: Mode::Receipt,
            description: String::new(),
            images: Vec::new(),
            created_at: now,
            version: 0,
        }
    }

    /// Starts a fresh conversation in `mode`, keeping the observed version so
    /// the write still replaces whatever is stored.
    pub fn restart(&self, mode: Mode, now: DateTime<Utc>) -> Self {
        Session {
            mode,
            description: String::new(),
            images: Vec::new(),
            created_at: now,
            version: self.version,
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode != Mode::Receipt
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.created_at > timeout
    }

    pub fn append_description(&mut self, text: &str) {
        if !self.description.is_empty() {
            self.description.push('\n');
        }
        self.description.push_str(text);
    }

    pub fn try_add_image(&mut self, image: StoredImage, max_images: usize) -> ImageAdd {
        if self.images.len() >= max_images {
            return ImageAdd::Full;
        }
        self.images.push(image);
        ImageAdd::Added(self.images.len())
    }

    pub fn clear_collection(&mut self) -> usize {
        let removed = self.images.len();
        self.images.clear();
        self.description.clear();
        removed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Stored,
    /// Another writer stored a newer version first.
    Conflict,
    Unavailable,
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Never fails; an absent or unreadable session comes back idle.
    async fn get(&self, user_id: &str) -> Session;
    async fn set(&self, user_id: &str, session: &Session) -> SetOutcome;
    async fn delete(&self, user_id: &str);
    /// Removes sessions older than the repository timeout; returns the count.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> usize;
}

/// Result of a mutation closure passed to [`modify_session`].
pub enum Update<T> {
    Write(T),
    Skip(T),
}

/// Read-modify-write with bounded retries on version conflicts.
pub async fn modify_session<T, F>(
    repo: &dyn SessionRepository,
    user_id: &str,
    mut mutate: F,
) -> Result<T, BotError>
where
    F: FnMut(&mut Session) -> Update<T>,
{
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let mut session = repo.get(user_id).await;
        let value = match mutate(&mut session) {
            Update::Skip(value) => return Ok(value),
            Update::Write(value) => value,
        };
        match repo.set(user_id, &session).await {
            SetOutcome::Stored => return Ok(value),
            SetOutcome::Conflict => {
                warn!(
                    user_id,
                    attempt, "session write conflicted with a concurrent delivery; retrying"
                );
            }
            SetOutcome::Unavailable => {
                return Err(BotError::Persistence(
                    "session store unavailable".to_string(),
                ))
            }
        }
    }

    Err(BotError::Persistence(format!(
        "session for {user_id} kept changing after {MAX_UPDATE_ATTEMPTS} attempts"
    )))
}
