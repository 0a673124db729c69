pub mod audio;
pub mod collector;
pub mod commands;
pub mod dispatcher;
pub mod receipt;
pub mod responses;

#[cfg(test)]
pub mod testing;

pub const UNKNOWN_USER: &str = "unknown";

/// Identity and reply channel of the event being handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// Session key; `"unknown"` when the platform omitted the user id.
    pub user_id: String,
    pub reply_token: String,
    pub message_id: String,
}

impl EventContext {
    pub fn new(user_id: Option<&str>, reply_token: &str, message_id: &str) -> Self {
        EventContext {
            user_id: user_id.unwrap_or(UNKNOWN_USER).to_string(),
            reply_token: reply_token.to_string(),
            message_id: message_id.to_string(),
        }
    }

    /// Push target for overflow segments, absent for unidentified senders.
    pub fn sender(&self) -> Option<&str> {
        if self.user_id == UNKNOWN_USER {
            None
        } else {
            Some(self.user_id.as_str())
        }
    }
}
