use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{BotError, MediaCategory};
use crate::line::{ContentFetcher, FetchedMedia, Messenger, OutboundText};
use crate::llm::media::{detect_mime_type, normalize_content_type, MediaLimits};
use crate::utils::http::get_http_client;

const REPLY_URL: &str = "https://api.line.me/v2/bot/message/reply";
const PUSH_URL: &str = "https://api.line.me/v2/bot/message/push";
const CONTENT_URL_BASE: &str = "https://api-data.line.me/v2/bot/message";

const PUSH_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const ERROR_BODY_LOG_LIMIT: usize = 800;

#[derive(Debug, Clone)]
pub struct LineClient {
    access_token: String,
    limits: MediaLimits,
}

impl LineClient {
    pub fn new(access_token: &str, limits: MediaLimits) -> Self {
        LineClient {
            access_token: access_token.trim().to_string(),
            limits,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        LineClient::new(
            &config.line_channel_access_token,
            MediaLimits::from_config(config),
        )
    }

    async fn post_message(&self, url: &str, body: &Value, max_attempts: usize) -> Result<(), BotError> {
        let client = get_http_client();
        let mut delay = Duration::from_millis(750);
        for attempt in 1..=max_attempts {
            let result = client
                .post(url)
                .bearer_auth(&self.access_token)
                .json(body)
                .send()
                .await;

            let retryable = match result {
                Ok(response) if response.status().is_success() => {
                    debug!(url, status = %response.status(), "LINE message accepted");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    warn!(
                        url,
                        %status,
                        attempt,
                        "LINE message rejected: {}",
                        truncate_for_log(&text, ERROR_BODY_LOG_LIMIT)
                    );
                    if !should_retry_status(status) || attempt == max_attempts {
                        return Err(BotError::UpstreamUnavailable(format!(
                            "LINE returned {status}"
                        )));
                    }
                    true
                }
                Err(err) => {
                    warn!(url, attempt, "LINE message send failed: {err}");
                    if !should_retry_error(&err) || attempt == max_attempts {
                        return Err(BotError::UpstreamUnavailable(err.to_string()));
                    }
                    true
                }
            };

            if retryable {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(BotError::UpstreamUnavailable("LINE message not sent".to_string()))
    }
}

fn message_object(message: &OutboundText) -> Value {
    let mut object = json!({ "type": "text", "text": message.text });
    if let Some(quick_reply) = message.affordance.quick_reply() {
        object["quickReply"] = quick_reply;
    }
    object
}

#[async_trait]
impl Messenger for LineClient {
    async fn reply(&self, reply_token: &str, message: &OutboundText) -> Result<(), BotError> {
        info!(chars = message.text.chars().count(), "replying via reply token");
        let body = json!({ "replyToken": reply_token, "messages": [message_object(message)] });
        // A reply token is spent by the first accepted call, so no retries.
        self.post_message(REPLY_URL, &body, 1).await
    }

    async fn push(&self, user_id: &str, message: &OutboundText) -> Result<(), BotError> {
        info!(user_id, chars = message.text.chars().count(), "pushing message");
        let body = json!({ "to": user_id, "messages": [message_object(message)] });
        self.post_message(PUSH_URL, &body, PUSH_MAX_ATTEMPTS).await
    }
}

#[async_trait]
impl ContentFetcher for LineClient {
    async fn fetch(&self, message_id: &str, category: MediaCategory) -> Result<FetchedMedia, BotError> {
        let client = get_http_client();
        let url = format!("{CONTENT_URL_BASE}/{message_id}/content");

        for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
            let last_attempt = attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS;
            let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);

            let response = match client.get(&url).bearer_auth(&self.access_token).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(
                        "Failed to fetch {category} {message_id}: {err} (timeout={}, connect={}, attempt={}/{})",
                        err.is_timeout(),
                        err.is_connect(),
                        attempt + 1,
                        MEDIA_DOWNLOAD_MAX_ATTEMPTS
                    );
                    if !should_retry_error(&err) || last_attempt {
                        return Err(BotError::DownloadFailed(err.to_string()));
                    }
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "Content download failed for {message_id} with status {}: {}",
                    status,
                    truncate_for_log(&body, ERROR_BODY_LOG_LIMIT)
                );
                if !should_retry_status(status) || last_attempt {
                    return Err(BotError::DownloadFailed(format!("status {status}")));
                }
                tokio::time::sleep(delay).await;
                continue;
            }

            if let Some(length) = response.content_length() {
                self.limits.check(category, length)?;
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let bytes = match response.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(err) => {
                    error!(
                        "Failed to read {category} bytes {message_id}: {err} (attempt={}/{})",
                        attempt + 1,
                        MEDIA_DOWNLOAD_MAX_ATTEMPTS
                    );
                    if last_attempt {
                        return Err(BotError::DownloadFailed(err.to_string()));
                    }
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            self.limits.check(category, bytes.len() as u64)?;
            let mut mime_type = normalize_content_type(category, content_type.as_deref());
            if category == MediaCategory::Image {
                // Headers sometimes say jpeg for HEIC uploads; trust the bytes.
                if let Some(sniffed) = detect_mime_type(&bytes).filter(|m| m.starts_with("image/")) {
                    mime_type = sniffed;
                }
            }
            info!(
                message_id,
                size_kb = bytes.len() / 1024,
                mime_type = %mime_type,
                "downloaded {category}"
            );
            return Ok(FetchedMedia { bytes, mime_type });
        }

        Err(BotError::DownloadFailed(format!("{category} {message_id}")))
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
