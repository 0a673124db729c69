use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::BotError;
use crate::llm::media::detect_mime_type;
use crate::llm::{Attachment, FinishReason, Generation, GenerationRequest, GenerativeModel};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;
const GEMINI_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

/// REST client for `generateContent` with inline attachments.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    safety_profile: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, safety_profile: &str) -> Self {
        GeminiClient {
            api_key: api_key.trim().to_string(),
            safety_profile: safety_profile.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        GeminiClient::new(&config.gemini_api_key, &config.gemini_safety_settings)
    }

    fn redact_api_key(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            return text.to_string();
        }
        text.replace(&self.api_key, "[redacted]")
    }

    fn build_safety_settings(&self) -> Vec<Value> {
        let threshold = match self.safety_profile.as_str() {
            "permissive" => "OFF",
            _ => "BLOCK_MEDIUM_AND_ABOVE",
        };

        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .iter()
        .map(|category| json!({ "category": category, "threshold": threshold }))
        .collect()
    }

    fn build_payload(&self, request: &GenerationRequest) -> Value {
        let mut generation_config = Map::new();
        generation_config.insert("temperature".to_string(), json!(request.temperature));
        generation_config.insert(
            "maxOutputTokens".to_string(),
            json!(request.max_output_tokens),
        );
        if request.json_output {
            generation_config.insert("responseMimeType".to_string(), json!("application/json"));
        }

        json!({
            "contents": [{ "role": "user", "parts": build_gemini_parts(&request.instruction, &request.attachments) }],
            "generationConfig": Value::Object(generation_config),
            "safetySettings": self.build_safety_settings(),
        })
    }

    async fn call_gemini_api(&self, model: &str, payload: &Value) -> Result<GeminiResponse, BotError> {
        let client = get_http_client();
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, model, self.api_key
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = model, payload = %summarize_gemini_payload(payload));
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match client
                .post(&url)
                .timeout(GEMINI_REQUEST_TIMEOUT)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = self.redact_api_key(&err.to_string());
                    let should_retry =
                        gemini_should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(gemini_retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(BotError::UpstreamUnavailable(err_text));
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let should_retry =
                    gemini_should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
                    status,
                    self.redact_api_key(&body_summary),
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                if is_quota_error(status, &body) {
                    return Err(BotError::QuotaExceeded);
                }
                let detail = message.unwrap_or(body_summary);
                return Err(BotError::UpstreamUnavailable(format!(
                    "Gemini returned {status}: {}",
                    self.redact_api_key(&detail)
                )));
            }

            let value = response.json::<GeminiResponse>().await.map_err(|err| {
                BotError::UpstreamUnavailable(format!(
                    "malformed Gemini response: {}",
                    self.redact_api_key(&err.to_string())
                ))
            })?;
            return Ok(value);
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, BotError> {
        let payload = self.build_payload(&request);
        let metadata = json!({
            "attachments": request.attachments.len(),
            "json": request.json_output,
        });
        log_llm_timing("gemini", &request.model, request.operation, Some(metadata), || async {
            let response = self.call_gemini_api(&request.model, &payload).await?;
            generation_from_response(response)
        })
        .await
    }
}

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn is_quota_error(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED")
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let parts = payload
        .pointer("/contents/0/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|part| {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        json!({ "text": truncate_for_log(text, 200) })
                    } else if let Some(inline) = part.get("inline_data") {
                        let mime_type = inline
                            .get("mime_type")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown");
                        let data_len = inline
                            .get("data")
                            .and_then(Value::as_str)
                            .map(str::len)
                            .unwrap_or(0);
                        json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                    } else {
                        json!({ "unknownPart": true })
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    json!({
        "parts": parts,
        "generationConfig": payload.get("generationConfig").cloned().unwrap_or(Value::Null),
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string);
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn normalize_gemini_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        "audio/mpeg" => "audio/mp3".to_string(),
        "audio/x-wav" => "audio/wav".to_string(),
        "audio/x-m4a" | "audio/m4a" => "audio/mp4".to_string(),
        "video/quicktime" => "video/mov".to_string(),
        "video/x-msvideo" => "video/avi".to_string(),
        _ => lowered,
    }
}

fn attachment_mime_type(attachment: &Attachment) -> String {
    let declared = attachment.mime_type.trim();
    if !declared.is_empty() && declared != "application/octet-stream" {
        return normalize_gemini_mime_type(declared);
    }
    detect_mime_type(&attachment.bytes)
        .map(|detected| normalize_gemini_mime_type(&detected))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn build_gemini_parts(instruction: &str, attachments: &[Attachment]) -> Vec<Value> {
    let mut parts = vec![json!({ "text": instruction })];
    for attachment in attachments {
        parts.push(json!({
            "inline_data": {
                "mime_type": attachment_mime_type(attachment),
                "data": general_purpose::STANDARD.encode(&attachment.bytes),
            }
        }));
    }
    parts
}

fn generation_from_response(response: GeminiResponse) -> Result<Generation, BotError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        warn!("Gemini blocked the prompt: {reason}");
        return Err(BotError::SafetyBlocked);
    }

    let candidate = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| BotError::UpstreamUnavailable("Gemini returned no candidates".into()))?;

    let finish_reason = FinishReason::from_api(candidate.finish_reason.as_deref());
    let text = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");

    if finish_reason == FinishReason::Safety {
        return Err(BotError::SafetyBlocked);
    }

    Ok(Generation {
        text,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> GeminiResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn reads_text_and_length_stop() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1"}]},"finishReason":"MAX_TOKENS"}]}"#,
        );
        let generation = generation_from_response(response).unwrap();
        assert_eq!(generation.text, "{\"a\":1");
        assert_eq!(generation.finish_reason, FinishReason::MaxTokens);
    }

    #[test]
    fn safety_stops_and_blocked_prompts_are_errors() {
        let stopped = parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(matches!(
            generation_from_response(stopped),
            Err(BotError::SafetyBlocked)
        ));

        let blocked = parse(r#"{"promptFeedback":{"blockReason":"OTHER"}}"#);
        assert!(matches!(
            generation_from_response(blocked),
            Err(BotError::SafetyBlocked)
        ));
    }

    #[test]
    fn empty_candidate_list_is_upstream_failure() {
        let response = parse(r#"{"candidates":[]}"#);
        assert!(matches!(
            generation_from_response(response),
            Err(BotError::UpstreamUnavailable(_))
        ));
    }

    #[test]
    fn quota_is_recognized_from_status_or_body() {
        assert!(is_quota_error(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_quota_error(
            StatusCode::FORBIDDEN,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#
        ));
        assert!(!is_quota_error(StatusCode::BAD_REQUEST, "{}"));
    }

    #[test]
    fn api_key_is_redacted_from_logs() {
        let client = GeminiClient::new("secret-key", "standard");
        assert_eq!(
            client.redact_api_key("https://x/?key=secret-key"),
            "https://x/?key=[redacted]"
        );
    }

    #[test]
    fn payload_carries_json_mode_and_inline_media() {
        let client = GeminiClient::new("k", "permissive");
        let request = GenerationRequest::new("m", "test", "describe".into())
            .with_attachments(vec![Attachment {
                bytes: vec![1, 2, 3],
                mime_type: "image/jpg".into(),
            }])
            .json();
        let payload = client.build_payload(&request);
        assert_eq!(
            payload.pointer("/generationConfig/responseMimeType"),
            Some(&json!("application/json"))
        );
        assert_eq!(
            payload.pointer("/contents/0/parts/1/inline_data/mime_type"),
            Some(&json!("image/jpeg"))
        );
        assert_eq!(
            payload.pointer("/safetySettings/0/threshold"),
            Some(&json!("OFF"))
        );
    }
}
