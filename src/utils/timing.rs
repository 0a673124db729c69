use std::fmt::Display;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

const TEXT_PREVIEW_CHARS: usize = 120;

/// Brackets the handling of one webhook event on the `bot.timing` target.
#[derive(Debug)]
pub struct EventTimer {
    route: String,
    user_id: String,
    message_id: Option<String>,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl EventTimer {
    pub fn new(route: &str, user_id: &str, message_id: Option<&str>, text: Option<&str>) -> Self {
        let text = text.map(|value| {
            value
                .replace('\n', " ")
                .chars()
                .take(TEXT_PREVIEW_CHARS)
                .collect::<String>()
        });
        EventTimer {
            route: route.to_string(),
            user_id: user_id.to_string(),
            message_id: message_id.map(str::to_string),
            text,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: "bot.timing",
            "event=event_received route={} user_id={} message_id={:?} received_at={} text={:?}",
            self.route,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "bot.timing",
            "event=event_completed route={} user_id={} message_id={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.route,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

pub fn start_event_timer(
    route: &str,
    user_id: &str,
    message_id: Option<&str>,
    text: Option<&str>,
) -> EventTimer {
    let timer = EventTimer::new(route, user_id, message_id, text);
    timer.log_received();
    timer
}

pub fn complete_event_timer(timer: &mut EventTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "bot.timing",
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let (status, error) = match &result {
        Ok(_) => ("success", String::new()),
        Err(err) => ("error", err.to_string()),
    };

    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "bot.timing",
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} error={:?} metadata={}",
        provider,
        model,
        operation,
        Utc::now().to_rfc3339(),
        duration,
        status,
        error,
        metadata_text
    );

    result
}
