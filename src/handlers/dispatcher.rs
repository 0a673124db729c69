//! Per-delivery orchestration: expire stale sessions, then route each event
//! by message kind, command and session mode.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::MediaCategory;
use crate::handlers::commands::{self, Command, EXAMPLE_TEXT, HELP_TEXT, VOICE_TUTORIAL_TEXT};
use crate::handlers::responses::respond;
use crate::handlers::{audio, collector, receipt, EventContext};
use crate::line::types::{MessageKind, WebhookDelivery, WebhookEvent};
use crate::line::Affordance;
use crate::llm::media::classify_file_name;
use crate::session::{ActiveMode, Mode};
use crate::state::AppState;
use crate::utils::timing::{complete_event_timer, start_event_timer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Receipt,
    CollectImage,
    Help,
    QuotaReport,
    VoiceTutorial,
    Example,
    EnterAmulet,
    EnterFortune,
    Cancel,
    Finalize,
    Clear,
    AppendDescription,
    ParseText,
    FortuneMedia(MediaCategory),
    AccountingMedia(MediaCategory),
    RejectFile,
    Ignore,
}

/// Session effect of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Keep,
    /// Replace whatever session exists with a fresh one in this mode.
    Enter(ActiveMode),
    End,
    /// Ends the session only if the handler succeeds.
    EndOnSuccess,
}

impl Route {
    pub fn label(self) -> &'static str {
        match self {
            Route::Receipt => "receipt",
            Route::CollectImage => "collect_image",
            Route::Help => "help",
            Route::QuotaReport => "quota",
            Route::VoiceTutorial => "voice_tutorial",
            Route::Example => "example",
            Route::EnterAmulet => "enter_amulet",
            Route::EnterFortune => "enter_fortune",
            Route::Cancel => "cancel",
            Route::Finalize => "finalize",
            Route::Clear => "clear",
            Route::AppendDescription => "append_description",
            Route::ParseText => "parse_text",
            Route::FortuneMedia(_) => "fortune_media",
            Route::AccountingMedia(_) => "accounting_media",
            Route::RejectFile => "reject_file",
            Route::Ignore => "ignore",
        }
    }

    pub fn transition(self) -> Transition {
        match self {
            Route::EnterAmulet => Transition::Enter(ActiveMode::AmuletCollection),
            Route::EnterFortune => Transition::Enter(ActiveMode::FortuneTranslation),
            Route::Cancel => Transition::End,
            Route::Finalize | Route::FortuneMedia(_) => Transition::EndOnSuccess,
            _ => Transition::Keep,
        }
    }
}

fn media_route(mode: Mode, category: MediaCategory) -> Route {
    if mode == Mode::FortuneTranslation {
        Route::FortuneMedia(category)
    } else {
        Route::AccountingMedia(category)
    }
}

/// Pure routing table. `command` is the keyword parse of the text, if any.
pub fn route(mode: Mode, kind: &MessageKind, command: Option<Command>) -> Route {
    let amulet = mode == Mode::AmuletCollection;
    match kind {
        MessageKind::Image if amulet => Route::CollectImage,
        MessageKind::Image => Route::Receipt,
        MessageKind::Text(_) => match command {
            Some(Command::Help) => Route::Help,
            Some(Command::QuotaReport) => Route::QuotaReport,
            Some(Command::VoiceTutorial) => Route::VoiceTutorial,
            Some(Command::EnterAmulet) => Route::EnterAmulet,
            Some(Command::EnterFortune) => Route::EnterFortune,
            Some(Command::Cancel) => Route::Cancel,
            Some(Command::Finalize) if amulet => Route::Finalize,
            Some(Command::Clear) if amulet => Route::Clear,
            Some(Command::Example) if !amulet => Route::Example,
            _ if amulet => Route::AppendDescription,
            _ => Route::ParseText,
        },
        MessageKind::Audio => media_route(mode, MediaCategory::Audio),
        MessageKind::Video => media_route(mode, MediaCategory::Video),
        MessageKind::File(name) => match classify_file_name(name) {
            Some(category) => media_route(mode, category),
            None => Route::RejectFile,
        },
        MessageKind::Other(_) => Route::Ignore,
    }
}

/// Handles one webhook delivery. Events run strictly in order; each traps
/// its own failures so the delivery is always acknowledged.
pub async fn process_delivery(state: &AppState, delivery: WebhookDelivery) {
    let swept = state.sessions.sweep_expired(Utc::now()).await;
    if swept > 0 {
        info!("Expired {swept} idle session(s)");
    }

    info!(events = delivery.events.len(), "processing webhook delivery");
    for event in delivery.events {
        handle_event(state, event).await;
    }
}

async fn handle_event(state: &AppState, event: WebhookEvent) {
    if event.event_type != "message" {
        debug!(event_type = %event.event_type, "skipping non-message event");
        return;
    }
    let Some(message) = event.message else {
        warn!("message event without a message body");
        return;
    };
    let Some(reply_token) = event.reply_token.as_deref() else {
        warn!(message_id = %message.id, "message event without a reply token");
        return;
    };

    let ctx = EventContext::new(event.source.user_id.as_deref(), reply_token, &message.id);
    let kind = message.kind();
    let text = match &kind {
        MessageKind::Text(text) => Some(text.trim().to_string()),
        _ => None,
    };
    let command = text.as_deref().and_then(commands::parse);
    let session = state.sessions.get(&ctx.user_id).await;
    let route = route(session.mode, &kind, command);
    let transition = route.transition();
    let duration_ms = message.duration.unwrap_or(0);

    let mut timer = start_event_timer(route.label(), &ctx.user_id, Some(&message.id), text.as_deref());
    info!(
        user_id = %ctx.user_id,
        mode = session.mode.as_str(),
        route = route.label(),
        transition = ?transition,
        "routing message"
    );

    match route {
        Route::Receipt => receipt::handle_receipt_image(state, &ctx).await,
        Route::CollectImage => collector::collect_image(state, &ctx).await,
        Route::Help => respond(state, &ctx, HELP_TEXT, Affordance::Default).await,
        Route::QuotaReport => {
            let report = state.usage.report();
            respond(state, &ctx, &report, Affordance::Default).await;
        }
        Route::VoiceTutorial => respond(state, &ctx, VOICE_TUTORIAL_TEXT, Affordance::Default).await,
        Route::Example => respond(state, &ctx, EXAMPLE_TEXT, Affordance::Default).await,
        Route::Cancel => collector::cancel(state, &ctx).await,
        Route::Finalize => collector::finalize(state, &ctx).await,
        Route::Clear => collector::clear(state, &ctx).await,
        Route::AppendDescription => {
            collector::append_description(state, &ctx, text.as_deref().unwrap_or_default()).await
        }
        Route::ParseText => {
            receipt::handle_accounting_text(state, &ctx, text.as_deref().unwrap_or_default()).await
        }
        Route::FortuneMedia(category) => {
            audio::handle_fortune_media(state, &ctx, category, duration_ms).await
        }
        Route::AccountingMedia(category) => {
            audio::handle_accounting_media(state, &ctx, category, duration_ms).await
        }
        Route::RejectFile => {
            let name = message.file_name.as_deref().unwrap_or_default();
            audio::reject_file(state, &ctx, name).await
        }
        Route::Ignore => {
            debug!(message_type = %message.message_type, "ignoring unsupported message type");
        }
        Route::EnterAmulet | Route::EnterFortune => {
            if let Transition::Enter(mode) = transition {
                collector::enter_mode(state, &ctx, mode).await;
            }
        }
    }

    complete_event_timer(&mut timer, "handled", None);
}
