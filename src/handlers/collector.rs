//! Multi-image collection for amulet copy, plus the mode transitions that
//! start and end a collection.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::{BotError, MediaCategory};
use crate::handlers::commands::{amulet_mode_text, cancelled_text, FORTUNE_MODE_TEXT, NOTHING_TO_CANCEL_TEXT};
use crate::handlers::responses::respond;
use crate::handlers::EventContext;
use crate::line::Affordance;
use crate::llm::Attachment;
use crate::session::{modify_session, ActiveMode, ImageAdd, Mode, StoredImage, Update};
use crate::state::AppState;

const SESSION_ERROR_TEXT: &str = "❌ 系統錯誤，請稍後再試\n❌ ผิดพลาด ลองใหม่ภายหลัง";
const IMAGE_FAILED_TEXT: &str = "❌ 圖片處理失敗，請重傳\n❌ รูปผิดพลาด ส่งใหม่นะ";
const NO_IMAGES_TEXT: &str = "⚠️ 還沒有圖片！\n請先傳佛牌照片\n\n⚠️ ยังไม่มีรูป!\nส่งรูปพระก่อนนะ";
const UNREADABLE_TEXT: &str = "❌ 無法辨識，請確認圖片清晰\n❌ อ่านไม่ได้ รูปชัดไหม";
const QUOTA_TEXT: &str = "❌ API 額度已滿，請稍後再試\n❌ เกินโควต้าแล้ว ลองใหม่ทีหลัง";
const FAILED_TEXT: &str = "❌ 處理失敗，請重試\n❌ ผิดพลาด ลองใหม่นะ";

fn bound_reached_text(max: usize) -> String {
    format!(
        "⚠️ 已達 {max} 張上限\n點下方按鈕選擇下一步\n\n⚠️ ครบ {max} รูปแล้ว\nกดปุ่มด้านล่างเลย"
    )
}

fn image_received_text(count: usize, max: usize) -> String {
    let next = if count < max {
        format!("可繼續傳圖（最多 {max} 張）\n")
    } else {
        "已達上限\n".to_string()
    };
    format!(
        "📷 已收到第 {count} 張圖片\n{next}\n點下方按鈕選擇下一步 👇\n\n\
         📷 รับรูปที่ {count} แล้ว\nกดปุ่มด้านล่างเลย"
    )
}

fn cleared_text(count: usize) -> String {
    format!("🗑️ 已清除 {count} 張圖片\n可重新開始傳圖\n\n🗑️ ล้าง {count} รูปแล้ว\nส่งรูปใหม่ได้เลย")
}

/// Starts a fresh amulet or fortune session, discarding any earlier one.
pub async fn enter_mode(state: &AppState, ctx: &EventContext, active: ActiveMode) {
    let mode = Mode::from(active);
    let now = Utc::now();
    let result = modify_session(state.sessions.as_ref(), &ctx.user_id, |session| {
        *session = session.restart(mode, now);
        Update::Write(())
    })
    .await;

    if let Err(err) = result {
        error!(user_id = %ctx.user_id, "Failed to enter {} mode: {err}", mode.as_str());
        respond(state, ctx, SESSION_ERROR_TEXT, Affordance::Default).await;
        return;
    }

    info!(user_id = %ctx.user_id, mode = mode.as_str(), "session mode entered");
    match active {
        ActiveMode::AmuletCollection => {
            let text = amulet_mode_text(state.settings.max_amulet_images);
            respond(state, ctx, &text, Affordance::Amulet).await;
        }
        ActiveMode::FortuneTranslation => {
            respond(state, ctx, FORTUNE_MODE_TEXT, Affordance::Fortune).await
        }
    }
}

pub async fn cancel(state: &AppState, ctx: &EventContext) {
    let session = state.sessions.get(&ctx.user_id).await;
    if !session.is_active() {
        respond(state, ctx, NOTHING_TO_CANCEL_TEXT, Affordance::Default).await;
        return;
    }

    state.sessions.delete(&ctx.user_id).await;
    info!(
        user_id = %ctx.user_id,
        mode = session.mode.as_str(),
        images = session.images.len(),
        "session cancelled"
    );
    respond(state, ctx, &cancelled_text(session.images.len()), Affordance::Default).await;
}

pub async fn collect_image(state: &AppState, ctx: &EventContext) {
    let max_images = state.settings.max_amulet_images;

    // Check the bound before spending a download on an image we cannot keep.
    let session = state.sessions.get(&ctx.user_id).await;
    if session.images.len() >= max_images {
        respond(state, ctx, &bound_reached_text(max_images), Affordance::Amulet).await;
        return;
    }

    let media = match state.fetcher.fetch(&ctx.message_id, MediaCategory::Image).await {
        Ok(media) => media,
        Err(err @ BotError::PayloadTooLarge(_)) => {
            respond(state, ctx, err.user_message(), Affordance::Amulet).await;
            return;
        }
        Err(err) => {
            warn!(user_id = %ctx.user_id, "Amulet image download failed: {err}");
            respond(state, ctx, IMAGE_FAILED_TEXT, Affordance::Amulet).await;
            return;
        }
    };

    let image = StoredImage {
        bytes: media.bytes,
        mime_type: media.mime_type,
    };
    let result = modify_session(state.sessions.as_ref(), &ctx.user_id, |session| {
        if session.mode != Mode::AmuletCollection {
            // Cancelled or expired while the download was in flight.
            return Update::Skip(None);
        }
        match session.try_add_image(image.clone(), max_images) {
            ImageAdd::Added(count) => Update::Write(Some(ImageAdd::Added(count))),
            ImageAdd::Full => Update::Skip(Some(ImageAdd::Full)),
        }
    })
    .await;

    match result {
        Ok(Some(ImageAdd::Added(count))) => {
            info!(user_id = %ctx.user_id, "amulet image collected {count}/{max_images}");
            respond(state, ctx, &image_received_text(count, max_images), Affordance::Amulet).await;
        }
        Ok(Some(ImageAdd::Full)) => {
            respond(state, ctx, &bound_reached_text(max_images), Affordance::Amulet).await;
        }
        Ok(None) => {
            respond(state, ctx, IMAGE_FAILED_TEXT, Affordance::Default).await;
        }
        Err(err) => {
            error!(user_id = %ctx.user_id, "Failed to store amulet image: {err}");
            respond(state, ctx, IMAGE_FAILED_TEXT, Affordance::Amulet).await;
        }
    }
}

pub async fn append_description(state: &AppState, ctx: &EventContext, text: &str) {
    let text = text.trim();
    let result = modify_session(state.sessions.as_ref(), &ctx.user_id, |session| {
        session.append_description(text);
        Update::Write(())
    })
    .await;

    match result {
        Ok(()) => {
            info!(user_id = %ctx.user_id, "amulet description noted");
            let reply = format!("📝 已收到：{text}\n\n請傳照片 / ส่งรูปได้เลย 📷");
            respond(state, ctx, &reply, Affordance::Amulet).await;
        }
        Err(err) => {
            error!(user_id = %ctx.user_id, "Failed to store description: {err}");
            respond(state, ctx, SESSION_ERROR_TEXT, Affordance::Amulet).await;
        }
    }
}

/// Empties images and description; the mode stays active.
pub async fn clear(state: &AppState, ctx: &EventContext) {
    let result = modify_session(state.sessions.as_ref(), &ctx.user_id, |session| {
        Update::Write(session.clear_collection())
    })
    .await;

    match result {
        Ok(removed) => respond(state, ctx, &cleared_text(removed), Affordance::Amulet).await,
        Err(err) => {
            error!(user_id = %ctx.user_id, "Failed to clear collection: {err}");
            respond(state, ctx, SESSION_ERROR_TEXT, Affordance::Amulet).await;
        }
    }
}

/// Generates copy from everything collected. The session ends only on
/// success so a failed attempt can be retried or topped up.
pub async fn finalize(state: &AppState, ctx: &EventContext) {
    let session = state.sessions.get(&ctx.user_id).await;
    if session.images.is_empty() {
        respond(state, ctx, NO_IMAGES_TEXT, Affordance::Amulet).await;
        return;
    }

    info!(
        user_id = %ctx.user_id,
        images = session.images.len(),
        has_description = !session.description.trim().is_empty(),
        "generating amulet copy"
    );
    let attachments = session
        .images
        .iter()
        .map(|image| Attachment {
            bytes: image.bytes.clone(),
            mime_type: image.mime_type.clone(),
        })
        .collect();

    match state.tasks().generate_amulet_copy(attachments, &session.description).await {
        Ok(copy) => {
            state.sessions.delete(&ctx.user_id).await;
            respond(state, ctx, &copy, Affordance::Default).await;
        }
        Err(err) if err.is_quota() => {
            warn!(user_id = %ctx.user_id, "Amulet copy hit the model quota");
            respond(state, ctx, QUOTA_TEXT, Affordance::Amulet).await;
        }
        Err(err @ (BotError::SafetyBlocked | BotError::NoStructuredValueFound(_))) => {
            warn!(user_id = %ctx.user_id, "Amulet copy came back empty: {err}");
            respond(state, ctx, UNREADABLE_TEXT, Affordance::Amulet).await;
        }
        Err(err) => {
            error!(user_id = %ctx.user_id, "Amulet copy failed: {err}");
            respond(state, ctx, FAILED_TEXT, Affordance::Amulet).await;
        }
    }
}
