//! Voice notes, clips and uploaded recordings: accounting transcription and
//! fortune-reading translation.

use tracing::{error, info, warn};

use crate::error::{BotError, Disposition, MediaCategory};
use crate::handlers::receipt::{account_text, persist_record};
use crate::handlers::responses::respond;
use crate::handlers::EventContext;
use crate::line::Affordance;
use crate::record::format_summary;
use crate::state::AppState;

const UNCLEAR_AUDIO_TEXT: &str = "❌ 無法識別語音，請重新錄製\n\
建議：\n\
1. 說話清晰\n\
2. 環境安靜\n\
3. 靠近麥克風\n\n\
❌ ฟังไม่ชัด กรุณาอัดใหม่\n\
คำแนะนำ:\n\
1. พูดชัดๆ\n\
2. ที่เงียบๆ\n\
3. ใกล้ไมค์";

const TRANSLATION_FAILED_TEXT: &str = "❌ 翻譯處理失敗，請稍後再試\n❌ แปลไม่ได้ ลองใหม่ทีหลัง";
const FAILED_TEXT: &str = "❌ 處理失敗，請重試\n❌ ผิดพลาด ลองใหม่นะ";

pub const UNSUPPORTED_FILE_TEXT: &str = "⚠️ 不支援此檔案格式\n請傳語音或影片檔（m4a、mp3、wav、mp4、mov）\n\n\
⚠️ ไม่รองรับไฟล์นี้\nส่งไฟล์เสียงหรือวิดีโอนะ";

fn too_long_text(max_ms: u64) -> String {
    let seconds = max_ms / 1000;
    format!("⚠️ 語音太長，請控制在 {seconds} 秒內\n⚠️ เสียงยาวเกินไป กรุณาไม่เกิน {seconds} วินาที")
}

fn transcript_summary_text(transcript: &str, summary: &str) -> String {
    format!("🎤 語音識別結果：\n\"{transcript}\"\n\n{summary}")
}

fn transcript_only_text(transcript: &str) -> String {
    format!(
        "🎤 語音識別：\n\"{transcript}\"\n\n\
         ⚠️ 無法解析為記帳資料\n格式範例：師傅名 品項 數量 單價\n\n\
         ⚠️ ไม่ใช่ข้อมูลบัญชี\nตัวอย่าง: อาจารย์ ของ จำนวน ราคา"
    )
}

/// Downloads and transcribes; `Ok(None)` for an empty transcript.
async fn transcribe(
    state: &AppState,
    ctx: &EventContext,
    category: MediaCategory,
    duration_ms: u64,
) -> Result<Option<String>, BotError> {
    let media = state.fetcher.fetch(&ctx.message_id, category).await?;
    let transcript = state
        .tasks()
        .transcribe(media.into_attachment(), category, duration_ms)
        .await?;
    if transcript.trim().is_empty() {
        return Ok(None);
    }
    info!(user_id = %ctx.user_id, chars = transcript.chars().count(), "{category} transcribed");
    Ok(Some(transcript))
}

/// Spoken bookkeeping. Recordings longer than the configured limit are
/// refused before anything is downloaded.
pub async fn handle_accounting_media(
    state: &AppState,
    ctx: &EventContext,
    category: MediaCategory,
    duration_ms: u64,
) {
    let max_ms = state.settings.max_audio_duration_ms;
    if duration_ms > max_ms {
        info!(user_id = %ctx.user_id, duration_ms, "recording too long for bookkeeping");
        respond(state, ctx, &too_long_text(max_ms), Affordance::Default).await;
        return;
    }

    let transcript = match transcribe(state, ctx, category, duration_ms).await {
        Ok(Some(transcript)) => transcript,
        Ok(None) => {
            respond(state, ctx, UNCLEAR_AUDIO_TEXT, Affordance::Default).await;
            return;
        }
        Err(err) if err.disposition() == Disposition::SoftFailure => {
            warn!(user_id = %ctx.user_id, "Transcription gave nothing usable: {err}");
            respond(state, ctx, UNCLEAR_AUDIO_TEXT, Affordance::Default).await;
            return;
        }
        Err(err) => {
            error!(user_id = %ctx.user_id, "Transcription failed: {err}");
            respond(state, ctx, err.user_message(), Affordance::Default).await;
            return;
        }
    };

    match account_text(state, &transcript).await {
        Ok(Some(record)) => {
            let reply = transcript_summary_text(&transcript, &format_summary(&record));
            respond(state, ctx, &reply, Affordance::Default).await;
            persist_record(state, &record, None).await;
        }
        Ok(None) => {
            respond(state, ctx, &transcript_only_text(&transcript), Affordance::Default).await;
        }
        Err(err) if err.disposition() == Disposition::SoftFailure => {
            respond(state, ctx, &transcript_only_text(&transcript), Affordance::Default).await;
        }
        Err(err) => {
            error!(user_id = %ctx.user_id, "Parsing the transcript failed: {err}");
            respond(state, ctx, err.user_message(), Affordance::Default).await;
        }
    }
}

/// Fortune reading: transcribe, then rewrite. A successful reply ends the
/// fortune session; failures keep it so the user can resend.
pub async fn handle_fortune_media(
    state: &AppState,
    ctx: &EventContext,
    category: MediaCategory,
    duration_ms: u64,
) {
    info!(
        user_id = %ctx.user_id,
        "fortune {category} received, {:.1} min",
        duration_ms as f64 / 60_000.0
    );

    let transcript = match transcribe(state, ctx, category, duration_ms).await {
        Ok(Some(transcript)) => transcript,
        Ok(None) => {
            respond(state, ctx, UNCLEAR_AUDIO_TEXT, Affordance::Fortune).await;
            return;
        }
        Err(err) => {
            report_fortune_failure(state, ctx, &err).await;
            return;
        }
    };

    match state.tasks().translate_fortune(&transcript, duration_ms).await {
        Ok(reading) => {
            state.sessions.delete(&ctx.user_id).await;
            respond(state, ctx, &reading, Affordance::Default).await;
        }
        Err(err) if err.disposition() == Disposition::SoftFailure => {
            warn!(user_id = %ctx.user_id, "Fortune rewrite came back empty: {err}");
            respond(state, ctx, TRANSLATION_FAILED_TEXT, Affordance::Fortune).await;
        }
        Err(err) => report_fortune_failure(state, ctx, &err).await,
    }
}

async fn report_fortune_failure(state: &AppState, ctx: &EventContext, err: &BotError) {
    error!(user_id = %ctx.user_id, "Fortune translation failed: {err}");
    let text = match err {
        BotError::QuotaExceeded | BotError::PayloadTooLarge(_) => err.user_message(),
        BotError::SafetyBlocked | BotError::NoStructuredValueFound(_) => UNCLEAR_AUDIO_TEXT,
        _ => FAILED_TEXT,
    };
    respond(state, ctx, text, Affordance::Fortune).await;
}

pub async fn reject_file(state: &AppState, ctx: &EventContext, file_name: &str) {
    info!(user_id = %ctx.user_id, file_name, "unsupported file rejected");
    let mode = state.sessions.get(&ctx.user_id).await.mode;
    respond(state, ctx, UNSUPPORTED_FILE_TEXT, Affordance::for_mode(mode)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{reply_ok, test_state};
    use crate::session::{Mode, Session};
    use chrono::Utc;

    fn ctx() -> EventContext {
        EventContext::new(Some("U1"), "token", "m1")
    }

    #[tokio::test]
    async fn long_recordings_are_refused_before_download() {
        let harness = test_state(vec![]);
        handle_accounting_media(&harness.state, &ctx(), MediaCategory::Audio, 60_001).await;

        assert_eq!(harness.fetcher.calls(), 0);
        assert_eq!(harness.model.calls(), 0);
        assert!(harness.messenger.last_text().contains("60 秒"));
    }

    #[tokio::test]
    async fn spoken_entries_parse_locally_after_transcription() {
        let harness = test_state(vec![reply_ok("阿贊南奔 金箔 10 500")]);
        handle_accounting_media(&harness.state, &ctx(), MediaCategory::Audio, 5_000).await;

        // Only the transcription hits the model.
        assert_eq!(harness.model.calls(), 1);
        assert_eq!(
            harness.messenger.last_text(),
            "🎤 語音識別結果：\n\"阿贊南奔 金箔 10 500\"\n\n✅ 阿贊南奔\n金箔×10=5,000\n💰 5,000"
        );
        assert_eq!(harness.records.appended().len(), 1);
    }

    #[tokio::test]
    async fn non_bookkeeping_speech_echoes_the_transcript() {
        let harness = test_state(vec![reply_ok("今天天氣很好"), reply_ok("null")]);
        handle_accounting_media(&harness.state, &ctx(), MediaCategory::Audio, 5_000).await;

        assert_eq!(harness.model.calls(), 2);
        assert!(harness.messenger.last_text().starts_with("🎤 語音識別：\n\"今天天氣很好\""));
    }

    #[tokio::test]
    async fn fortune_success_ends_the_session() {
        let harness = test_state(vec![reply_ok("ดวงดี"), reply_ok("緣主您好，今年財運穩定。")]);
        let now = Utc::now();
        let session = Session::idle(now).restart(Mode::FortuneTranslation, now);
        harness.state.sessions.set("U1", &session).await;

        handle_fortune_media(&harness.state, &ctx(), MediaCategory::Audio, 200_000).await;

        let requests = harness.model.requests();
        assert_eq!(requests.len(), 2);
        // 200 s is past both the audio and the fortune thresholds.
        assert_eq!(requests[0].model, "gemini-2.5-pro");
        assert_eq!(requests[1].model, "gemini-2.5-pro");
        assert_eq!(harness.messenger.last_text(), "緣主您好，今年財運穩定。");
        assert!(!harness.state.sessions.get("U1").await.is_active());
    }

    #[tokio::test]
    async fn unsupported_files_keep_the_buttons_of_the_current_mode() {
        let cases = [
            (None, Affordance::Default),
            (Some(Mode::AmuletCollection), Affordance::Amulet),
            (Some(Mode::FortuneTranslation), Affordance::Fortune),
        ];
        for (mode, expected) in cases {
            let harness = test_state(vec![reply_ok("unused")]);
            if let Some(mode) = mode {
                let now = Utc::now();
                let session = Session::idle(now).restart(mode, now);
                harness.state.sessions.set("U1", &session).await;
            }

            reject_file(&harness.state, &ctx(), "a.pdf").await;

            let sent = harness.messenger.sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].text, UNSUPPORTED_FILE_TEXT);
            assert_eq!(sent[0].affordance, expected, "mode={mode:?}");
            assert_eq!(harness.fetcher.calls(), 0);
            assert_eq!(harness.model.calls(), 0);
            // Rejection leaves the session untouched.
            assert_eq!(
                harness.state.sessions.get("U1").await.mode,
                mode.unwrap_or_default()
            );
        }
    }

    #[tokio::test]
    async fn fortune_quota_failure_keeps_the_session() {
        let harness = test_state(vec![Err(BotError::QuotaExceeded)]);
        let now = Utc::now();
        let session = Session::idle(now).restart(Mode::FortuneTranslation, now);
        harness.state.sessions.set("U1", &session).await;

        handle_fortune_media(&harness.state, &ctx(), MediaCategory::Audio, 30_000).await;

        assert_eq!(harness.messenger.last_text(), BotError::QuotaExceeded.user_message());
        assert_eq!(
            harness.state.sessions.get("U1").await.mode,
            Mode::FortuneTranslation
        );
    }
}
