//! Bookkeeping from receipt photos and typed text.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

use crate::error::{BotError, Disposition, MediaCategory};
use crate::handlers::responses::respond;
use crate::handlers::EventContext;
use crate::line::{Affordance, FetchedMedia};
use crate::record::{format_summary, AccountingRecord, LineItem};
use crate::state::AppState;

static THAI_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{0E00}-\x{0E7F}]").expect("valid Thai script pattern"));
static PAYEE_ITEM_QTY_PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s+(.+?)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)$")
        .expect("valid payee pattern")
});
static ITEM_QTY_PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)$").expect("valid item pattern")
});
static WHITESPACE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

const TOTAL_FAILURE_TEXT: &str = "❌ 完全無法辨識，請確認：\n\
1. 是否為收據照片\n\
2. 照片是否清晰\n\
3. 光線是否充足\n\n\
❌ อ่านไม่ได้ กรุณาตรวจสอบ:\n\
1. เป็นรูปใบเสร็จหรือไม่\n\
2. รูปชัดหรือไม่\n\
3. แสงเพียงพอหรือไม่";

const RETAKE_TEXT: &str = "❌ 辨識失敗，請重拍清晰照片\n❌ อ่านไม่ได้ ถ่ายใหม่ชัดๆนะ";

pub const NOT_ACCOUNTING_TEXT: &str = "⚠️ 無法解析為記帳資料\n\n\
請使用以下格式：\n\
師傅名 品項 數量 單價\n\n\
範例：\n\
• 阿贊南奔 金箔 10 500\n\
• หลวงปู่ทวด ทอง 10 500\n\n\
⚠️ ไม่ใช่ข้อมูลบัญชี\n\n\
รูปแบบที่ถูกต้อง:\n\
อาจารย์ รายการ จำนวน ราคา\n\n\
ตัวอย่าง:\n\
• หลวงปู่ทวด ทอง 10 500\n\
• อาจารย์นำบุญ ทองคำ 5 1000\n\n\
💡 或點擊「範例」查看更多格式\n\
💡 หรือกด \"ตัวอย่าง\" ดูเพิ่มเติม";

const TEXT_QUOTA_TEXT: &str = "❌ 額度已滿 / เกินโควต้าแล้ว";

fn quality_warning_text(note: &str) -> String {
    format!(
        "⚠️ 圖片品質問題\n{note}\n\n建議：\n📸 重新拍攝清晰照片\n✏️ 或手動輸入：師傅 品項 數量 單價"
    )
}

fn partial_info_text(record: &AccountingRecord) -> String {
    let or_unknown = |value: &str| if value.is_empty() { "未知".to_string() } else { value.to_string() };
    format!(
        "⚠️ 只辨識到部分信息：\n店家：{}\n日期：{}\n\n無法辨識商品明細，請：\n📸 重新拍攝或\n✏️ 手動輸入明細",
        or_unknown(&record.master),
        or_unknown(&record.date)
    )
}

/// Simple `payee item qty price` or `item qty price` entries, parsed without
/// a model call. Thai text always goes to the model for translation.
pub fn parse_locally(text: &str) -> Option<AccountingRecord> {
    let text = text.trim();
    if text.is_empty() || THAI_SCRIPT.is_match(text) {
        return None;
    }
    let normalized = WHITESPACE_RUNS.replace_all(text, " ");

    let number = |value: &str| value.parse::<f64>().ok();
    if let Some(caps) = PAYEE_ITEM_QTY_PRICE.captures(&normalized) {
        let item = LineItem::priced(caps[2].trim(), number(&caps[3])?, number(&caps[4])?);
        return Some(AccountingRecord {
            master: caps[1].trim().to_string(),
            items: vec![item],
            ..AccountingRecord::default()
        });
    }
    if let Some(caps) = ITEM_QTY_PRICE.captures(&normalized) {
        let item = LineItem::priced(caps[1].trim(), number(&caps[2])?, number(&caps[3])?);
        return Some(AccountingRecord {
            items: vec![item],
            ..AccountingRecord::default()
        });
    }
    None
}

/// Local parse first, model parse otherwise. `Ok(None)` when the text is not
/// a bookkeeping entry.
pub async fn account_text(state: &AppState, text: &str) -> Result<Option<AccountingRecord>, BotError> {
    if let Some(record) = parse_locally(text) {
        info!("parsed bookkeeping text locally");
        return Ok(Some(record));
    }
    state.tasks().parse_text(text).await
}

/// Best-effort persistence; failures never reach the user.
pub async fn persist_record(state: &AppState, record: &AccountingRecord, image: Option<&FetchedMedia>) {
    let mut attachment_url = None;
    if let Some(image) = image {
        match state.records.upload_attachment(image, record).await {
            Ok(url) => attachment_url = url,
            Err(err) => warn!("Receipt image upload failed: {err}"),
        }
    }
    if let Err(err) = state.records.append(record, attachment_url.as_deref()).await {
        warn!("Spreadsheet append failed: {err}");
    }
}

pub async fn handle_receipt_image(state: &AppState, ctx: &EventContext) {
    let image = match state.fetcher.fetch(&ctx.message_id, MediaCategory::Image).await {
        Ok(image) => image,
        Err(err) => {
            warn!(user_id = %ctx.user_id, "Receipt download failed: {err}");
            respond(state, ctx, err.user_message(), Affordance::Default).await;
            return;
        }
    };

    let record = match state.tasks().recognize_receipt(image.clone().into_attachment()).await {
        Ok(record) => record,
        Err(err) if err.disposition() == Disposition::SoftFailure => {
            warn!(user_id = %ctx.user_id, "Receipt not recognized: {err}");
            respond(state, ctx, TOTAL_FAILURE_TEXT, Affordance::Default).await;
            return;
        }
        Err(err) => {
            error!(user_id = %ctx.user_id, "Receipt recognition failed: {err}");
            respond(state, ctx, err.user_message(), Affordance::Default).await;
            return;
        }
    };

    if record.reports_unreadable_image() {
        respond(state, ctx, &quality_warning_text(&record.note), Affordance::Default).await;
        return;
    }

    if !record.has_items() {
        if !record.master.is_empty() || !record.date.is_empty() {
            respond(state, ctx, &partial_info_text(&record), Affordance::Default).await;
        } else {
            respond(state, ctx, RETAKE_TEXT, Affordance::Default).await;
        }
        return;
    }

    info!(user_id = %ctx.user_id, items = record.items.len(), "receipt recognized");
    respond(state, ctx, &format_summary(&record), Affordance::Default).await;
    persist_record(state, &record, Some(&image)).await;
}

pub async fn handle_accounting_text(state: &AppState, ctx: &EventContext, text: &str) {
    match account_text(state, text).await {
        Ok(Some(record)) => {
            respond(state, ctx, &format_summary(&record), Affordance::Default).await;
            persist_record(state, &record, None).await;
        }
        Ok(None) => {
            info!(user_id = %ctx.user_id, "text is not a bookkeeping entry");
            respond(state, ctx, NOT_ACCOUNTING_TEXT, Affordance::Default).await;
        }
        Err(err) if err.is_quota() => {
            respond(state, ctx, TEXT_QUOTA_TEXT, Affordance::Default).await;
        }
        Err(err) if err.disposition() == Disposition::SoftFailure => {
            warn!(user_id = %ctx.user_id, "Text parse gave no record: {err}");
            respond(state, ctx, NOT_ACCOUNTING_TEXT, Affordance::Default).await;
        }
        Err(err) => {
            error!(user_id = %ctx.user_id, "Text parse failed: {err}");
            respond(state, ctx, err.user_message(), Affordance::Default).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{reply_ok, reply_with, test_state};
    use crate::llm::FinishReason;

    fn ctx() -> EventContext {
        EventContext::new(Some("U1"), "token", "m1")
    }

    #[test]
    fn payee_item_quantity_price() {
        let record = parse_locally("阿贊南奔 金箔 10 500").unwrap();
        assert_eq!(record.master, "阿贊南奔");
        assert_eq!(record.date, "");
        assert_eq!(record.items, vec![LineItem::priced("金箔", 10.0, 500.0)]);
        assert_eq!(record.items[0].total, 5000.0);
    }

    #[test]
    fn item_without_payee() {
        let record = parse_locally("金箔  2   12.5").unwrap();
        assert_eq!(record.master, "");
        assert_eq!(record.items, vec![LineItem::priced("金箔", 2.0, 12.5)]);
    }

    #[test]
    fn thai_and_free_text_need_the_model() {
        assert_eq!(parse_locally("หลวงปู่ทวด ทอง 10 500"), None);
        assert_eq!(parse_locally("今天買了很多東西"), None);
        assert_eq!(parse_locally("金箔 十個 五百"), None);
        assert_eq!(parse_locally("   "), None);
    }

    #[tokio::test]
    async fn local_text_never_calls_the_model() {
        let harness = test_state(vec![]);
        handle_accounting_text(&harness.state, &ctx(), "阿贊南奔 金箔 10 500").await;

        assert_eq!(harness.model.calls(), 0);
        assert_eq!(harness.messenger.last_text(), "✅ 阿贊南奔\n金箔×10=5,000\n💰 5,000");
        let appended = harness.records.appended();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].0.items[0].total, 5000.0);
        assert_eq!(appended[0].1, None);
    }

    #[tokio::test]
    async fn model_null_means_not_bookkeeping() {
        let harness = test_state(vec![reply_ok("null")]);
        handle_accounting_text(&harness.state, &ctx(), "你好嗎").await;

        assert_eq!(harness.model.calls(), 1);
        assert_eq!(harness.messenger.last_text(), NOT_ACCOUNTING_TEXT);
        assert!(harness.records.appended().is_empty());
    }

    #[tokio::test]
    async fn recognized_receipts_are_uploaded_then_appended() {
        let harness = test_state(vec![reply_ok(
            r#"```json
{"date":"2025-05-01","master":"龍婆","items":[{"name":"符管","qty":2,"price":300,"total":600}],"note":""}
```"#,
        )]);
        harness.records.set_upload_url("https://drive/receipt");
        handle_receipt_image(&harness.state, &ctx()).await;

        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(harness.messenger.last_text(), "✅ 龍婆\n符管×2=600\n💰 600");
        let appended = harness.records.appended();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].1.as_deref(), Some("https://drive/receipt"));
    }

    #[tokio::test]
    async fn blurry_receipts_get_a_quality_warning() {
        let harness = test_state(vec![reply_ok(
            r#"{"date":"","master":"","items":[],"note":"圖片模糊"}"#,
        )]);
        handle_receipt_image(&harness.state, &ctx()).await;

        assert!(harness.messenger.last_text().starts_with("⚠️ 圖片品質問題\n圖片模糊"));
        assert!(harness.records.appended().is_empty());
    }

    #[tokio::test]
    async fn partial_receipts_report_what_was_read() {
        let harness = test_state(vec![reply_ok(r#"{"master":"瓦拉瓦寺","items":[]}"#)]);
        handle_receipt_image(&harness.state, &ctx()).await;

        let text = harness.messenger.last_text();
        assert!(text.contains("店家：瓦拉瓦寺"));
        assert!(text.contains("日期：未知"));
    }

    #[tokio::test]
    async fn unparsable_receipts_are_a_total_failure() {
        let harness = test_state(vec![reply_with("抱歉", FinishReason::Stop)]);
        handle_receipt_image(&harness.state, &ctx()).await;
        assert_eq!(harness.messenger.last_text(), TOTAL_FAILURE_TEXT);
    }

    #[tokio::test]
    async fn persistence_failures_do_not_change_the_reply() {
        let harness = test_state(vec![]);
        harness.records.fail_appends();
        handle_accounting_text(&harness.state, &ctx(), "金箔 1 100").await;
        assert_eq!(harness.messenger.last_text(), "✅ 記帳成功 / บันทึกแล้ว\n金箔×1=100\n💰 100");
    }
}
