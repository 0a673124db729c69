//! Keyword commands and the fixed help texts they answer with.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    QuotaReport,
    VoiceTutorial,
    EnterAmulet,
    EnterFortune,
    Cancel,
    Finalize,
    Clear,
    Example,
}

/// Checked top to bottom; the first matching keyword wins.
const COMMAND_TABLE: &[(Command, &[&str])] = &[
    (Command::Help, &["?", "？", "說明", "คู่มือ", "help"]),
    (Command::QuotaReport, &["額度", "โควต้า", "quota"]),
    (Command::VoiceTutorial, &["語音", "เสียง"]),
    (Command::EnterAmulet, &["佛牌", "พระ", "พระเครื่อง"]),
    (Command::EnterFortune, &["語音翻譯", "แปล", "แปลเสียง"]),
    (Command::Cancel, &["取消", "ยกเลิก", "cancel"]),
    (Command::Finalize, &["完成", "เสร็จ", "done", "生成"]),
    (Command::Clear, &["清除", "ล้าง", "clear", "重來"]),
    (Command::Example, &["範例", "ตัวอย่าง"]),
];

pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    COMMAND_TABLE
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| keyword.eq_ignore_ascii_case(text)))
        .map(|(command, _)| *command)
}

pub const HELP_TEXT: &str = "📖 使用說明 / คู่มือ\n\n\
📷 拍照記帳 → 拍收據 AI 辨識\n\
📿 佛牌文案 → 拍佛牌 AI 寫文案\n\
🎙️ 語音記帳 → 錄語音 AI 辨識後記帳\n\
🔮 語音翻譯 → 命理語音翻成中文解說\n\
✏️ 文字記帳 → 師傅 品項 數量 單價\n\n\
📷 ถ่ายรูปใบเสร็จ → AI อ่านให้\n\
📿 ถ่ายรูปพระ → AI เขียนบทความ\n\
🎙️ อัดเสียง → AI ฟังแล้วบันทึก\n\
🔮 แปลเสียง → แปลโหราศาสตร์เป็นจีน\n\
✏️ พิมพ์ → อาจารย์ ของ จำนวน ราคา\n\n\
👇 點按鈕開始 / กดปุ่มเลย";

pub const VOICE_TUTORIAL_TEXT: &str = "🎙️ 語音記帳教學\n\n\
① 點輸入框旁的「🎤」\n\
② 按住說話\n\
③ 放開發送\n\n\
💬 範例：「阿贊南奔 金箔 十個 五百」\n\n\
🎙️ วิธีอัดเสียง\n\n\
① กดไอคอน「🎤」\n\
② กดค้างพูด\n\
③ ปล่อยส่ง\n\n\
💬 ตัวอย่าง: \"หลวงปู่ทวด ทอง 10 500\"";

pub const EXAMPLE_TEXT: &str = "💡 輸入範例 (可直接複製) / ตัวอย่าง:\n\n\
🔻 中文格式 / รูปแบบจีน:\n\
阿贊南奔 金箔 10 500\n\n\
🔻 泰文格式 / รูปแบบไทย:\n\
หลวงปู่ทวด ทอง 10 500\n\
(Bot 會自動翻譯 / ระบบจะแปลภาษาให้)\n\n\
✨ 試試看吧！ / ลองดูนะครับ";

pub fn amulet_mode_text(max_images: usize) -> String {
    format!(
        "📿 佛牌聖物文案模式\n\n\
         ➀ 可先傳文字描述（選填）\n\
         → 師父、佛牌名、功效\n\n\
         ➁ 傳 1~{max_images} 張照片\n\
         → 正面/背面/細節\n\n\
         ➂ 點「完成生成」\n\
         → AI 綜合生成文案\n\n\
         📿 โหมดพระ\n\
         ส่งรูป 1-{max_images} ภาพ แล้วกดปุ่ม 👇"
    )
}

pub const FORTUNE_MODE_TEXT: &str = "🔮 語音翻譯模式\n\n\
請上傳命理語音檔案\n\
AI 會將內容轉化為台灣命理老師解說文\n\n\
🔮 โหมดแปลเสียง\n\n\
อัปโหลดไฟล์เสียงโหราศาสตร์\n\
AI จะแปลเป็นคำอธิบาย\n\n\
👉 點按鈕取消可離開\n\
👉 กดปุ่มยกเลิกได้";

pub fn cancelled_text(cleared_images: usize) -> String {
    let cleared = if cleared_images > 0 {
        format!("（已清除 {cleared_images} 張圖片）")
    } else {
        String::new()
    };
    format!(
        "✅ 已取消模式{cleared}\n✅ ยกเลิกโหมดแล้ว\n\n\
         請點選下方按鈕繼續使用\nกดปุ่มด้านล่างเพื่อใช้งานต่อ"
    )
}

pub const NOTHING_TO_CANCEL_TEXT: &str = "ℹ️ 目前沒有進行中的模式\nℹ️ ไม่มีโหมดที่ต้องยกเลิก";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_trimmed_and_ascii_case_insensitive() {
        assert_eq!(parse("  佛牌 "), Some(Command::EnterAmulet));
        assert_eq!(parse("DONE"), Some(Command::Finalize));
        assert_eq!(parse("Cancel"), Some(Command::Cancel));
        assert_eq!(parse("？"), Some(Command::Help));
        assert_eq!(parse("語音翻譯"), Some(Command::EnterFortune));
        assert_eq!(parse("語音"), Some(Command::VoiceTutorial));
        assert_eq!(parse("แปลเสียง"), Some(Command::EnterFortune));
        assert_eq!(parse("重來"), Some(Command::Clear));
        assert_eq!(parse("範例"), Some(Command::Example));
    }

    #[test]
    fn free_text_is_not_a_command() {
        assert_eq!(parse("阿贊南奔 金箔 10 500"), None);
        assert_eq!(parse("佛牌很漂亮"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn cancel_text_mentions_cleared_images() {
        assert!(cancelled_text(3).contains("已清除 3 張圖片"));
        assert!(!cancelled_text(0).contains("已清除"));
    }
}
