use serde_json::{json, Value};

use crate::session::Mode;

/// Named quick-reply button groups attached to an outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affordance {
    #[default]
    Default,
    Amulet,
    Fortune,
    None,
}

fn camera(label: &str) -> Value {
    json!({ "type": "action", "action": { "type": "camera", "label": label } })
}

fn camera_roll(label: &str) -> Value {
    json!({ "type": "action", "action": { "type": "cameraRoll", "label": label } })
}

fn message(label: &str, text: &str) -> Value {
    json!({ "type": "action", "action": { "type": "message", "label": label, "text": text } })
}

impl Affordance {
    /// Button group a user in `mode` should be offered next.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Receipt => Affordance::Default,
            Mode::AmuletCollection => Affordance::Amulet,
            Mode::FortuneTranslation => Affordance::Fortune,
        }
    }

    pub fn quick_reply(self) -> Option<Value> {
        let items = match self {
            Affordance::None => return None,
            Affordance::Default => vec![
                camera("📷 拍收據 / ถ่ายรูป"),
                camera_roll("🖼️ 傳照片 / รูปภาพ"),
                message("📿 佛牌文案 / พระ", "佛牌"),
                message("🎙️ 語音 / เสียง", "語音"),
                message("🔮 語音翻譯 / แปล", "語音翻譯"),
                message("📊 額度 / โควต้า", "額度"),
                message("❓ 說明 / คู่มือ", "說明"),
            ],
            Affordance::Amulet => vec![
                camera("📷 拍照 / ถ่ายรูป"),
                camera_roll("🖼️ 相簿 / อัลบั้ม"),
                message("✅ 完成生成 / เสร็จสร้าง", "完成"),
                message("🗑️ 清除重來 / ล้างใหม่", "清除"),
                message("❌ 取消離開 / ยกเลิก", "取消"),
            ],
            Affordance::Fortune => vec![
                camera_roll("📁 選檔案 / เลือกไฟล์"),
                message("❌ 取消離開 / ยกเลิก", "取消"),
            ],
        };
        Some(json!({ "items": items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_has_its_own_buttons() {
        assert_eq!(Affordance::for_mode(Mode::Receipt), Affordance::Default);
        assert_eq!(Affordance::for_mode(Mode::AmuletCollection), Affordance::Amulet);
        assert_eq!(Affordance::for_mode(Mode::FortuneTranslation), Affordance::Fortune);
    }

    #[test]
    fn button_sets_match_their_mode() {
        let amulet = Affordance::Amulet.quick_reply().unwrap();
        let texts: Vec<&str> = amulet["items"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|item| item["action"]["text"].as_str())
            .collect();
        assert_eq!(texts, vec!["完成", "清除", "取消"]);

        assert_eq!(Affordance::Fortune.quick_reply().unwrap()["items"].as_array().unwrap().len(), 2);
        assert_eq!(Affordance::Default.quick_reply().unwrap()["items"].as_array().unwrap().len(), 7);
        assert!(Affordance::None.quick_reply().is_none());
    }
}
