//! Turning model text into JSON values.
//!
//! Both entry points return `None` instead of an error: an absent value is a
//! normal outcome that callers answer by asking the user to retry.

use serde_json::Value;
use tracing::{debug, warn};

/// Appended to `note` when a response had to be closed synthetically.
pub const TRUNCATION_NOTE: &str = "(部分內容被截斷)";

/// Strict parse of the whole text, then of the outermost `{...}` span.
pub fn extract_json(raw: &str, source: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        debug!(source, "model response parsed directly");
        return Some(value);
    }

    let span = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            warn!(source, "no JSON object found in model response");
            return None;
        }
    };

    match serde_json::from_str::<Value>(span) {
        Ok(value) => {
            debug!(source, "model response parsed after trimming surrounding text");
            Some(value)
        }
        Err(err) => {
            warn!(source, "JSON span in model response failed to parse: {err}");
            None
        }
    }
}

/// Closes a response that stopped for length and parses it as an object.
/// Only meaningful when the model reported a length stop.
pub fn repair_truncated(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let closed = close_truncated(&trimmed[start..]);

    let mut value = match serde_json::from_str::<Value>(&closed) {
        Ok(value) => value,
        Err(err) => {
            warn!("truncated model response could not be repaired: {err}");
            return None;
        }
    };

    let object = value.as_object_mut()?;
    let note = object
        .get("note")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if !note.contains(TRUNCATION_NOTE) {
        let note = if note.is_empty() {
            TRUNCATION_NOTE.to_string()
        } else {
            format!("{note} {TRUNCATION_NOTE}")
        };
        object.insert("note".to_string(), Value::String(note));
    }

    debug!("truncated model response repaired");
    Some(value)
}

struct Scan {
    /// Unclosed `{` / `[` in opening order.
    stack: Vec<u8>,
    /// Byte offset of a string literal that never closed.
    open_string: Option<usize>,
    /// Byte offset of the most recent complete string literal.
    last_string_start: Option<usize>,
}

// Byte-wise is safe: UTF-8 continuation bytes never collide with ASCII.
fn scan(text: &str) -> Scan {
    let mut stack = Vec::new();
    let mut open_string = None;
    let mut last_string_start = None;
    let mut escaped = false;

    for (index, byte) in text.bytes().enumerate() {
        if let Some(start) = open_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                open_string = None;
                last_string_start = Some(start);
            }
            continue;
        }
        match byte {
            b'"' => open_string = Some(index),
            b'{' | b'[' => stack.push(byte),
            b'}' | b']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    Scan {
        stack,
        open_string,
        last_string_start,
    }
}

fn is_bare_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '+' | '-')
}

fn is_complete_literal(token: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(token),
        Ok(Value::Number(_) | Value::Bool(_) | Value::Null)
    )
}

fn trim_end_in_place(text: &mut String) {
    let len = text.trim_end().len();
    text.truncate(len);
}

/// Drops the trailing incomplete fragment, then appends the missing closers
/// innermost first.
pub(crate) fn close_truncated(text: &str) -> String {
    let mut body = text.trim_end().to_string();
    if let Some(start) = scan(&body).open_string {
        body.truncate(start);
    }

    loop {
        trim_end_in_place(&mut body);
        let Some(last) = body.chars().last() else {
            break;
        };
        match last {
            ',' => {
                body.pop();
            }
            ':' => {
                // A key whose value never arrived.
                body.pop();
                trim_end_in_place(&mut body);
                match scan(&body).last_string_start {
                    Some(start) if body.ends_with('"') => body.truncate(start),
                    _ => break,
                }
            }
            '"' => {
                // A complete string directly after `{` or `,` inside an
                // object is a key without its colon.
                let scanned = scan(&body);
                let dangling_key = scanned.stack.last() == Some(&b'{')
                    && scanned.last_string_start.is_some_and(|start| {
                        let before = body[..start].trim_end();
                        before.ends_with('{') || before.ends_with(',')
                    });
                match scanned.last_string_start {
                    Some(start) if dangling_key => body.truncate(start),
                    _ => break,
                }
            }
            ch if is_bare_token_char(ch) => {
                let start = body
                    .char_indices()
                    .rev()
                    .find(|(_, ch)| !is_bare_token_char(*ch))
                    .map(|(index, ch)| index + ch.len_utf8())
                    .unwrap_or(0);
                if is_complete_literal(&body[start..]) {
                    break;
                }
                body.truncate(start);
            }
            _ => break,
        }
    }

    let closers: String = scan(&body)
        .stack
        .iter()
        .rev()
        .map(|open| if *open == b'{' { '}' } else { ']' })
        .collect();
    body.push_str(&closers);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapped_and_bare_objects_parse_identically() {
        let bare = r#"{"date":"2025-01-02","master":"龍婆","items":[{"name":"符管","qty":1,"price":300,"total":300}],"note":""}"#;
        let wrapped = format!("好的，以下是結果：\n```json\n{bare}\n```\n希望有幫助！");
        assert_eq!(extract_json(bare, "test"), extract_json(&wrapped, "test"));
        assert!(extract_json(bare, "test").is_some());
    }

    #[test]
    fn prose_without_an_object_is_absent() {
        assert_eq!(extract_json("抱歉，我無法辨識這張圖片。", "test"), None);
        assert_eq!(extract_json("} oops {", "test"), None);
        assert_eq!(extract_json("{\"a\": }", "test"), None);
    }

    #[test]
    fn literal_null_parses_directly() {
        assert_eq!(extract_json("null", "test"), Some(Value::Null));
    }

    #[test]
    fn closes_nested_containers_innermost_first() {
        // Two unclosed `{` around one unclosed `[`, cut inside a string.
        let raw = r#"{"master":"A","detail":{"items":["金箔","符"#;
        let closed = close_truncated(raw);
        assert!(closed.ends_with("]}}"), "{closed}");
        let value = repair_truncated(raw).unwrap();
        assert_eq!(value["detail"]["items"], json!(["金箔"]));
        assert_eq!(value["note"], json!(TRUNCATION_NOTE));
    }

    #[test]
    fn drops_the_dangling_field_of_an_item() {
        let raw = r#"{"date":"","master":"阿贊","items":[{"name":"金箔","qty":10,"price":500,"total":5000},{"name":"符管","qty":"#;
        let value = repair_truncated(raw).unwrap();
        let items = value["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["total"], json!(5000));
        assert_eq!(items[1], json!({"name": "符管"}));
    }

    #[test]
    fn drops_incomplete_literals_and_bare_keys() {
        let value = repair_truncated(r#"{"a":1,"b":tr"#).unwrap();
        assert_eq!(value, json!({"a": 1, "note": TRUNCATION_NOTE}));

        let value = repair_truncated(r#"{"a":1,"b""#).unwrap();
        assert_eq!(value["a"], json!(1));
        assert!(value.get("b").is_none());

        let value = repair_truncated(r#"{"a":[1,2,3"#).unwrap();
        assert_eq!(value["a"], json!([1, 2, 3]));
    }

    #[test]
    fn advisory_note_is_added_exactly_once() {
        let raw = format!(r#"{{"note":"字跡模糊 {TRUNCATION_NOTE}","items":[{{"name":"金"#);
        let value = repair_truncated(&raw).unwrap();
        let note = value["note"].as_str().unwrap();
        assert_eq!(note.matches(TRUNCATION_NOTE).count(), 1);
        assert!(note.starts_with("字跡模糊"));

        let value = repair_truncated(r#"{"note":"部分模糊","items":["#).unwrap();
        assert_eq!(value["note"], json!(format!("部分模糊 {TRUNCATION_NOTE}")));
    }

    #[test]
    fn escaped_quotes_do_not_confuse_the_scanner() {
        let raw = r#"{"name":"他說\"好\"","items":[{"name":"x\"y"#;
        let value = repair_truncated(raw).unwrap();
        assert_eq!(value["name"], json!("他說\"好\""));
        assert_eq!(value["items"], json!([{}]));
    }

    #[test]
    fn text_without_an_object_cannot_be_repaired() {
        assert_eq!(repair_truncated("no json here"), None);
    }
}
