//! Parsed accounting record and its chat summary.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub qty: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total: f64,
}

impl LineItem {
    pub fn priced(name: &str, qty: f64, price: f64) -> Self {
        LineItem {
            name: name.to_string(),
            qty,
            price,
            total: qty * price,
        }
    }
}

/// Empty `items` means recognition failed, not a zero-purchase record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountingRecord {
    /// ISO date as read from the input; empty when none was given.
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    /// Payee: the master, temple or shop.
    #[serde(default, alias = "payee", deserialize_with = "lenient_string")]
    pub master: String,
    #[serde(default, deserialize_with = "lenient_items")]
    pub items: Vec<LineItem>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: String,
}

impl AccountingRecord {
    /// `None` for anything that is not an object (the parse prompt answers
    /// `null` for text that is not bookkeeping).
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let mut record: AccountingRecord = serde_json::from_value(value).ok()?;
        record.fill_missing_amounts();
        Some(record)
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(|item| item.total).sum()
    }

    // Quantity defaults to 1; an absent unit price falls back to the total.
    fn fill_missing_amounts(&mut self) {
        self.items.retain(|item| !item.name.trim().is_empty());
        for item in &mut self.items {
            if item.qty <= 0.0 {
                item.qty = 1.0;
            }
            if item.total == 0.0 && item.price != 0.0 {
                item.total = item.qty * item.price;
            } else if item.price == 0.0 && item.total != 0.0 {
                item.price = item.total / item.qty;
            }
        }
    }

    /// Image-quality complaints the recognizer writes into `note`.
    pub fn reports_unreadable_image(&self) -> bool {
        ["模糊", "無法辨識", "不清楚"]
            .iter()
            .any(|marker| self.note.contains(marker))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) => value.trim().to_string(),
        Value::Null => String::new(),
        Value::Number(value) => value.to_string(),
        Value::Bool(value) => value.to_string(),
        _ => String::new(),
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(value) => value.as_f64().unwrap_or_default(),
        Value::String(value) => value
            .trim()
            .replace([',', '，'], "")
            .parse::<f64>()
            .unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(values) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(values
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

/// Integers print bare, fractions keep up to two decimals.
pub fn format_amount(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let negative = rounded < 0.0;
    let absolute = rounded.abs();
    let whole = absolute.trunc() as u64;
    let fraction = ((absolute - absolute.trunc()) * 100.0).round() as u64;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if fraction > 0 {
        let decimals = format!("{fraction:02}");
        out.push('.');
        out.push_str(decimals.trim_end_matches('0'));
    }
    out
}

pub fn format_summary(record: &AccountingRecord) -> String {
    let header = if record.master.is_empty() {
        "✅ 記帳成功 / บันทึกแล้ว".to_string()
    } else {
        format!("✅ {}", record.master)
    };

    let mut lines = vec![header];
    for item in &record.items {
        lines.push(format!(
            "{}×{}={}",
            item.name,
            format_amount(item.qty),
            format_amount(item.total)
        ));
    }
    lines.push(format!("💰 {}", format_amount(record.total())));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_payee_alias_and_stringly_numbers() {
        let value = json!({
            "date": null,
            "payee": "龍婆",
            "items": [{"name": "符管", "qty": "2", "price": "1,200", "total": null}, "garbage"],
        });
        let record = AccountingRecord::from_value(value).unwrap();
        assert_eq!(record.master, "龍婆");
        assert_eq!(record.date, "");
        assert_eq!(record.items, vec![LineItem::priced("符管", 2.0, 1200.0)]);
    }

    #[test]
    fn non_objects_are_not_records() {
        assert_eq!(AccountingRecord::from_value(Value::Null), None);
        assert_eq!(AccountingRecord::from_value(json!([1, 2])), None);
    }

    #[test]
    fn missing_price_falls_back_to_total() {
        let record = AccountingRecord::from_value(json!({
            "items": [{"name": "供品", "total": 900}]
        }))
        .unwrap();
        assert_eq!(record.items[0].qty, 1.0);
        assert_eq!(record.items[0].price, 900.0);
    }

    #[test]
    fn amounts_use_thousands_separators() {
        assert_eq!(format_amount(5000.0), "5,000");
        assert_eq!(format_amount(1234567.0), "1,234,567");
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(12.5), "12.5");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn summary_lists_items_and_total() {
        let record = AccountingRecord {
            master: "阿贊南奔".to_string(),
            items: vec![
                LineItem::priced("金箔", 10.0, 500.0),
                LineItem::priced("蠟燭", 2.0, 30.0),
            ],
            ..AccountingRecord::default()
        };
        assert_eq!(
            format_summary(&record),
            "✅ 阿贊南奔\n金箔×10=5,000\n蠟燭×2=60\n💰 5,060"
        );

        let anonymous = AccountingRecord {
            items: vec![LineItem::priced("金箔", 1.0, 100.0)],
            ..AccountingRecord::default()
        };
        assert!(format_summary(&anonymous).starts_with("✅ 記帳成功 / บันทึกแล้ว\n"));
    }
}
