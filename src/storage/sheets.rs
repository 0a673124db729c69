use async_trait::async_trait;
use base64::Engine;
use chrono::{NaiveDate, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::BotError;
use crate::line::FetchedMedia;
use crate::record::AccountingRecord;
use crate::storage::RecordSink;
use crate::utils::dates::taiwan_today;
use crate::utils::http::get_http_client;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Sheets `values:append` plus the Apps Script upload proxy.
#[derive(Debug, Clone, Default)]
pub struct SheetsRecorder {
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
    apps_script_url: String,
    drive_folder_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "webViewLink")]
    web_view_link: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SheetsRecorder {
    pub fn from_config(config: &Config) -> Self {
        SheetsRecorder {
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            access_token: config.google_access_token.clone(),
            apps_script_url: config.apps_script_url.clone(),
            drive_folder_id: config.google_drive_folder_id.clone(),
        }
    }

    fn sheets_configured(&self) -> bool {
        !self.spreadsheet_id.is_empty() && !self.access_token.is_empty()
    }

    fn append_url(&self) -> Result<Url, BotError> {
        let mut url = Url::parse(SHEETS_API_BASE)
            .map_err(|err| BotError::Persistence(format!("bad sheets url: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| BotError::Persistence("sheets url cannot be a base".to_string()))?
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}!A:G:append", self.sheet_name));
        url.query_pairs_mut().append_pair("valueInputOption", "USER_ENTERED");
        Ok(url)
    }
}

/// Empty, unparsable and future dates all become `today`.
pub fn normalize_record_date(raw: &str, today: NaiveDate) -> NaiveDate {
    let raw = raw.trim();
    if raw.is_empty() {
        info!("record has no date; using today {today}");
        return today;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) if date > today => {
            warn!("record date {raw} is in the future; using today {today}");
            today
        }
        Ok(date) => date,
        Err(_) => {
            warn!("record date {raw:?} is not a valid date; using today {today}");
            today
        }
    }
}

pub fn build_rows(record: &AccountingRecord, date: NaiveDate, attachment_url: Option<&str>) -> Vec<Value> {
    let date = date.format("%Y-%m-%d").to_string();
    record
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let url = if index == 0 { attachment_url.unwrap_or("") } else { "" };
            json!([date, record.master, item.name, item.qty, item.price, item.total, url])
        })
        .collect()
}

pub fn attachment_file_name(record: &AccountingRecord, today: NaiveDate) -> String {
    let master = if record.master.is_empty() { "未知" } else { record.master.as_str() };
    let master: String = master
        .chars()
        .map(|ch| if "\\/:*?\"<>|".contains(ch) { '_' } else { ch })
        .collect();
    let date = if record.date.is_empty() {
        today.format("%Y-%m-%d").to_string()
    } else {
        record.date.clone()
    };
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
    format!("{date}_{master}_{timestamp}.jpg")
}

#[async_trait]
impl RecordSink for SheetsRecorder {
    async fn append(&self, record: &AccountingRecord, attachment_url: Option<&str>) -> Result<(), BotError> {
        if !self.sheets_configured() {
            warn!("Google Sheets is not configured; skipping append");
            return Ok(());
        }
        if !record.has_items() {
            return Ok(());
        }

        let date = normalize_record_date(&record.date, taiwan_today());
        let rows = build_rows(record, date, attachment_url);
        let row_count = rows.len();

        let response = get_http_client()
            .post(self.append_url()?)
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(|err| BotError::Persistence(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Persistence(format!(
                "sheets append returned {status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        info!(rows = row_count, "appended record to Google Sheet");
        Ok(())
    }

    async fn upload_attachment(
        &self,
        image: &FetchedMedia,
        record: &AccountingRecord,
    ) -> Result<Option<String>, BotError> {
        if self.apps_script_url.is_empty() {
            return Ok(None);
        }

        let file_name = attachment_file_name(record, taiwan_today());
        info!(file_name = %file_name, "uploading receipt image");
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);

        let response = get_http_client()
            .post(&self.apps_script_url)
            .json(&json!({
                "image": encoded,
                "fileName": file_name,
                "folderId": self.drive_folder_id,
            }))
            .send()
            .await
            .map_err(|err| BotError::Persistence(err.to_string()))?;

        let result: UploadResponse = response
            .json()
            .await
            .map_err(|err| BotError::Persistence(format!("upload response: {err}")))?;
        if !result.success {
            return Err(BotError::Persistence(
                result.error.unwrap_or_else(|| "apps script upload failed".to_string()),
            ));
        }

        info!(link = ?result.web_view_link, "receipt image uploaded");
        Ok(result.web_view_link)
    }
}
