use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::session::{Mode, Session, StoredImage};

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub user_id: String,
    pub mode: String,
    pub description: String,
    pub images_json: String,
    pub created_at_ms: i64,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageColumn {
    mime_type: String,
    data: String,
}

pub fn encode_images(images: &[StoredImage]) -> String {
    let columns: Vec<ImageColumn> = images
        .iter()
        .map(|image| ImageColumn {
            mime_type: image.mime_type.clone(),
            data: general_purpose::STANDARD.encode(&image.bytes),
        })
        .collect();
    serde_json::to_string(&columns).unwrap_or_else(|_| "[]".to_string())
}

fn decode_images(raw: &str) -> Vec<StoredImage> {
    let columns: Vec<ImageColumn> = serde_json::from_str(raw).unwrap_or_default();
    columns
        .into_iter()
        .filter_map(|column| {
            general_purpose::STANDARD
                .decode(column.data)
                .ok()
                .map(|bytes| StoredImage {
                    bytes,
                    mime_type: column.mime_type,
                })
        })
        .collect()
}

pub fn millis_to_datetime(value: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(value)
        .single()
        .unwrap_or_else(Utc::now)
}

impl SessionRow {
    pub fn into_session(self) -> Session {
        Session {
            mode: Mode::parse(&self.mode),
            description: self.description,
            images: decode_images(&self.images_json),
            created_at: millis_to_datetime(self.created_at_ms),
            version: u64::try_from(self.version).unwrap_or(0),
        }
    }
}
