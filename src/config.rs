use std::env;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub line_channel_access_token: String,
    pub line_channel_secret: String,
    pub port: u16,
    pub log_level: String,
    pub gemini_api_key: String,
    pub gemini_pro_model: String,
    pub gemini_model_receipt: String,
    pub gemini_model_audio: String,
    pub gemini_model_amulet: String,
    pub gemini_model_fortune: String,
    pub gemini_model_parse: String,
    pub gemini_safety_settings: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub google_access_token: String,
    pub google_drive_folder_id: String,
    pub apps_script_url: String,
    pub max_image_size_mb: u64,
    pub max_audio_size_mb: u64,
    pub max_video_size_mb: u64,
    pub max_audio_duration_ms: u64,
    pub line_max_message_length: usize,
    pub max_amulet_images: usize,
    pub session_timeout_seconds: u64,
    pub session_store: SessionStoreKind,
    pub database_url: String,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

// Service account keys are often pasted with literal "\n" and wrapping quotes.
fn normalize_secret(value: String) -> String {
    value.replace("\\n", "\n").replace('"', "").trim().to_string()
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    match trimmed.to_lowercase().as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

fn parse_session_store(value: &str) -> SessionStoreKind {
    match value.trim().to_lowercase().as_str() {
        "sqlite" | "sql" | "db" => SessionStoreKind::Sqlite,
        "memory" | "" => SessionStoreKind::Memory,
        other => {
            warn!("Unknown SESSION_STORE value '{}'; using in-memory sessions.", other);
            SessionStoreKind::Memory
        }
    }
}

fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

impl Config {
    pub fn load() -> Result<Self> {
        let default_model = "gemini-2.5-flash";
        Ok(Config {
            line_channel_access_token: env_string("LINE_CHANNEL_ACCESS_TOKEN", "")
                .trim()
                .to_string(),
            line_channel_secret: env_string("LINE_CHANNEL_SECRET", "").trim().to_string(),
            port: env_u16("PORT", 3000),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            gemini_api_key: env_string("GEMINI_API_KEY", "").trim().to_string(),
            gemini_pro_model: env_string("GEMINI_PRO_MODEL", "gemini-2.5-pro"),
            gemini_model_receipt: env_string("GEMINI_MODEL_RECEIPT", default_model),
            gemini_model_audio: env_string("GEMINI_MODEL_AUDIO", default_model),
            gemini_model_amulet: env_string("GEMINI_MODEL_AMULET", default_model),
            gemini_model_fortune: env_string("GEMINI_MODEL_FORTUNE", default_model),
            gemini_model_parse: env_string("GEMINI_MODEL_PARSE", default_model),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            spreadsheet_id: env_string("SPREADSHEET_ID", "").trim().to_string(),
            sheet_name: env_string("SHEET_NAME", "收據記錄"),
            google_access_token: normalize_secret(env_string("GOOGLE_ACCESS_TOKEN", "")),
            google_drive_folder_id: env_string("GOOGLE_DRIVE_FOLDER_ID", ""),
            apps_script_url: env_string("APPS_SCRIPT_URL", "").trim().to_string(),
            max_image_size_mb: env_u64("MAX_IMAGE_SIZE_MB", 4),
            max_audio_size_mb: env_u64("MAX_AUDIO_SIZE_MB", 10),
            max_video_size_mb: env_u64("MAX_VIDEO_SIZE_MB", 20),
            max_audio_duration_ms: env_u64("MAX_AUDIO_DURATION_MS", 60_000),
            line_max_message_length: env_usize("LINE_MAX_MESSAGE_LENGTH", 4500).max(1),
            max_amulet_images: env_usize("MAX_AMULET_IMAGES", 5).max(1),
            session_timeout_seconds: env_u64("SESSION_TIMEOUT_SECONDS", 1800),
            session_store: parse_session_store(&env_string("SESSION_STORE", "memory")),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://sessions.db?mode=rwc",
            )),
        })
    }

    pub fn sheets_enabled(&self) -> bool {
        !self.spreadsheet_id.is_empty() && !self.google_access_token.is_empty()
    }
}
