use crate::config::Config;
use crate::error::{BotError, MediaCategory};

const BYTES_PER_MB: u64 = 1024 * 1024;

const AUDIO_FILE_EXTENSIONS: &[&str] = &["m4a", "mp3", "wav", "aac", "ogg", "flac", "aiff"];
const VIDEO_FILE_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "3gp", "mpeg"];

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
            if brand == b"M4A " {
                return Some("audio/mp4".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Category of an uploaded file judged by extension; `None` means the bot
/// cannot transcribe it.
pub fn classify_file_name(file_name: &str) -> Option<MediaCategory> {
    let extension = file_name.rsplit_once('.')?.1.trim().to_ascii_lowercase();
    if AUDIO_FILE_EXTENSIONS.contains(&extension.as_str()) {
        Some(MediaCategory::Audio)
    } else if VIDEO_FILE_EXTENSIONS.contains(&extension.as_str()) {
        Some(MediaCategory::Video)
    } else {
        None
    }
}

/// Fixes the content types the platform reports for voice notes and clips.
pub fn normalize_content_type(category: MediaCategory, raw: Option<&str>) -> String {
    let raw = raw
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match category {
        MediaCategory::Image => raw.unwrap_or_else(|| "image/jpeg".to_string()),
        MediaCategory::Audio => match raw {
            Some(value) if value.contains("m4a") || value.contains("aac") => "audio/mp4".to_string(),
            Some(value) => value,
            None => "audio/mp4".to_string(),
        },
        MediaCategory::Video => match raw {
            Some(value) if value.starts_with("video/") => value,
            _ => "video/mp4".to_string(),
        },
    }
}

/// Download ceilings per media category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaLimits {
    pub image_bytes: u64,
    pub audio_bytes: u64,
    pub video_bytes: u64,
}

impl Default for MediaLimits {
    fn default() -> Self {
        MediaLimits {
            image_bytes: 4 * BYTES_PER_MB,
            audio_bytes: 10 * BYTES_PER_MB,
            video_bytes: 20 * BYTES_PER_MB,
        }
    }
}

impl MediaLimits {
    pub fn from_config(config: &Config) -> Self {
        MediaLimits {
            image_bytes: config.max_image_size_mb.saturating_mul(BYTES_PER_MB),
            audio_bytes: config.max_audio_size_mb.saturating_mul(BYTES_PER_MB),
            video_bytes: config.max_video_size_mb.saturating_mul(BYTES_PER_MB),
        }
    }

    pub fn limit_for(&self, category: MediaCategory) -> u64 {
        match category {
            MediaCategory::Image => self.image_bytes,
            MediaCategory::Audio => self.audio_bytes,
            MediaCategory::Video => self.video_bytes,
        }
    }

    pub fn check(&self, category: MediaCategory, size: u64) -> Result<(), BotError> {
        if size > self.limit_for(category) {
            return Err(BotError::PayloadTooLarge(category));
        }
        Ok(())
    }
}
