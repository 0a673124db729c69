use std::fmt;

/// Media families with their own size limits on the download path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCategory {
    Image,
    Audio,
    Video,
}

impl MediaCategory {
    pub fn label(self) -> &'static str {
        match self {
            MediaCategory::Image => "image",
            MediaCategory::Audio => "audio",
            MediaCategory::Video => "video",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a failure is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Translated into a user-facing message by the task handler.
    MustReport,
    /// Treated as an absent result; the handler asks the user to retry.
    SoftFailure,
    /// Logged and dropped; never reaches the user.
    LogAndContinue,
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("generative model quota exhausted")]
    QuotaExceeded,
    #[error("{0} payload exceeds the configured size limit")]
    PayloadTooLarge(MediaCategory),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("response blocked by safety filter")]
    SafetyBlocked,
    #[error("response truncated for length")]
    TruncatedForLength,
    #[error("no structured value found in {0} response")]
    NoStructuredValueFound(String),
    #[error("media download failed: {0}")]
    DownloadFailed(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl BotError {
    pub fn disposition(&self) -> Disposition {
        match self {
            BotError::QuotaExceeded
            | BotError::PayloadTooLarge(_)
            | BotError::UpstreamUnavailable(_)
            | BotError::DownloadFailed(_) => Disposition::MustReport,
            BotError::SafetyBlocked
            | BotError::TruncatedForLength
            | BotError::NoStructuredValueFound(_) => Disposition::SoftFailure,
            BotError::Persistence(_) => Disposition::LogAndContinue,
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, BotError::QuotaExceeded)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            BotError::QuotaExceeded => {
                "❌ 免費額度已滿，請稍後再試\n❌ เกินโควต้าแล้ว ลองใหม่ทีหลังนะ"
            }
            BotError::PayloadTooLarge(MediaCategory::Image) => {
                "❌ 圖片檔案過大，請壓縮後重新上傳\n❌ ไฟล์ใหญ่เกินไป กรุณาบีบอัดแล้วส่งใหม่"
            }
            BotError::PayloadTooLarge(MediaCategory::Audio) => {
                "❌ 語音檔案太大\n❌ ไฟล์เสียงใหญ่เกินไป"
            }
            BotError::PayloadTooLarge(MediaCategory::Video) => {
                "❌ 影片檔案太大\n❌ ไฟล์วิดีโอใหญ่เกินไป"
            }
            BotError::SafetyBlocked
            | BotError::TruncatedForLength
            | BotError::NoStructuredValueFound(_) => {
                "❌ 無法辨識，請換個清楚一點的內容再試\n❌ อ่านไม่ได้ ลองส่งใหม่ให้ชัดขึ้นนะ"
            }
            BotError::UpstreamUnavailable(_)
            | BotError::DownloadFailed(_)
            | BotError::Persistence(_) => "❌ 系統錯誤，請稍後再試\n❌ ผิดพลาด ลองใหม่ภายหลัง",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_failures_never_reach_the_user() {
        let err = BotError::Persistence("sheet down".to_string());
        assert_eq!(err.disposition(), Disposition::LogAndContinue);
    }

    #[test]
    fn quota_and_size_errors_must_be_reported() {
        assert_eq!(BotError::QuotaExceeded.disposition(), Disposition::MustReport);
        assert_eq!(
            BotError::PayloadTooLarge(MediaCategory::Video).disposition(),
            Disposition::MustReport
        );
        assert!(BotError::PayloadTooLarge(MediaCategory::Image)
            .user_message()
            .contains("圖片"));
    }

    #[test]
    fn structural_failures_are_soft() {
        assert_eq!(BotError::SafetyBlocked.disposition(), Disposition::SoftFailure);
        assert_eq!(
            BotError::NoStructuredValueFound("receipt".into()).disposition(),
            Disposition::SoftFailure
        );
    }
}
