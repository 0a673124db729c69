//! Secondary writes: spreadsheet rows and receipt image uploads. Callers
//! log failures and carry on; these never decide what the user sees.

pub mod sheets;

use async_trait::async_trait;

use crate::error::BotError;
use crate::line::FetchedMedia;
use crate::record::AccountingRecord;

pub use sheets::SheetsRecorder;

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Appends one row per item. `attachment_url` lands on the first row only.
    async fn append(&self, record: &AccountingRecord, attachment_url: Option<&str>) -> Result<(), BotError>;

    /// Stores the receipt image; `Ok(None)` when uploads are not configured.
    async fn upload_attachment(
        &self,
        image: &FetchedMedia,
        record: &AccountingRecord,
    ) -> Result<Option<String>, BotError>;
}
