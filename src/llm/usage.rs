use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::llm::policy::Task;
use crate::utils::dates::taiwan_date;

#[derive(Debug, Default)]
struct DailyUsage {
    date: Option<NaiveDate>,
    counts: HashMap<Task, u32>,
}

impl DailyUsage {
    fn roll_to(&mut self, today: NaiveDate) {
        if self.date != Some(today) {
            if self.date.is_some() {
                info!("Usage counters reset for {today}");
            }
            self.date = Some(today);
            self.counts.clear();
        }
    }
}

/// Per-task model call counts for the current Taiwan day. Process-local.
#[derive(Debug, Default)]
pub struct UsageTracker {
    state: Mutex<DailyUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        UsageTracker::default()
    }

    pub fn record(&self, task: Task) {
        self.record_at(task, Utc::now());
    }

    pub fn record_at(&self, task: Task, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.roll_to(taiwan_date(now));
        let count = state.counts.entry(task).or_insert(0);
        *count += 1;
        info!(task = task.label(), count = *count, "model usage recorded");
    }

    pub fn count_at(&self, task: Task, now: DateTime<Utc>) -> u32 {
        let mut state = self.state.lock();
        state.roll_to(taiwan_date(now));
        state.counts.get(&task).copied().unwrap_or(0)
    }

    pub fn report(&self) -> String {
        self.report_at(Utc::now())
    }

    pub fn report_at(&self, now: DateTime<Utc>) -> String {
        let today = taiwan_date(now);
        let count = |task| self.count_at(task, now);
        let total: u32 = Task::ALL.iter().map(|task| count(*task)).sum();

        format!(
            "📊 今日 API 用量 / โควต้าวันนี้\n📅 {today}\n\n\
             📷 收據辨識 / ใบเสร็จ: {} 次\n\
             🎙️ 語音辨識 / เสียง: {} 次\n\
             📿 佛牌文案 / พระ: {} 次\n\
             🔮 命理翻譯 / โหราศาสตร์: {} 次\n\
             ✏️ 文字解析 / ข้อความ: {} 次\n\n\
             📈 合計 / รวม: {total} 次\n\n\
             💡 Gemini 免費版約 15 RPM / 1500 RPD",
            count(Task::Receipt),
            count(Task::Audio),
            count(Task::Amulet),
            count(Task::Fortune),
            count(Task::Parse),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn counters_reset_when_the_taiwan_day_changes() {
        let tracker = UsageTracker::new();
        let evening = Utc.with_ymd_and_hms(2025, 5, 1, 15, 0, 0).unwrap();
        tracker.record_at(Task::Receipt, evening);
        tracker.record_at(Task::Receipt, evening);
        tracker.record_at(Task::Parse, evening);
        assert_eq!(tracker.count_at(Task::Receipt, evening), 2);

        // 16:00 UTC is midnight in Taipei.
        let next_day = Utc.with_ymd_and_hms(2025, 5, 1, 16, 0, 0).unwrap();
        assert_eq!(tracker.count_at(Task::Receipt, next_day), 0);
        assert_eq!(tracker.count_at(Task::Parse, next_day), 0);
    }

    #[test]
    fn report_lists_every_task_and_the_total() {
        let tracker = UsageTracker::new();
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 2, 0, 0).unwrap();
        tracker.record_at(Task::Amulet, now);
        tracker.record_at(Task::Fortune, now);
        let report = tracker.report_at(now);
        assert!(report.contains("📅 2025-05-01"));
        assert!(report.contains("📿 佛牌文案 / พระ: 1 次"));
        assert!(report.contains("📷 收據辨識 / ใบเสร็จ: 0 次"));
        assert!(report.contains("📈 合計 / รวม: 2 次"));
    }
}
