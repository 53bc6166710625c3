use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};

use super::domain::{DayOfWeek, ScheduleEntry, ScheduleEntryId};

/// Decides which weekly schedule entry, if any, is in session at a local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindowMatcher {
    tolerance_before: Duration,
    tolerance_after: Duration,
}

impl Default for ScheduleWindowMatcher {
    fn default() -> Self {
        Self::new(Duration::minutes(15), Duration::zero())
    }
}

impl ScheduleWindowMatcher {
    /// Negative tolerances are treated as zero.
    pub fn new(tolerance_before: Duration, tolerance_after: Duration) -> Self {
        Self {
            tolerance_before: tolerance_before.max(Duration::zero()),
            tolerance_after: tolerance_after.max(Duration::zero()),
        }
    }

    pub fn tolerance_before(&self) -> Duration {
        self.tolerance_before
    }

    pub fn tolerance_after(&self) -> Duration {
        self.tolerance_after
    }

    /// Active entry whose tolerance window contains `now`.
    ///
    /// Overlapping matches resolve to the earliest `start_time`, then to input order.
    pub fn active_session<'a>(
        &self,
        entries: &'a [ScheduleEntry],
        now: NaiveDateTime,
    ) -> Option<&'a ScheduleEntry> {
        let today = DayOfWeek::from(now.weekday());
        let now_seconds = seconds_from_midnight(now.time());

        entries
            .iter()
            .filter(|entry| entry.is_active && entry.day_of_week == today)
            .filter(|entry| {
                let (opens, closes) = self.window_seconds(entry);
                opens <= now_seconds && now_seconds <= closes
            })
            .min_by_key(|entry| entry.start_time)
    }

    /// Window bounds in seconds from midnight. They may fall outside `0..86_400`; the
    /// window is not wrapped onto the neighbouring day.
    fn window_seconds(&self, entry: &ScheduleEntry) -> (i64, i64) {
        (
            seconds_from_midnight(entry.start_time) - self.tolerance_before.num_seconds(),
            seconds_from_midnight(entry.end_time) + self.tolerance_after.num_seconds(),
        )
    }
}

fn seconds_from_midnight(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight())
}

/// Pair of active entries of the same course that overlap on the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConflict {
    pub first: ScheduleEntryId,
    pub second: ScheduleEntryId,
}

/// Lists overlapping active entries. Each pair is reported once, in input order.
pub fn find_conflicts(entries: &[ScheduleEntry]) -> Vec<ScheduleConflict> {
    let mut conflicts = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_active {
            continue;
        }
        for other in entries[index + 1..].iter().filter(|other| other.is_active) {
            if entry.course_id == other.course_id && entry.overlaps(other) {
                conflicts.push(ScheduleConflict {
                    first: entry.id,
                    second: other.id,
                });
            }
        }
    }
    conflicts
}
