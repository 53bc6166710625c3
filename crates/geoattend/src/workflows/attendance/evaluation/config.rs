use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use super::super::schedule::ScheduleWindowMatcher;

/// Attendance capture policy. Loaded from the environment by `AppConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendancePolicy {
    /// Minutes before the nominal start during which capture is already accepted.
    pub tolerance_before_minutes: u32,
    /// Minutes after the nominal end during which the session still counts as active.
    pub tolerance_after_minutes: u32,
    /// Arrivals up to this many minutes after the start are still on time.
    pub late_grace_minutes: u32,
    /// GPS fixes reporting a worse accuracy are rejected. `None` disables the check.
    pub max_accuracy_meters: Option<f64>,
    /// Offset of the campus wall clock from UTC.
    pub utc_offset_minutes: i32,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            tolerance_before_minutes: 15,
            tolerance_after_minutes: 0,
            late_grace_minutes: 0,
            max_accuracy_meters: Some(10.0),
            utc_offset_minutes: 0,
        }
    }
}

impl AttendancePolicy {
    pub fn schedule_matcher(&self) -> ScheduleWindowMatcher {
        ScheduleWindowMatcher::new(
            Duration::minutes(i64::from(self.tolerance_before_minutes)),
            Duration::minutes(i64::from(self.tolerance_after_minutes)),
        )
    }

    /// `None` when the configured offset is beyond +/- 24 hours.
    pub fn campus_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }
}
