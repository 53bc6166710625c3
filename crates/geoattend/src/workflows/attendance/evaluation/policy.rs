use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::super::domain::{ClassroomId, RecordStatus, ScheduleEntry, ScheduleEntryId};
use super::super::geofence::GeofenceMatch;
use super::config::AttendancePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    NotRecorded,
}

impl AttendanceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::NotRecorded => "not_recorded",
        }
    }

    /// Status persisted for a recorded decision.
    pub fn record_status(&self) -> Option<RecordStatus> {
        match self {
            AttendanceStatus::Present => Some(RecordStatus::Present),
            AttendanceStatus::Late => Some(RecordStatus::Late),
            AttendanceStatus::NotRecorded => None,
        }
    }
}

/// Why a submission did not produce an attendance record. Both are valid outcomes, not
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotRecordedReason {
    NoScheduledClass,
    OutOfRange,
}

impl NotRecordedReason {
    pub fn summary(&self) -> &'static str {
        match self {
            NotRecordedReason::NoScheduledClass => "no scheduled class at this time",
            NotRecordedReason::OutOfRange => "too far from the classroom",
        }
    }
}

/// Outcome of evaluating one GPS submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceDecision {
    pub status: AttendanceStatus,
    pub attendance_recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotRecordedReason>,
    pub distance_meters: Option<f64>,
    pub nearest_classroom_id: Option<ClassroomId>,
    pub matched_schedule_entry_id: Option<ScheduleEntryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_late: Option<i64>,
}

impl AttendanceDecision {
    pub(crate) fn no_active_session() -> Self {
        Self {
            status: AttendanceStatus::NotRecorded,
            attendance_recorded: false,
            reason: Some(NotRecordedReason::NoScheduledClass),
            distance_meters: None,
            nearest_classroom_id: None,
            matched_schedule_entry_id: None,
            minutes_late: None,
        }
    }

    pub fn summary(&self) -> String {
        match (self.status, self.reason) {
            (AttendanceStatus::Present, _) => "attendance recorded: present".to_string(),
            (AttendanceStatus::Late, _) => format!(
                "attendance recorded: late by {} minute(s)",
                self.minutes_late.unwrap_or_default()
            ),
            (AttendanceStatus::NotRecorded, Some(NotRecordedReason::OutOfRange)) => format!(
                "not recorded: {:.1} m from the nearest classroom",
                self.distance_meters.unwrap_or_default()
            ),
            (AttendanceStatus::NotRecorded, reason) => format!(
                "not recorded: {}",
                reason
                    .unwrap_or(NotRecordedReason::NoScheduledClass)
                    .summary()
            ),
        }
    }
}

/// Whole minutes elapsed since the session's nominal start, floored at zero.
pub(crate) fn minutes_late(session_start: NaiveTime, now: NaiveDateTime) -> i64 {
    let start = now.date().and_time(session_start);
    now.signed_duration_since(start)
        .max(Duration::zero())
        .num_minutes()
}

pub(crate) fn decide_outcome(
    entry: &ScheduleEntry,
    nearest: &GeofenceMatch<'_>,
    policy: &AttendancePolicy,
    now: NaiveDateTime,
) -> AttendanceDecision {
    let mut decision = AttendanceDecision {
        status: AttendanceStatus::NotRecorded,
        attendance_recorded: false,
        reason: None,
        distance_meters: Some(nearest.distance_meters),
        nearest_classroom_id: Some(nearest.classroom.id),
        matched_schedule_entry_id: Some(entry.id),
        minutes_late: None,
    };

    if !nearest.within_geofence() {
        decision.reason = Some(NotRecordedReason::OutOfRange);
        return decision;
    }

    let late_by = minutes_late(entry.start_time, now);
    decision.attendance_recorded = true;
    if late_by <= i64::from(policy.late_grace_minutes) {
        decision.status = AttendanceStatus::Present;
    } else {
        decision.status = AttendanceStatus::Late;
        decision.minutes_late = Some(late_by);
    }

    decision
}
