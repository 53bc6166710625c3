use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::{AttendanceRecord, CourseId, RecordStatus, UserId};

/// Aggregate attendance figures for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub total_sessions: usize,
    pub attended_sessions: usize,
    pub present_sessions: usize,
    pub late_sessions: usize,
    pub absent_sessions: usize,
    /// Percentage of sessions attended, present or late.
    pub attendance_rate: f64,
    /// Percentage of sessions attended on time.
    pub punctuality_rate: f64,
}

impl AttendanceStats {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AttendanceRecord>,
    {
        let mut stats = Self {
            total_sessions: 0,
            attended_sessions: 0,
            present_sessions: 0,
            late_sessions: 0,
            absent_sessions: 0,
            attendance_rate: 0.0,
            punctuality_rate: 0.0,
        };

        for record in records {
            stats.total_sessions += 1;
            if record.status.attended() {
                stats.attended_sessions += 1;
            }
            match record.status {
                RecordStatus::Present => stats.present_sessions += 1,
                RecordStatus::Late => stats.late_sessions += 1,
                RecordStatus::Absent => stats.absent_sessions += 1,
                RecordStatus::Excused => {}
            }
        }

        if stats.total_sessions > 0 {
            let total = stats.total_sessions as f64;
            stats.attendance_rate = percentage(stats.attended_sessions as f64, total);
            stats.punctuality_rate = percentage(stats.present_sessions as f64, total);
        }

        stats
    }
}

/// Course-wide figures over every record of the course in a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStats {
    pub course_id: CourseId,
    pub total_students: usize,
    pub total_records: usize,
    pub statistics: AttendanceStats,
}

/// Per-course line of a summary report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseAttendanceSummary {
    pub course_id: CourseId,
    pub unique_students: usize,
    pub statistics: AttendanceStats,
}

/// Attendance summary across courses, ordered by course id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummaryReport {
    pub total_records: usize,
    pub overall: AttendanceStats,
    pub courses: Vec<CourseAttendanceSummary>,
}

impl AttendanceSummaryReport {
    pub fn from_records(records: &[AttendanceRecord]) -> Self {
        let mut by_course: BTreeMap<CourseId, Vec<&AttendanceRecord>> = BTreeMap::new();
        for record in records {
            by_course.entry(record.course_id).or_default().push(record);
        }

        let courses = by_course
            .into_iter()
            .map(|(course_id, course_records)| {
                let unique_students: BTreeSet<UserId> =
                    course_records.iter().map(|record| record.user_id).collect();
                CourseAttendanceSummary {
                    course_id,
                    unique_students: unique_students.len(),
                    statistics: AttendanceStats::from_records(course_records),
                }
            })
            .collect();

        Self {
            total_records: records.len(),
            overall: AttendanceStats::from_records(records),
            courses,
        }
    }
}

fn percentage(part: f64, total: f64) -> f64 {
    (part / total * 100.0 * 100.0).round() / 100.0
}
