use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AttendanceRecord, Classroom, CourseId, RecordStatus, ScheduleEntry, ScheduleEntryId, UserId,
};

/// Read access to course data owned by the course service.
pub trait CourseDirectory: Send + Sync {
    fn classrooms_for_course(&self, course_id: CourseId) -> Result<Vec<Classroom>, DirectoryError>;
    fn active_schedules(&self, course_id: CourseId) -> Result<Vec<ScheduleEntry>, DirectoryError>;
    fn enrolled_students(&self, course_id: CourseId) -> Result<Vec<UserId>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("course {0} not found")]
    UnknownCourse(CourseId),
    #[error("course directory unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for attendance records.
pub trait AttendanceRepository: Send + Sync {
    /// Stores `record`, failing with [`RepositoryError::Conflict`] when its id is taken or a
    /// record already occupies the same user, course, class date and schedule entry. The
    /// session check and the write must happen atomically.
    fn insert(&self, record: AttendanceRecord) -> Result<AttendanceRecord, RepositoryError>;
    fn find_for_session(
        &self,
        user_id: UserId,
        course_id: CourseId,
        class_date: NaiveDate,
        schedule_entry_id: Option<ScheduleEntryId>,
    ) -> Result<Option<AttendanceRecord>, RepositoryError>;
    /// Matching records, newest `created_at` first, after `skip`/`limit` are applied.
    fn query(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Filters for listing attendance records. Unset fields match everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub course_id: Option<CourseId>,
    #[serde(default)]
    pub status: Option<RecordStatus>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            course_id: None,
            status: None,
            from: None,
            to: None,
            skip: 0,
            limit: default_limit(),
        }
    }
}

impl RecordQuery {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.user_id.map_or(true, |id| record.user_id == id)
            && self.course_id.map_or(true, |id| record.course_id == id)
            && self.status.map_or(true, |status| record.status == status)
            && self.from.map_or(true, |from| record.class_date >= from)
            && self.to.map_or(true, |to| record.class_date <= to)
    }

    /// Apply the filters and pagination to an in-memory record set.
    pub fn apply<'a, I>(&self, records: I) -> Vec<AttendanceRecord>
    where
        I: IntoIterator<Item = &'a AttendanceRecord>,
    {
        let mut matching: Vec<AttendanceRecord> = records
            .into_iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching.into_iter().skip(self.skip).take(self.limit).collect()
    }

    /// The same filters with pagination lifted.
    pub fn unpaginated(&self) -> Self {
        Self {
            skip: 0,
            limit: usize::MAX,
            ..self.clone()
        }
    }
}

/// One page of a record listing together with the number of records matching the filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
    pub records: Vec<AttendanceRecord>,
}

/// Outbound notification hook (push or e-mail adapters).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: AttendanceNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceNotification {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub notification_type: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Source of the current instant, injected so evaluations can be replayed.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
