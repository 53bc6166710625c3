use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::geo::Coordinate;

/// Identifier of a student or staff account in the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassroomId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleEntryId(pub i64);

/// Identifier assigned to persisted attendance records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(UserId, CourseId, ClassroomId, ScheduleEntryId, RecordId);

/// Physical room eligible for attendance capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: ClassroomId,
    pub name: String,
    pub building: String,
    pub room_number: String,
    pub location: Coordinate,
    pub geofence_radius_meters: f64,
}

impl Classroom {
    /// Label used on records and notifications, e.g. "Engineering 204".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.building, self.room_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// Course-service numbering: 0 = Monday through 6 = Sunday.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Monday),
            1 => Some(Self::Tuesday),
            2 => Some(Self::Wednesday),
            3 => Some(Self::Thursday),
            4 => Some(Self::Friday),
            5 => Some(Self::Saturday),
            6 => Some(Self::Sunday),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(value: Weekday) -> Self {
        match value {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        if let Ok(index) = normalized.parse::<u8>() {
            return Self::from_index(index).ok_or(ScheduleError::UnknownDay(raw.to_string()));
        }

        let day = match normalized.as_str() {
            "monday" | "mon" => Self::Monday,
            "tuesday" | "tue" => Self::Tuesday,
            "wednesday" | "wed" => Self::Wednesday,
            "thursday" | "thu" => Self::Thursday,
            "friday" | "fri" => Self::Friday,
            "saturday" | "sat" => Self::Saturday,
            "sunday" | "sun" => Self::Sunday,
            _ => return Err(ScheduleError::UnknownDay(raw.to_string())),
        };
        Ok(day)
    }
}

/// Recurring weekly session of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleEntryId,
    pub course_id: CourseId,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Room the session is held in. `None` lets any of the course's classrooms count.
    pub classroom_id: Option<ClassroomId>,
    pub is_active: bool,
}

impl ScheduleEntry {
    pub fn new(
        id: ScheduleEntryId,
        course_id: CourseId,
        day_of_week: DayOfWeek,
        start_time: NaiveTime,
        end_time: NaiveTime,
        classroom_id: Option<ClassroomId>,
    ) -> Result<Self, ScheduleError> {
        if start_time >= end_time {
            return Err(ScheduleError::InvalidTimeRange {
                start: start_time,
                end: end_time,
            });
        }

        Ok(Self {
            id,
            course_id,
            day_of_week,
            start_time,
            end_time,
            classroom_id,
            is_active: true,
        })
    }

    /// Same day and intersecting `[start, end)` ranges.
    pub fn overlaps(&self, other: &ScheduleEntry) -> bool {
        self.day_of_week == other.day_of_week
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("schedule end time {end} must be after start time {start}")]
    InvalidTimeRange { start: NaiveTime, end: NaiveTime },
    #[error("unknown day of week '{0}'")]
    UnknownDay(String),
}

/// One GPS submission from the mobile client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub position: Coordinate,
    pub accuracy_meters: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Present,
    Late,
    Absent,
    Excused,
}

impl RecordStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RecordStatus::Present => "present",
            RecordStatus::Late => "late",
            RecordStatus::Absent => "absent",
            RecordStatus::Excused => "excused",
        }
    }

    /// Present and late both count as attended.
    pub fn attended(&self) -> bool {
        matches!(self, RecordStatus::Present | RecordStatus::Late)
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "late" => Ok(Self::Late),
            "absent" => Ok(Self::Absent),
            "excused" => Ok(Self::Excused),
            other => Err(format!("unknown attendance status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceSource {
    GpsAuto,
    Manual,
    SystemAuto,
}

/// Durable attendance artifact written from a recorded decision or an absence sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub status: RecordStatus,
    pub source: AttendanceSource,
    pub schedule_entry_id: Option<ScheduleEntryId>,
    pub classroom_id: Option<ClassroomId>,
    pub classroom_name: Option<String>,
    pub recorded_distance: Option<f64>,
    pub class_date: NaiveDate,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub minutes_late: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Whether this record occupies the given user's course session on `class_date`.
    pub fn is_for_session(
        &self,
        user_id: UserId,
        course_id: CourseId,
        class_date: NaiveDate,
        schedule_entry_id: Option<ScheduleEntryId>,
    ) -> bool {
        self.user_id == user_id
            && self.course_id == course_id
            && self.class_date == class_date
            && self.schedule_entry_id == schedule_entry_id
    }

    /// Whether `other` would occupy the same session as this record.
    pub fn same_session(&self, other: &AttendanceRecord) -> bool {
        self.is_for_session(
            other.user_id,
            other.course_id,
            other.class_date,
            other.schedule_entry_id,
        )
    }
}
