use chrono::NaiveTime;
use serde::{Deserialize, Deserializer};
use std::io::Read;

use super::super::domain::{
    Classroom, ClassroomId, CourseId, DayOfWeek, ScheduleEntry, ScheduleEntryId, UserId,
};
use super::super::geo::Coordinate;
use super::RegistryImportError;

#[derive(Debug, Deserialize)]
struct ClassroomRow {
    id: i64,
    name: String,
    building: String,
    room_number: String,
    latitude: f64,
    longitude: f64,
    geofence_radius_meters: f64,
}

#[derive(Debug, Deserialize)]
struct ScheduleRow {
    id: i64,
    course_id: i64,
    day_of_week: String,
    start_time: String,
    end_time: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    classroom_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    is_active: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnrollmentRow {
    course_id: i64,
    user_id: i64,
}

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source)
}

pub(crate) fn parse_classrooms<R: Read>(source: R) -> Result<Vec<Classroom>, RegistryImportError> {
    let mut classrooms = Vec::new();

    for row in reader(source).deserialize::<ClassroomRow>() {
        let row = row?;
        let location = Coordinate::new(row.latitude, row.longitude).map_err(|source| {
            RegistryImportError::InvalidClassroom {
                id: row.id,
                reason: source.to_string(),
            }
        })?;
        if !(row.geofence_radius_meters.is_finite() && row.geofence_radius_meters > 0.0) {
            return Err(RegistryImportError::InvalidClassroom {
                id: row.id,
                reason: format!(
                    "geofence radius must be positive, got {}",
                    row.geofence_radius_meters
                ),
            });
        }

        classrooms.push(Classroom {
            id: ClassroomId(row.id),
            name: row.name,
            building: row.building,
            room_number: row.room_number,
            location,
            geofence_radius_meters: row.geofence_radius_meters,
        });
    }

    Ok(classrooms)
}

pub(crate) fn parse_schedules<R: Read>(source: R) -> Result<Vec<ScheduleEntry>, RegistryImportError> {
    let mut entries = Vec::new();

    for row in reader(source).deserialize::<ScheduleRow>() {
        let row = row?;
        let invalid = |reason: String| RegistryImportError::InvalidSchedule { id: row.id, reason };

        let day_of_week = row
            .day_of_week
            .parse::<DayOfWeek>()
            .map_err(|err| invalid(err.to_string()))?;
        let start_time = parse_time(&row.start_time)
            .ok_or_else(|| invalid(format!("unreadable start time '{}'", row.start_time)))?;
        let end_time = parse_time(&row.end_time)
            .ok_or_else(|| invalid(format!("unreadable end time '{}'", row.end_time)))?;
        let classroom_id = match row.classroom_id.as_deref() {
            Some(raw) => Some(ClassroomId(
                raw.parse::<i64>()
                    .map_err(|_| invalid(format!("unreadable classroom id '{raw}'")))?,
            )),
            None => None,
        };
        let is_active = match row.is_active.as_deref() {
            Some(raw) => parse_bool(raw)
                .ok_or_else(|| invalid(format!("unreadable is_active flag '{raw}'")))?,
            None => true,
        };

        let mut entry = ScheduleEntry::new(
            ScheduleEntryId(row.id),
            CourseId(row.course_id),
            day_of_week,
            start_time,
            end_time,
            classroom_id,
        )
        .map_err(|err| invalid(err.to_string()))?;
        entry.is_active = is_active;
        entries.push(entry);
    }

    Ok(entries)
}

pub(crate) fn parse_enrollments<R: Read>(
    source: R,
) -> Result<Vec<(CourseId, UserId)>, RegistryImportError> {
    let mut enrollments = Vec::new();
    for row in reader(source).deserialize::<EnrollmentRow>() {
        let row = row?;
        enrollments.push((CourseId(row.course_id), UserId(row.user_id)));
    }
    Ok(enrollments)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
fn parse_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}
