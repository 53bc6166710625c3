use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use geoattend::config::{ConfigError, RegistryConfig};
use geoattend::error::AppError;
use geoattend::workflows::attendance::{
    AttendanceNotification, AttendanceRecord, AttendanceRepository, CampusRegistry, Classroom,
    ClassroomId, Clock, Coordinate, CourseId, DayOfWeek, NotificationError,
    NotificationPublisher, RecordId, RecordQuery, RepositoryError, ScheduleEntry,
    ScheduleEntryId, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAttendanceRepository {
    records: Arc<Mutex<BTreeMap<RecordId, AttendanceRecord>>>,
}

impl AttendanceRepository for InMemoryAttendanceRepository {
    fn insert(&self, record: AttendanceRecord) -> Result<AttendanceRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id)
            || guard.values().any(|existing| existing.same_session(&record))
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id, record.clone());
        Ok(record)
    }

    fn find_for_session(
        &self,
        user_id: UserId,
        course_id: CourseId,
        class_date: NaiveDate,
        schedule_entry_id: Option<ScheduleEntryId>,
    ) -> Result<Option<AttendanceRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|record| record.is_for_session(user_id, course_id, class_date, schedule_entry_id))
            .cloned())
    }

    fn query(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(query.apply(guard.values()))
    }
}

/// Logs every notification and keeps it for inspection; stands in for the push gateway.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationPublisher {
    events: Arc<Mutex<Vec<AttendanceNotification>>>,
}

impl NotificationPublisher for LoggingNotificationPublisher {
    fn publish(&self, notification: AttendanceNotification) -> Result<(), NotificationError> {
        info!(
            user_id = %notification.user_id,
            course_id = %notification.course_id,
            kind = %notification.notification_type,
            message = %notification.message,
            "notification dispatched"
        );
        let mut guard = self.events.lock().expect("notification mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

impl LoggingNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<AttendanceNotification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }
}

/// Clock the demo moves between scenarios.
pub(crate) struct ScriptedClock {
    now: Mutex<DateTime<Utc>>,
}

impl ScriptedClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub(crate) fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = instant;
    }
}

impl Clock for ScriptedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) const SAMPLE_COURSE: CourseId = CourseId(101);
pub(crate) const SAMPLE_LAB_COURSE: CourseId = CourseId(102);

/// Lecture hall location of the built-in campus.
pub(crate) fn sample_origin() -> Coordinate {
    Coordinate {
        latitude: 4.6097,
        longitude: -74.0817,
    }
}

/// Built-in campus used when no registry exports are configured.
///
/// Course 101 meets on weekdays 08:00-10:00 in the lecture hall; course 102 meets Tuesday and
/// Thursday 14:00-16:00 in the computer lab.
pub(crate) fn sample_campus() -> CampusRegistry {
    let classrooms = vec![
        Classroom {
            id: ClassroomId(1),
            name: "Lecture Hall A".to_string(),
            building: "Engineering".to_string(),
            room_number: "101".to_string(),
            location: sample_origin(),
            geofence_radius_meters: 30.0,
        },
        Classroom {
            id: ClassroomId(2),
            name: "Computer Lab".to_string(),
            building: "Science".to_string(),
            room_number: "204".to_string(),
            location: Coordinate {
                latitude: 4.6110,
                longitude: -74.0830,
            },
            geofence_radius_meters: 20.0,
        },
    ];

    let mut registry = CampusRegistry::new(classrooms, Vec::new());
    let weekdays = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
    ];
    let mut next_id = 1;
    for day in weekdays {
        push_sample_entry(&mut registry, next_id, SAMPLE_COURSE, day, (8, 10), 1);
        next_id += 1;
    }
    for day in [DayOfWeek::Tuesday, DayOfWeek::Thursday] {
        push_sample_entry(&mut registry, next_id, SAMPLE_LAB_COURSE, day, (14, 16), 2);
        next_id += 1;
    }

    for user in 1..=5 {
        registry.enroll(SAMPLE_COURSE, UserId(user));
    }
    for user in 3..=6 {
        registry.enroll(SAMPLE_LAB_COURSE, UserId(user));
    }
    registry
}

fn push_sample_entry(
    registry: &mut CampusRegistry,
    id: i64,
    course_id: CourseId,
    day: DayOfWeek,
    (start_hour, end_hour): (u32, u32),
    classroom: i64,
) {
    let (Some(start), Some(end)) = (
        NaiveTime::from_hms_opt(start_hour, 0, 0),
        NaiveTime::from_hms_opt(end_hour, 0, 0),
    ) else {
        return;
    };
    if let Ok(entry) = ScheduleEntry::new(
        ScheduleEntryId(id),
        course_id,
        day,
        start,
        end,
        Some(ClassroomId(classroom)),
    ) {
        registry.add_schedule(entry);
    }
}

/// Loads the registry from the configured CSV exports, or the built-in campus when none are set.
pub(crate) fn load_registry(config: &RegistryConfig) -> Result<CampusRegistry, AppError> {
    match (&config.classrooms_csv, &config.schedules_csv) {
        (Some(classrooms), Some(schedules)) => Ok(CampusRegistry::from_paths(
            classrooms,
            schedules,
            config.enrollments_csv.as_deref(),
        )?),
        (None, None) => {
            warn!("no registry exports configured, serving the built-in sample campus");
            Ok(sample_campus())
        }
        (Some(_), None) => Err(ConfigError::MissingPair {
            key: "REGISTRY_SCHEDULES_CSV",
            paired_with: "REGISTRY_CLASSROOMS_CSV",
        }
        .into()),
        (None, Some(_)) => Err(ConfigError::MissingPair {
            key: "REGISTRY_CLASSROOMS_CSV",
            paired_with: "REGISTRY_SCHEDULES_CSV",
        }
        .into()),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Campus wall-clock time, `YYYY-MM-DDTHH:MM` with optional seconds.
pub(crate) fn parse_local_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DDTHH:MM ({err})"))
}
