use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::attendance::domain::{
    AttendanceEvent, AttendanceRecord, Classroom, ClassroomId, CourseId, DayOfWeek,
    ScheduleEntry, ScheduleEntryId, UserId,
};
use crate::workflows::attendance::geo::{Coordinate, EARTH_RADIUS_METERS};
use crate::workflows::attendance::registry::CampusRegistry;
use crate::workflows::attendance::repository::{
    AttendanceNotification, AttendanceRepository, FixedClock, NotificationError,
    NotificationPublisher, RecordQuery, RepositoryError,
};
use crate::workflows::attendance::{AttendancePolicy, AttendanceService};

pub(super) const COURSE: CourseId = CourseId(101);
pub(super) const STUDENT: UserId = UserId(42);

/// Main quad of the sample campus.
pub(super) fn campus() -> Coordinate {
    Coordinate::new(4.6097, -74.0817).expect("valid campus coordinate")
}

/// Point `meters` due north of `origin`; haversine distance along a meridian is exact.
pub(super) fn offset_north(origin: Coordinate, meters: f64) -> Coordinate {
    Coordinate {
        latitude: origin.latitude + (meters / EARTH_RADIUS_METERS).to_degrees(),
        longitude: origin.longitude,
    }
}

pub(super) fn classroom(id: i64, location: Coordinate, radius: f64) -> Classroom {
    Classroom {
        id: ClassroomId(id),
        name: format!("Room {id}"),
        building: "Engineering".to_string(),
        room_number: format!("{}", 200 + id),
        location,
        geofence_radius_meters: radius,
    }
}

pub(super) fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

/// 2025-10-06 is a Monday.
pub(super) fn class_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 6).expect("valid date")
}

pub(super) fn monday_at(hour: u32, minute: u32) -> NaiveDateTime {
    class_day().and_time(time(hour, minute))
}

pub(super) fn utc(local: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&local)
}

pub(super) fn entry(
    id: i64,
    day: DayOfWeek,
    start: NaiveTime,
    end: NaiveTime,
    classroom_id: Option<i64>,
) -> ScheduleEntry {
    ScheduleEntry::new(
        ScheduleEntryId(id),
        COURSE,
        day,
        start,
        end,
        classroom_id.map(ClassroomId),
    )
    .expect("valid schedule entry")
}

/// Monday 08:00-10:00 in classroom 1.
pub(super) fn morning_lecture() -> ScheduleEntry {
    entry(1, DayOfWeek::Monday, time(8, 0), time(10, 0), Some(1))
}

pub(super) fn event_at(position: Coordinate) -> AttendanceEvent {
    AttendanceEvent {
        user_id: STUDENT,
        course_id: COURSE,
        position,
        accuracy_meters: 5.0,
        observed_at: utc(monday_at(8, 0)),
    }
}

pub(super) fn policy() -> AttendancePolicy {
    AttendancePolicy::default()
}

/// Course 101: classroom 1 (10 m geofence) at the quad, classroom 2 (50 m) 300 m north.
/// Course 202 has a schedule but no classroom. Students 42, 43 and 44 take course 101;
/// student 42 also takes course 202.
pub(super) fn registry() -> CampusRegistry {
    let mut registry = CampusRegistry::new(
        vec![
            classroom(1, campus(), 10.0),
            classroom(2, offset_north(campus(), 300.0), 50.0),
        ],
        vec![
            morning_lecture(),
            entry(2, DayOfWeek::Wednesday, time(14, 0), time(16, 0), Some(2)),
        ],
    );
    registry.add_schedule(
        ScheduleEntry::new(
            ScheduleEntryId(9),
            CourseId(202),
            DayOfWeek::Monday,
            time(8, 0),
            time(9, 0),
            None,
        )
        .expect("valid schedule entry"),
    );
    for student in [42, 43, 44] {
        registry.enroll(COURSE, UserId(student));
    }
    registry.enroll(CourseId(202), STUDENT);
    registry
}

pub(super) type TestService = AttendanceService<CampusRegistry, MemoryRepository, MemoryNotifications>;

pub(super) fn build_service_at(
    local_now: NaiveDateTime,
) -> (TestService, Arc<MemoryRepository>, Arc<MemoryNotifications>) {
    let repository = Arc::new(MemoryRepository::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = AttendanceService::with_clock(
        Arc::new(registry()),
        repository.clone(),
        notifications.clone(),
        Arc::new(FixedClock(utc(local_now))),
        policy(),
    );
    (service, repository, notifications)
}

pub(super) fn build_service() -> (TestService, Arc<MemoryRepository>, Arc<MemoryNotifications>) {
    build_service_at(monday_at(8, 0))
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<Vec<AttendanceRecord>>>,
}

impl MemoryRepository {
    pub(super) fn all(&self) -> Vec<AttendanceRecord> {
        self.records.lock().expect("repository mutex poisoned").clone()
    }
}

impl AttendanceRepository for MemoryRepository {
    fn insert(&self, record: AttendanceRecord) -> Result<AttendanceRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard
            .iter()
            .any(|existing| existing.id == record.id || existing.same_session(&record))
        {
            return Err(RepositoryError::Conflict);
        }
        guard.push(record.clone());
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
            .iter()
            .find(|record| record.is_for_session(user_id, course_id, class_date, schedule_entry_id))
            .cloned())
    }

    fn query(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(query.apply(guard.iter()))
    }
}

pub(super) struct UnavailableRepository;

impl AttendanceRepository for UnavailableRepository {
    fn insert(&self, _record: AttendanceRecord) -> Result<AttendanceRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_for_session(
        &self,
        _user_id: UserId,
        _course_id: CourseId,
        _class_date: NaiveDate,
        _schedule_entry_id: Option<ScheduleEntryId>,
    ) -> Result<Option<AttendanceRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn query(&self, _query: &RecordQuery) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<AttendanceNotification>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<AttendanceNotification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, notification: AttendanceNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifications;

impl NotificationPublisher for OfflineNotifications {
    fn publish(&self, _notification: AttendanceNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("push gateway offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
