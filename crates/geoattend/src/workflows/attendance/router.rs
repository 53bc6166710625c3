use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    AttendanceEvent, AttendanceRecord, Classroom, ClassroomId, CourseId, RecordId,
    RecordStatus, ScheduleEntryId, UserId,
};
use super::evaluation::{AttendanceStatus, EvaluationError, NotRecordedReason};
use super::geo::Coordinate;
use super::repository::{
    AttendanceRepository, CourseDirectory, DirectoryError, NotificationPublisher, RecordPage,
    RecordQuery, RepositoryError,
};
use super::service::{AttendanceService, AttendanceServiceError, GpsSubmissionOutcome};

/// Router builder exposing GPS submission, record listing, statistics, reports and absence sweeps.
pub fn attendance_router<D, R, N>(service: Arc<AttendanceService<D, R, N>>) -> Router
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/attendance/gps-events",
            post(gps_event_handler::<D, R, N>),
        )
        .route("/api/v1/attendance/records", get(records_handler::<D, R, N>))
        .route(
            "/api/v1/attendance/users/:user_id/stats",
            get(stats_handler::<D, R, N>),
        )
        .route(
            "/api/v1/attendance/courses/:course_id/stats",
            get(course_stats_handler::<D, R, N>),
        )
        .route(
            "/api/v1/attendance/reports/summary",
            get(summary_report_handler::<D, R, N>),
        )
        .route(
            "/api/v1/attendance/courses/:course_id/absences",
            post(absences_handler::<D, R, N>),
        )
        .with_state(service)
}

/// Mobile client payload for one GPS capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsEventRequest {
    pub user_id: i64,
    pub course_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub event_timestamp: DateTime<Utc>,
}

impl From<GpsEventRequest> for AttendanceEvent {
    fn from(request: GpsEventRequest) -> Self {
        AttendanceEvent {
            user_id: UserId(request.user_id),
            course_id: CourseId(request.course_id),
            position: Coordinate {
                latitude: request.latitude,
                longitude: request.longitude,
            },
            accuracy_meters: request.accuracy,
            observed_at: request.event_timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GpsEventView {
    pub attendance_recorded: bool,
    pub status: AttendanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotRecordedReason>,
    pub message: String,
    pub distance_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_late: Option<i64>,
    pub matched_schedule_entry_id: Option<ScheduleEntryId>,
    pub nearest_classroom: Option<ClassroomView>,
    pub record_id: Option<RecordId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassroomView {
    pub id: ClassroomId,
    pub name: String,
    pub building: String,
    pub room_number: String,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence_radius_meters: f64,
}

impl From<&Classroom> for ClassroomView {
    fn from(classroom: &Classroom) -> Self {
        Self {
            id: classroom.id,
            name: classroom.name.clone(),
            building: classroom.building.clone(),
            room_number: classroom.room_number.clone(),
            latitude: classroom.location.latitude,
            longitude: classroom.location.longitude,
            geofence_radius_meters: classroom.geofence_radius_meters,
        }
    }
}

impl From<&GpsSubmissionOutcome> for GpsEventView {
    fn from(outcome: &GpsSubmissionOutcome) -> Self {
        let decision = &outcome.decision;
        Self {
            attendance_recorded: decision.attendance_recorded,
            status: decision.status,
            reason: decision.reason,
            message: decision.summary(),
            distance_meters: decision.distance_meters,
            minutes_late: decision.minutes_late,
            matched_schedule_entry_id: decision.matched_schedule_entry_id,
            nearest_classroom: outcome.nearest_classroom.as_ref().map(ClassroomView::from),
            record_id: outcome.record.as_ref().map(|record| record.id),
        }
    }
}

pub(crate) async fn gps_event_handler<D, R, N>(
    State(service): State<Arc<AttendanceService<D, R, N>>>,
    Json(request): Json<GpsEventRequest>,
) -> Response
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.submit_gps_event(request.into()) {
        Ok(outcome) => {
            let payload = json!({
                "success": true,
                "data": GpsEventView::from(&outcome),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Query string accepted by the record listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RecordsParams {
    pub user_id: Option<i64>,
    pub course_id: Option<i64>,
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl RecordsParams {
    fn into_query(self) -> Result<RecordQuery, String> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<RecordStatus>)
            .transpose()?;
        let limit = match self.limit {
            Some(0) => return Err("limit must be at least 1".to_string()),
            Some(limit) => limit.min(1000),
            None => 100,
        };

        Ok(RecordQuery {
            user_id: self.user_id.map(UserId),
            course_id: self.course_id.map(CourseId),
            status,
            from: self.from,
            to: self.to,
            skip: self.skip.unwrap_or(0),
            limit,
        })
    }
}

#[derive(Debug, Serialize)]
struct RecordsView {
    total: usize,
    page: usize,
    per_page: usize,
    records: Vec<AttendanceRecord>,
}

impl From<RecordPage> for RecordsView {
    fn from(page: RecordPage) -> Self {
        Self {
            total: page.total,
            page: page.skip / page.limit.max(1) + 1,
            per_page: page.limit,
            records: page.records,
        }
    }
}

pub(crate) async fn records_handler<D, R, N>(
    State(service): State<Arc<AttendanceService<D, R, N>>>,
    Query(params): Query<RecordsParams>,
) -> Response
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let query = match params.into_query() {
        Ok(query) => query,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": message })),
            )
                .into_response()
        }
    };

    match service.records(&query) {
        Ok(page) => (StatusCode::OK, Json(RecordsView::from(page))).into_response(),
        Err(err) => error_response(err),
    }
}

/// Optional course and date range narrowing the statistics and report endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
    pub course_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub(crate) async fn stats_handler<D, R, N>(
    State(service): State<Arc<AttendanceService<D, R, N>>>,
    Path(user_id): Path<i64>,
    Query(params): Query<PeriodParams>,
) -> Response
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.user_stats(
        UserId(user_id),
        params.course_id.map(CourseId),
        params.from,
        params.to,
    ) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn course_stats_handler<D, R, N>(
    State(service): State<Arc<AttendanceService<D, R, N>>>,
    Path(course_id): Path<i64>,
    Query(params): Query<PeriodParams>,
) -> Response
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.course_stats(CourseId(course_id), params.from, params.to) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn summary_report_handler<D, R, N>(
    State(service): State<Arc<AttendanceService<D, R, N>>>,
    Query(params): Query<PeriodParams>,
) -> Response
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.summary_report(params.course_id.map(CourseId), params.from, params.to) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsenceRequest {
    pub schedule_entry_id: i64,
    pub class_date: NaiveDate,
}

pub(crate) async fn absences_handler<D, R, N>(
    State(service): State<Arc<AttendanceService<D, R, N>>>,
    Path(course_id): Path<i64>,
    Json(request): Json<AbsenceRequest>,
) -> Response
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.mark_absences(
        CourseId(course_id),
        ScheduleEntryId(request.schedule_entry_id),
        request.class_date,
    ) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Maps service failures onto HTTP statuses. Valid negative outcomes never reach here.
pub(crate) fn error_response(err: AttendanceServiceError) -> Response {
    let status = match &err {
        AttendanceServiceError::InvalidAccuracy(_)
        | AttendanceServiceError::InsufficientAccuracy { .. }
        | AttendanceServiceError::Evaluation(EvaluationError::InvalidCoordinate(_))
        | AttendanceServiceError::Evaluation(EvaluationError::NoClassroomsAvailable { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AttendanceServiceError::NotEnrolled { .. } => StatusCode::FORBIDDEN,
        AttendanceServiceError::DuplicateAttendance { .. }
        | AttendanceServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        AttendanceServiceError::Directory(DirectoryError::UnknownCourse(_))
        | AttendanceServiceError::UnknownScheduleEntry { .. }
        | AttendanceServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        AttendanceServiceError::Directory(DirectoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AttendanceServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({
        "success": false,
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}
