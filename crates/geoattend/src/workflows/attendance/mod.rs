//! GPS attendance capture: geofence geometry, schedule windows, and the decision engine,
//! plus the service, ports and HTTP router that persist its decisions.

pub mod domain;
pub mod evaluation;
pub mod geo;
pub mod geofence;
pub mod registry;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod service;
pub mod stats;

#[cfg(test)]
mod tests;

pub use domain::{
    AttendanceEvent, AttendanceRecord, AttendanceSource, Classroom, ClassroomId, CourseId,
    DayOfWeek, RecordId, RecordStatus, ScheduleEntry, ScheduleEntryId, ScheduleError, UserId,
};
pub use evaluation::{
    AttendanceDecision, AttendanceDecisionEngine, AttendancePolicy, AttendanceStatus,
    EvaluationError, NotRecordedReason,
};
pub use geo::{distance_meters, Coordinate, InvalidCoordinate, EARTH_RADIUS_METERS};
pub use geofence::{nearest, GeofenceError, GeofenceMatch};
pub use registry::{CampusRegistry, RegistryImportError};
pub use repository::{
    AttendanceNotification, AttendanceRepository, Clock, CourseDirectory, DirectoryError,
    FixedClock, NotificationError, NotificationPublisher, RecordPage, RecordQuery,
    RepositoryError, SystemClock,
};
pub use router::{attendance_router, GpsEventRequest};
pub use schedule::{find_conflicts, ScheduleConflict, ScheduleWindowMatcher};
pub use service::{AbsenceSummary, AttendanceService, AttendanceServiceError, GpsSubmissionOutcome};
pub use stats::{AttendanceStats, AttendanceSummaryReport, CourseAttendanceSummary, CourseStats};
