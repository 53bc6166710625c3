use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    AttendanceEvent, AttendanceRecord, AttendanceSource, Classroom, CourseId, RecordId,
    RecordStatus, ScheduleEntryId, UserId,
};
use super::evaluation::{AttendanceDecision, AttendanceDecisionEngine, AttendancePolicy, EvaluationError};
use super::repository::{
    AttendanceNotification, AttendanceRepository, Clock, CourseDirectory, DirectoryError,
    NotificationPublisher, RecordPage, RecordQuery, RepositoryError, SystemClock,
};
use super::stats::{AttendanceStats, AttendanceSummaryReport, CourseStats};

/// Service composing the course directory, decision engine, and record storage.
pub struct AttendanceService<D, R, N> {
    directory: Arc<D>,
    repository: Arc<R>,
    notifications: Arc<N>,
    clock: Arc<dyn Clock>,
    engine: Arc<AttendanceDecisionEngine>,
    campus_offset: FixedOffset,
    record_sequence: AtomicI64,
}

/// Result of a GPS submission, ready to hand back to the mobile client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsSubmissionOutcome {
    pub decision: AttendanceDecision,
    pub nearest_classroom: Option<Classroom>,
    pub record: Option<AttendanceRecord>,
}

/// Summary of an end-of-session absence sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbsenceSummary {
    pub course_id: CourseId,
    pub schedule_entry_id: ScheduleEntryId,
    pub class_date: NaiveDate,
    pub total_enrolled: usize,
    pub already_registered: usize,
    pub marked_absent: usize,
    pub absent_students: Vec<UserId>,
}

impl<D, R, N> AttendanceService<D, R, N>
where
    D: CourseDirectory + 'static,
    R: AttendanceRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        directory: Arc<D>,
        repository: Arc<R>,
        notifications: Arc<N>,
        policy: AttendancePolicy,
    ) -> Self {
        Self::with_clock(
            directory,
            repository,
            notifications,
            Arc::new(SystemClock),
            policy,
        )
    }

    pub fn with_clock(
        directory: Arc<D>,
        repository: Arc<R>,
        notifications: Arc<N>,
        clock: Arc<dyn Clock>,
        policy: AttendancePolicy,
    ) -> Self {
        let campus_offset = policy.campus_offset().unwrap_or_else(|| {
            warn!(
                utc_offset_minutes = policy.utc_offset_minutes,
                "campus offset out of range, falling back to UTC"
            );
            Utc.fix()
        });

        Self {
            directory,
            repository,
            notifications,
            clock,
            engine: Arc::new(AttendanceDecisionEngine::new(policy)),
            campus_offset,
            record_sequence: AtomicI64::new(1),
        }
    }

    pub fn policy(&self) -> &AttendancePolicy {
        self.engine.policy()
    }

    /// Campus wall-clock time according to the injected clock.
    pub fn local_now(&self) -> NaiveDateTime {
        self.clock
            .now()
            .with_timezone(&self.campus_offset)
            .naive_local()
    }

    /// Evaluate a GPS submission and persist the attendance record when one is due.
    pub fn submit_gps_event(
        &self,
        event: AttendanceEvent,
    ) -> Result<GpsSubmissionOutcome, AttendanceServiceError> {
        event.position.validate().map_err(EvaluationError::from)?;
        self.check_accuracy(event.accuracy_meters)?;

        let schedules = self.directory.active_schedules(event.course_id)?;
        self.check_enrollment(event.user_id, event.course_id)?;
        let classrooms = self.directory.classrooms_for_course(event.course_id)?;
        let now = self.local_now();

        let decision = self.engine.evaluate(&event, &classrooms, &schedules, now)?;
        let nearest_classroom = decision.nearest_classroom_id.and_then(|id| {
            classrooms
                .iter()
                .find(|classroom| classroom.id == id)
                .cloned()
        });

        info!(
            user_id = %event.user_id,
            course_id = %event.course_id,
            status = decision.status.label(),
            distance_meters = ?decision.distance_meters,
            "gps event evaluated"
        );

        let record = match decision.status.record_status() {
            Some(status) if decision.attendance_recorded => Some(self.record_attendance(
                &event,
                &decision,
                status,
                nearest_classroom.as_ref(),
                now.date(),
            )?),
            _ => None,
        };

        Ok(GpsSubmissionOutcome {
            decision,
            nearest_classroom,
            record,
        })
    }

    fn check_accuracy(&self, accuracy_meters: f64) -> Result<(), AttendanceServiceError> {
        if !accuracy_meters.is_finite() || accuracy_meters < 0.0 {
            return Err(AttendanceServiceError::InvalidAccuracy(accuracy_meters));
        }

        match self.policy().max_accuracy_meters {
            Some(threshold) if accuracy_meters > threshold => {
                warn!(accuracy_meters, threshold, "gps fix rejected for low accuracy");
                Err(AttendanceServiceError::InsufficientAccuracy {
                    accuracy_meters,
                    threshold_meters: threshold,
                })
            }
            _ => Ok(()),
        }
    }

    fn check_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<(), AttendanceServiceError> {
        if self.directory.enrolled_students(course_id)?.contains(&user_id) {
            return Ok(());
        }
        warn!(user_id = %user_id, course_id = %course_id, "gps event from unenrolled user");
        Err(AttendanceServiceError::NotEnrolled { user_id, course_id })
    }

    fn record_attendance(
        &self,
        event: &AttendanceEvent,
        decision: &AttendanceDecision,
        status: RecordStatus,
        classroom: Option<&Classroom>,
        class_date: NaiveDate,
    ) -> Result<AttendanceRecord, AttendanceServiceError> {
        let existing = self.repository.find_for_session(
            event.user_id,
            event.course_id,
            class_date,
            decision.matched_schedule_entry_id,
        )?;
        let duplicate = || {
            warn!(
                user_id = %event.user_id,
                course_id = %event.course_id,
                "duplicate attendance attempt blocked"
            );
            AttendanceServiceError::DuplicateAttendance {
                user_id: event.user_id,
                course_id: event.course_id,
                class_date,
            }
        };
        if existing.is_some() {
            return Err(duplicate());
        }

        let record = AttendanceRecord {
            id: self.next_record_id(),
            user_id: event.user_id,
            course_id: event.course_id,
            status,
            source: AttendanceSource::GpsAuto,
            schedule_entry_id: decision.matched_schedule_entry_id,
            classroom_id: decision.nearest_classroom_id,
            classroom_name: classroom.map(Classroom::display_name),
            recorded_distance: decision.distance_meters,
            class_date,
            actual_arrival: Some(event.observed_at),
            minutes_late: decision.minutes_late,
            created_at: self.clock.now(),
        };

        // A concurrent submission for the same session can land between the lookup and here.
        let stored = match self.repository.insert(record) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => return Err(duplicate()),
            Err(err) => return Err(err.into()),
        };
        info!(record_id = %stored.id, status = stored.status.label(), "attendance recorded");
        self.notify_recorded(&stored);
        Ok(stored)
    }

    fn notify_recorded(&self, record: &AttendanceRecord) {
        let classroom = record.classroom_name.clone().unwrap_or_default();
        let mut metadata = BTreeMap::new();
        metadata.insert("record_id".to_string(), record.id.to_string());
        metadata.insert("status".to_string(), record.status.label().to_string());
        metadata.insert("classroom".to_string(), classroom.clone());
        if let Some(distance) = record.recorded_distance {
            metadata.insert("distance".to_string(), format!("{distance:.2}"));
        }

        let notification = AttendanceNotification {
            user_id: record.user_id,
            course_id: record.course_id,
            notification_type: "attendance_recorded".to_string(),
            message: format!("Attendance recorded at {classroom}"),
            metadata,
        };

        // The record is already stored; a failed notification must not undo it.
        if let Err(err) = self.notifications.publish(notification) {
            warn!(record_id = %record.id, error = %err, "failed to send attendance notification");
        }
    }

    fn next_record_id(&self) -> RecordId {
        RecordId(self.record_sequence.fetch_add(1, Ordering::Relaxed))
    }

    /// One page of matching records plus the number of records matching before pagination.
    pub fn records(&self, query: &RecordQuery) -> Result<RecordPage, AttendanceServiceError> {
        let matching = self.repository.query(&query.unpaginated())?;
        Ok(RecordPage {
            total: matching.len(),
            skip: query.skip,
            limit: query.limit,
            records: matching
                .into_iter()
                .skip(query.skip)
                .take(query.limit)
                .collect(),
        })
    }

    /// Attendance rates for a student, optionally narrowed to one course and date range.
    pub fn user_stats(
        &self,
        user_id: UserId,
        course_id: Option<CourseId>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<AttendanceStats, AttendanceServiceError> {
        let query = RecordQuery {
            user_id: Some(user_id),
            course_id,
            from,
            to,
            limit: usize::MAX,
            ..RecordQuery::default()
        };
        let records = self.repository.query(&query)?;
        Ok(AttendanceStats::from_records(&records))
    }

    /// Course-wide attendance over a period; unknown courses are reported as such.
    pub fn course_stats(
        &self,
        course_id: CourseId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<CourseStats, AttendanceServiceError> {
        self.directory.active_schedules(course_id)?;
        let total_students = self.directory.enrolled_students(course_id)?.len();
        let records = self.repository.query(&RecordQuery {
            course_id: Some(course_id),
            from,
            to,
            limit: usize::MAX,
            ..RecordQuery::default()
        })?;

        Ok(CourseStats {
            course_id,
            total_students,
            total_records: records.len(),
            statistics: AttendanceStats::from_records(&records),
        })
    }

    /// Summary report over a period, grouped by course.
    pub fn summary_report(
        &self,
        course_id: Option<CourseId>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<AttendanceSummaryReport, AttendanceServiceError> {
        let records = self.repository.query(&RecordQuery {
            course_id,
            from,
            to,
            limit: usize::MAX,
            ..RecordQuery::default()
        })?;
        Ok(AttendanceSummaryReport::from_records(&records))
    }

    /// Record every enrolled student without attendance on `class_date` as absent.
    pub fn mark_absences(
        &self,
        course_id: CourseId,
        schedule_entry_id: ScheduleEntryId,
        class_date: NaiveDate,
    ) -> Result<AbsenceSummary, AttendanceServiceError> {
        let schedules = self.directory.active_schedules(course_id)?;
        if !schedules.iter().any(|entry| entry.id == schedule_entry_id) {
            return Err(AttendanceServiceError::UnknownScheduleEntry {
                course_id,
                schedule_entry_id,
            });
        }

        let enrolled = self.directory.enrolled_students(course_id)?;
        let existing = self.repository.query(&RecordQuery {
            course_id: Some(course_id),
            from: Some(class_date),
            to: Some(class_date),
            limit: usize::MAX,
            ..RecordQuery::default()
        })?;
        let registered: BTreeSet<UserId> = existing.iter().map(|record| record.user_id).collect();

        let mut absent_students = Vec::new();
        for user_id in enrolled.iter().copied() {
            if registered.contains(&user_id) || absent_students.contains(&user_id) {
                continue;
            }

            let inserted = self.repository.insert(AttendanceRecord {
                id: self.next_record_id(),
                user_id,
                course_id,
                status: RecordStatus::Absent,
                source: AttendanceSource::SystemAuto,
                schedule_entry_id: Some(schedule_entry_id),
                classroom_id: None,
                classroom_name: None,
                recorded_distance: None,
                class_date,
                actual_arrival: None,
                minutes_late: None,
                created_at: self.clock.now(),
            });
            match inserted {
                Ok(_) => absent_students.push(user_id),
                // The student checked in after the listing above.
                Err(RepositoryError::Conflict) => {}
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            course_id = %course_id,
            %class_date,
            marked_absent = absent_students.len(),
            "absence sweep complete"
        );

        Ok(AbsenceSummary {
            course_id,
            schedule_entry_id,
            class_date,
            total_enrolled: enrolled.len(),
            already_registered: registered.len(),
            marked_absent: absent_students.len(),
            absent_students,
        })
    }
}

/// Error raised by the attendance service.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceServiceError {
    #[error("GPS accuracy must be a non-negative number of meters, got {0}")]
    InvalidAccuracy(f64),
    #[error("GPS accuracy too low: {accuracy_meters:.1} m (threshold {threshold_meters:.1} m)")]
    InsufficientAccuracy {
        accuracy_meters: f64,
        threshold_meters: f64,
    },
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("user {user_id} is not enrolled in course {course_id}")]
    NotEnrolled { user_id: UserId, course_id: CourseId },
    #[error("schedule entry {schedule_entry_id} does not belong to course {course_id}")]
    UnknownScheduleEntry {
        course_id: CourseId,
        schedule_entry_id: ScheduleEntryId,
    },
    #[error("attendance already recorded for user {user_id} in course {course_id} on {class_date}")]
    DuplicateAttendance {
        user_id: UserId,
        course_id: CourseId,
        class_date: NaiveDate,
    },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
