use std::sync::{Arc, Barrier};
use std::thread;

use chrono::NaiveDate;

use super::common::*;
use crate::workflows::attendance::domain::{
    AttendanceRecord, AttendanceSource, ClassroomId, CourseId, RecordStatus, ScheduleEntryId,
    UserId,
};
use crate::workflows::attendance::evaluation::{
    AttendancePolicy, AttendanceStatus, EvaluationError, NotRecordedReason,
};
use crate::workflows::attendance::repository::{
    AttendanceRepository, DirectoryError, FixedClock, RecordQuery, RepositoryError,
};
use crate::workflows::attendance::{AttendanceService, AttendanceServiceError};

#[test]
fn recorded_submission_persists_and_notifies() {
    let (service, repository, notifications) = build_service();

    let outcome = service
        .submit_gps_event(event_at(offset_north(campus(), 6.0)))
        .expect("submission accepted");

    assert_eq!(outcome.decision.status, AttendanceStatus::Present);
    let classroom = outcome.nearest_classroom.expect("classroom resolved");
    assert_eq!(classroom.id, ClassroomId(1));

    let record = outcome.record.expect("record written");
    assert_eq!(record.status, RecordStatus::Present);
    assert_eq!(record.source, AttendanceSource::GpsAuto);
    assert_eq!(record.schedule_entry_id, Some(ScheduleEntryId(1)));
    assert_eq!(record.class_date, class_day());
    assert_eq!(record.classroom_name.as_deref(), Some("Engineering 201"));
    assert_eq!(record.actual_arrival, Some(utc(monday_at(8, 0))));
    assert_eq!(repository.all(), vec![record.clone()]);

    let sent = notifications.events();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, STUDENT);
    assert_eq!(sent[0].notification_type, "attendance_recorded");
    assert_eq!(
        sent[0].metadata.get("status").map(String::as_str),
        Some("present")
    );
}

#[test]
fn late_submission_records_minutes_late() {
    let (service, repository, _) = build_service_at(monday_at(8, 25));

    let outcome = service
        .submit_gps_event(event_at(campus()))
        .expect("submission accepted");

    assert_eq!(outcome.decision.status, AttendanceStatus::Late);
    let record = outcome.record.expect("record written");
    assert_eq!(record.status, RecordStatus::Late);
    assert_eq!(record.minutes_late, Some(25));
    assert_eq!(repository.all().len(), 1);
}

#[test]
fn second_submission_for_same_session_is_rejected() {
    let (service, repository, _) = build_service();
    service
        .submit_gps_event(event_at(campus()))
        .expect("first submission accepted");

    let err = service
        .submit_gps_event(event_at(campus()))
        .expect_err("duplicate rejected");

    assert!(matches!(
        err,
        AttendanceServiceError::DuplicateAttendance { user_id, course_id, class_date }
            if user_id == STUDENT && course_id == COURSE && class_date == class_day()
    ));
    assert_eq!(repository.all().len(), 1);
}

/// Holds every session lookup until both submissions have made theirs.
struct InterleavedRepository {
    inner: MemoryRepository,
    lookups: Barrier,
}

impl AttendanceRepository for InterleavedRepository {
    fn insert(&self, record: AttendanceRecord) -> Result<AttendanceRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn find_for_session(
        &self,
        user_id: UserId,
        course_id: CourseId,
        class_date: NaiveDate,
        schedule_entry_id: Option<ScheduleEntryId>,
    ) -> Result<Option<AttendanceRecord>, RepositoryError> {
        let found = self
            .inner
            .find_for_session(user_id, course_id, class_date, schedule_entry_id);
        self.lookups.wait();
        found
    }

    fn query(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, RepositoryError> {
        self.inner.query(query)
    }
}

#[test]
fn concurrent_submissions_for_same_session_store_one_record() {
    let repository = Arc::new(InterleavedRepository {
        inner: MemoryRepository::default(),
        lookups: Barrier::new(2),
    });
    let service = AttendanceService::with_clock(
        Arc::new(registry()),
        repository.clone(),
        Arc::new(MemoryNotifications::default()),
        Arc::new(FixedClock(utc(monday_at(8, 0)))),
        policy(),
    );

    let (first, second) = thread::scope(|scope| {
        let first = scope.spawn(|| service.submit_gps_event(event_at(campus())));
        let second = scope.spawn(|| service.submit_gps_event(event_at(campus())));
        (
            first.join().expect("first submission thread"),
            second.join().expect("second submission thread"),
        )
    });

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        Err(AttendanceServiceError::DuplicateAttendance { user_id, .. }) if *user_id == STUDENT
    )));
    assert_eq!(repository.inner.all().len(), 1);
}

#[test]
fn unenrolled_user_is_refused() {
    let (service, repository, notifications) = build_service();
    let mut event = event_at(campus());
    event.user_id = UserId(999);

    let err = service.submit_gps_event(event).expect_err("enrollment required");
    assert!(matches!(
        err,
        AttendanceServiceError::NotEnrolled { user_id: UserId(999), course_id } if course_id == COURSE
    ));
    assert!(repository.all().is_empty());
    assert!(notifications.events().is_empty());
}

#[test]
fn low_accuracy_fix_is_rejected_before_evaluation() {
    let (service, repository, _) = build_service();
    let mut event = event_at(campus());
    event.accuracy_meters = 25.0;

    let err = service.submit_gps_event(event).expect_err("accuracy rejected");
    assert!(matches!(
        err,
        AttendanceServiceError::InsufficientAccuracy { threshold_meters, .. } if threshold_meters == 10.0
    ));
    assert!(repository.all().is_empty());
}

#[test]
fn negative_accuracy_is_invalid() {
    let (service, _, _) = build_service();
    let mut event = event_at(campus());
    event.accuracy_meters = -1.0;

    assert!(matches!(
        service.submit_gps_event(event),
        Err(AttendanceServiceError::InvalidAccuracy(_))
    ));
}

#[test]
fn disabled_accuracy_threshold_accepts_coarse_fixes() {
    let repository = Arc::new(MemoryRepository::default());
    let service = AttendanceService::with_clock(
        Arc::new(registry()),
        repository.clone(),
        Arc::new(MemoryNotifications::default()),
        Arc::new(FixedClock(utc(monday_at(8, 0)))),
        AttendancePolicy {
            max_accuracy_meters: None,
            ..policy()
        },
    );
    let mut event = event_at(campus());
    event.accuracy_meters = 120.0;

    let outcome = service.submit_gps_event(event).expect("submission accepted");
    assert!(outcome.decision.attendance_recorded);
}

#[test]
fn out_of_range_submission_writes_nothing() {
    let (service, repository, notifications) = build_service();

    let outcome = service
        .submit_gps_event(event_at(offset_north(campus(), 60.0)))
        .expect("submission evaluated");

    assert_eq!(outcome.decision.reason, Some(NotRecordedReason::OutOfRange));
    assert!(outcome.record.is_none());
    assert_eq!(
        outcome.nearest_classroom.map(|classroom| classroom.id),
        Some(ClassroomId(1))
    );
    assert!(repository.all().is_empty());
    assert!(notifications.events().is_empty());
}

#[test]
fn outside_class_hours_returns_no_scheduled_class() {
    let (service, repository, _) = build_service_at(monday_at(13, 0));

    let outcome = service
        .submit_gps_event(event_at(campus()))
        .expect("submission evaluated");

    assert_eq!(
        outcome.decision.reason,
        Some(NotRecordedReason::NoScheduledClass)
    );
    assert!(outcome.nearest_classroom.is_none());
    assert!(repository.all().is_empty());
}

#[test]
fn course_without_classrooms_fails_loudly() {
    let (service, _, _) = build_service();
    let mut event = event_at(campus());
    event.course_id = CourseId(202);

    let err = service.submit_gps_event(event).expect_err("configuration defect");
    assert!(matches!(
        err,
        AttendanceServiceError::Evaluation(EvaluationError::NoClassroomsAvailable { .. })
    ));
    assert!(err.to_string().contains("contact an administrator"));
}

#[test]
fn unknown_course_is_a_directory_error() {
    let (service, _, _) = build_service();
    let mut event = event_at(campus());
    event.course_id = CourseId(999);

    assert!(matches!(
        service.submit_gps_event(event),
        Err(AttendanceServiceError::Directory(DirectoryError::UnknownCourse(CourseId(999))))
    ));
}

#[test]
fn notification_failure_keeps_the_record() {
    let repository = Arc::new(MemoryRepository::default());
    let service = AttendanceService::with_clock(
        Arc::new(registry()),
        repository.clone(),
        Arc::new(OfflineNotifications),
        Arc::new(FixedClock(utc(monday_at(8, 0)))),
        policy(),
    );

    let outcome = service
        .submit_gps_event(event_at(campus()))
        .expect("submission accepted");

    assert!(outcome.record.is_some());
    assert_eq!(repository.all().len(), 1);
}

#[test]
fn repository_outage_surfaces_as_error() {
    let service = AttendanceService::with_clock(
        Arc::new(registry()),
        Arc::new(UnavailableRepository),
        Arc::new(MemoryNotifications::default()),
        Arc::new(FixedClock(utc(monday_at(8, 0)))),
        policy(),
    );

    assert!(matches!(
        service.submit_gps_event(event_at(campus())),
        Err(AttendanceServiceError::Repository(RepositoryError::Unavailable(_)))
    ));
}

#[test]
fn campus_offset_shifts_local_time() {
    // 13:05 UTC is 08:05 on a campus five hours behind UTC.
    let repository = Arc::new(MemoryRepository::default());
    let service = AttendanceService::with_clock(
        Arc::new(registry()),
        repository.clone(),
        Arc::new(MemoryNotifications::default()),
        Arc::new(FixedClock(utc(monday_at(13, 5)))),
        AttendancePolicy {
            utc_offset_minutes: -300,
            ..policy()
        },
    );

    assert_eq!(service.local_now(), monday_at(8, 5));
    let outcome = service
        .submit_gps_event(event_at(campus()))
        .expect("submission accepted");
    assert_eq!(outcome.decision.status, AttendanceStatus::Late);
    assert_eq!(outcome.decision.minutes_late, Some(5));
}

#[test]
fn stats_summarise_recorded_sessions() {
    let (service, _, _) = build_service_at(monday_at(8, 30));
    service
        .submit_gps_event(event_at(campus()))
        .expect("late submission accepted");
    service
        .mark_absences(COURSE, ScheduleEntryId(1), class_day())
        .expect("absence sweep");

    let stats = service
        .user_stats(STUDENT, Some(COURSE), None, None)
        .expect("stats computed");
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.attended_sessions, 1);
    assert_eq!(stats.late_sessions, 1);
    assert_eq!(stats.attendance_rate, 100.0);
    assert_eq!(stats.punctuality_rate, 0.0);

    let absent = service
        .user_stats(UserId(43), None, None, None)
        .expect("stats computed");
    assert_eq!(absent.absent_sessions, 1);
    assert_eq!(absent.attendance_rate, 0.0);
}

#[test]
fn absence_sweep_marks_only_unregistered_students() {
    let (service, repository, _) = build_service();
    service
        .submit_gps_event(event_at(campus()))
        .expect("submission accepted");

    let summary = service
        .mark_absences(COURSE, ScheduleEntryId(1), class_day())
        .expect("absence sweep");

    assert_eq!(summary.total_enrolled, 3);
    assert_eq!(summary.already_registered, 1);
    assert_eq!(summary.marked_absent, 2);
    assert_eq!(summary.absent_students, vec![UserId(43), UserId(44)]);

    let absent = repository
        .all()
        .into_iter()
        .filter(|record| record.status == RecordStatus::Absent)
        .collect::<Vec<_>>();
    assert_eq!(absent.len(), 2);
    assert!(absent
        .iter()
        .all(|record| record.source == AttendanceSource::SystemAuto));

    let rerun = service
        .mark_absences(COURSE, ScheduleEntryId(1), class_day())
        .expect("second sweep");
    assert_eq!(rerun.marked_absent, 0);
    assert_eq!(rerun.already_registered, 3);
}

#[test]
fn absence_sweep_rejects_entry_of_another_course() {
    let (service, repository, _) = build_service();

    for foreign in [ScheduleEntryId(9), ScheduleEntryId(77)] {
        let err = service
            .mark_absences(COURSE, foreign, class_day())
            .expect_err("entry not part of the course");
        assert!(matches!(
            err,
            AttendanceServiceError::UnknownScheduleEntry { course_id, schedule_entry_id }
                if course_id == COURSE && schedule_entry_id == foreign
        ));
    }
    assert!(repository.all().is_empty());
}

#[test]
fn course_stats_cover_enrolled_students() {
    let (service, _, _) = build_service_at(monday_at(8, 25));
    service
        .submit_gps_event(event_at(campus()))
        .expect("late submission accepted");
    service
        .mark_absences(COURSE, ScheduleEntryId(1), class_day())
        .expect("absence sweep");

    let stats = service
        .course_stats(COURSE, Some(class_day()), Some(class_day()))
        .expect("course stats");
    assert_eq!(stats.course_id, COURSE);
    assert_eq!(stats.total_students, 3);
    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.statistics.present_sessions, 0);
    assert_eq!(stats.statistics.late_sessions, 1);
    assert_eq!(stats.statistics.absent_sessions, 2);
    assert_eq!(stats.statistics.attendance_rate, 33.33);

    let next_week = class_day() + chrono::Duration::days(7);
    let empty = service
        .course_stats(COURSE, Some(next_week), None)
        .expect("course stats");
    assert_eq!(empty.total_records, 0);
    assert_eq!(empty.statistics.attendance_rate, 0.0);

    assert!(matches!(
        service.course_stats(CourseId(999), None, None),
        Err(AttendanceServiceError::Directory(DirectoryError::UnknownCourse(CourseId(999))))
    ));
}

#[test]
fn summary_report_groups_records_by_course() {
    let (service, _, _) = build_service_at(monday_at(8, 25));
    service
        .submit_gps_event(event_at(campus()))
        .expect("late submission accepted");
    service
        .mark_absences(COURSE, ScheduleEntryId(1), class_day())
        .expect("absence sweep");
    service
        .mark_absences(CourseId(202), ScheduleEntryId(9), class_day())
        .expect("absence sweep");

    let report = service
        .summary_report(None, None, None)
        .expect("summary report");
    assert_eq!(report.total_records, 4);
    assert_eq!(report.overall.attended_sessions, 1);
    assert_eq!(report.overall.absent_sessions, 3);
    assert_eq!(report.courses.len(), 2);
    assert_eq!(report.courses[0].course_id, COURSE);
    assert_eq!(report.courses[0].unique_students, 3);
    assert_eq!(report.courses[0].statistics.late_sessions, 1);
    assert_eq!(report.courses[1].course_id, CourseId(202));
    assert_eq!(report.courses[1].unique_students, 1);
    assert_eq!(report.courses[1].statistics.absent_sessions, 1);

    let narrowed = service
        .summary_report(Some(CourseId(202)), None, None)
        .expect("summary report");
    assert_eq!(narrowed.total_records, 1);
    assert_eq!(narrowed.courses.len(), 1);
}

#[test]
fn records_listing_filters_by_status() {
    let (service, _, _) = build_service();
    service
        .submit_gps_event(event_at(campus()))
        .expect("submission accepted");
    service
        .mark_absences(COURSE, ScheduleEntryId(1), class_day())
        .expect("absence sweep");

    let absent = service
        .records(&RecordQuery {
            status: Some(RecordStatus::Absent),
            ..RecordQuery::default()
        })
        .expect("records listed");
    assert_eq!(absent.total, 2);
    assert_eq!(absent.records.len(), 2);

    let page = service
        .records(&RecordQuery {
            course_id: Some(COURSE),
            limit: 1,
            ..RecordQuery::default()
        })
        .expect("records listed");
    assert_eq!(page.total, 3);
    assert_eq!(page.records.len(), 1);
    assert_eq!(page.limit, 1);
}
