use crate::infra::{
    load_registry, parse_date, parse_local_datetime, sample_campus, sample_origin,
    InMemoryAttendanceRepository, LoggingNotificationPublisher, ScriptedClock, SAMPLE_COURSE,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::Args;
use geoattend::config::AppConfig;
use geoattend::error::AppError;
use geoattend::workflows::attendance::{
    AbsenceSummary, AttendanceDecision, AttendanceEvent, AttendancePolicy, AttendanceService,
    AttendanceServiceError, AttendanceStats, Coordinate, CourseDirectory, CourseId, DayOfWeek,
    FixedClock, GpsSubmissionOutcome, RecordId, UserId, EARTH_RADIUS_METERS,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Course the student is checking into
    #[arg(long)]
    pub(crate) course: i64,
    /// Student submitting the fix
    #[arg(long)]
    pub(crate) user: i64,
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) latitude: f64,
    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub(crate) longitude: f64,
    /// Reported GPS accuracy in meters
    #[arg(long, default_value_t = 5.0)]
    pub(crate) accuracy: f64,
    /// Campus local time of the fix (YYYY-MM-DDTHH:MM). Defaults to now.
    #[arg(long, value_parser = parse_local_datetime)]
    pub(crate) at: Option<NaiveDateTime>,
    /// Classroom CSV export, overriding REGISTRY_CLASSROOMS_CSV
    #[arg(long)]
    pub(crate) classrooms: Option<PathBuf>,
    /// Schedule CSV export, overriding REGISTRY_SCHEDULES_CSV
    #[arg(long)]
    pub(crate) schedules: Option<PathBuf>,
    /// Print the outcome as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Class date to simulate (YYYY-MM-DD). Defaults to Monday 2025-10-06.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Minutes after the start that still count as present
    #[arg(long)]
    pub(crate) grace_minutes: Option<u32>,
    /// Print the walkthrough as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_evaluation(args: EvaluateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let mut registry_config = config.registry.clone();
    if let Some(path) = args.classrooms {
        registry_config.classrooms_csv = Some(path);
    }
    if let Some(path) = args.schedules {
        registry_config.schedules_csv = Some(path);
    }
    let registry = load_registry(&registry_config)?;

    let policy = config.attendance.clone();
    let observed_at = match args.at {
        Some(local) => local_to_utc(&policy, local),
        None => Utc::now(),
    };

    let service = AttendanceService::with_clock(
        Arc::new(registry),
        Arc::new(InMemoryAttendanceRepository::default()),
        Arc::new(LoggingNotificationPublisher::default()),
        Arc::new(FixedClock(observed_at)),
        policy,
    );

    let outcome = service.submit_gps_event(AttendanceEvent {
        user_id: UserId(args.user),
        course_id: CourseId(args.course),
        position: Coordinate {
            latitude: args.latitude,
            longitude: args.longitude,
        },
        accuracy_meters: args.accuracy,
        observed_at,
    })?;

    if args.json {
        print_json(&outcome)?;
    } else {
        render_outcome(&outcome, service.local_now());
    }
    Ok(())
}

fn render_outcome(outcome: &GpsSubmissionOutcome, local_now: NaiveDateTime) {
    let decision = &outcome.decision;
    println!("Evaluated at {local_now}");
    println!("- status: {}", decision.status.label());
    println!("- {}", decision.summary());
    if let Some(classroom) = &outcome.nearest_classroom {
        println!(
            "- nearest classroom: {} ({}), geofence {:.0} m",
            classroom.name,
            classroom.display_name(),
            classroom.geofence_radius_meters
        );
    }
    if let Some(distance) = decision.distance_meters {
        println!("- distance: {distance:.1} m");
    }
    if let Some(entry) = decision.matched_schedule_entry_id {
        println!("- schedule entry: {entry}");
    }
}

fn local_to_utc(policy: &AttendancePolicy, local: NaiveDateTime) -> DateTime<Utc> {
    policy
        .campus_offset()
        .and_then(|offset| offset.from_local_datetime(&local).single())
        .map(|instant| instant.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}

#[derive(Debug, Serialize)]
struct DemoStep {
    scenario: &'static str,
    user_id: UserId,
    local_time: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<AttendanceDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<String>,
}

#[derive(Debug, Serialize)]
struct StudentStats {
    user_id: UserId,
    stats: AttendanceStats,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    class_date: NaiveDate,
    day_of_week: DayOfWeek,
    steps: Vec<DemoStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    absences: Option<AbsenceSummary>,
    stats: Vec<StudentStats>,
}

struct Scenario {
    label: &'static str,
    user: i64,
    at: (u32, u32),
    meters_north: f64,
    accuracy: f64,
}

const SCENARIOS: [Scenario; 6] = [
    Scenario {
        label: "arrives early at the lecture hall",
        user: 1,
        at: (7, 50),
        meters_north: 0.0,
        accuracy: 4.0,
    },
    Scenario {
        label: "walks in after the start",
        user: 2,
        at: (8, 12),
        meters_north: 12.0,
        accuracy: 6.0,
    },
    Scenario {
        label: "checks in from the cafeteria",
        user: 3,
        at: (8, 20),
        meters_north: 120.0,
        accuracy: 5.0,
    },
    Scenario {
        label: "submits a second fix",
        user: 1,
        at: (8, 30),
        meters_north: 2.0,
        accuracy: 4.0,
    },
    Scenario {
        label: "reports a coarse fix indoors",
        user: 4,
        at: (8, 40),
        meters_north: 3.0,
        accuracy: 35.0,
    },
    Scenario {
        label: "shows up after class ended",
        user: 5,
        at: (11, 0),
        meters_north: 0.0,
        accuracy: 4.0,
    },
];

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let class_date = args
        .date
        .or_else(|| NaiveDate::from_ymd_opt(2025, 10, 6))
        .unwrap_or_else(|| Utc::now().date_naive());
    let mut policy = AttendancePolicy::default();
    if let Some(grace) = args.grace_minutes {
        policy.late_grace_minutes = grace;
    }

    let registry = Arc::new(sample_campus());
    let clock = Arc::new(ScriptedClock::new(Utc.from_utc_datetime(
        &class_date.and_hms_opt(0, 0, 0).unwrap_or_default(),
    )));
    let notifications = Arc::new(LoggingNotificationPublisher::default());
    let service = AttendanceService::with_clock(
        registry.clone(),
        Arc::new(InMemoryAttendanceRepository::default()),
        notifications.clone(),
        clock.clone(),
        policy.clone(),
    );

    let mut steps = Vec::with_capacity(SCENARIOS.len());
    for scenario in &SCENARIOS {
        let Some(local_time) = class_date.and_hms_opt(scenario.at.0, scenario.at.1, 0) else {
            continue;
        };
        let observed_at = local_to_utc(&policy, local_time);
        clock.set(observed_at);

        let event = AttendanceEvent {
            user_id: UserId(scenario.user),
            course_id: SAMPLE_COURSE,
            position: north_of(sample_origin(), scenario.meters_north),
            accuracy_meters: scenario.accuracy,
            observed_at,
        };

        let step = match service.submit_gps_event(event) {
            Ok(outcome) => DemoStep {
                scenario: scenario.label,
                user_id: UserId(scenario.user),
                local_time,
                record_id: outcome.record.as_ref().map(|record| record.id),
                decision: Some(outcome.decision),
                rejected: None,
            },
            Err(err) => DemoStep {
                scenario: scenario.label,
                user_id: UserId(scenario.user),
                local_time,
                decision: None,
                record_id: None,
                rejected: Some(err.to_string()),
            },
        };
        steps.push(step);
    }

    let day = DayOfWeek::from(class_date.weekday());
    let session = registry
        .active_schedules(SAMPLE_COURSE)
        .map_err(AttendanceServiceError::from)?
        .into_iter()
        .find(|entry| entry.day_of_week == day);
    let absences = match session {
        Some(entry) => Some(service.mark_absences(SAMPLE_COURSE, entry.id, class_date)?),
        None => None,
    };

    let stats = (1..=5)
        .map(|user| {
            service
                .user_stats(UserId(user), Some(SAMPLE_COURSE), Some(class_date), Some(class_date))
                .map(|stats| StudentStats {
                    user_id: UserId(user),
                    stats,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let report = DemoReport {
        class_date,
        day_of_week: day,
        steps,
        absences,
        stats,
    };

    if args.json {
        return print_json(&report);
    }

    render_report(&report, &policy, notifications.events().len());
    Ok(())
}

fn north_of(origin: Coordinate, meters: f64) -> Coordinate {
    Coordinate {
        latitude: origin.latitude + (meters / EARTH_RADIUS_METERS).to_degrees(),
        longitude: origin.longitude,
    }
}

fn render_report(report: &DemoReport, policy: &AttendancePolicy, notifications_sent: usize) {
    println!(
        "GPS attendance demo: course {} on {} ({})",
        SAMPLE_COURSE,
        report.class_date,
        report.day_of_week.label()
    );
    println!(
        "Window opens {} min before start | grace {} min | accuracy limit {}",
        policy.tolerance_before_minutes,
        policy.late_grace_minutes,
        policy
            .max_accuracy_meters
            .map(|meters| format!("{meters:.0} m"))
            .unwrap_or_else(|| "off".to_string())
    );

    println!("\nSubmissions");
    for step in &report.steps {
        let result = match (&step.decision, &step.rejected) {
            (Some(decision), _) => decision.summary(),
            (None, Some(reason)) => format!("rejected: {reason}"),
            (None, None) => "no outcome".to_string(),
        };
        println!(
            "- {} student {} {}: {}",
            step.local_time.time(),
            step.user_id,
            step.scenario,
            result
        );
    }

    match &report.absences {
        Some(summary) => {
            println!("\nAbsence sweep for schedule entry {}", summary.schedule_entry_id);
            println!(
                "- {} enrolled | {} registered | {} marked absent",
                summary.total_enrolled, summary.already_registered, summary.marked_absent
            );
        }
        None => println!("\nNo session scheduled on {}; absence sweep skipped", report.class_date),
    }

    println!("\nPer-student rates for the day");
    for entry in &report.stats {
        println!(
            "- student {}: {:.0}% attendance | {:.0}% punctual ({} session(s))",
            entry.user_id,
            entry.stats.attendance_rate,
            entry.stats.punctuality_rate,
            entry.stats.total_sessions
        );
    }
    println!("\n{notifications_sent} notification(s) dispatched");
}
