mod config;
mod policy;

pub use config::AttendancePolicy;
pub use policy::{AttendanceDecision, AttendanceStatus, NotRecordedReason};

use chrono::NaiveDateTime;

use super::domain::{AttendanceEvent, Classroom, CourseId, ScheduleEntry, ScheduleEntryId};
use super::geo::InvalidCoordinate;
use super::geofence::{self, GeofenceError};
use super::schedule::ScheduleWindowMatcher;
use policy::decide_outcome;

/// Stateless evaluator turning a GPS submission into an attendance decision.
///
/// Everything the decision depends on is passed in, so identical inputs always produce
/// identical decisions and the engine can be shared across request handlers.
#[derive(Debug, Clone)]
pub struct AttendanceDecisionEngine {
    policy: AttendancePolicy,
    matcher: ScheduleWindowMatcher,
}

impl AttendanceDecisionEngine {
    pub fn new(policy: AttendancePolicy) -> Self {
        let matcher = policy.schedule_matcher();
        Self { policy, matcher }
    }

    pub fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    /// Evaluate `event` against the course's classrooms and schedule at local time `now`.
    ///
    /// Schedule entries belonging to other courses are ignored.
    pub fn evaluate(
        &self,
        event: &AttendanceEvent,
        classrooms: &[Classroom],
        schedules: &[ScheduleEntry],
        now: NaiveDateTime,
    ) -> Result<AttendanceDecision, EvaluationError> {
        event.position.validate()?;

        let course_entries: Vec<ScheduleEntry> = schedules
            .iter()
            .filter(|entry| entry.course_id == event.course_id)
            .cloned()
            .collect();

        let Some(entry) = self.matcher.active_session(&course_entries, now) else {
            return Ok(AttendanceDecision::no_active_session());
        };

        let candidates: Vec<&Classroom> = match entry.classroom_id {
            Some(classroom_id) => classrooms
                .iter()
                .filter(|classroom| classroom.id == classroom_id)
                .collect(),
            None => classrooms.iter().collect(),
        };

        let nearest = geofence::nearest(event.position, candidates).map_err(|err| match err {
            GeofenceError::NoClassroomsAvailable => EvaluationError::NoClassroomsAvailable {
                course_id: event.course_id,
                schedule_entry_id: entry.id,
            },
            GeofenceError::InvalidCoordinate(invalid) => EvaluationError::InvalidCoordinate(invalid),
        })?;

        Ok(decide_outcome(entry, &nearest, &self.policy, now))
    }
}

/// Configuration or input defects. These abort evaluation and are never reported as an
/// attendance outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    InvalidCoordinate(#[from] InvalidCoordinate),
    #[error("no classroom configured for course {course_id} (schedule entry {schedule_entry_id}); contact an administrator")]
    NoClassroomsAvailable {
        course_id: CourseId,
        schedule_entry_id: ScheduleEntryId,
    },
}
