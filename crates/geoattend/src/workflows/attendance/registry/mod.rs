//! In-memory campus registry hydrated from CSV exports of the course service.

mod parser;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use super::domain::{Classroom, ClassroomId, CourseId, ScheduleEntry, UserId};
use super::repository::{CourseDirectory, DirectoryError};
use super::schedule::find_conflicts;

/// Classrooms, weekly schedules and enrollments for every course on campus.
#[derive(Debug, Clone, Default)]
pub struct CampusRegistry {
    classrooms: Vec<Classroom>,
    schedules: Vec<ScheduleEntry>,
    course_classrooms: BTreeMap<CourseId, BTreeSet<ClassroomId>>,
    enrollments: BTreeMap<CourseId, Vec<UserId>>,
}

impl CampusRegistry {
    pub fn new(classrooms: Vec<Classroom>, schedules: Vec<ScheduleEntry>) -> Self {
        let mut registry = Self {
            classrooms,
            ..Self::default()
        };
        for entry in schedules {
            registry.add_schedule(entry);
        }
        registry
    }

    pub fn from_readers<C, S>(classrooms: C, schedules: S) -> Result<Self, RegistryImportError>
    where
        C: Read,
        S: Read,
    {
        let classrooms = parser::parse_classrooms(classrooms)?;
        let schedules = parser::parse_schedules(schedules)?;

        let known: BTreeSet<ClassroomId> = classrooms.iter().map(|room| room.id).collect();
        if let Some(entry) = schedules
            .iter()
            .find(|entry| entry.classroom_id.is_some_and(|id| !known.contains(&id)))
        {
            return Err(RegistryImportError::InvalidSchedule {
                id: entry.id.0,
                reason: format!(
                    "references unknown classroom {}",
                    entry.classroom_id.map(|id| id.0).unwrap_or_default()
                ),
            });
        }

        for conflict in find_conflicts(&schedules) {
            warn!(
                first = %conflict.first,
                second = %conflict.second,
                "overlapping schedule entries imported"
            );
        }

        let registry = Self::new(classrooms, schedules);
        info!(
            classrooms = registry.classrooms.len(),
            schedules = registry.schedules.len(),
            courses = registry.course_classrooms.len(),
            "campus registry loaded"
        );
        Ok(registry)
    }

    pub fn from_paths(
        classrooms: impl AsRef<Path>,
        schedules: impl AsRef<Path>,
        enrollments: Option<&Path>,
    ) -> Result<Self, RegistryImportError> {
        let mut registry = Self::from_readers(File::open(classrooms)?, File::open(schedules)?)?;
        if let Some(path) = enrollments {
            registry.load_enrollments(File::open(path)?)?;
        }
        Ok(registry)
    }

    pub fn load_enrollments<R: Read>(&mut self, source: R) -> Result<(), RegistryImportError> {
        for (course_id, user_id) in parser::parse_enrollments(source)? {
            self.enroll(course_id, user_id);
        }
        Ok(())
    }

    /// Adds a schedule entry; its classroom becomes eligible for the course.
    pub fn add_schedule(&mut self, entry: ScheduleEntry) {
        let rooms = self.course_classrooms.entry(entry.course_id).or_default();
        if let Some(classroom_id) = entry.classroom_id {
            rooms.insert(classroom_id);
        }
        self.schedules.push(entry);
    }

    /// Makes a classroom eligible for a course without a dedicated schedule entry.
    pub fn assign_classroom(&mut self, course_id: CourseId, classroom_id: ClassroomId) {
        self.course_classrooms
            .entry(course_id)
            .or_default()
            .insert(classroom_id);
    }

    pub fn enroll(&mut self, course_id: CourseId, user_id: UserId) {
        let students = self.enrollments.entry(course_id).or_default();
        if !students.contains(&user_id) {
            students.push(user_id);
        }
    }

    pub fn classrooms(&self) -> &[Classroom] {
        &self.classrooms
    }

    pub fn schedules(&self) -> &[ScheduleEntry] {
        &self.schedules
    }

    pub fn courses(&self) -> impl Iterator<Item = CourseId> + '_ {
        self.course_classrooms.keys().copied()
    }
}

impl CourseDirectory for CampusRegistry {
    fn classrooms_for_course(&self, course_id: CourseId) -> Result<Vec<Classroom>, DirectoryError> {
        let rooms = self
            .course_classrooms
            .get(&course_id)
            .ok_or(DirectoryError::UnknownCourse(course_id))?;

        Ok(self
            .classrooms
            .iter()
            .filter(|classroom| rooms.contains(&classroom.id))
            .cloned()
            .collect())
    }

    fn active_schedules(&self, course_id: CourseId) -> Result<Vec<ScheduleEntry>, DirectoryError> {
        if !self.course_classrooms.contains_key(&course_id) {
            return Err(DirectoryError::UnknownCourse(course_id));
        }

        Ok(self
            .schedules
            .iter()
            .filter(|entry| entry.course_id == course_id && entry.is_active)
            .cloned()
            .collect())
    }

    fn enrolled_students(&self, course_id: CourseId) -> Result<Vec<UserId>, DirectoryError> {
        Ok(self.enrollments.get(&course_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug)]
pub enum RegistryImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidClassroom { id: i64, reason: String },
    InvalidSchedule { id: i64, reason: String },
}

impl std::fmt::Display for RegistryImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryImportError::Io(err) => write!(f, "failed to read registry export: {err}"),
            RegistryImportError::Csv(err) => write!(f, "invalid registry CSV data: {err}"),
            RegistryImportError::InvalidClassroom { id, reason } => {
                write!(f, "classroom {id} rejected: {reason}")
            }
            RegistryImportError::InvalidSchedule { id, reason } => {
                write!(f, "schedule entry {id} rejected: {reason}")
            }
        }
    }
}

impl std::error::Error for RegistryImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryImportError::Io(err) => Some(err),
            RegistryImportError::Csv(err) => Some(err),
            RegistryImportError::InvalidClassroom { .. }
            | RegistryImportError::InvalidSchedule { .. } => None,
        }
    }
}

impl From<std::io::Error> for RegistryImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RegistryImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}
