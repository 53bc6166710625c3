//! Geofence-based class attendance.
//!
//! The decision engine under [`workflows::attendance`] is a pure function of a GPS fix, the
//! classrooms attached to a course, its weekly schedule, and the current local time. The
//! service and router layers wrap it with persistence and HTTP ports.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
