use super::domain::Classroom;
use super::geo::{distance_meters, Coordinate, InvalidCoordinate};

/// Distances closer than this are treated as ties.
pub const TIE_TOLERANCE_METERS: f64 = 1e-6;

/// Closest classroom to a GPS fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceMatch<'a> {
    pub classroom: &'a Classroom,
    pub distance_meters: f64,
}

impl GeofenceMatch<'_> {
    /// Inclusive: a fix exactly on the boundary counts as inside.
    pub fn within_geofence(&self) -> bool {
        self.distance_meters <= self.classroom.geofence_radius_meters
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeofenceError {
    #[error("no classrooms available for geofence lookup")]
    NoClassroomsAvailable,
    #[error(transparent)]
    InvalidCoordinate(#[from] InvalidCoordinate),
}

/// Find the classroom nearest to `position`.
///
/// Equidistant classrooms resolve to the one that appears first in `classrooms`.
pub fn nearest<'a, I>(position: Coordinate, classrooms: I) -> Result<GeofenceMatch<'a>, GeofenceError>
where
    I: IntoIterator<Item = &'a Classroom>,
{
    let mut best: Option<GeofenceMatch<'a>> = None;

    for classroom in classrooms {
        let distance = distance_meters(position, classroom.location)?;
        let closer = match &best {
            Some(current) => distance < current.distance_meters - TIE_TOLERANCE_METERS,
            None => true,
        };
        if closer {
            best = Some(GeofenceMatch {
                classroom,
                distance_meters: distance,
            });
        }
    }

    best.ok_or(GeofenceError::NoClassroomsAvailable)
}
