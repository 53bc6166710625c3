use super::common::*;
use crate::workflows::attendance::geo::{distance_meters, Coordinate, InvalidCoordinate};
use crate::workflows::attendance::geofence::{nearest, GeofenceError};

#[test]
fn distance_is_symmetric_and_zero_on_identity() {
    let a = campus();
    let b = Coordinate::new(4.6351, -74.0703).expect("valid");

    let forward = distance_meters(a, b).expect("valid inputs");
    let backward = distance_meters(b, a).expect("valid inputs");

    assert!((forward - backward).abs() < 1e-9);
    assert_eq!(distance_meters(a, a).expect("valid inputs"), 0.0);
}

#[test]
fn one_degree_of_longitude_on_the_equator() {
    let origin = Coordinate::new(0.0, 0.0).expect("valid");
    let east = Coordinate::new(0.0, 1.0).expect("valid");

    let distance = distance_meters(origin, east).expect("valid inputs");
    assert!(
        (distance - 111_195.0).abs() < 111_195.0 * 0.01,
        "got {distance}"
    );
}

#[test]
fn short_distances_are_accurate_to_the_centimeter() {
    for meters in [1.0, 8.0, 60.0, 250.0, 999.0] {
        let target = offset_north(campus(), meters);
        let distance = distance_meters(campus(), target).expect("valid inputs");
        assert!((distance - meters).abs() < 0.01, "{meters} m measured as {distance}");
    }
}

#[test]
fn antipodal_points_stay_finite() {
    let a = Coordinate::new(0.0, 0.0).expect("valid");
    let b = Coordinate::new(0.0, 180.0).expect("valid");
    let distance = distance_meters(a, b).expect("valid inputs");
    assert!(distance.is_finite());
    assert!(distance > 20_000_000.0);
}

#[test]
fn out_of_range_coordinates_are_rejected_not_clamped() {
    assert!(Coordinate::new(90.5, 0.0).is_err());
    assert!(Coordinate::new(0.0, -180.01).is_err());
    assert!(Coordinate::new(f64::NAN, 0.0).is_err());

    let bogus = Coordinate {
        latitude: 123.0,
        longitude: 10.0,
    };
    assert_eq!(
        distance_meters(bogus, campus()),
        Err(InvalidCoordinate {
            latitude: 123.0,
            longitude: 10.0
        })
    );
}

#[test]
fn nearest_fails_without_classrooms() {
    let rooms: Vec<crate::workflows::attendance::Classroom> = Vec::new();
    assert_eq!(
        nearest(campus(), &rooms),
        Err(GeofenceError::NoClassroomsAvailable)
    );
}

#[test]
fn nearest_picks_the_closest_classroom() {
    let rooms = vec![
        classroom(1, offset_north(campus(), 10.0), 20.0),
        classroom(2, offset_north(campus(), 5.0), 20.0),
    ];

    let found = nearest(campus(), &rooms).expect("classrooms available");
    assert_eq!(found.classroom.id.0, 2);
    assert!((found.distance_meters - 5.0).abs() < 1e-6);
    assert!(found.within_geofence());
}

#[test]
fn equidistant_classrooms_resolve_to_input_order() {
    let spot = offset_north(campus(), 12.0);
    let rooms = vec![classroom(7, spot, 20.0), classroom(3, spot, 20.0)];

    let found = nearest(campus(), &rooms).expect("classrooms available");
    assert_eq!(found.classroom.id.0, 7);

    let reversed = vec![rooms[1].clone(), rooms[0].clone()];
    let found = nearest(campus(), &reversed).expect("classrooms available");
    assert_eq!(found.classroom.id.0, 3);
}

#[test]
fn geofence_boundary_is_inclusive() {
    let room = classroom(1, campus(), 10.0);
    let rooms = [room];
    let found = nearest(offset_north(campus(), 9.999_999), &rooms).expect("classroom available");
    assert!(found.within_geofence());

    let found = nearest(offset_north(campus(), 10.01), &rooms).expect("classroom available");
    assert!(!found.within_geofence());
}

#[test]
fn nearest_rejects_invalid_classroom_locations() {
    let mut broken = classroom(1, campus(), 10.0);
    broken.location.longitude = 200.0;

    assert!(matches!(
        nearest(campus(), &[broken]),
        Err(GeofenceError::InvalidCoordinate(_))
    ));
}
