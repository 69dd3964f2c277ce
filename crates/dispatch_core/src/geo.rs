//! Spatial operations: coordinates, great-circle distance and radius filtering.
//!
//! This module provides:
//!
//! - **Coordinate**: validated latitude/longitude pair in degrees
//! - **Distance calculations**: Haversine distance on a spherical Earth
//! - **Radius filter**: shortlist candidates around a center, nearest first
//!
//! Everything here is pure; the radius filter is exact over the candidate list
//! it is given, so callers decide which candidates are worth handing in.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for all great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::Latitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }
}

/// Great-circle distance between two coordinates in kilometres (Haversine).
///
/// The haversine term is clamped to `[0, 1]` before the inverse step: rounding
/// can push it a hair outside that range for coincident or antipodal points,
/// which would otherwise produce NaN.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = (sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon).clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Keep the candidates whose distance to `center` is at most `radius_km`.
///
/// Results are sorted ascending by distance; equal distances keep their input
/// order. A zero radius keeps only points coincident with the center, and a
/// negative or non-finite radius keeps nothing.
pub fn within_radius<I: Clone>(
    center: Coordinate,
    radius_km: f64,
    candidates: &[(I, Coordinate)],
) -> Vec<(I, f64)> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Vec::new();
    }

    let mut hits: Vec<(I, f64)> = candidates
        .iter()
        .filter_map(|(id, position)| {
            let distance = distance_km(center, *position);
            (distance <= radius_km).then(|| (id.clone(), distance))
        })
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1));
    hits
}

/// Shift a coordinate north by `km` along its meridian. Handy for building
/// fixtures at exact distances, since meridian arcs are exact under Haversine.
pub fn offset_north(origin: Coordinate, km: f64) -> Coordinate {
    Coordinate {
        lat: origin.lat + (km / EARTH_RADIUS_KM).to_degrees(),
        lng: origin.lng,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addis() -> Coordinate {
        Coordinate::new(9.02, 38.75).expect("valid coordinate")
    }

    #[test]
    fn distance_to_self_is_zero() {
        for point in [addis(), Coordinate { lat: 90.0, lng: 0.0 }, Coordinate { lat: -33.9, lng: 151.2 }] {
            assert_eq!(distance_km(point, point), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = addis();
        let b = Coordinate { lat: 8.9779, lng: 38.7993 };
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-12);
    }

    #[test]
    fn one_degree_of_longitude_on_the_equator() {
        let a = Coordinate { lat: 0.0, lng: 0.0 };
        let b = Coordinate { lat: 0.0, lng: 1.0 };
        let distance = distance_km(a, b);
        assert!((distance - 111.195).abs() < 0.01, "got {distance}");
    }

    #[test]
    fn antipodal_points_are_finite() {
        let a = Coordinate { lat: 0.0, lng: 0.0 };
        let b = Coordinate { lat: 0.0, lng: 180.0 };
        let distance = distance_km(a, b);
        assert!(distance.is_finite());
        assert!((distance - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn within_radius_filters_and_sorts() {
        let center = addis();
        let candidates = vec![
            ("far", offset_north(center, 6.0)),
            ("mid", offset_north(center, 3.0)),
            ("near", offset_north(center, 1.0)),
        ];

        let hits = within_radius(center, 5.0, &candidates);
        let ids: Vec<_> = hits.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!((hits[0].1 - 1.0).abs() < 1e-9);
        assert!((hits[1].1 - 3.0).abs() < 1e-9);
    }

    #[test]
    fn zero_radius_keeps_only_coincident_points() {
        let center = addis();
        let candidates = vec![(1, center), (2, offset_north(center, 0.001))];
        let hits = within_radius(center, 0.0, &candidates);
        assert_eq!(hits, vec![(1, 0.0)]);
    }

    #[test]
    fn negative_or_nan_radius_keeps_nothing() {
        let center = addis();
        let candidates = vec![(1, center)];
        assert!(within_radius(center, -1.0, &candidates).is_empty());
        assert!(within_radius(center, f64::NAN, &candidates).is_empty());
    }

    #[test]
    fn ties_keep_input_order() {
        let center = addis();
        let same = offset_north(center, 2.0);
        let hits = within_radius(center, 5.0, &[("b", same), ("a", same)]);
        assert_eq!(hits[0].0, "b");
        assert_eq!(hits[1].0, "a");
    }

    #[test]
    fn coordinate_rejects_out_of_range_values() {
        assert_eq!(Coordinate::new(91.0, 0.0), Err(CoordinateError::Latitude(91.0)));
        assert_eq!(Coordinate::new(0.0, -181.0), Err(CoordinateError::Longitude(-181.0)));
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }
}
