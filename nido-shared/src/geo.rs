/// GeoJSON point type and geometric search helpers
///
/// This module provides the `GeoPoint` type used for property locations and
/// the geometric primitives behind radius and polygon search.
///
/// # Coordinate Order
///
/// GeoJSON stores coordinates as `[longitude, latitude]`. Every function in
/// this module takes longitude first. Swapping the order is the classic bug
/// with this format, so the accessors are named explicitly.
///
/// # Example
///
/// ```
/// use nido_shared::geo::GeoPoint;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let milan = GeoPoint::new(9.19, 45.4642)?;
/// let rome = GeoPoint::new(12.4964, 41.9028)?;
///
/// let km = milan.haversine_km(&rome);
/// assert!(km > 470.0 && km < 490.0);
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers, used for Haversine distance
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Maximum allowed radius for a radius search, in kilometers
pub const MAX_SEARCH_RADIUS_KM: f64 = 500.0;

/// Minimum number of points in a search polygon
pub const MIN_POLYGON_POINTS: usize = 3;

/// Maximum number of points in a search polygon
pub const MAX_POLYGON_POINTS: usize = 100;

/// Error type for geographic validation
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// Longitude outside [-180, 180]
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// Latitude outside [-90, 90]
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Geometry type is not "Point"
    #[error("expected GeoJSON type \"Point\", got \"{0}\"")]
    NotAPoint(String),

    /// Polygon point count outside the allowed window
    #[error("polygon must have between {MIN_POLYGON_POINTS} and {MAX_POLYGON_POINTS} points, got {0}")]
    PolygonSize(usize),

    /// Radius outside (0, MAX_SEARCH_RADIUS_KM]
    #[error("search radius must be greater than 0 and at most {MAX_SEARCH_RADIUS_KM} km, got {0}")]
    RadiusOutOfRange(f64),
}

/// A GeoJSON Point with `[longitude, latitude]` coordinates
///
/// Serialized as the standard GeoJSON wire shape:
///
/// ```json
/// { "type": "Point", "coordinates": [9.19, 45.4642] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Always "Point"
    #[serde(rename = "type")]
    pub kind: String,

    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    /// Creates a validated point from longitude and latitude
    ///
    /// # Errors
    ///
    /// Returns `GeoError` if either coordinate is out of range or not finite.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, GeoError> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::LongitudeOutOfRange(longitude));
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::LatitudeOutOfRange(latitude));
        }

        Ok(Self {
            kind: "Point".to_string(),
            coordinates: [longitude, latitude],
        })
    }

    /// Validates a point deserialized from untrusted input
    ///
    /// Checks the GeoJSON type tag and both coordinate ranges.
    pub fn validate(&self) -> Result<(), GeoError> {
        if self.kind != "Point" {
            return Err(GeoError::NotAPoint(self.kind.clone()));
        }
        Self::new(self.coordinates[0], self.coordinates[1]).map(|_| ())
    }

    /// Longitude (east-west), first GeoJSON coordinate
    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    /// Latitude (north-south), second GeoJSON coordinate
    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }

    /// Great-circle distance to another point in kilometers (Haversine)
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude().to_radians();
        let lat2 = other.latitude().to_radians();
        let d_lat = (other.latitude() - self.latitude()).to_radians();
        let d_lng = (other.longitude() - self.longitude()).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }

    /// Axis-aligned bounding box around this point for a radius in km
    ///
    /// Returns `(min_lng, min_lat, max_lng, max_lat)`. Used as a cheap SQL
    /// prefilter before the exact Haversine check. The longitude span widens
    /// with latitude; near the poles the box degenerates to the full range.
    pub fn bounding_box(&self, radius_km: f64) -> (f64, f64, f64, f64) {
        let lat_delta = radius_km / 111.045;
        let cos_lat = self.latitude().to_radians().cos();
        let lng_delta = if cos_lat.abs() < 1e-6 {
            180.0
        } else {
            radius_km / (111.045 * cos_lat.abs())
        };

        (
            (self.longitude() - lng_delta).max(-180.0),
            (self.latitude() - lat_delta).max(-90.0),
            (self.longitude() + lng_delta).min(180.0),
            (self.latitude() + lat_delta).min(90.0),
        )
    }
}

/// Validates a radius for radius search
///
/// Accepts values in `(0, MAX_SEARCH_RADIUS_KM]`.
pub fn validate_radius_km(radius_km: f64) -> Result<(), GeoError> {
    if !radius_km.is_finite() || radius_km <= 0.0 || radius_km > MAX_SEARCH_RADIUS_KM {
        return Err(GeoError::RadiusOutOfRange(radius_km));
    }
    Ok(())
}

/// Validates a polygon ring for polygon search
///
/// The ring is a list of `[longitude, latitude]` pairs. Between 3 and 100
/// points, each within coordinate range. The ring does not need to repeat
/// its first point; closure is implicit.
pub fn validate_polygon(ring: &[[f64; 2]]) -> Result<(), GeoError> {
    if ring.len() < MIN_POLYGON_POINTS || ring.len() > MAX_POLYGON_POINTS {
        return Err(GeoError::PolygonSize(ring.len()));
    }
    for point in ring {
        GeoPoint::new(point[0], point[1])?;
    }
    Ok(())
}

/// Tests whether a point lies inside a polygon ring (ray casting)
///
/// The ring closes implicitly: the edge from the last point back to the
/// first is always considered. Points exactly on an edge may fall on either
/// side; property search treats that as acceptable.
pub fn point_in_polygon(point: &GeoPoint, ring: &[[f64; 2]]) -> bool {
    let x = point.longitude();
    let y = point.latitude();
    let n = ring.len();
    if n < MIN_POLYGON_POINTS {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);

        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid_point() {
        let point = GeoPoint::new(9.19, 45.4642).expect("valid point");
        assert_eq!(point.kind, "Point");
        assert_eq!(point.longitude(), 9.19);
        assert_eq!(point.latitude(), 45.4642);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(matches!(
            GeoPoint::new(181.0, 0.0),
            Err(GeoError::LongitudeOutOfRange(_))
        ));
        assert!(matches!(
            GeoPoint::new(-180.5, 0.0),
            Err(GeoError::LongitudeOutOfRange(_))
        ));
        assert!(matches!(
            GeoPoint::new(0.0, 90.1),
            Err(GeoError::LatitudeOutOfRange(_))
        ));
        assert!(matches!(
            GeoPoint::new(0.0, f64::NAN),
            Err(GeoError::LatitudeOutOfRange(_))
        ));
    }

    #[test]
    fn test_boundary_values_accepted() {
        assert!(GeoPoint::new(-180.0, -90.0).is_ok());
        assert!(GeoPoint::new(180.0, 90.0).is_ok());
        assert!(GeoPoint::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let point = GeoPoint::new(12.4964, 41.9028).unwrap();
        let json = serde_json::to_string(&point).unwrap();
        assert!(json.contains("\"type\":\"Point\""));

        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_type_tag() {
        let json = r#"{"type":"Polygon","coordinates":[9.19,45.46]}"#;
        let point: GeoPoint = serde_json::from_str(json).unwrap();
        assert!(matches!(point.validate(), Err(GeoError::NotAPoint(_))));
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        // One degree of latitude along a meridian is roughly 111.19 km
        let a = GeoPoint::new(0.0, 0.0).unwrap();
        let b = GeoPoint::new(0.0, 1.0).unwrap();
        let km = a.haversine_km(&b);
        assert!((km - 111.19).abs() < 0.5, "got {}", km);
    }

    #[test]
    fn test_haversine_milan_rome() {
        let milan = GeoPoint::new(9.19, 45.4642).unwrap();
        let rome = GeoPoint::new(12.4964, 41.9028).unwrap();
        let km = milan.haversine_km(&rome);
        assert!(km > 470.0 && km < 490.0, "got {}", km);
    }

    #[test]
    fn test_haversine_zero_distance() {
        let point = GeoPoint::new(9.19, 45.4642).unwrap();
        assert!(point.haversine_km(&point) < 1e-9);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = GeoPoint::new(9.19, 45.4642).unwrap();
        let b = GeoPoint::new(12.4964, 41.9028).unwrap();
        assert!((a.haversine_km(&b) - b.haversine_km(&a)).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_contains_circle() {
        let center = GeoPoint::new(9.19, 45.4642).unwrap();
        let (min_lng, min_lat, max_lng, max_lat) = center.bounding_box(10.0);

        assert!(min_lng < center.longitude() && center.longitude() < max_lng);
        assert!(min_lat < center.latitude() && center.latitude() < max_lat);

        // A point 10 km due north must still be inside the box
        let north = GeoPoint::new(9.19, 45.4642 + 10.0 / 111.045).unwrap();
        assert!(north.latitude() <= max_lat + 1e-9);
    }

    #[test]
    fn test_validate_radius() {
        assert!(validate_radius_km(1.0).is_ok());
        assert!(validate_radius_km(500.0).is_ok());
        assert!(validate_radius_km(0.0).is_err());
        assert!(validate_radius_km(-5.0).is_err());
        assert!(validate_radius_km(500.1).is_err());
        assert!(validate_radius_km(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_polygon_size() {
        let two = vec![[0.0, 0.0], [1.0, 0.0]];
        assert!(matches!(
            validate_polygon(&two),
            Err(GeoError::PolygonSize(2))
        ));

        let three = vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert!(validate_polygon(&three).is_ok());

        let many: Vec<[f64; 2]> = (0..101).map(|i| [i as f64 * 0.001, 0.0]).collect();
        assert!(matches!(
            validate_polygon(&many),
            Err(GeoError::PolygonSize(101))
        ));
    }

    #[test]
    fn test_validate_polygon_rejects_bad_coordinates() {
        let ring = vec![[0.0, 0.0], [200.0, 0.0], [0.0, 1.0]];
        assert!(matches!(
            validate_polygon(&ring),
            Err(GeoError::LongitudeOutOfRange(_))
        ));
    }

    #[test]
    fn test_point_in_polygon_square() {
        // Unit square, ring not explicitly closed
        let square = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let inside = GeoPoint::new(0.5, 0.5).unwrap();
        assert!(point_in_polygon(&inside, &square));

        let outside = GeoPoint::new(1.5, 0.5).unwrap();
        assert!(!point_in_polygon(&outside, &square));

        let far = GeoPoint::new(-10.0, -10.0).unwrap();
        assert!(!point_in_polygon(&far, &square));
    }

    #[test]
    fn test_point_in_polygon_implicit_closure() {
        // Triangle whose closing edge (last -> first) is the hypotenuse;
        // a point near that edge only resolves correctly if closure holds
        let triangle = vec![[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]];

        let inside = GeoPoint::new(1.0, 1.0).unwrap();
        assert!(point_in_polygon(&inside, &triangle));

        let beyond_hypotenuse = GeoPoint::new(3.0, 3.0).unwrap();
        assert!(!point_in_polygon(&beyond_hypotenuse, &triangle));
    }

    #[test]
    fn test_point_in_polygon_concave() {
        // L-shape: the notch at the top right is outside
        let l_shape = vec![
            [0.0, 0.0],
            [4.0, 0.0],
            [4.0, 2.0],
            [2.0, 2.0],
            [2.0, 4.0],
            [0.0, 4.0],
        ];

        let in_base = GeoPoint::new(3.0, 1.0).unwrap();
        assert!(point_in_polygon(&in_base, &l_shape));

        let in_notch = GeoPoint::new(3.0, 3.0).unwrap();
        assert!(!point_in_polygon(&in_notch, &l_shape));
    }
}
