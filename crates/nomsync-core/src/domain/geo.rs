//! Geospatial identity for submissions and candidates
//!
//! Two records coming from different sources (the review platform and the
//! manually edited planner) never share an identifier until they have been
//! matched. They are correlated by location instead:
//!
//! - [`cell_id`] buckets a point into a cube-sphere cell. Two points with
//!   equal cell ids lie in the same cell, a few tens of meters across at the
//!   default level.
//! - [`distance_meters`] gives the great-circle distance used to decide
//!   whether two points in the same cell are close enough to be the same
//!   physical nomination.
//!
//! ## Projection
//!
//! ```text
//! (lat, lng) ──→ unit vector (x, y, z) ──→ face = dominant axis (+3 if negative)
//!            ──→ face-local (u, v) ──→ quadratic (s, t) ──→ (i, j) at 2^level
//! ```
//!
//! The quadratic step keeps cell areas close to uniform across a face.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Mean equatorial Earth radius used by the planner, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Subdivision level matching the review platform's spatial grid
pub const DEFAULT_CELL_LEVEL: u8 = 17;

/// Finest level whose per-axis grid still fits in a `u32`
pub const MAX_CELL_LEVEL: u8 = 30;

// ============================================================================
// GeoPoint
// ============================================================================

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns `true` when both components are finite and within range
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Unit vector on the sphere for this point
    fn to_unit_vector(self) -> [f64; 3] {
        let phi = self.lat.to_radians();
        let theta = self.lng.to_radians();
        let cos_phi = phi.cos();
        [cos_phi * theta.cos(), cos_phi * theta.sin(), phi.sin()]
    }
}

// ============================================================================
// CellId
// ============================================================================

/// Identifier of a cube-sphere cell at a given subdivision level
///
/// Equality means "same cell". The identifier is not meant to be turned
/// back into coordinates.
///
/// Rendered as `F{face}ij[{i},{j}]@{level}`, which is also the serialized
/// form stored in the candidate cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId {
    face: u8,
    level: u8,
    i: u32,
    j: u32,
}

impl CellId {
    /// Cube face, `0..=5`
    pub fn face(&self) -> u8 {
        self.face
    }

    /// Subdivision level the cell was computed at
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Quantized `(i, j)` coordinates on the face grid
    pub fn ij(&self) -> (u32, u32) {
        (self.i, self.j)
    }
}

impl Display for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "F{}ij[{},{}]@{}", self.face, self.i, self.j, self.level)
    }
}

impl FromStr for CellId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidCellId(s.to_string());

        let rest = s.strip_prefix('F').ok_or_else(invalid)?;
        let (face, rest) = rest.split_once("ij[").ok_or_else(invalid)?;
        let (coords, level) = rest.split_once("]@").ok_or_else(invalid)?;
        let (i, j) = coords.split_once(',').ok_or_else(invalid)?;

        let face: u8 = face.parse().map_err(|_| invalid())?;
        let level: u8 = level.parse().map_err(|_| invalid())?;
        let i: u32 = i.trim().parse().map_err(|_| invalid())?;
        let j: u32 = j.trim().parse().map_err(|_| invalid())?;

        if face > 5 || level > MAX_CELL_LEVEL {
            return Err(invalid());
        }
        let size = 1u64 << level;
        if u64::from(i) >= size || u64::from(j) >= size {
            return Err(invalid());
        }

        Ok(Self { face, level, i, j })
    }
}

impl TryFrom<String> for CellId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellId> for String {
    fn from(cell: CellId) -> Self {
        cell.to_string()
    }
}

// ============================================================================
// Projection
// ============================================================================

/// Picks the cube face from the dominant axis of the unit vector
fn face_of(xyz: [f64; 3]) -> u8 {
    let [x, y, z] = xyz;
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

    let axis = if ax >= ay && ax >= az {
        0
    } else if ay >= az {
        1
    } else {
        2
    };

    if xyz[axis] < 0.0 {
        axis as u8 + 3
    } else {
        axis as u8
    }
}

/// Face-local gnomonic coordinates, each in `[-1, 1]`
fn face_uv(face: u8, xyz: [f64; 3]) -> (f64, f64) {
    let [x, y, z] = xyz;
    match face {
        0 => (y / x, z / x),
        1 => (-x / y, z / y),
        2 => (-x / z, -y / z),
        3 => (z / x, y / x),
        4 => (z / y, -x / y),
        _ => (-y / z, -x / z),
    }
}

/// Quadratic re-parameterization from `[-1, 1]` to `[0, 1]`
fn uv_to_st(u: f64) -> f64 {
    if u >= 0.0 {
        0.5 * (1.0 + 3.0 * u).sqrt()
    } else {
        1.0 - 0.5 * (1.0 - 3.0 * u).sqrt()
    }
}

/// Quantizes `s` into `[0, size - 1]`
fn st_to_ij(s: f64, size: u64) -> u32 {
    let scaled = (s * size as f64).floor();
    let max = (size - 1) as f64;
    scaled.clamp(0.0, max) as u32
}

/// Computes the cell containing `point` at subdivision `level`
///
/// Levels above [`MAX_CELL_LEVEL`] are clamped to it.
pub fn cell_id(point: GeoPoint, level: u8) -> CellId {
    let level = level.min(MAX_CELL_LEVEL);
    let xyz = point.to_unit_vector();
    let face = face_of(xyz);
    let (u, v) = face_uv(face, xyz);

    let size = 1u64 << level;
    CellId {
        face,
        level,
        i: st_to_ij(uv_to_st(u), size),
        j: st_to_ij(uv_to_st(v), size),
    }
}

// ============================================================================
// Distance
// ============================================================================

/// Great-circle distance between two points using the haversine formula
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point `meters` due north of `p`
    fn north_of(p: GeoPoint, meters: f64) -> GeoPoint {
        GeoPoint::new(p.lat + (meters / EARTH_RADIUS_METERS).to_degrees(), p.lng)
    }

    #[test]
    fn test_faces_follow_dominant_axis() {
        assert_eq!(cell_id(GeoPoint::new(0.0, 0.0), 10).face(), 0);
        assert_eq!(cell_id(GeoPoint::new(0.0, 90.0), 10).face(), 1);
        assert_eq!(cell_id(GeoPoint::new(90.0, 0.0), 10).face(), 2);
        assert_eq!(cell_id(GeoPoint::new(0.0, 180.0), 10).face(), 3);
        assert_eq!(cell_id(GeoPoint::new(0.0, -90.0), 10).face(), 4);
        assert_eq!(cell_id(GeoPoint::new(-90.0, 0.0), 10).face(), 5);
    }

    #[test]
    fn test_cell_id_is_deterministic() {
        let p = GeoPoint::new(51.5007, -0.1246);
        assert_eq!(cell_id(p, DEFAULT_CELL_LEVEL), cell_id(p, DEFAULT_CELL_LEVEL));
    }

    #[test]
    fn test_face_center_lands_mid_grid() {
        let cell = cell_id(GeoPoint::new(0.0, 0.0), 4);
        assert_eq!(cell.ij(), (8, 8));
    }

    #[test]
    fn test_level_zero_is_whole_face() {
        let cell = cell_id(GeoPoint::new(12.0, 3.0), 0);
        assert_eq!(cell.ij(), (0, 0));
        assert_eq!(cell.level(), 0);
    }

    #[test]
    fn test_indices_stay_in_range_at_face_edges() {
        // 45 degrees of longitude on the equator sits on the boundary of faces 0 and 1
        for lng in [-45.0, 45.0, 135.0, -135.0] {
            let cell = cell_id(GeoPoint::new(0.0, lng), 12);
            let (i, j) = cell.ij();
            assert!(i < 1 << 12 && j < 1 << 12, "out of range at lng {lng}");
        }
    }

    #[test]
    fn test_level_is_clamped() {
        let cell = cell_id(GeoPoint::new(10.0, 10.0), 40);
        assert_eq!(cell.level(), MAX_CELL_LEVEL);
    }

    #[test]
    fn test_distant_points_differ() {
        let a = cell_id(GeoPoint::new(48.8584, 2.2945), DEFAULT_CELL_LEVEL);
        let b = cell_id(GeoPoint::new(48.8606, 2.3376), DEFAULT_CELL_LEVEL);
        assert_ne!(a, b);
    }

    #[test]
    fn test_default_cells_are_tens_of_meters() {
        // Walking north in 1 m steps, the cell must change within a few hundred meters
        let start = GeoPoint::new(40.7128, -74.0060);
        let origin = cell_id(start, DEFAULT_CELL_LEVEL);
        let changed = (1..300)
            .map(|m| north_of(start, m as f64))
            .any(|p| cell_id(p, DEFAULT_CELL_LEVEL) != origin);
        assert!(changed);
    }

    #[test]
    fn test_cell_id_text_round_trip() {
        let cell = cell_id(GeoPoint::new(-33.8568, 151.2153), DEFAULT_CELL_LEVEL);
        let text = cell.to_string();
        assert!(text.starts_with(&format!("F{}ij[", cell.face())));
        assert_eq!(text.parse::<CellId>().unwrap(), cell);
    }

    #[test]
    fn test_cell_id_rejects_garbage() {
        assert!("".parse::<CellId>().is_err());
        assert!("F7ij[0,0]@3".parse::<CellId>().is_err());
        assert!("F1ij[9,0]@3".parse::<CellId>().is_err());
        assert!("F1ij[a,b]@3".parse::<CellId>().is_err());
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = GeoPoint::new(35.6586, 139.7454);
        assert_eq!(distance_meters(p, p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(35.6586, 139.7454);
        let b = GeoPoint::new(35.7101, 139.8107);
        assert!((distance_meters(a, b) - distance_meters(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_distance_due_north_matches_arc_length() {
        let a = GeoPoint::new(10.0, 20.0);
        let b = north_of(a, 8.0);
        assert!((distance_meters(a, b) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_quarter_meridian() {
        let d = distance_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(90.0, 0.0));
        let expected = EARTH_RADIUS_METERS * std::f64::consts::FRAC_PI_2;
        assert!((d - expected).abs() < 1e-3);
    }

    #[test]
    fn test_geo_point_validity() {
        assert!(GeoPoint::new(0.0, 0.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }
}
