// lib/src/geo/geokit.rs
// Pure WGS84 helpers. Nothing in here performs I/O or suspends.

use models::errors::{ValidationError, ValidationResult};
use models::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Decimal places kept after normalization (about 11 cm at the equator).
const COORDINATE_PRECISION: f64 = 1_000_000.0;

/// Tolerance, in degrees, for deciding that a point lies on a polygon edge.
const EDGE_EPSILON: f64 = 1e-9;

/// Checks WGS84 bounds and returns the normalized point.
pub fn validate(latitude: f64, longitude: f64) -> ValidationResult<Coordinates> {
    let in_bounds = latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude);
    if !in_bounds {
        return Err(ValidationError::InvalidCoordinate { latitude, longitude });
    }
    let (latitude, longitude) = normalize(latitude, longitude);
    Ok(Coordinates::new(latitude, longitude))
}

/// Rounds both components to six decimals.
pub fn normalize(latitude: f64, longitude: f64) -> (f64, f64) {
    (round6(latitude), round6(longitude))
}

pub fn normalize_point(point: Coordinates) -> Coordinates {
    let (latitude, longitude) = normalize(point.latitude, point.longitude);
    Coordinates::new(latitude, longitude)
}

fn round6(value: f64) -> f64 {
    (value * COORDINATE_PRECISION).round() / COORDINATE_PRECISION
}

/// Great-circle distance in kilometres (haversine).
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn distance_m(a: Coordinates, b: Coordinates) -> f64 {
    distance_km(a, b) * 1000.0
}

/// Human readable distance: metres below one kilometre, otherwise one decimal km.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{} m", (km * 1000.0).round() as i64)
    } else {
        format!("{:.1} km", km)
    }
}

/// Ray-casting membership test. Points on an edge or vertex count as inside.
/// Polygons with fewer than three points contain nothing; self-intersecting
/// polygons give unspecified results.
pub fn point_in_polygon(point: Coordinates, boundary: &[Coordinates]) -> bool {
    if boundary.len() < 3 {
        return false;
    }

    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = boundary.len() - 1;

    for i in 0..boundary.len() {
        let (xi, yi) = (boundary[i].longitude, boundary[i].latitude);
        let (xj, yj) = (boundary[j].longitude, boundary[j].latitude);

        if on_segment(x, y, xi, yi, xj, yj) {
            return true;
        }
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn on_segment(x: f64, y: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
    let cross = (x - x1) * (y2 - y1) - (y - y1) * (x2 - x1);
    if cross.abs() > EDGE_EPSILON {
        return false;
    }
    x >= x1.min(x2) - EDGE_EPSILON
        && x <= x1.max(x2) + EDGE_EPSILON
        && y >= y1.min(y2) - EDGE_EPSILON
        && y <= y1.max(y2) + EDGE_EPSILON
}

/// Arithmetic mean of the boundary points, normalized. `None` for an empty slice.
pub fn centroid(boundary: &[Coordinates]) -> Option<Coordinates> {
    if boundary.is_empty() {
        return None;
    }
    let n = boundary.len() as f64;
    let (sum_lat, sum_lng) = boundary
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.latitude, lng + p.longitude));
    Some(normalize_point(Coordinates::new(sum_lat / n, sum_lng / n)))
}

/// Greedy visiting order over `mids` starting at `start`: indices into `mids`.
/// Ties go to the lowest index, so the result is deterministic.
pub fn nearest_neighbor_order(start: Coordinates, mids: &[Coordinates]) -> Vec<usize> {
    if mids.len() <= 1 {
        return (0..mids.len()).collect();
    }

    let mut remaining: Vec<usize> = (0..mids.len()).collect();
    let mut order = Vec::with_capacity(mids.len());
    let mut current = start;

    while !remaining.is_empty() {
        let mut best_slot = 0;
        let mut best_distance = f64::INFINITY;
        for (slot, &idx) in remaining.iter().enumerate() {
            let d = distance_km(current, mids[idx]);
            if d < best_distance {
                best_distance = d;
                best_slot = slot;
            }
        }
        let next = remaining.remove(best_slot);
        current = mids[next];
        order.push(next);
    }
    order
}

/// Full tour `start, mids (greedy order), end`. Not optimal, only cheap.
pub fn nearest_neighbor_tour(start: Coordinates, mids: &[Coordinates], end: Coordinates) -> Vec<Coordinates> {
    let mut tour = Vec::with_capacity(mids.len() + 2);
    tour.push(start);
    tour.extend(nearest_neighbor_order(start, mids).into_iter().map(|i| mids[i]));
    tour.push(end);
    tour
}
