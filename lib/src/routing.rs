// lib/src/routing.rs
// Straight-line route estimation. Legs use haversine distance and a
// per-mode average speed with a 20% stop/traffic buffer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geo;
use models::errors::{PlannerError, PlannerResult, ValidationError};
use models::Coordinates;

const STOP_BUFFER: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
}

impl TransportMode {
    pub fn speed_kmh(&self) -> f64 {
        match self {
            TransportMode::Driving => 30.0,
            TransportMode::Walking => 5.0,
            TransportMode::Bicycling => 10.0,
        }
    }

    /// Whole seconds needed to cover `distance_km`, rounded up.
    pub fn leg_seconds(&self, distance_km: f64) -> i64 {
        (distance_km / self.speed_kmh() * 3600.0 * STOP_BUFFER).ceil() as i64
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Driving => write!(f, "driving"),
            TransportMode::Walking => write!(f, "walking"),
            TransportMode::Bicycling => write!(f, "bicycling"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "driving" | "driver" => Ok(TransportMode::Driving),
            "walking" | "walker" => Ok(TransportMode::Walking),
            "bicycling" | "cycling" | "cyclist" => Ok(TransportMode::Bicycling),
            other => Err(PlannerError::BadRequest(format!("unknown transport mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub from: Coordinates,
    pub to: Coordinates,
    pub distance_km: f64,
    pub duration_seconds: i64,
    /// RFC 3339 on the wire.
    pub arrival_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub mode: TransportMode,
    pub waypoints: Vec<Coordinates>,
    /// `order[i]` is the input index of `waypoints[i]`.
    pub order: Vec<usize>,
    pub legs: Vec<RouteLeg>,
    pub total_distance_km: f64,
    pub total_duration_seconds: i64,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub optimized: bool,
}

/// Builds a route through `points`. With `optimize` and more than three
/// points the interior is reordered greedily; the ends stay pinned.
pub fn build_route(
    points: &[Coordinates],
    mode: TransportMode,
    departure_time: DateTime<Utc>,
    optimize: bool,
) -> PlannerResult<Route> {
    if points.len() < 2 {
        return Err(ValidationError::TooFewRoutePoints(points.len()).into());
    }
    let points: Vec<Coordinates> = points
        .iter()
        .map(|p| geo::validate(p.latitude, p.longitude))
        .collect::<Result<_, _>>()?;

    let last = points.len() - 1;
    let reorder = optimize && points.len() > 3;
    let order: Vec<usize> = if reorder {
        let mids = &points[1..last];
        let mut order = Vec::with_capacity(points.len());
        order.push(0);
        order.extend(geo::nearest_neighbor_order(points[0], mids).into_iter().map(|i| i + 1));
        order.push(last);
        order
    } else {
        (0..points.len()).collect()
    };
    let waypoints: Vec<Coordinates> = order.iter().map(|&i| points[i]).collect();

    let mut legs = Vec::with_capacity(waypoints.len() - 1);
    let mut clock = departure_time;
    let mut total_distance_km = 0.0;
    let mut total_duration_seconds = 0;
    for pair in waypoints.windows(2) {
        let distance_km = geo::distance_km(pair[0], pair[1]);
        let duration_seconds = mode.leg_seconds(distance_km);
        clock += Duration::seconds(duration_seconds);
        total_distance_km += distance_km;
        total_duration_seconds += duration_seconds;
        legs.push(RouteLeg {
            from: pair[0],
            to: pair[1],
            distance_km,
            duration_seconds,
            arrival_time: clock,
        });
    }

    Ok(Route {
        mode,
        waypoints,
        order,
        legs,
        total_distance_km,
        total_duration_seconds,
        departure_time,
        arrival_time: clock,
        optimized: reorder,
    })
}

/// Round trip from `chw_home` through every stop and back, always optimized.
/// `order` indexes the combined list `[home, stops.., home]`.
pub fn build_visit_route(
    chw_home: Coordinates,
    stops: &[Coordinates],
    mode: TransportMode,
    departure_time: DateTime<Utc>,
) -> PlannerResult<Route> {
    let mut points = Vec::with_capacity(stops.len() + 2);
    points.push(chw_home);
    points.extend_from_slice(stops);
    points.push(chw_home);
    build_route(&points, mode, departure_time, true)
}

impl Route {
    /// Indices into the stop list of a visit route, in travel order.
    pub fn stop_order(&self) -> Vec<usize> {
        let n = self.order.len();
        if n <= 2 {
            return Vec::new();
        }
        self.order[1..n - 1].iter().map(|&i| i - 1).collect()
    }
}
