//! Circular arrangement of expanded cluster members
//!
//! Coordinates are treated as a flat local plane around the cluster center; no geodesic
//! correction is applied. The radius shrinks geometrically past the reference zoom so
//! the arrangement keeps a roughly constant on-screen size.

use crate::ExpansionConfig;
use geo::Point;
use serde::Serialize;
use std::f64::consts::PI;

/// Which ring a member was placed on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ring {
    Single,
    Inner,
    Outer,
}

/// Placement of one member
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RingPosition {
    /// Index into the member list
    pub index: usize,
    pub ring: Ring,
    /// Radians, counter-clockwise from east
    pub angle: f64,
    pub radius: f64,
    pub position: Point<f64>,
}

/// `R(zoom) = base / 2^max(0, zoom - reference_zoom)`
#[inline]
pub fn radius_at_zoom(base_radius: f64, reference_zoom: f64, zoom: f64) -> f64 {
    base_radius / 2f64.powf((zoom - reference_zoom).max(0.0))
}

/// Member counts on the inner and outer ring; `(n, 0)` for a single ring
pub fn ring_counts(n: usize, config: &ExpansionConfig) -> (usize, usize) {
    if n <= config.single_ring_max {
        return (n, 0);
    }
    let share = (n as f64 * config.inner_ring_share).floor() as usize;
    let inner = share.min(config.inner_ring_max);
    (inner, n - inner)
}

/// Place `n` members around `center`
pub fn arrange(center: Point<f64>, n: usize, zoom: f64, config: &ExpansionConfig) -> Vec<RingPosition> {
    #[cfg(feature = "profiling")]
    profiling::scope!("layout::arrange");

    let radius = radius_at_zoom(config.base_radius, config.reference_zoom, zoom);
    let place = |index: usize, ring: Ring, angle: f64, radius: f64| RingPosition {
        index,
        ring,
        angle,
        radius,
        position: Point::new(
            center.x() + radius * angle.cos(),
            center.y() + radius * angle.sin(),
        ),
    };

    if n <= config.single_ring_max {
        return (0..n)
            .map(|i| place(i, Ring::Single, 2.0 * PI * i as f64 / n as f64, radius))
            .collect();
    }

    let (inner, outer) = ring_counts(n, config);
    let inner_radius = config.inner_ring_factor * radius;
    let outer_radius = config.outer_ring_factor * radius;

    let mut positions = Vec::with_capacity(n);
    positions.extend(
        (0..inner).map(|i| place(i, Ring::Inner, 2.0 * PI * i as f64 / inner as f64, inner_radius)),
    );
    // Half-slot phase so outer members do not sit radially behind inner ones
    let phase = PI / outer as f64;
    positions.extend((0..outer).map(|j| {
        place(
            inner + j,
            Ring::Outer,
            2.0 * PI * j as f64 / outer as f64 + phase,
            outer_radius,
        )
    }));
    positions
}

/// Center of an expansion: the cluster's own coordinates when known, otherwise the mean
/// of member coordinates excluding the `(0, 0)` sentinel.
pub fn resolve_center(cluster_location: Option<Point<f64>>, members: &[Point<f64>]) -> Option<Point<f64>> {
    if let Some(location) = cluster_location {
        return Some(location);
    }
    let (sum_x, sum_y, count) = members
        .iter()
        .filter(|p| !(p.x() == 0.0 && p.y() == 0.0))
        .fold((0.0, 0.0, 0usize), |(x, y, n), p| (x + p.x(), y + p.y(), n + 1));
    (count > 0).then(|| Point::new(sum_x / count as f64, sum_y / count as f64))
}
