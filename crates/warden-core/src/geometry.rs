//! Distance queries and bounds used by routes, doors, and cells

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Distance from `p` to the segment `a`-`b`, projecting onto the segment and
/// clamping to its endpoints.
pub fn point_segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Minimum distance from `p` to a polyline: over every point and every
/// segment joining consecutive points. `None` for an empty polyline.
pub fn polyline_distance(p: Vec3, points: &[Vec3]) -> Option<f32> {
    let first = points.first()?;
    let mut best = p.distance(*first);
    for pair in points.windows(2) {
        best = best.min(point_segment_distance(p, pair[0], pair[1]));
    }
    for point in &points[1..] {
        best = best.min(p.distance(*point));
    }
    Some(best)
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create bounds from two corners in any order
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create bounds centered on a point
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Whether the point lies inside (inclusive)
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}
