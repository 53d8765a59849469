//! Region and movement tracking for the tracked subject
//!
//! Turns a stream of subject positions into discrete notifications: entering a
//! different named region, or moving far enough from the last anchor point to
//! count as significant. The population manager reacts to both between ticks.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use warden_core::Aabb;

/// A named area of the facility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub bounds: Aabb,
}

impl Region {
    pub fn new(name: impl Into<String>, bounds: Aabb) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionEvent {
    /// The subject moved from one region (or none) into another (or none)
    RegionChanged {
        from: Option<String>,
        to: Option<String>,
    },
    /// The subject moved at least the configured threshold from the last anchor
    SignificantMovement { from: Vec3, to: Vec3 },
}

pub struct RegionTracker {
    regions: Vec<Region>,
    /// Distance that counts as significant movement
    pub movement_threshold: f32,
    current: Option<String>,
    anchor: Option<Vec3>,
}

impl RegionTracker {
    pub fn new(regions: Vec<Region>, movement_threshold: f32) -> Self {
        Self {
            regions,
            movement_threshold: movement_threshold.max(0.0),
            current: None,
            anchor: None,
        }
    }

    /// First region containing the position, in declaration order
    pub fn region_at(&self, pos: Vec3) -> Option<&str> {
        self.regions
            .iter()
            .find(|r| r.bounds.contains(pos))
            .map(|r| r.name.as_str())
    }

    /// Name of the region the subject was last seen in
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Feed a new subject position. The first update only establishes the
    /// anchor and the starting region.
    pub fn update(&mut self, pos: Vec3) -> Vec<RegionEvent> {
        let mut events = Vec::new();
        let region = self.region_at(pos).map(str::to_string);

        let Some(anchor) = self.anchor else {
            self.anchor = Some(pos);
            self.current = region;
            return events;
        };

        if region != self.current {
            events.push(RegionEvent::RegionChanged {
                from: self.current.take(),
                to: region.clone(),
            });
            self.current = region;
        }

        if anchor.distance(pos) >= self.movement_threshold {
            events.push(RegionEvent::SignificantMovement {
                from: anchor,
                to: pos,
            });
            self.anchor = Some(pos);
        }

        events
    }

    /// Forget the subject (e.g. after it despawns)
    pub fn reset(&mut self) {
        self.current = None;
        self.anchor = None;
    }
}
