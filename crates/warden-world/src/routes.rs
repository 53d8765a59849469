//! Patrol routes and the assignments that staff them

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::info;
use warden_core::{polyline_distance, AssignmentId};

use crate::error::WorldError;

/// A named loop of waypoints walked by one patrol officer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolRoute {
    pub name: String,
    pub waypoints: Vec<Vec3>,
    /// Walking speed in meters per second
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Seconds spent at each waypoint before moving on
    #[serde(default = "default_dwell")]
    pub dwell_time: f32,
}

fn default_speed() -> f32 {
    1.6
}

fn default_dwell() -> f32 {
    3.0
}

impl PatrolRoute {
    pub fn new(name: impl Into<String>, waypoints: Vec<Vec3>) -> Self {
        Self {
            name: name.into(),
            waypoints,
            speed: default_speed(),
            dwell_time: default_dwell(),
        }
    }

    /// Minimum distance from `p` to the route, over waypoints and the
    /// segments joining consecutive waypoints.
    pub fn distance_to(&self, p: Vec3) -> Option<f32> {
        polyline_distance(p, &self.waypoints)
    }
}

/// Binds an assignment id to the route its officer walks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolAssignment {
    pub id: AssignmentId,
    pub route: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<PatrolRoute>,
    #[serde(default)]
    assignments: Vec<PatrolAssignment>,
}

/// Every precomputed patrol route plus the assignments staffing them.
///
/// Constructed once and owned by the population manager.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<String, PatrolRoute>,
    assignments: Vec<PatrolAssignment>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, WorldError> {
        let file: RouteFile = toml::from_str(content)?;
        let mut registry = Self::new();
        for route in file.routes {
            registry.insert_route(route)?;
        }
        for assignment in file.assignments {
            registry.add_assignment(assignment)?;
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self, WorldError> {
        let content =
            fs::read_to_string(path).map_err(|e| WorldError::Io(path.to_path_buf(), e))?;
        let registry = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} routes and {} assignments from {:?}",
            registry.routes.len(),
            registry.assignments.len(),
            path
        );
        Ok(registry)
    }

    /// Add a route. Routes without waypoints are rejected.
    pub fn insert_route(&mut self, route: PatrolRoute) -> Result<(), WorldError> {
        if route.waypoints.is_empty() {
            return Err(WorldError::EmptyRoute(route.name));
        }
        if self.routes.contains_key(&route.name) {
            return Err(WorldError::DuplicateRoute(route.name));
        }
        self.routes.insert(route.name.clone(), route);
        Ok(())
    }

    /// Add an assignment. Its route must already be registered.
    pub fn add_assignment(&mut self, assignment: PatrolAssignment) -> Result<(), WorldError> {
        if !self.routes.contains_key(&assignment.route) {
            return Err(WorldError::UnknownRoute(assignment.id, assignment.route));
        }
        self.assignments.push(assignment);
        Ok(())
    }

    pub fn route(&self, name: &str) -> Option<&PatrolRoute> {
        self.routes.get(name)
    }

    pub fn routes(&self) -> impl Iterator<Item = &PatrolRoute> {
        self.routes.values()
    }

    pub fn assignments(&self) -> &[PatrolAssignment] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes matching [`warden_world::FacilityLayout::demo`](crate::FacilityLayout::demo):
    /// a yard loop far north of intake and a walk along the cellblock.
    pub fn demo() -> Self {
        let mut registry = Self::new();
        let routes = [
            PatrolRoute {
                name: "yard_loop".to_string(),
                waypoints: vec![
                    Vec3::new(0.0, 0.0, 60.0),
                    Vec3::new(20.0, 0.0, 60.0),
                    Vec3::new(20.0, 0.0, 80.0),
                    Vec3::new(0.0, 0.0, 80.0),
                ],
                speed: 1.4,
                dwell_time: 4.0,
            },
            PatrolRoute {
                name: "cellblock_walk".to_string(),
                waypoints: vec![Vec3::new(36.0, 0.0, 14.0), Vec3::new(50.0, 0.0, 14.0)],
                speed: 1.6,
                dwell_time: 2.0,
            },
        ];
        for (i, route) in routes.into_iter().enumerate() {
            let assignment = PatrolAssignment {
                id: AssignmentId(i as u32 + 1),
                route: route.name.clone(),
            };
            // Demo data is static and known to be valid
            if registry.insert_route(route).is_ok() {
                let _ = registry.add_assignment(assignment);
            }
        }
        registry
    }
}
