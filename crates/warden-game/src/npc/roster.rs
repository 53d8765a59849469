//! Officer roster: spawn, despawn, and look up live officers

use std::collections::BTreeMap;

use glam::Vec3;
use tracing::info;
use warden_core::AgentId;
use warden_world::{FacilityLayout, PatrolAssignment, PatrolRoute};

use super::agent::Agent;
use super::population::OfficerSpawner;
use super::{Officer, OfficerRole};
use crate::config::EngineConfig;
use crate::services::NavigationService;

/// Owns every live officer, keyed and iterated in id order
pub struct OfficerRoster {
    officers: BTreeMap<AgentId, Officer>,
    next_id: u64,
}

impl OfficerRoster {
    pub fn new() -> Self {
        Self {
            officers: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn next_officer_id(&mut self) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create an officer and register its agent with navigation
    pub fn spawn(
        &mut self,
        role: OfficerRole,
        position: Vec3,
        speed: f32,
        config: &EngineConfig,
        nav: &mut dyn NavigationService,
    ) -> AgentId {
        let id = self.next_officer_id();
        let agent = Agent::spawn(id, position, speed, config.agent.clone(), nav);
        self.officers.insert(id, Officer::new(agent, role, config));
        info!("{} on duty as {} at {:?}", id, role.name(), position);
        id
    }

    /// Remove an officer and its navigation agent
    pub fn despawn(&mut self, id: AgentId, nav: &mut dyn NavigationService) -> bool {
        match self.officers.remove(&id) {
            Some(officer) => {
                info!("{} off duty", id);
                officer.despawn(nav);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: AgentId) -> Option<&Officer> {
        self.officers.get(&id)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Officer> {
        self.officers.get_mut(&id)
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.officers.contains_key(&id)
    }

    /// Officer ids in ascending order
    pub fn ids(&self) -> Vec<AgentId> {
        self.officers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Officer> {
        self.officers.values()
    }

    /// Officers holding the given role, in id order
    pub fn with_role(&self, role: OfficerRole) -> Vec<AgentId> {
        self.officers
            .values()
            .filter(|o| o.role() == role)
            .map(|o| o.id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.officers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.officers.is_empty()
    }
}

impl Default for OfficerRoster {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets the population manager staff assignments from the roster
pub struct RosterSpawner<'a> {
    pub roster: &'a mut OfficerRoster,
    pub nav: &'a mut dyn NavigationService,
    pub layout: &'a FacilityLayout,
    pub config: &'a EngineConfig,
}

impl OfficerSpawner for RosterSpawner<'_> {
    fn spawn_patrol(&mut self, assignment: &PatrolAssignment, route: &PatrolRoute) -> Option<AgentId> {
        let start = route.waypoints.first().copied()?;
        let id = self.roster.spawn(OfficerRole::Patrol, start, route.speed, self.config, self.nav);
        let officer = self.roster.get_mut(id)?;
        officer.assign_patrol(assignment.id, route.clone(), self.nav);
        Some(id)
    }

    fn spawn_supervisor(&mut self) -> Option<AgentId> {
        let post = self.layout.supervisor_post;
        let speed = self.config.officers.supervisor_speed;
        let id = self.roster.spawn(OfficerRole::Supervisor, post, speed, self.config, self.nav);
        let officer = self.roster.get_mut(id)?;
        officer.assign_post(post);
        Some(id)
    }

    fn despawn(&mut self, officer: AgentId) {
        self.roster.despawn(officer, self.nav);
    }

    fn is_alive(&self, officer: AgentId) -> bool {
        self.roster
            .get(officer)
            .map(|o| o.agent().is_enabled())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::StraightLineNav;
    use crate::npc::activity::Activity;
    use crate::npc::population::{PopulationConfig, PopulationManager};
    use warden_core::AssignmentId;
    use warden_world::RouteRegistry;

    #[test]
    fn test_spawn_and_despawn() {
        let config = EngineConfig::default();
        let mut nav = StraightLineNav::new();
        let mut roster = OfficerRoster::new();
        let a = roster.spawn(OfficerRole::Intake, Vec3::ZERO, 3.0, &config, &mut nav);
        let b = roster.spawn(OfficerRole::Patrol, Vec3::ONE, 3.0, &config, &mut nav);
        assert_eq!(roster.ids(), vec![a, b]);
        assert_eq!(nav.agent_count(), 2);
        assert!(roster.get(a).unwrap().escort().is_some());
        assert_eq!(roster.with_role(OfficerRole::Patrol), vec![b]);

        assert!(roster.despawn(a, &mut nav));
        assert!(!roster.despawn(a, &mut nav));
        assert_eq!(nav.agent_count(), 1);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_spawner_staffs_assignments() {
        let config = EngineConfig::default();
        let layout = FacilityLayout::demo();
        let mut nav = StraightLineNav::new();
        let mut roster = OfficerRoster::new();
        let route = PatrolRoute::new("line", vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)]);
        let assignment = PatrolAssignment {
            id: AssignmentId(4),
            route: "line".to_string(),
        };

        let mut spawner = RosterSpawner {
            roster: &mut roster,
            nav: &mut nav,
            layout: &layout,
            config: &config,
        };
        let patrol = spawner.spawn_patrol(&assignment, &route).unwrap();
        let supervisor = spawner.spawn_supervisor().unwrap();
        assert!(spawner.is_alive(patrol));
        spawner.despawn(supervisor);
        assert!(!spawner.is_alive(supervisor));

        let officer = roster.get(patrol).unwrap();
        assert_eq!(officer.assignment(), Some(AssignmentId(4)));
        assert_eq!(officer.agent().position(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(officer.activity().activity(), Activity::Patrolling);
    }

    #[test]
    fn test_disabled_patrol_is_replaced_not_duplicated() {
        let config = EngineConfig::default();
        let layout = FacilityLayout::demo();
        let mut nav = StraightLineNav::new();
        let mut roster = OfficerRoster::new();
        let mut routes = RouteRegistry::new();
        routes
            .insert_route(PatrolRoute::new(
                "line",
                vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)],
            ))
            .unwrap();
        routes
            .add_assignment(PatrolAssignment {
                id: AssignmentId(1),
                route: "line".to_string(),
            })
            .unwrap();
        let mut pop = PopulationManager::new(PopulationConfig::default(), routes).unwrap();
        let subject = Some(Vec3::new(2.0, 0.0, 0.0));

        let mut spawner = RosterSpawner {
            roster: &mut roster,
            nav: &mut nav,
            layout: &layout,
            config: &config,
        };
        pop.update(0.0, subject, true, &mut spawner);
        let first = roster.with_role(OfficerRole::Patrol);
        assert_eq!(first.len(), 1);

        // The patrol loses its navigation component and disables itself
        nav.remove_agent(first[0]);
        roster.get_mut(first[0]).unwrap().agent_mut().tick(0.1, 0.1, &mut nav);
        assert!(!roster.get(first[0]).unwrap().agent().is_enabled());

        let mut spawner = RosterSpawner {
            roster: &mut roster,
            nav: &mut nav,
            layout: &layout,
            config: &config,
        };
        pop.update(0.2, subject, true, &mut spawner);
        let patrols = roster.with_role(OfficerRole::Patrol);
        assert_eq!(patrols.len(), 1);
        assert_ne!(patrols[0], first[0]);
        assert_eq!(pop.records().next().unwrap().officer, Some(patrols[0]));
    }
}
