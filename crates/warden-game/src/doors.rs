//! Reference door subsystem
//!
//! Doors open and close asynchronously: a request takes `operation_time`
//! seconds and then reports completion or failure with the request's
//! [`DoorOpId`]. A door is leased to the operation in flight on it; a second
//! request is rejected with [`DoorError::Busy`] and the caller retries later.

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_core::{DoorId, DoorOpId};
use warden_world::FacilityLayout;

use crate::services::{DoorCommand, DoorError, DoorEvent, DoorSubsystem};

/// Injected hardware fault, for exercising failure paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DoorFault {
    #[default]
    None,
    /// Asynchronous operations fail; the direct command still works
    Jammed,
    /// Every command fails
    Dead,
}

#[derive(Debug, Clone)]
struct DoorOperation {
    op: DoorOpId,
    command: DoorCommand,
    remaining: f32,
}

#[derive(Debug, Clone)]
pub struct DoorState {
    pub id: DoorId,
    pub position: Vec3,
    pub trigger: Option<String>,
    pub is_open: bool,
    pub is_locked: bool,
    pub fault: DoorFault,
    in_flight: Option<DoorOperation>,
}

pub struct DoorSystem {
    doors: BTreeMap<DoorId, DoorState>,
    triggers: HashMap<String, DoorId>,
    operation_time: f32,
    next_op: u64,
    events: Vec<DoorEvent>,
}

impl DoorSystem {
    pub fn new(operation_time: f32) -> Self {
        Self {
            doors: BTreeMap::new(),
            triggers: HashMap::new(),
            operation_time: operation_time.max(0.0),
            next_op: 1,
            events: Vec::new(),
        }
    }

    /// Build a closed door for every door in the layout
    pub fn from_layout(layout: &FacilityLayout, operation_time: f32) -> Self {
        let mut system = Self::new(operation_time);
        for door in &layout.doors {
            system.add_door(door.id, door.position, door.trigger.clone(), door.locked);
        }
        system
    }

    pub fn add_door(
        &mut self,
        id: DoorId,
        position: Vec3,
        trigger: Option<String>,
        is_locked: bool,
    ) {
        if let Some(name) = &trigger {
            self.triggers.insert(name.clone(), id);
        }
        self.doors.insert(
            id,
            DoorState {
                id,
                position,
                trigger,
                is_open: false,
                is_locked,
                fault: DoorFault::None,
                in_flight: None,
            },
        );
    }

    pub fn set_fault(&mut self, door: DoorId, fault: DoorFault) {
        if let Some(state) = self.doors.get_mut(&door) {
            state.fault = fault;
        }
    }

    pub fn door(&self, door: DoorId) -> Option<&DoorState> {
        self.doors.get(&door)
    }

    pub fn doors(&self) -> impl Iterator<Item = &DoorState> {
        self.doors.values()
    }

    /// Whether an operation is in flight on the door
    pub fn is_busy(&self, door: DoorId) -> bool {
        self.doors
            .get(&door)
            .map(|d| d.in_flight.is_some())
            .unwrap_or(false)
    }

    /// Doors currently standing open
    pub fn open_doors(&self) -> Vec<DoorId> {
        self.doors
            .values()
            .filter(|d| d.is_open)
            .map(|d| d.id)
            .collect()
    }

    /// Advance operations in flight, completing those whose time is up
    pub fn update(&mut self, delta: f32) {
        for state in self.doors.values_mut() {
            let Some(operation) = state.in_flight.as_mut() else {
                continue;
            };
            operation.remaining -= delta;
            if operation.remaining > 0.0 {
                continue;
            }
            let Some(operation) = state.in_flight.take() else {
                continue;
            };

            if state.fault != DoorFault::None {
                warn!("{} failed to {}: {:?}", state.id, operation.command, state.fault);
                self.events.push(DoorEvent::Failed {
                    op: operation.op,
                    door: state.id,
                    command: operation.command,
                    reason: format!("{:?}", state.fault).to_lowercase(),
                });
                continue;
            }

            state.is_open = operation.command == DoorCommand::Open;
            debug!("{} finished {}", state.id, operation.command);
            self.events.push(DoorEvent::Completed {
                op: operation.op,
                door: state.id,
                command: operation.command,
            });
        }
    }

    fn start_operation(
        &mut self,
        door: DoorId,
        command: DoorCommand,
        bypass_lock: bool,
    ) -> Result<DoorOpId, DoorError> {
        let operation_time = self.operation_time;
        let state = self
            .doors
            .get_mut(&door)
            .ok_or(DoorError::UnknownDoor(door))?;
        if state.in_flight.is_some() {
            return Err(DoorError::Busy(door));
        }
        if command == DoorCommand::Open && state.is_locked {
            if !bypass_lock {
                return Err(DoorError::Locked(door));
            }
            if state.fault == DoorFault::None {
                state.is_locked = false;
            }
        }

        let op = DoorOpId(self.next_op);
        self.next_op += 1;
        state.in_flight = Some(DoorOperation {
            op,
            command,
            remaining: operation_time,
        });
        debug!("{} {} requested ({:?})", door, command, op);
        Ok(op)
    }
}

impl DoorSubsystem for DoorSystem {
    fn door_position(&self, door: DoorId) -> Option<Vec3> {
        self.doors.get(&door).map(|d| d.position)
    }

    fn doors_within(&self, center: Vec3, radius: f32) -> Vec<DoorId> {
        self.doors
            .values()
            .filter(|d| d.position.distance(center) <= radius)
            .map(|d| d.id)
            .collect()
    }

    fn is_closed(&self, door: DoorId) -> bool {
        self.doors.get(&door).map(|d| !d.is_open).unwrap_or(false)
    }

    fn is_locked(&self, door: DoorId) -> bool {
        self.doors.get(&door).map(|d| d.is_locked).unwrap_or(false)
    }

    fn trigger_name(&self, door: DoorId) -> Option<String> {
        self.doors.get(&door).and_then(|d| d.trigger.clone())
    }

    fn request(&mut self, door: DoorId, command: DoorCommand) -> Result<DoorOpId, DoorError> {
        self.start_operation(door, command, false)
    }

    fn trigger(&mut self, name: &str, command: DoorCommand) -> Result<DoorOpId, DoorError> {
        let door = *self
            .triggers
            .get(name)
            .ok_or_else(|| DoorError::UnknownTrigger(name.to_string()))?;
        self.start_operation(door, command, true)
    }

    fn force(&mut self, door: DoorId, command: DoorCommand) -> Result<(), DoorError> {
        let state = self
            .doors
            .get_mut(&door)
            .ok_or(DoorError::UnknownDoor(door))?;
        if state.fault == DoorFault::Dead {
            return Err(DoorError::Jammed(door));
        }
        if let Some(overridden) = state.in_flight.take() {
            self.events.push(DoorEvent::Failed {
                op: overridden.op,
                door,
                command: overridden.command,
                reason: "overridden".to_string(),
            });
        }
        state.is_open = command == DoorCommand::Open;
        if state.is_open {
            state.is_locked = false;
        }
        debug!("{} forced {}", door, command);
        Ok(())
    }

    fn set_locked(&mut self, door: DoorId, locked: bool) -> Result<(), DoorError> {
        let state = self
            .doors
            .get_mut(&door)
            .ok_or(DoorError::UnknownDoor(door))?;
        state.is_locked = locked;
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<DoorEvent> {
        std::mem::take(&mut self.events)
    }
}
