//! Facility layout: posts, holding cells, processing stations, cells, and doors
//!
//! A layout is plain data. It is loaded once (from TOML or [`FacilityLayout::demo`])
//! and handed to the simulation, which owns it for its whole lifetime.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::info;
use warden_core::{Aabb, DoorId};

use crate::error::WorldError;
use crate::regions::Region;

/// Processing station visited during intake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationKind {
    Mugshot,
    Scanner,
    Storage,
}

impl StationKind {
    pub fn name(&self) -> &'static str {
        match self {
            StationKind::Mugshot => "Mugshot",
            StationKind::Scanner => "Scanner",
            StationKind::Storage => "Storage",
        }
    }
}

/// A holding cell or a housing cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSpec {
    pub index: u32,
    pub door: DoorId,
    /// Where an officer stands to operate the door
    pub door_point: Vec3,
    /// Interior volume, used to decide whether a subject is inside
    pub bounds: Aabb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSpec {
    pub kind: StationKind,
    pub point: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorSpec {
    pub id: DoorId,
    pub position: Vec3,
    /// Name used by the door subsystem's escort trigger API
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

/// Static description of one intake facility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityLayout {
    /// Where intake officers wait between sessions
    pub post: Vec3,
    /// Where the supervising officer stands
    pub supervisor_post: Vec3,
    #[serde(default)]
    pub holding_cells: Vec<CellSpec>,
    #[serde(default)]
    pub cells: Vec<CellSpec>,
    #[serde(default)]
    pub stations: Vec<StationSpec>,
    #[serde(default)]
    pub doors: Vec<DoorSpec>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl FacilityLayout {
    /// Parse and validate a layout from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, WorldError> {
        let layout: FacilityLayout = toml::from_str(content)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Load a layout file from disk
    pub fn load(path: &Path) -> Result<Self, WorldError> {
        let content =
            fs::read_to_string(path).map_err(|e| WorldError::Io(path.to_path_buf(), e))?;
        let layout = Self::from_toml_str(&content)?;
        info!(
            "Loaded facility layout from {:?} ({} doors, {} cells)",
            path,
            layout.doors.len(),
            layout.cells.len()
        );
        Ok(layout)
    }

    fn validate(&self) -> Result<(), WorldError> {
        let door_ids: HashSet<DoorId> = self.doors.iter().map(|d| d.id).collect();
        for (label, cells) in [("holding cell", &self.holding_cells), ("cell", &self.cells)] {
            let mut seen = HashSet::new();
            for cell in cells {
                if !seen.insert(cell.index) {
                    return Err(WorldError::DuplicateCell(label, cell.index));
                }
                if !door_ids.contains(&cell.door) {
                    return Err(WorldError::UnknownCellDoor(cell.index, cell.door.0));
                }
            }
        }
        Ok(())
    }

    pub fn holding_cell(&self, index: u32) -> Option<&CellSpec> {
        self.holding_cells.iter().find(|c| c.index == index)
    }

    pub fn cell(&self, index: u32) -> Option<&CellSpec> {
        self.cells.iter().find(|c| c.index == index)
    }

    pub fn station(&self, kind: StationKind) -> Option<&StationSpec> {
        self.stations.iter().find(|s| s.kind == kind)
    }

    pub fn door(&self, id: DoorId) -> Option<&DoorSpec> {
        self.doors.iter().find(|d| d.id == id)
    }

    /// Small two-wing facility used by the dry-run binary and tests.
    ///
    /// Holding cells sit north of the officer post, the processing stations run
    /// east along z = 0, and the housing cells sit further east. A corridor
    /// door between the holding wing and the stations is unlocked and has no
    /// trigger, so only door negotiation ever opens it.
    pub fn demo() -> Self {
        let cell = |index: u32, door: u32, x: f32| CellSpec {
            index,
            door: DoorId(door),
            door_point: Vec3::new(x, 0.0, 6.0),
            bounds: Aabb::new(Vec3::new(x - 2.0, 0.0, 8.5), Vec3::new(x + 2.0, 3.0, 12.0)),
        };
        let door = |id: u32, x: f32, z: f32, trigger: Option<&str>, locked: bool| DoorSpec {
            id: DoorId(id),
            position: Vec3::new(x, 0.0, z),
            trigger: trigger.map(str::to_string),
            locked,
        };

        Self {
            post: Vec3::ZERO,
            supervisor_post: Vec3::new(-4.0, 0.0, 0.0),
            holding_cells: vec![cell(1, 11, 4.0), cell(2, 12, 10.0)],
            cells: vec![cell(1, 21, 40.0), cell(2, 22, 46.0)],
            stations: vec![
                StationSpec {
                    kind: StationKind::Mugshot,
                    point: Vec3::new(20.0, 0.0, 0.0),
                },
                StationSpec {
                    kind: StationKind::Scanner,
                    point: Vec3::new(25.0, 0.0, 0.0),
                },
                StationSpec {
                    kind: StationKind::Storage,
                    point: Vec3::new(30.0, 0.0, 0.0),
                },
            ],
            doors: vec![
                door(11, 4.0, 8.0, Some("holding_1"), true),
                door(12, 10.0, 8.0, Some("holding_2"), true),
                door(21, 40.0, 8.0, Some("cell_1"), true),
                door(22, 46.0, 8.0, Some("cell_2"), true),
                door(30, 15.0, 3.0, None, false),
            ],
            regions: vec![
                Region::new(
                    "intake",
                    Aabb::new(Vec3::new(-10.0, -1.0, -10.0), Vec3::new(34.0, 5.0, 14.0)),
                ),
                Region::new(
                    "cellblock",
                    Aabb::new(Vec3::new(34.0, -1.0, -10.0), Vec3::new(60.0, 5.0, 20.0)),
                ),
                Region::new(
                    "yard",
                    Aabb::new(Vec3::new(-20.0, -1.0, 40.0), Vec3::new(40.0, 5.0, 100.0)),
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
post = [0.0, 0.0, 0.0]
supervisor_post = [-4.0, 0.0, 0.0]

[[holding_cells]]
index = 2
door = 12
door_point = [10.0, 0.0, 6.0]
bounds = { min = [8.0, 0.0, 8.5], max = [12.0, 3.0, 12.0] }

[[stations]]
kind = "mugshot"
point = [20.0, 0.0, 0.0]

[[doors]]
id = 12
position = [10.0, 0.0, 8.0]
trigger = "holding_2"
locked = true
"#;

    #[test]
    fn test_parse_layout() {
        let layout = FacilityLayout::from_toml_str(SAMPLE).unwrap();
        let holding = layout.holding_cell(2).unwrap();
        assert_eq!(holding.door, DoorId(12));
        assert!(holding.bounds.contains(Vec3::new(10.0, 1.0, 10.0)));
        assert_eq!(
            layout.station(StationKind::Mugshot).unwrap().point,
            Vec3::new(20.0, 0.0, 0.0)
        );
        assert!(layout.station(StationKind::Scanner).is_none());
        assert_eq!(layout.door(DoorId(12)).unwrap().trigger.as_deref(), Some("holding_2"));
        assert!(layout.cells.is_empty());
    }

    #[test]
    fn test_unknown_cell_door_rejected() {
        let bad = SAMPLE.replace("door = 12", "door = 99");
        let err = FacilityLayout::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, WorldError::UnknownCellDoor(2, 99)));
    }

    #[test]
    fn test_demo_layout_is_consistent() {
        let layout = FacilityLayout::demo();
        assert!(layout.validate().is_ok());
        for cell in layout.holding_cells.iter().chain(layout.cells.iter()) {
            let door = layout.door(cell.door).unwrap();
            assert!(door.trigger.is_some(), "cell doors are escort-operated");
            assert!(!cell.bounds.contains(cell.door_point), "door point must be outside");
        }
        for kind in [StationKind::Mugshot, StationKind::Scanner, StationKind::Storage] {
            assert!(layout.station(kind).is_some(), "{:?} missing", kind);
        }
    }

    #[test]
    fn test_demo_roundtrips_through_toml() {
        let layout = FacilityLayout::demo();
        let text = toml::to_string(&layout).unwrap();
        let parsed = FacilityLayout::from_toml_str(&text).unwrap();
        assert_eq!(parsed.doors.len(), layout.doors.len());
        assert_eq!(parsed.regions.len(), layout.regions.len());
    }
}
