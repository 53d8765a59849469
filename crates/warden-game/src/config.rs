//! Engine configuration
//!
//! Every tunable of every layer, grouped by concern. All fields have defaults
//! so a partial TOML file (or none at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use warden_core::TimeConfig;

use crate::npc::activity::ActivityConfig;
use crate::npc::agent::AgentConfig;
use crate::npc::door_nav::DoorNavConfig;
use crate::npc::escort::EscortConfig;
use crate::npc::population::{PopulationConfig, PopulationError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse engine config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize engine config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Population(#[from] PopulationError),

    #[error("invalid engine config: {0}")]
    Invalid(String),
}

/// Staffing and movement speeds for officers the engine spawns itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfficerConfig {
    /// Intake officers kept on duty at the post
    pub intake_count: u32,
    pub intake_speed: f32,
    pub supervisor_speed: f32,
}

impl Default for OfficerConfig {
    fn default() -> Self {
        Self {
            intake_count: 1,
            intake_speed: 3.5,
            supervisor_speed: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub time: TimeConfig,
    pub agent: AgentConfig,
    pub door_nav: DoorNavConfig,
    pub escort: EscortConfig,
    pub activity: ActivityConfig,
    pub population: PopulationConfig,
    pub officers: OfficerConfig,
    pub regions: RegionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Subject displacement that counts as significant movement
    pub movement_threshold: f32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 5.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings no layer can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.population.validate()?;
        if self.time.time_scale < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "time scale {} is negative",
                self.time.time_scale
            )));
        }
        if self.officers.intake_speed <= 0.0 || self.officers.supervisor_speed <= 0.0 {
            return Err(ConfigError::Invalid("officer speeds must be positive".into()));
        }
        if self.escort.fetch_delay_min < 0.0 || self.escort.fetch_delay_max < 0.0 {
            return Err(ConfigError::Invalid("fetch delays must not be negative".into()));
        }
        // Moves start after the clearance delay, so arrivals must not land
        // inside the cooldown that follows a door operation
        if self.escort.arrival_cooldown > self.escort.clearance_delay {
            return Err(ConfigError::Invalid(format!(
                "arrival cooldown {} exceeds door clearance delay {}",
                self.escort.arrival_cooldown, self.escort.clearance_delay
            )));
        }
        Ok(())
    }
}
