//! Escort compliance and patience
//!
//! While escorting, the officer measures its distance to the subject every
//! tick. Staying inside the perfect band regenerates patience; anything
//! further out drains it, faster the further away the subject is. Past the
//! warning distance the officer speaks up, at most once per cooldown, with a
//! line chosen by how far out the subject is.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Band edges in meters, innermost first
    pub perfect_distance: f32,
    pub warning_distance: f32,
    pub violation_distance: f32,
    pub escape_distance: f32,
    /// Patience per second regained inside the perfect band
    pub regen_rate: f32,
    /// Patience per second lost between the perfect and warning edges
    pub drift_decay: f32,
    pub warning_decay: f32,
    pub violation_decay: f32,
    pub escape_decay: f32,
    /// Minimum seconds between two verbal responses
    pub warning_cooldown: f32,
    pub initial_patience: f32,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            perfect_distance: 2.0,
            warning_distance: 4.0,
            violation_distance: 6.0,
            escape_distance: 8.0,
            regen_rate: 5.0,
            drift_decay: 1.0,
            warning_decay: 2.0,
            violation_decay: 5.0,
            escape_decay: 10.0,
            warning_cooldown: 4.0,
            initial_patience: MAX_PATIENCE,
        }
    }
}

pub const MAX_PATIENCE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceBand {
    Perfect,
    Drifting,
    Warning,
    Violation,
    Escape,
}

/// Verbal response to a subject lagging behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceResponse {
    StayCloser,
    TooFar,
    StopAndReturn,
}

impl ComplianceResponse {
    pub fn line(&self) -> &'static str {
        match self {
            ComplianceResponse::StayCloser => "Stay close to me.",
            ComplianceResponse::TooFar => "You're too far. Get back here.",
            ComplianceResponse::StopAndReturn => "Stop right there and come back!",
        }
    }
}

/// What one update produced
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComplianceUpdate {
    pub response: Option<ComplianceResponse>,
    /// Set on the single update where patience first hits zero
    pub exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct ComplianceTracker {
    config: ComplianceConfig,
    patience: f32,
    violations: u32,
    last_warning_at: Option<f64>,
    exhausted: bool,
}

impl ComplianceTracker {
    pub fn new(config: ComplianceConfig) -> Self {
        let patience = config.initial_patience;
        Self::with_patience(config, patience)
    }

    pub fn with_patience(config: ComplianceConfig, patience: f32) -> Self {
        Self {
            config,
            patience: patience.clamp(0.0, MAX_PATIENCE),
            violations: 0,
            last_warning_at: None,
            exhausted: false,
        }
    }

    pub fn patience(&self) -> f32 {
        self.patience
    }

    /// Verbal responses issued so far
    pub fn violations(&self) -> u32 {
        self.violations
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn band(&self, distance: f32) -> DistanceBand {
        let c = &self.config;
        if distance <= c.perfect_distance {
            DistanceBand::Perfect
        } else if distance <= c.warning_distance {
            DistanceBand::Drifting
        } else if distance <= c.violation_distance {
            DistanceBand::Warning
        } else if distance <= c.escape_distance {
            DistanceBand::Violation
        } else {
            DistanceBand::Escape
        }
    }

    pub fn update(&mut self, distance: f32, now: f64, delta: f32) -> ComplianceUpdate {
        let band = self.band(distance);
        let rate = match band {
            DistanceBand::Perfect => self.config.regen_rate,
            DistanceBand::Drifting => -self.config.drift_decay,
            DistanceBand::Warning => -self.config.warning_decay,
            DistanceBand::Violation => -self.config.violation_decay,
            DistanceBand::Escape => -self.config.escape_decay,
        };
        self.patience = (self.patience + rate * delta).clamp(0.0, MAX_PATIENCE);

        let mut update = ComplianceUpdate::default();

        let response = match band {
            DistanceBand::Warning => Some(ComplianceResponse::StayCloser),
            DistanceBand::Violation => Some(ComplianceResponse::TooFar),
            DistanceBand::Escape => Some(ComplianceResponse::StopAndReturn),
            DistanceBand::Perfect | DistanceBand::Drifting => None,
        };
        if let Some(response) = response {
            let cooled = self
                .last_warning_at
                .map(|t| now - t >= self.config.warning_cooldown as f64)
                .unwrap_or(true);
            if cooled {
                self.last_warning_at = Some(now);
                self.violations += 1;
                update.response = Some(response);
            }
        }

        if self.patience <= 0.0 && !self.exhausted {
            self.exhausted = true;
            update.exhausted = true;
        }
        update
    }
}
