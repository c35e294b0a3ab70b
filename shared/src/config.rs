//! Tunable movement and reconciliation settings with RON persistence.
//!
//! A configuration value is an immutable snapshot: the client and server
//! replace it wholesale between frames and never patch fields while a frame
//! is being simulated.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::math::Vector2;

/// Errors that can occur when loading, saving, or checking configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Axis-aligned playable area. Positions are clamped into it after collision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl WorldBounds {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Clamps `point` so a body of `radius` stays fully inside.
    ///
    /// When the area is narrower than the body the point is pinned to the
    /// lower edge instead of panicking like `f32::clamp` would.
    pub fn clamp(&self, point: Vector2, radius: f32) -> Vector2 {
        Vector2 {
            x: point.x.min(self.max_x - radius).max(self.min_x + radius),
            y: point.y.min(self.max_y - radius).max(self.min_y + radius),
        }
    }

    pub fn contains(&self, point: Vector2) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }
}

/// Dodge roll tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollConfig {
    /// Seconds the roll lasts.
    pub duration: f32,
    /// Seconds after a trigger before another roll is allowed.
    pub cooldown: f32,
    /// Roll speed as a multiple of the walking speed.
    pub speed_multiplier: f32,
}

impl Default for RollConfig {
    fn default() -> Self {
        Self {
            duration: 0.35,
            cooldown: 1.0,
            speed_multiplier: 2.0,
        }
    }
}

/// Escape search used when a body ends up inside blocked geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Number of concentric rings to search.
    pub rings: u32,
    /// Distance between consecutive rings.
    pub ring_step: f32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            rings: 4,
            ring_step: 4.0,
        }
    }
}

/// How velocity responds to input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionModel {
    /// Velocity is set straight to the target every frame.
    Instant,
    /// Velocity eases toward the target at `rate` units per second squared.
    Accelerating { rate: f32 },
}

/// Movement settings for one controlled entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfiguration {
    /// Walking speed in units per second.
    pub speed: f32,
    /// Acceleration in units/s². Zero selects the instant-response model.
    pub acceleration: f32,
    pub collision_radius: f32,
    pub collision_enabled: bool,
    /// Grid cell size. Zero means continuous movement.
    pub grid_size: f32,
    /// Seconds a grid step takes from one cell center to the next.
    pub grid_step_duration: f32,
    pub bounds: Option<WorldBounds>,
    /// Largest distance a single frame may move before it counts as a bad frame.
    pub max_step_distance: f32,
    /// Frame deltas above this are clamped before integration.
    pub max_frame_delta: f32,
    /// Speed multiplier while crouched/prone.
    pub crouch_speed_factor: f32,
    pub roll: RollConfig,
    pub recovery: Option<RecoveryConfig>,
}

impl Default for MotionConfiguration {
    fn default() -> Self {
        Self {
            speed: 200.0,
            acceleration: 0.0,
            collision_radius: 8.0,
            collision_enabled: true,
            grid_size: 0.0,
            grid_step_duration: 0.15,
            bounds: None,
            max_step_distance: 64.0,
            max_frame_delta: 0.1,
            crouch_speed_factor: 0.3,
            roll: RollConfig::default(),
            recovery: None,
        }
    }
}

impl MotionConfiguration {
    /// Grid movement always interpolates at a constant speed, so it ignores
    /// `acceleration`.
    pub fn model(&self) -> MotionModel {
        if self.acceleration > 0.0 && !self.is_grid() {
            MotionModel::Accelerating {
                rate: self.acceleration,
            }
        } else {
            MotionModel::Instant
        }
    }

    pub fn is_grid(&self) -> bool {
        self.grid_size > 0.0
    }

    /// Largest `speed_scale` an input may legitimately carry.
    pub fn max_speed_scale(&self) -> f32 {
        let base = self.roll.speed_multiplier.max(1.0);
        if self.is_grid() && self.speed > 0.0 {
            base.max(self.grid_speed_scale())
        } else {
            base
        }
    }

    /// Speed multiplier that crosses one grid cell in `grid_step_duration`.
    pub fn grid_speed_scale(&self) -> f32 {
        if self.speed <= 0.0 || self.grid_step_duration <= 0.0 {
            return 0.0;
        }
        (self.grid_size / self.grid_step_duration) / self.speed
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.speed.is_finite() && self.speed >= 0.0) {
            return Err(invalid("motion.speed", "must be a non-negative number"));
        }
        if !(self.acceleration.is_finite() && self.acceleration >= 0.0) {
            return Err(invalid("motion.acceleration", "must be a non-negative number"));
        }
        if !non_negative(self.collision_radius) {
            return Err(invalid("motion.collision_radius", "must be a non-negative number"));
        }
        if !non_negative(self.grid_size) {
            return Err(invalid("motion.grid_size", "must be a non-negative number"));
        }
        if self.is_grid() && !positive(self.grid_step_duration) {
            return Err(invalid(
                "motion.grid_step_duration",
                "must be positive in grid mode",
            ));
        }
        if !positive(self.max_step_distance) {
            return Err(invalid("motion.max_step_distance", "must be positive"));
        }
        if !positive(self.max_frame_delta) {
            return Err(invalid("motion.max_frame_delta", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.crouch_speed_factor) {
            return Err(invalid("motion.crouch_speed_factor", "must be within [0, 1]"));
        }
        if !non_negative(self.roll.duration) {
            return Err(invalid("motion.roll.duration", "must be a non-negative number"));
        }
        if !non_negative(self.roll.cooldown) {
            return Err(invalid("motion.roll.cooldown", "must be a non-negative number"));
        }
        if !non_negative(self.roll.speed_multiplier) {
            return Err(invalid(
                "motion.roll.speed_multiplier",
                "must be a non-negative number",
            ));
        }
        if let Some(recovery) = &self.recovery {
            if !positive(recovery.ring_step) {
                return Err(invalid("motion.recovery.ring_step", "must be positive"));
            }
        }
        if let Some(bounds) = &self.bounds {
            let finite = [bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y]
                .iter()
                .all(|v| v.is_finite());
            if !finite || bounds.min_x >= bounds.max_x || bounds.min_y >= bounds.max_y {
                return Err(invalid("motion.bounds", "min must be below max"));
            }
        }
        Ok(())
    }
}

/// Thresholds and buffer limits for snapshot reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Errors at or below this distance are accepted without correction.
    pub accept_threshold: f32,
    /// Errors above this distance hard-snap to the server position.
    pub snap_threshold: f32,
    /// Fraction of the error removed by one smooth correction.
    pub blend_factor: f32,
    /// Buffered inputs older than this are pruned.
    pub retention_ms: u64,
    /// Hard upper bound on buffered inputs.
    pub buffer_capacity: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 5.0,
            snap_threshold: 50.0,
            blend_factor: 0.3,
            retention_ms: 2000,
            buffer_capacity: 512,
        }
    }
}

impl ReconciliationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !non_negative(self.accept_threshold) {
            return Err(invalid(
                "reconciliation.accept_threshold",
                "must be a non-negative number",
            ));
        }
        if !(self.snap_threshold.is_finite() && self.snap_threshold > self.accept_threshold) {
            return Err(invalid(
                "reconciliation.snap_threshold",
                "must be above accept_threshold",
            ));
        }
        if !(self.blend_factor > 0.0 && self.blend_factor <= 1.0) {
            return Err(invalid(
                "reconciliation.blend_factor",
                "must be within (0, 1]",
            ));
        }
        if self.retention_ms == 0 {
            return Err(invalid("reconciliation.retention_ms", "must be positive"));
        }
        if self.buffer_capacity == 0 {
            return Err(invalid(
                "reconciliation.buffer_capacity",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration shared by the client and server binaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub motion: MotionConfiguration,
    pub reconciliation: ReconciliationConfig,
}

impl GameConfig {
    /// Loads and validates a RON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config = Self::from_ron(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_ron(contents: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = ron::from_str(contents).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::new().depth_limit(3);
        ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = self.to_ron()?;
        std::fs::write(path, serialized).map_err(ConfigError::WriteError)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.motion.validate()?;
        self.reconciliation.validate()
    }
}

// Both reject NaN, which slips through plain `<` comparisons.
fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
