//! Deterministic single-frame movement simulation.
//!
//! Client prediction, client replay and the authoritative server all advance
//! bodies through [`step`], so a replayed input reproduces the original frame
//! exactly when the world and configuration agree.

use serde::{Deserialize, Serialize};

use crate::collision::{CollisionValidator, ValidationOutcome};
use crate::config::{MotionConfiguration, MotionModel};
use crate::math::{Axis, MovementVector, Vector2};
use crate::world::CollisionWorld;

/// Position and velocity of one controlled entity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictedState {
    pub position: Vector2,
    pub velocity: Vector2,
}

impl PredictedState {
    pub fn at(position: Vector2) -> Self {
        Self {
            position,
            velocity: Vector2::ZERO,
        }
    }
}

/// Outcome of advancing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub state: PredictedState,
    pub validation: ValidationOutcome,
}

/// Velocity the body wants for a direction and speed multiplier.
pub fn target_velocity(
    config: &MotionConfiguration,
    direction: MovementVector,
    speed_scale: f32,
) -> Vector2 {
    direction.as_vector() * (config.speed * speed_scale)
}

/// Integrates velocity toward `target` for `dt` seconds under the configured model.
pub fn integrate_velocity(
    config: &MotionConfiguration,
    current: Vector2,
    target: Vector2,
    speed_scale: f32,
    dt: f32,
) -> Vector2 {
    match config.model() {
        MotionModel::Instant => target,
        MotionModel::Accelerating { rate } => {
            let cap = config.speed * speed_scale.max(1.0);
            current.move_towards(target, rate * dt).clamp_magnitude(cap)
        }
    }
}

/// Advances `state` by one frame of `direction` input.
///
/// `dt` is clamped to `max_frame_delta` first. A slide zeroes the velocity
/// component that ran into the wall; a fully rejected move zeroes velocity.
pub fn step<W: CollisionWorld + ?Sized>(
    config: &MotionConfiguration,
    world: &W,
    state: PredictedState,
    direction: MovementVector,
    speed_scale: f32,
    dt: f32,
) -> StepResult {
    let dt = dt.clamp(0.0, config.max_frame_delta);
    let target = target_velocity(config, direction, speed_scale);
    let mut velocity = integrate_velocity(config, state.velocity, target, speed_scale, dt);

    let candidate = state.position + velocity * dt;
    let validation = CollisionValidator::new(config, world).validate(state.position, candidate);

    if validation.admitted {
        match validation.slide_axis {
            Some(Axis::X) => velocity.y = 0.0,
            Some(Axis::Y) => velocity.x = 0.0,
            None => {}
        }
    } else {
        velocity = Vector2::ZERO;
    }

    let mut position = validation.resolved;
    if validation.admitted && config.is_grid() {
        position = snap_to_cell_center(position, config.grid_size);
    }

    StepResult {
        state: PredictedState { position, velocity },
        validation,
    }
}

/// Pulls `position` onto the nearest cell center when it is within float
/// error of it, so a replayed grid step ends exactly where the original did.
fn snap_to_cell_center(position: Vector2, grid: f32) -> Vector2 {
    let center = Vector2::new(
        ((position.x / grid).floor() + 0.5) * grid,
        ((position.y / grid).floor() + 0.5) * grid,
    );
    if (position - center).magnitude() <= grid * CELL_SNAP_FRACTION {
        center
    } else {
        position
    }
}

const CELL_SNAP_FRACTION: f32 = 1e-4;
