use log::{info, warn};
use rand::seq::SliceRandom;
use shared::motion::{self, PredictedState, StepResult};
use shared::{BufferedInput, MotionConfiguration, MovementVector, TileGrid, Vector2};
use std::collections::HashMap;

/// Authoritative bodies, one per connected client.
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u32,
    pub bodies: HashMap<u32, PredictedState>,
    config: MotionConfiguration,
    world: TileGrid,
}

impl GameState {
    pub fn new(config: MotionConfiguration, world: TileGrid) -> Self {
        Self {
            tick: 0,
            bodies: HashMap::new(),
            config,
            world,
        }
    }

    /// Places a new body on a random open tile and returns its position.
    pub fn add_player(&mut self, client_id: u32) -> Vector2 {
        let spawn = self
            .world
            .open_tiles()
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(Vector2::ZERO);

        self.add_player_at(client_id, spawn);
        spawn
    }

    pub fn add_player_at(&mut self, client_id: u32, spawn: Vector2) {
        info!("Added player {} at ({}, {})", client_id, spawn.x, spawn.y);
        self.bodies.insert(client_id, PredictedState::at(spawn));
    }

    pub fn remove_player(&mut self, client_id: &u32) {
        if self.bodies.remove(client_id).is_some() {
            info!("Removed player {}", client_id);
        }
    }

    /// Applies one client frame after sanitizing it.
    ///
    /// Returns `None` for unknown clients.
    pub fn apply_input(&mut self, client_id: u32, input: &BufferedInput) -> Option<StepResult> {
        let body = self.bodies.get_mut(&client_id)?;
        let input = sanitize_input(&self.config, input);

        let result = motion::step(
            &self.config,
            &self.world,
            *body,
            input.vector,
            input.speed_scale,
            input.frame_delta,
        );
        if let Some(err) = &result.validation.error {
            warn!(
                "Client {} input {} rejected: {}",
                client_id, input.sequence, err
            );
        }

        *body = result.state;
        Some(result)
    }

    pub fn position(&self, client_id: u32) -> Option<Vector2> {
        self.bodies.get(&client_id).map(|b| b.position)
    }

    pub fn config(&self) -> &MotionConfiguration {
        &self.config
    }

    pub fn world(&self) -> &TileGrid {
        &self.world
    }
}

/// Clamps client-supplied values into what an honest client could send.
///
/// Direction is limited to unit length, the speed multiplier to the largest
/// the configuration allows and the frame delta to `max_frame_delta`. Non-finite
/// numbers become zero.
pub fn sanitize_input(config: &MotionConfiguration, input: &BufferedInput) -> BufferedInput {
    let direction = input.vector.as_vector();
    let finite_or_zero = |v: f32| if v.is_finite() { v } else { 0.0 };

    BufferedInput {
        vector: MovementVector::clamped(direction.x, direction.y),
        speed_scale: finite_or_zero(input.speed_scale).clamp(0.0, config.max_speed_scale()),
        frame_delta: finite_or_zero(input.frame_delta).clamp(0.0, config.max_frame_delta),
        ..*input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn input(sequence: u32, x: f32, y: f32) -> BufferedInput {
        BufferedInput {
            sequence,
            vector: MovementVector::from_raw(x, y),
            speed_scale: 1.0,
            issued_at: sequence as u64 * 16,
            frame_delta: 0.016,
        }
    }

    fn open_state() -> GameState {
        GameState::new(
            MotionConfiguration::default(),
            TileGrid::from_rows(32.0, &["........", "........", "........"]),
        )
    }

    #[test]
    fn test_spawn_is_on_open_tile() {
        let mut state = GameState::new(MotionConfiguration::default(), TileGrid::arena());
        let spawn = state.add_player(1);

        let (col, row) = state.world().tile_at(spawn);
        assert!(!state.world().is_wall(col, row));
        assert_eq!(state.position(1), Some(spawn));
    }

    #[test]
    fn test_apply_input_moves_body() {
        let mut state = open_state();
        state.add_player_at(1, Vector2::new(128.0, 48.0));

        let result = state.apply_input(1, &input(1, 1.0, 0.0)).unwrap();

        assert!(result.validation.admitted);
        assert_approx_eq!(state.position(1).unwrap().x, 131.2, 1e-4);
    }

    #[test]
    fn test_unknown_client_is_ignored() {
        let mut state = open_state();
        assert!(state.apply_input(7, &input(1, 1.0, 0.0)).is_none());
    }

    #[test]
    fn test_sanitize_clamps_speed_and_delta() {
        let config = MotionConfiguration::default();
        let cheat = BufferedInput {
            speed_scale: 50.0,
            frame_delta: 3.0,
            ..input(1, 1.0, 0.0)
        };

        let clean = sanitize_input(&config, &cheat);
        assert_eq!(clean.speed_scale, config.max_speed_scale());
        assert_eq!(clean.frame_delta, config.max_frame_delta);
        assert_eq!(clean.sequence, 1);
    }

    #[test]
    fn test_sanitize_zeroes_non_finite_values() {
        let config = MotionConfiguration::default();
        let bad = BufferedInput {
            speed_scale: f32::NAN,
            frame_delta: f32::INFINITY,
            ..input(1, 1.0, 0.0)
        };

        let clean = sanitize_input(&config, &bad);
        assert_eq!(clean.speed_scale, 0.0);
        assert_eq!(clean.frame_delta, 0.0);
    }

    #[test]
    fn test_server_matches_client_step() {
        let mut state = open_state();
        let start = Vector2::new(64.0, 48.0);
        state.add_player_at(1, start);

        let config = MotionConfiguration::default();
        let mut predicted = PredictedState::at(start);
        for seq in 1..=20 {
            let frame = input(seq, 1.0, 1.0);
            predicted = motion::step(
                &config,
                state.world(),
                predicted,
                frame.vector,
                frame.speed_scale,
                frame.frame_delta,
            )
            .state;
            state.apply_input(1, &frame);
        }

        assert_eq!(state.bodies[&1], predicted);
    }

    #[test]
    fn test_remove_player() {
        let mut state = open_state();
        state.add_player_at(3, Vector2::new(48.0, 48.0));
        state.remove_player(&3);
        assert!(state.position(3).is_none());
    }
}
