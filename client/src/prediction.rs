//! Client-side prediction for the locally controlled entity.
//!
//! The controller applies input immediately, records every simulated frame in
//! the [`InputBuffer`] and announces it on the event channel so the network
//! layer can forward it. Roll and crouch only change the `speed_scale` a frame
//! is recorded with; replay never needs the action state machine.

use log::{debug, info, warn};
use shared::motion::{self, PredictedState};
use shared::{
    CollisionValidator, CollisionWorld, MotionConfiguration, MovementVector,
    ReconciliationConfig, Vector2,
};
use tokio::sync::mpsc;

use crate::input_buffer::{FrameRecord, InputBuffer};

/// Things the controller reports to the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionEvent {
    /// A frame was simulated and should be sent to the server.
    Input(shared::BufferedInput),
    RollStarted { facing: MovementVector },
    RollFinished,
    /// A grid step finished on the center of `cell`.
    Aligned { cell: (i32, i32) },
    /// Position was forced, either by a hard correction or a teleport.
    Snapped { position: Vector2 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RollState {
    Idle,
    Rolling {
        facing: MovementVector,
        ends_at: u64,
    },
}

/// Discrete action state. Expiry is stored as a clock time and checked every
/// frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionState {
    pub roll: RollState,
    /// Clock time at which a new roll may start.
    pub roll_ready_at: u64,
    pub prone: bool,
}

impl Default for ActionState {
    fn default() -> Self {
        Self {
            roll: RollState::Idle,
            roll_ready_at: 0,
            prone: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GridTransit {
    from: Vector2,
    to: Vector2,
    cell: (i32, i32),
    elapsed: f32,
}

/// What one frame will simulate.
struct FramePlan {
    direction: MovementVector,
    speed_scale: f32,
    dt: f32,
}

pub struct PredictiveMotionController {
    config: MotionConfiguration,
    state: PredictedState,
    actions: ActionState,
    transit: Option<GridTransit>,
    facing: MovementVector,
    buffer: InputBuffer,
    clock: f64,
    events: Option<mpsc::UnboundedSender<MotionEvent>>,
}

impl PredictiveMotionController {
    pub fn new(
        config: MotionConfiguration,
        reconciliation: &ReconciliationConfig,
        spawn: Vector2,
    ) -> Self {
        Self {
            config,
            state: PredictedState::at(spawn),
            actions: ActionState::default(),
            transit: None,
            facing: MovementVector::from_raw(0.0, -1.0),
            buffer: InputBuffer::new(reconciliation.retention_ms, reconciliation.buffer_capacity),
            clock: 0.0,
            events: None,
        }
    }

    /// Opens the event channel, replacing any previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MotionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn state(&self) -> PredictedState {
        self.state
    }

    pub fn config(&self) -> &MotionConfiguration {
        &self.config
    }

    /// Swaps the configuration between frames. An in-flight grid step is
    /// dropped if the grid changes.
    pub fn set_config(&mut self, config: MotionConfiguration) {
        if config.grid_size != self.config.grid_size {
            self.transit = None;
        }
        self.config = config;
    }

    pub fn set_reconciliation_limits(&mut self, reconciliation: &ReconciliationConfig) {
        self.buffer
            .set_limits(reconciliation.retention_ms, reconciliation.buffer_capacity);
    }

    pub fn buffer(&self) -> &InputBuffer {
        &self.buffer
    }

    pub fn actions(&self) -> ActionState {
        self.actions
    }

    /// Milliseconds of simulated time since the controller was created.
    pub fn now_ms(&self) -> u64 {
        (self.clock * 1000.0).round() as u64
    }

    pub fn is_rolling(&self) -> bool {
        matches!(self.actions.roll, RollState::Rolling { .. })
    }

    pub fn is_aligned(&self) -> bool {
        self.transit.is_none()
    }

    /// Seconds until another roll may start.
    pub fn cooldown_remaining(&self) -> f32 {
        self.actions.roll_ready_at.saturating_sub(self.now_ms()) as f32 / 1000.0
    }

    pub fn set_prone(&mut self, prone: bool) {
        if self.actions.prone != prone {
            debug!("Prone {}", if prone { "on" } else { "off" });
        }
        self.actions.prone = prone;
    }

    /// Starts a dodge roll along `vector`, or along the last movement
    /// direction when `vector` is zero.
    ///
    /// Returns `false` while rolling, while the cooldown runs, or in grid mode.
    pub fn trigger_roll(&mut self, vector: MovementVector) -> bool {
        if self.config.is_grid() || self.is_rolling() {
            return false;
        }

        let now = self.now_ms();
        if now < self.actions.roll_ready_at {
            debug!(
                "Roll refused, {:.2}s of cooldown left",
                self.cooldown_remaining()
            );
            return false;
        }

        if !vector.is_zero() {
            self.facing = vector;
        }
        let facing = self.facing;
        self.actions.roll = RollState::Rolling {
            facing,
            ends_at: now + seconds_to_ms(self.config.roll.duration),
        };
        self.actions.roll_ready_at = now + seconds_to_ms(self.config.roll.cooldown);
        self.emit(MotionEvent::RollStarted { facing });
        true
    }

    /// Ends any roll and grid step in progress. The roll cooldown keeps running.
    pub fn cancel_actions(&mut self) {
        self.actions.roll = RollState::Idle;
        self.transit = None;
    }

    /// Places the entity at `position` at rest, dropping buffered history.
    pub fn teleport(&mut self, position: Vector2) {
        info!("Teleported to ({:.1}, {:.1})", position.x, position.y);
        self.cancel_actions();
        self.state = PredictedState::at(position);
        self.buffer.clear();
        self.emit(MotionEvent::Snapped { position });
    }

    /// Applies a reconciled state. A hard snap also cancels in-progress actions.
    pub fn apply_correction(&mut self, state: PredictedState, snapped: bool) {
        if snapped {
            self.cancel_actions();
            self.emit(MotionEvent::Snapped {
                position: state.position,
            });
        }
        self.state = state;
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut InputBuffer {
        &mut self.buffer
    }

    /// Simulates one frame of `dt` seconds with the given movement intent.
    pub fn advance<W: CollisionWorld + ?Sized>(
        &mut self,
        dt: f32,
        vector: MovementVector,
        world: &W,
    ) -> PredictedState {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += dt as f64;
        let now = self.now_ms();

        self.expire_roll(now);
        if !self.is_rolling() && !vector.is_zero() {
            self.facing = vector;
        }

        let plan = match self.actions.roll {
            RollState::Rolling { facing, .. } => Some(FramePlan {
                direction: facing,
                speed_scale: self.config.roll.speed_multiplier * self.prone_factor(),
                dt,
            }),
            RollState::Idle if self.config.is_grid() => self.plan_grid_step(vector, dt, world),
            RollState::Idle => Some(FramePlan {
                direction: vector,
                speed_scale: self.prone_factor(),
                dt,
            }),
        };

        let plan = match plan {
            Some(plan) if !plan.direction.is_zero() || !self.state.velocity.is_zero() => plan,
            _ => {
                self.state.velocity = Vector2::ZERO;
                self.buffer.prune(now);
                return self.state;
            }
        };

        let frame_delta = plan.dt.clamp(0.0, self.config.max_frame_delta);
        let before = self.state;
        let result = motion::step(
            &self.config,
            world,
            before,
            plan.direction,
            plan.speed_scale,
            frame_delta,
        );
        if let Some(err) = &result.validation.error {
            warn!("Predicted frame rejected: {}", err);
        }
        self.state = result.state;

        if self.transit.is_some() {
            self.finish_grid_step(result.validation.admitted);
        }

        let input = self.buffer.record(FrameRecord {
            vector: plan.direction,
            speed_scale: plan.speed_scale,
            issued_at: now,
            frame_delta,
            before,
            after: self.state,
        });
        self.emit(MotionEvent::Input(input));
        self.buffer.prune(now);

        self.state
    }

    fn prone_factor(&self) -> f32 {
        if self.actions.prone {
            self.config.crouch_speed_factor
        } else {
            1.0
        }
    }

    fn expire_roll(&mut self, now: u64) {
        if let RollState::Rolling { ends_at, .. } = self.actions.roll {
            if now >= ends_at {
                self.actions.roll = RollState::Idle;
                self.emit(MotionEvent::RollFinished);
            }
        }
    }

    fn plan_grid_step<W: CollisionWorld + ?Sized>(
        &mut self,
        vector: MovementVector,
        dt: f32,
        world: &W,
    ) -> Option<FramePlan> {
        let grid = self.config.grid_size;

        if self.transit.is_none() {
            if vector.is_zero() {
                return None;
            }

            let v = vector.as_vector();
            let (dx, dy) = if v.x.abs() >= v.y.abs() {
                (v.x.signum() as i32, 0)
            } else {
                (0, v.y.signum() as i32)
            };
            let here = self.state.position;
            let cell = (
                (here.x / grid).floor() as i32 + dx,
                (here.y / grid).floor() as i32 + dy,
            );
            let to = Vector2::new(
                (cell.0 as f32 + 0.5) * grid,
                (cell.1 as f32 + 0.5) * grid,
            );

            let check = CollisionValidator::new(&self.config, world).validate(here, to);
            if !check.admitted || check.resolved != to {
                debug!("Grid step into cell {:?} refused", cell);
                return None;
            }

            self.transit = Some(GridTransit {
                from: here,
                to,
                cell,
                elapsed: 0.0,
            });
        }

        let duration = self.config.grid_step_duration;
        let max_dt = self.config.max_frame_delta;
        let transit = self.transit.as_mut()?;

        let remaining = (duration - transit.elapsed).max(0.0);
        let step_dt = dt.min(max_dt);
        let step_dt = if step_dt >= remaining {
            transit.elapsed = duration;
            remaining
        } else {
            transit.elapsed += step_dt;
            step_dt
        };

        let span = transit.to - transit.from;
        let direction = MovementVector::from_raw(span.x, span.y);
        let speed_scale = if self.config.speed > 0.0 {
            span.magnitude() / duration / self.config.speed
        } else {
            0.0
        };

        Some(FramePlan {
            direction,
            speed_scale,
            dt: step_dt,
        })
    }

    fn finish_grid_step(&mut self, admitted: bool) {
        let Some(transit) = self.transit else {
            return;
        };

        if !admitted {
            warn!("Grid step into cell {:?} blocked mid-way", transit.cell);
            self.transit = None;
            return;
        }

        // `motion::step` already lands on the center; this also stops the body.
        if transit.elapsed >= self.config.grid_step_duration {
            self.state = PredictedState::at(transit.to);
            self.transit = None;
            self.emit(MotionEvent::Aligned { cell: transit.cell });
        }
    }

    fn emit(&mut self, event: MotionEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                debug!("Motion event receiver dropped");
                self.events = None;
            }
        }
    }
}

fn seconds_to_ms(seconds: f32) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{OpenWorld, TileGrid};

    fn controller(config: MotionConfiguration) -> PredictiveMotionController {
        PredictiveMotionController::new(config, &ReconciliationConfig::default(), Vector2::ZERO)
    }

    fn forward() -> MovementVector {
        MovementVector::from_raw(0.0, -1.0)
    }

    #[test]
    fn test_forward_ten_frames() {
        let mut controller = controller(MotionConfiguration::default());

        let mut state = PredictedState::default();
        for _ in 0..10 {
            state = controller.advance(0.016, forward(), &OpenWorld);
        }

        assert_approx_eq!(state.position.x, 0.0, 1e-4);
        assert_approx_eq!(state.position.y, -32.0, 1e-3);
        assert_approx_eq!(state.velocity.magnitude(), 200.0, 1e-3);
        assert_eq!(controller.buffer().len(), 10);
    }

    #[test]
    fn test_frames_are_sent_as_events() {
        let mut controller = controller(MotionConfiguration::default());
        let mut events = controller.subscribe();

        controller.advance(0.016, forward(), &OpenWorld);
        controller.advance(0.016, forward(), &OpenWorld);

        match events.try_recv().unwrap() {
            MotionEvent::Input(input) => assert_eq!(input.sequence, 1),
            other => panic!("unexpected event {:?}", other),
        }
        match events.try_recv().unwrap() {
            MotionEvent::Input(input) => {
                assert_eq!(input.sequence, 2);
                assert_eq!(input.issued_at, 32);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_idle_frames_are_not_recorded() {
        let mut controller = controller(MotionConfiguration::default());
        for _ in 0..5 {
            controller.advance(0.016, MovementVector::ZERO, &OpenWorld);
        }
        assert!(controller.buffer().is_empty());
        assert_eq!(controller.now_ms(), 80);
    }

    #[test]
    fn test_accelerating_decay_frames_are_recorded() {
        let config = MotionConfiguration {
            acceleration: 1000.0,
            ..Default::default()
        };
        let mut controller = controller(config);

        controller.advance(0.05, MovementVector::from_raw(1.0, 0.0), &OpenWorld);
        let recorded = controller.buffer().len();
        controller.advance(0.05, MovementVector::ZERO, &OpenWorld);

        assert!(controller.state().velocity.is_zero());
        assert_eq!(controller.buffer().len(), recorded + 1);
    }

    #[test]
    fn test_crouch_scales_speed() {
        let mut controller = controller(MotionConfiguration::default());
        controller.set_prone(true);

        let state = controller.advance(0.016, forward(), &OpenWorld);
        assert_approx_eq!(state.velocity.magnitude(), 60.0, 1e-3);

        let input = controller.buffer().iter().last().unwrap().input;
        assert_approx_eq!(input.speed_scale, 0.3, 1e-6);
    }

    #[test]
    fn test_roll_moves_along_facing_and_ignores_input() {
        let mut controller = controller(MotionConfiguration::default());
        controller.advance(0.016, MovementVector::from_raw(1.0, 0.0), &OpenWorld);

        assert!(controller.trigger_roll(MovementVector::ZERO));
        let state = controller.advance(0.016, MovementVector::from_raw(-1.0, 0.0), &OpenWorld);

        assert_approx_eq!(state.velocity.x, 400.0, 1e-3);
        assert_approx_eq!(state.velocity.y, 0.0, 1e-6);
    }

    #[test]
    fn test_roll_uses_direction_held_at_trigger() {
        let mut controller = controller(MotionConfiguration::default());
        let mut events = controller.subscribe();
        controller.advance(0.016, forward(), &OpenWorld);
        while events.try_recv().is_ok() {}

        let right = MovementVector::from_raw(1.0, 0.0);
        assert!(controller.trigger_roll(right));
        assert_eq!(
            events.try_recv().unwrap(),
            MotionEvent::RollStarted { facing: right }
        );

        let state = controller.advance(0.016, right, &OpenWorld);
        assert_approx_eq!(state.velocity.x, 400.0, 1e-3);
        assert_approx_eq!(state.velocity.y, 0.0, 1e-6);
    }

    #[test]
    fn test_roll_defaults_to_forward() {
        let mut controller = controller(MotionConfiguration::default());
        let mut events = controller.subscribe();

        assert!(controller.trigger_roll(MovementVector::ZERO));
        assert_eq!(
            events.try_recv().unwrap(),
            MotionEvent::RollStarted { facing: forward() }
        );
    }

    #[test]
    fn test_roll_expires_after_duration() {
        let mut controller = controller(MotionConfiguration::default());
        let mut events = controller.subscribe();
        controller.trigger_roll(MovementVector::ZERO);

        for _ in 0..34 {
            controller.advance(0.01, MovementVector::ZERO, &OpenWorld);
        }
        assert!(controller.is_rolling());

        controller.advance(0.01, MovementVector::ZERO, &OpenWorld);
        assert!(!controller.is_rolling());

        let finished = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| e == MotionEvent::RollFinished);
        assert!(finished);
    }

    #[test]
    fn test_roll_cooldown_blocks_second_trigger() {
        let mut controller = controller(MotionConfiguration::default());
        assert!(controller.trigger_roll(MovementVector::ZERO));

        // 0.5s later the roll is over but the 1s cooldown is not.
        for _ in 0..50 {
            controller.advance(0.01, MovementVector::ZERO, &OpenWorld);
        }
        assert!(!controller.is_rolling());
        assert!(!controller.trigger_roll(MovementVector::ZERO));
        assert_approx_eq!(controller.cooldown_remaining(), 0.5, 1e-3);

        for _ in 0..50 {
            controller.advance(0.01, MovementVector::ZERO, &OpenWorld);
        }
        assert_eq!(controller.cooldown_remaining(), 0.0);
        assert!(controller.trigger_roll(MovementVector::ZERO));
    }

    #[test]
    fn test_cooldown_runs_while_rolling() {
        let mut controller = controller(MotionConfiguration::default());
        controller.trigger_roll(MovementVector::ZERO);
        let start = controller.cooldown_remaining();

        controller.advance(0.1, MovementVector::ZERO, &OpenWorld);
        assert!(controller.is_rolling());
        assert!(controller.cooldown_remaining() < start);
    }

    #[test]
    fn test_blocked_move_zeroes_velocity() {
        let grid = TileGrid::from_rows(32.0, &["###", "#.#", "###"]);
        let spawn = grid.tile_center(1, 1);
        let mut controller = PredictiveMotionController::new(
            MotionConfiguration::default(),
            &ReconciliationConfig::default(),
            spawn,
        );

        let mut state = controller.state();
        for _ in 0..60 {
            state = controller.advance(0.016, MovementVector::from_raw(1.0, 0.0), &grid);
        }

        assert!(state.position.x < 64.0 - 8.0 + 1e-3);
        assert!(!grid.is_wall(grid.tile_at(state.position).0, 1));
    }

    #[test]
    fn test_grid_step_ends_aligned() {
        let config = MotionConfiguration {
            grid_size: 32.0,
            grid_step_duration: 0.1,
            ..Default::default()
        };
        let mut controller = PredictiveMotionController::new(
            config,
            &ReconciliationConfig::default(),
            Vector2::new(16.0, 16.0),
        );
        let mut events = controller.subscribe();

        controller.advance(0.04, MovementVector::from_raw(1.0, 0.0), &OpenWorld);
        assert!(!controller.is_aligned());

        // Input is ignored mid-step.
        controller.advance(0.04, MovementVector::from_raw(0.0, 1.0), &OpenWorld);
        controller.advance(0.04, MovementVector::ZERO, &OpenWorld);

        assert!(controller.is_aligned());
        assert_eq!(controller.state().position, Vector2::new(48.0, 16.0));

        let aligned = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| e == MotionEvent::Aligned { cell: (1, 0) });
        assert!(aligned);
    }

    #[test]
    fn test_grid_step_replays_onto_cell_center() {
        let config = MotionConfiguration {
            grid_size: 32.0,
            grid_step_duration: 0.15,
            ..Default::default()
        };
        let mut controller = PredictiveMotionController::new(
            config.clone(),
            &ReconciliationConfig::default(),
            Vector2::new(16.0, 16.0),
        );
        while !controller.is_aligned() || controller.buffer().is_empty() {
            controller.advance(0.017, MovementVector::from_raw(1.0, 0.0), &OpenWorld);
        }

        let mut entries = controller.buffer().iter();
        let first = entries.next().unwrap();
        let mut replayed = motion::step(
            &config,
            &OpenWorld,
            first.before,
            first.input.vector,
            first.input.speed_scale,
            first.input.frame_delta,
        )
        .state;
        for entry in entries {
            replayed = motion::step(
                &config,
                &OpenWorld,
                replayed,
                entry.input.vector,
                entry.input.speed_scale,
                entry.input.frame_delta,
            )
            .state;
        }

        assert_eq!(controller.state().position, Vector2::new(48.0, 16.0));
        assert_eq!(replayed.position, controller.state().position);
    }

    #[test]
    fn test_grid_step_into_wall_is_refused() {
        let grid = TileGrid::from_rows(32.0, &["#..", "..."]);
        let config = MotionConfiguration {
            grid_size: 32.0,
            ..Default::default()
        };
        let mut controller = PredictiveMotionController::new(
            config,
            &ReconciliationConfig::default(),
            grid.tile_center(1, 0),
        );

        let state = controller.advance(0.05, MovementVector::from_raw(-1.0, 0.0), &grid);
        assert_eq!(state.position, grid.tile_center(1, 0));
        assert!(controller.is_aligned());
        assert!(controller.buffer().is_empty());
    }

    #[test]
    fn test_no_roll_in_grid_mode() {
        let config = MotionConfiguration {
            grid_size: 32.0,
            ..Default::default()
        };
        let mut controller = controller(config);
        assert!(!controller.trigger_roll(MovementVector::ZERO));
    }

    #[test]
    fn test_teleport_resets_history_and_actions() {
        let mut controller = controller(MotionConfiguration::default());
        controller.advance(0.016, forward(), &OpenWorld);
        controller.trigger_roll(MovementVector::ZERO);

        controller.teleport(Vector2::new(100.0, 100.0));

        assert_eq!(controller.state(), PredictedState::at(Vector2::new(100.0, 100.0)));
        assert!(!controller.is_rolling());
        assert!(controller.buffer().is_empty());
    }
}
