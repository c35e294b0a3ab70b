use log::{debug, info};
use shared::motion::PredictedState;
use shared::{CollisionWorld, GameConfig, ServerSnapshot, Vector2};
use tokio::sync::mpsc;

use crate::input::{Action, HeldInput, InputFrame, InputNormalizer, Projection};
use crate::prediction::{MotionEvent, PredictiveMotionController};
use crate::reconciliation::{Correction, ReconcileOutcome, ReconciliationEngine, ReconciliationStats};

/// Handle the network layer uses to deliver snapshots to the game.
pub type SnapshotSender = mpsc::UnboundedSender<ServerSnapshot>;

/// Result of one client frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub state: PredictedState,
    pub frame: InputFrame,
    pub corrections: Vec<ReconcileOutcome>,
}

/// Locally controlled entity: input, prediction and reconciliation wired together.
///
/// Snapshots queue up in an inbox and are applied at the start of the next
/// tick, so a correction never lands in the middle of a simulated frame.
pub struct ClientGameState<W: CollisionWorld> {
    controller: PredictiveMotionController,
    reconciler: ReconciliationEngine,
    normalizer: InputNormalizer,
    world: W,
    inbox_tx: SnapshotSender,
    inbox_rx: mpsc::UnboundedReceiver<ServerSnapshot>,
}

impl<W: CollisionWorld> ClientGameState<W> {
    pub fn new(config: GameConfig, world: W, spawn: Vector2, projection: Projection) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            controller: PredictiveMotionController::new(
                config.motion,
                &config.reconciliation,
                spawn,
            ),
            reconciler: ReconciliationEngine::new(config.reconciliation),
            normalizer: InputNormalizer::new(projection),
            world,
            inbox_tx,
            inbox_rx,
        }
    }

    pub fn snapshot_sender(&self) -> SnapshotSender {
        self.inbox_tx.clone()
    }

    /// Queues an authoritative snapshot for the next tick.
    pub fn on_server_snapshot(&self, snapshot: ServerSnapshot) {
        // The receiver lives in `self`, so this only fails during teardown.
        let _ = self.inbox_tx.send(snapshot);
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MotionEvent> {
        self.controller.subscribe()
    }

    /// Runs one frame: pending snapshots, then input, then prediction.
    pub fn tick(&mut self, dt: f32, held: Option<&HeldInput>) -> TickReport {
        let corrections = self.drain_snapshots();

        let frame = self.normalizer.update(held);
        self.controller.set_prone(frame.crouched);
        if frame.fired(Action::Dodge) && self.controller.trigger_roll(frame.movement) {
            debug!("Dodge roll started");
        }

        let state = self.controller.advance(dt, frame.movement, &self.world);

        TickReport {
            state,
            frame,
            corrections,
        }
    }

    fn drain_snapshots(&mut self) -> Vec<ReconcileOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(snapshot) = self.inbox_rx.try_recv() {
            let outcome = self.apply_snapshot(&snapshot);
            if outcome.correction != Correction::Ignored {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Reconciles immediately instead of waiting for the next tick.
    pub fn apply_snapshot(&mut self, snapshot: &ServerSnapshot) -> ReconcileOutcome {
        let now = self.controller.now_ms();
        let predicted = self.controller.state();
        let motion = self.controller.config().clone();

        let outcome = self.reconciler.reconcile(
            snapshot,
            predicted,
            self.controller.buffer_mut(),
            &motion,
            &self.world,
            now,
        );

        if outcome.correction != Correction::Ignored {
            self.controller
                .apply_correction(outcome.state, outcome.correction == Correction::Snapped);
        }
        outcome
    }

    /// Starts over at `spawn`, e.g. after (re)connecting.
    pub fn reset(&mut self, spawn: Vector2) {
        info!("Resetting local entity to ({:.1}, {:.1})", spawn.x, spawn.y);
        while self.inbox_rx.try_recv().is_ok() {}
        self.reconciler.reset();
        self.controller.teleport(spawn);
    }

    /// Replaces the configuration wholesale between frames.
    pub fn set_config(&mut self, config: GameConfig) {
        self.controller.set_reconciliation_limits(&config.reconciliation);
        self.controller.set_config(config.motion);
        self.reconciler.set_config(config.reconciliation);
    }

    pub fn state(&self) -> PredictedState {
        self.controller.state()
    }

    pub fn controller(&self) -> &PredictiveMotionController {
        &self.controller
    }

    pub fn stats(&self) -> ReconciliationStats {
        self.reconciler.stats()
    }

    pub fn now_ms(&self) -> u64 {
        self.controller.now_ms()
    }

    pub fn world(&self) -> &W {
        &self.world
    }
}
