//! Reconciles the predicted state against authoritative snapshots.
//!
//! The snapshot is compared with what the client predicted at the
//! acknowledged input, not with the current prediction, so latency alone
//! never registers as error. The chosen baseline is then rolled forward by
//! replaying every input the server has not seen yet.

use log::{debug, warn};
use shared::motion::{self, PredictedState};
use shared::{CollisionWorld, MotionConfiguration, MovementError, ReconciliationConfig, ServerSnapshot};

use crate::input_buffer::InputBuffer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Duplicate or out-of-order snapshot; nothing changed.
    Ignored,
    /// Error within tolerance, prediction kept.
    Accepted,
    /// Baseline pulled part of the way toward the server position.
    Smoothed,
    /// Baseline replaced with the server position.
    Snapped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileOutcome {
    pub state: PredictedState,
    pub correction: Correction,
    /// Distance between the server position and the prediction at the ack.
    pub error: f32,
    /// Inputs re-simulated on top of the baseline.
    pub replayed: usize,
}

impl ReconcileOutcome {
    fn ignored(state: PredictedState) -> Self {
        Self {
            state,
            correction: Correction::Ignored,
            error: 0.0,
            replayed: 0,
        }
    }

    /// The desync error for a hard snap.
    pub fn desync(&self) -> Option<MovementError> {
        (self.correction == Correction::Snapped)
            .then_some(MovementError::ReconciliationDesync { error: self.error })
    }
}

/// Running totals, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationStats {
    pub accepted: u64,
    pub smoothed: u64,
    pub snapped: u64,
    pub ignored: u64,
}

impl ReconciliationStats {
    fn record(&mut self, correction: Correction) {
        match correction {
            Correction::Ignored => self.ignored += 1,
            Correction::Accepted => self.accepted += 1,
            Correction::Smoothed => self.smoothed += 1,
            Correction::Snapped => self.snapped += 1,
        }
    }
}

pub struct ReconciliationEngine {
    config: ReconciliationConfig,
    last_processed: Option<(u32, u64)>,
    stats: ReconciliationStats,
}

impl ReconciliationEngine {
    pub fn new(config: ReconciliationConfig) -> Self {
        Self {
            config,
            last_processed: None,
            stats: ReconciliationStats::default(),
        }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ReconciliationConfig) {
        self.config = config;
    }

    pub fn stats(&self) -> ReconciliationStats {
        self.stats
    }

    pub fn last_acknowledged(&self) -> Option<u32> {
        self.last_processed.map(|(ack, _)| ack)
    }

    /// Forgets the snapshot history, e.g. after reconnecting.
    pub fn reset(&mut self) {
        self.last_processed = None;
    }

    /// Corrects `predicted` with `snapshot` and replays outstanding inputs.
    ///
    /// Snapshots that are not strictly newer than the last one processed,
    /// by acknowledged sequence then server time, are ignored. Processing the
    /// same snapshot twice is therefore a no-op.
    pub fn reconcile<W: CollisionWorld + ?Sized>(
        &mut self,
        snapshot: &ServerSnapshot,
        predicted: PredictedState,
        buffer: &mut InputBuffer,
        motion_config: &MotionConfiguration,
        world: &W,
        now_ms: u64,
    ) -> ReconcileOutcome {
        let key = snapshot.order_key();
        if self.last_processed.is_some_and(|last| key <= last) {
            debug!(
                "Ignoring stale snapshot (ack {}, t={})",
                snapshot.last_acknowledged_sequence, snapshot.server_timestamp
            );
            self.stats.record(Correction::Ignored);
            return ReconcileOutcome::ignored(predicted);
        }

        if !snapshot.position.is_finite() {
            warn!(
                "{}",
                MovementError::InvalidPosition {
                    x: snapshot.position.x,
                    y: snapshot.position.y,
                }
            );
            self.stats.record(Correction::Ignored);
            return ReconcileOutcome::ignored(predicted);
        }

        self.last_processed = Some(key);

        let ack = snapshot.last_acknowledged_sequence;
        let at_ack = buffer.predicted_at(ack, predicted);
        let error = at_ack.position.distance(snapshot.position);

        let (baseline, correction) = if error <= self.config.accept_threshold {
            (at_ack, Correction::Accepted)
        } else if error > self.config.snap_threshold {
            warn!(
                "{}, snapping to ({:.1}, {:.1})",
                MovementError::ReconciliationDesync { error },
                snapshot.position.x,
                snapshot.position.y
            );
            (PredictedState::at(snapshot.position), Correction::Snapped)
        } else {
            debug!("Smoothing {:.2} units of prediction error", error);
            let position = at_ack
                .position
                .lerp(snapshot.position, self.config.blend_factor);
            (
                PredictedState {
                    position,
                    velocity: at_ack.velocity,
                },
                Correction::Smoothed,
            )
        };

        buffer.rebase(ack, baseline);

        let mut state = baseline;
        let mut replayed = 0;
        for entry in buffer.unacknowledged_mut(ack) {
            entry.before = state;
            state = motion::step(
                motion_config,
                world,
                state,
                entry.input.vector,
                entry.input.speed_scale,
                entry.input.frame_delta,
            )
            .state;
            entry.after = state;
            replayed += 1;
        }

        buffer.prune(now_ms);
        self.stats.record(correction);

        if correction != Correction::Accepted {
            debug!(
                "Reconciled ack {} ({:?}, error {:.2}), replayed {} inputs",
                ack, correction, error, replayed
            );
        }

        ReconcileOutcome {
            state,
            correction,
            error,
            replayed,
        }
    }
}
