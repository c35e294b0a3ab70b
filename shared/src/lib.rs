//! # Shared movement simulation and protocol
//!
//! Everything the client and the authoritative server must agree on lives
//! here: the vector math, the motion configuration, the collision validator,
//! the single-frame [`motion::step`] and the packets exchanged over UDP.
//! Prediction only stays in sync when both sides run the same code with the
//! same configuration, so neither binary carries its own copy of the physics.

pub mod collision;
pub mod config;
pub mod error;
pub mod math;
pub mod motion;
pub mod world;

use serde::{Deserialize, Serialize};

pub use collision::{CollisionValidator, ValidationOutcome};
pub use config::{
    ConfigError, GameConfig, MotionConfiguration, MotionModel, ReconciliationConfig,
    RecoveryConfig, RollConfig, WorldBounds,
};
pub use error::{CollisionQueryError, MovementError};
pub use math::{Axis, MovementVector, Vector2};
pub use motion::{PredictedState, StepResult};
pub use world::{CollisionWorld, OpenWorld, TileGrid};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        dir_x: f32,
        dir_y: f32,
        speed_scale: f32,
        frame_delta: f32,
    },
    Disconnect,
    /// Sent periodically by an idle client so it is not timed out.
    KeepAlive,

    Connected {
        client_id: u32,
        spawn_x: f32,
        spawn_y: f32,
    },
    Snapshot {
        tick: u32,
        timestamp: u64,
        last_acknowledged_sequence: u32,
        x: f32,
        y: f32,
    },
    Disconnected {
        reason: String,
    },
}

/// One frame of local movement intent, sequenced for acknowledgment.
///
/// `speed_scale` carries the crouch or roll multiplier that was in effect,
/// so the frame can be re-simulated without the action state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferedInput {
    pub sequence: u32,
    pub vector: MovementVector,
    pub speed_scale: f32,
    /// Milliseconds on the issuing clock.
    pub issued_at: u64,
    /// Seconds simulated by this frame.
    pub frame_delta: f32,
}

impl BufferedInput {
    pub fn to_packet(&self) -> Packet {
        let direction = self.vector.as_vector();
        Packet::Input {
            sequence: self.sequence,
            timestamp: self.issued_at,
            dir_x: direction.x,
            dir_y: direction.y,
            speed_scale: self.speed_scale,
            frame_delta: self.frame_delta,
        }
    }

    /// Reads an input packet. The direction is clamped to unit length, any
    /// other sanitation is left to the receiver.
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        match *packet {
            Packet::Input {
                sequence,
                timestamp,
                dir_x,
                dir_y,
                speed_scale,
                frame_delta,
            } => Some(Self {
                sequence,
                vector: MovementVector::clamped(dir_x, dir_y),
                speed_scale,
                issued_at: timestamp,
                frame_delta,
            }),
            _ => None,
        }
    }
}

/// Authoritative position for the local entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub position: Vector2,
    pub last_acknowledged_sequence: u32,
    pub server_timestamp: u64,
}

impl ServerSnapshot {
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        match *packet {
            Packet::Snapshot {
                timestamp,
                last_acknowledged_sequence,
                x,
                y,
                ..
            } => Some(Self {
                position: Vector2::new(x, y),
                last_acknowledged_sequence,
                server_timestamp: timestamp,
            }),
            _ => None,
        }
    }

    /// Ordering key: acknowledgment first, server time as tie-breaker.
    pub fn order_key(&self) -> (u32, u64) {
        (self.last_acknowledged_sequence, self.server_timestamp)
    }
}
