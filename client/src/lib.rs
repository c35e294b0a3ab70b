//! # Movement Client Library
//!
//! Client-side half of the movement core: it turns held controls into
//! movement, predicts the locally controlled entity without waiting for the
//! server, and folds authoritative snapshots back in when they arrive.
//!
//! ## Architecture Overview
//!
//! ### Input Normalization
//! Held keys and gamepad buttons are mapped to a unit movement vector, so a
//! diagonal is never faster than a single direction. Discrete actions (dodge,
//! crouch, interact, inventory, menu) fire once per press.
//!
//! ### Client-Side Prediction
//! Every frame is simulated locally through the same [`shared::motion::step`]
//! the server runs, then recorded with a sequence number and sent on. The
//! recorded frame carries its speed multiplier and frame delta, so it can be
//! re-simulated later without the roll or crouch state that produced it.
//!
//! ### Server Reconciliation
//! Snapshots name the last input the server applied. The client compares the
//! snapshot with what it had predicted at that input, applies one of three
//! corrections (accept, blend, hard snap) and replays every input the server
//! has not seen yet on top of the corrected baseline.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! - Key and button identifiers, bindings and the isometric projection
//! - Edge detection for actions and the crouch toggle
//! - The [`input::InputSource`] trait for pluggable devices
//!
//! ### Input Buffer Module (`input_buffer`)
//! - Sequenced ring of recent inputs with the predicted state around each
//! - Age and capacity based pruning
//!
//! ### Prediction Module (`prediction`)
//! - The predictive motion controller and its roll, crouch and grid state
//! - Motion events for the network layer
//!
//! ### Reconciliation Module (`reconciliation`)
//! - Threshold based correction and input replay
//! - Ordering of snapshots so duplicates and stale ones are no-ops
//!
//! ### Game Module (`game`)
//! Wires the pieces above into one per-frame `tick` with a snapshot inbox.
//!
//! ### Network Module (`network`)
//! UDP client loop with simulated latency and packet loss.
//!
//! ### Script Module (`script`)
//! Headless input sources for bots and soak tests.
//!
//! ## Usage Example
//!
//! ```rust
//! use client::game::ClientGameState;
//! use client::input::{HeldInput, KeyId, Projection};
//! use shared::{GameConfig, OpenWorld, ServerSnapshot, Vector2};
//!
//! let mut game = ClientGameState::new(
//!     GameConfig::default(),
//!     OpenWorld,
//!     Vector2::ZERO,
//!     Projection::TopDown,
//! );
//!
//! // Predict one frame of walking forward
//! let report = game.tick(0.016, Some(&HeldInput::with_keys(&[KeyId::W])));
//! assert!(report.state.position.y < 0.0);
//!
//! // A snapshot confirming that frame is reconciled on the next tick
//! game.on_server_snapshot(ServerSnapshot {
//!     position: report.state.position,
//!     last_acknowledged_sequence: 1,
//!     server_timestamp: 1,
//! });
//! game.tick(0.016, None);
//! assert_eq!(game.stats().accepted, 1);
//! ```

pub mod game;
pub mod input;
pub mod input_buffer;
pub mod network;
pub mod prediction;
pub mod reconciliation;
pub mod script;
