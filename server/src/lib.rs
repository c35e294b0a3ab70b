//! # Movement Server Library
//!
//! Authoritative half of the movement core. The server owns one body per
//! connected client, applies that client's inputs through the same
//! [`shared::motion::step`] the client predicts with, and sends each client a
//! snapshot of its own body every tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Bodies only move when an input is applied. Every input carries the frame
//! delta and speed multiplier the client simulated with, so an honest client
//! and the server land on the same position without the server knowing about
//! rolls or crouching.
//!
//! ### Input Sanitation
//! Client values are clamped before use: direction to unit length, speed
//! multiplier to the configured maximum, frame delta to `max_frame_delta`.
//! Duplicate and stale sequence numbers are dropped and each client's queue
//! is capped.
//!
//! ### Acknowledgment
//! Snapshots carry the highest sequence applied for the receiving client.
//! Clients use it to pick the prediction to compare against and the inputs
//! to replay.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! - Connection tracking and client ID assignment
//! - Per-client input queues and acknowledgment tracking
//! - Timeout detection and cleanup
//!
//! ### Game Module (`game`)
//! - Authoritative bodies on a tile grid
//! - Input sanitation and application
//!
//! ### Network Module (`network`)
//! - UDP socket tasks for receiving, sending and timeouts
//! - The tick loop: apply queued inputs, then send snapshots
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::GameConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 30Hz tick, at most 32 clients
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(33),
//!         32,
//!         GameConfig::default(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server runs internal async tasks for:
//! - **Network Receiver**: listens for incoming packets
//! - **Network Sender**: drains the outgoing packet queue
//! - **Timeout Checker**: removes clients silent for more than five seconds
//! - **Main Loop**: applies inputs and sends snapshots each tick

pub mod client_manager;
pub mod game;
pub mod network;
