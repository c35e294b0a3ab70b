//! Movement error taxonomy.
//!
//! None of these escape the movement core as faults. They are recovered
//! locally and travel as data inside validation and reconciliation results
//! so callers and telemetry can see what happened to a frame.

/// Why a frame's movement was altered or discarded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MovementError {
    /// A coordinate was NaN or infinite; the frame is discarded.
    #[error("non-finite position ({x}, {y})")]
    InvalidPosition { x: f32, y: f32 },

    /// The frame tried to move further than the configured maximum.
    #[error("movement delta {distance:.2} exceeds maximum {max:.2}")]
    ExcessiveDelta { distance: f32, max: f32 },

    /// The world's collision predicate failed; movement proceeded as unblocked.
    #[error("collision query failed: {0}")]
    CollisionQueryFailure(#[source] CollisionQueryError),

    /// Prediction drifted past the hard-snap threshold.
    #[error("prediction desync of {error:.2} units")]
    ReconciliationDesync { error: f32 },
}

/// Failure reported by a [`CollisionWorld`](crate::world::CollisionWorld).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollisionQueryError {
    /// The point lies outside the area the world knows about.
    #[error("point ({x:.1}, {y:.1}) is outside the collision grid")]
    OutOfRange { x: f32, y: f32 },

    /// The world system is degraded or not loaded yet.
    #[error("collision world unavailable: {0}")]
    Unavailable(String),
}
