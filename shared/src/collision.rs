//! Position admissibility, wall sliding and stuck recovery.

use log::warn;

use crate::config::MotionConfiguration;
use crate::error::MovementError;
use crate::math::{Axis, Vector2};
use crate::world::CollisionWorld;

/// Result of validating one candidate move.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Whether any movement was admitted.
    pub admitted: bool,
    /// Where the body ends up. Equal to `current` when nothing was admitted.
    pub resolved: Vector2,
    /// Set when the move was only admitted along one axis.
    pub slide_axis: Option<Axis>,
    pub error: Option<MovementError>,
}

impl ValidationOutcome {
    fn admit(resolved: Vector2, slide_axis: Option<Axis>) -> Self {
        Self {
            admitted: true,
            resolved,
            slide_axis,
            error: None,
        }
    }

    fn reject(current: Vector2, error: Option<MovementError>) -> Self {
        Self {
            admitted: false,
            resolved: current,
            slide_axis: None,
            error,
        }
    }
}

/// Validates candidate positions against a borrowed world and configuration.
///
/// The validator owns nothing: it is built per frame around the caller's
/// configuration snapshot and collision predicate.
pub struct CollisionValidator<'a, W: CollisionWorld + ?Sized> {
    config: &'a MotionConfiguration,
    world: &'a W,
}

impl<'a, W: CollisionWorld + ?Sized> CollisionValidator<'a, W> {
    pub fn new(config: &'a MotionConfiguration, world: &'a W) -> Self {
        Self { config, world }
    }

    /// Decides where a body moving from `current` toward `candidate` may go.
    ///
    /// Order of checks:
    /// 1. non-finite coordinates are rejected as `InvalidPosition`
    /// 2. moves longer than `max_step_distance` are rejected as `ExcessiveDelta`
    /// 3. the candidate (plus radius samples) is queried against the world
    /// 4. a blocked candidate tries `(candidate.x, current.y)` then `(current.x, candidate.y)`
    /// 5. fully blocked moves stay at `current`, unless recovery is configured
    ///    and `current` itself is inside geometry
    ///
    /// The recovery search is centred on `current`, the point that is stuck,
    /// not on the rejected `candidate`. A body merely walking into a wall is
    /// blocked, not stuck, and never searches.
    ///
    /// World bounds are applied last to every admitted position.
    pub fn validate(&self, current: Vector2, candidate: Vector2) -> ValidationOutcome {
        if !candidate.is_finite() || !current.is_finite() {
            let bad = if candidate.is_finite() { current } else { candidate };
            warn!("Discarding frame with non-finite position ({}, {})", bad.x, bad.y);
            return ValidationOutcome::reject(
                current,
                Some(MovementError::InvalidPosition { x: bad.x, y: bad.y }),
            );
        }

        let distance = current.distance(candidate);
        if distance > self.config.max_step_distance {
            warn!(
                "Rejecting movement delta {:.2} (max {:.2}) from ({:.1}, {:.1})",
                distance, self.config.max_step_distance, current.x, current.y
            );
            return ValidationOutcome::reject(
                current,
                Some(MovementError::ExcessiveDelta {
                    distance,
                    max: self.config.max_step_distance,
                }),
            );
        }

        if candidate == current {
            return ValidationOutcome::admit(current, None);
        }

        if !self.config.collision_enabled {
            return ValidationOutcome::admit(self.clamp_to_bounds(candidate), None);
        }

        let mut query_error = None;

        if !self.blocked(candidate, &mut query_error) {
            return self.finish(
                ValidationOutcome::admit(self.clamp_to_bounds(candidate), None),
                query_error,
            );
        }

        let slide_x = candidate.with_y(current.y);
        if slide_x != current && !self.blocked(slide_x, &mut query_error) {
            return self.finish(
                ValidationOutcome::admit(self.clamp_to_bounds(slide_x), Some(Axis::X)),
                query_error,
            );
        }

        let slide_y = current.with_y(candidate.y);
        if slide_y != current && !self.blocked(slide_y, &mut query_error) {
            return self.finish(
                ValidationOutcome::admit(self.clamp_to_bounds(slide_y), Some(Axis::Y)),
                query_error,
            );
        }

        if self.config.recovery.is_some() && self.blocked(current, &mut query_error) {
            if let Some(escape) = self.find_escape(current, &mut query_error) {
                return self.finish(
                    ValidationOutcome::admit(self.clamp_to_bounds(escape), None),
                    query_error,
                );
            }
        }

        ValidationOutcome::reject(current, query_error)
    }

    /// Searches expanding rings around `origin` for the nearest free point.
    ///
    /// Ring `k` sits at `k * ring_step` and holds `8 * k` evenly spaced samples,
    /// so sample density along the circumference stays roughly constant.
    pub fn find_escape(
        &self,
        origin: Vector2,
        query_error: &mut Option<MovementError>,
    ) -> Option<Vector2> {
        let recovery = self.config.recovery.as_ref()?;

        for ring in 1..=recovery.rings {
            let radius = ring as f32 * recovery.ring_step;
            let samples = 8 * ring;

            for i in 0..samples {
                let angle = std::f32::consts::TAU * i as f32 / samples as f32;
                let point = origin + Vector2::new(angle.cos(), angle.sin()) * radius;
                if !self.blocked(point, query_error) {
                    return Some(point);
                }
            }
        }

        None
    }

    /// True when the point, or any sample at the collision radius around it, is blocked.
    ///
    /// Failed queries count as open; the first failure is kept for the outcome.
    fn blocked(&self, point: Vector2, query_error: &mut Option<MovementError>) -> bool {
        let radius = self.config.collision_radius;
        let samples = [
            point,
            point + Vector2::new(radius, 0.0),
            point + Vector2::new(-radius, 0.0),
            point + Vector2::new(0.0, radius),
            point + Vector2::new(0.0, -radius),
        ];
        let samples = if radius > 0.0 { &samples[..] } else { &samples[..1] };

        samples.iter().any(|&sample| match self.world.is_blocked(sample) {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!("Collision query failed at ({:.1}, {:.1}): {}", sample.x, sample.y, e);
                if query_error.is_none() {
                    *query_error = Some(MovementError::CollisionQueryFailure(e));
                }
                false
            }
        })
    }

    fn clamp_to_bounds(&self, point: Vector2) -> Vector2 {
        match &self.config.bounds {
            Some(bounds) => bounds.clamp(point, self.config.collision_radius),
            None => point,
        }
    }

    fn finish(
        &self,
        mut outcome: ValidationOutcome,
        query_error: Option<MovementError>,
    ) -> ValidationOutcome {
        if outcome.error.is_none() {
            outcome.error = query_error;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecoveryConfig, WorldBounds};
    use crate::error::CollisionQueryError;
    use crate::world::{OpenWorld, TileGrid};

    fn point_config() -> MotionConfiguration {
        MotionConfiguration {
            collision_radius: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_open_world_admits_candidate() {
        let config = point_config();
        let validator = CollisionValidator::new(&config, &OpenWorld);

        let outcome = validator.validate(Vector2::ZERO, Vector2::new(3.0, 4.0));
        assert!(outcome.admitted);
        assert_eq!(outcome.resolved, Vector2::new(3.0, 4.0));
        assert_eq!(outcome.slide_axis, None);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn test_non_finite_candidate_rejected() {
        let config = point_config();
        let validator = CollisionValidator::new(&config, &OpenWorld);

        let current = Vector2::new(1.0, 1.0);
        let outcome = validator.validate(current, Vector2::new(f32::NAN, 0.0));
        assert!(!outcome.admitted);
        assert_eq!(outcome.resolved, current);
        assert!(matches!(
            outcome.error,
            Some(MovementError::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_excessive_delta_rejected() {
        let config = MotionConfiguration {
            max_step_distance: 10.0,
            ..point_config()
        };
        let validator = CollisionValidator::new(&config, &OpenWorld);

        let outcome = validator.validate(Vector2::ZERO, Vector2::new(100.0, 0.0));
        assert!(!outcome.admitted);
        assert_eq!(outcome.resolved, Vector2::ZERO);
        assert!(matches!(
            outcome.error,
            Some(MovementError::ExcessiveDelta { .. })
        ));
    }

    #[test]
    fn test_fully_blocked_region_never_advances() {
        let config = point_config();
        let world = |p: Vector2| -> Result<bool, CollisionQueryError> { Ok(p.x > 10.0) };
        let validator = CollisionValidator::new(&config, &world);

        let current = Vector2::new(10.0, 5.0);
        let outcome = validator.validate(current, Vector2::new(12.0, 5.0));
        assert!(!outcome.admitted);
        assert_eq!(outcome.resolved, current);
    }

    #[test]
    fn test_diagonal_block_slides_along_open_axis() {
        let config = point_config();
        // Wall to the right: moving right+down keeps only the downward component.
        let world = |p: Vector2| -> Result<bool, CollisionQueryError> { Ok(p.x > 10.0) };
        let validator = CollisionValidator::new(&config, &world);

        let outcome = validator.validate(Vector2::new(10.0, 0.0), Vector2::new(12.0, 2.0));
        assert!(outcome.admitted);
        assert_eq!(outcome.resolved, Vector2::new(10.0, 2.0));
        assert_eq!(outcome.slide_axis, Some(Axis::Y));
    }

    #[test]
    fn test_slide_prefers_x_axis_first() {
        let config = point_config();
        // Floor below y = 10: moving right+down keeps the horizontal component.
        let world = |p: Vector2| -> Result<bool, CollisionQueryError> { Ok(p.y > 10.0) };
        let validator = CollisionValidator::new(&config, &world);

        let outcome = validator.validate(Vector2::new(0.0, 10.0), Vector2::new(2.0, 12.0));
        assert!(outcome.admitted);
        assert_eq!(outcome.resolved, Vector2::new(2.0, 10.0));
        assert_eq!(outcome.slide_axis, Some(Axis::X));
    }

    #[test]
    fn test_corner_blocks_both_axes() {
        let config = point_config();
        let world =
            |p: Vector2| -> Result<bool, CollisionQueryError> { Ok(p.x > 10.0 || p.y > 10.0) };
        let validator = CollisionValidator::new(&config, &world);

        let current = Vector2::new(10.0, 10.0);
        let outcome = validator.validate(current, Vector2::new(12.0, 12.0));
        assert!(!outcome.admitted);
        assert_eq!(outcome.resolved, current);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn test_radius_samples_detect_nearby_walls() {
        let config = MotionConfiguration {
            collision_radius: 4.0,
            ..Default::default()
        };
        let world = |p: Vector2| -> Result<bool, CollisionQueryError> { Ok(p.x > 10.0) };
        let validator = CollisionValidator::new(&config, &world);

        // The center stays left of the wall but the right sample crosses it.
        let outcome = validator.validate(Vector2::new(5.0, 0.0), Vector2::new(8.0, 0.0));
        assert!(!outcome.admitted);
    }

    #[test]
    fn test_query_count_follows_radius() {
        let queries = std::cell::Cell::new(0);
        let world = |_p: Vector2| -> Result<bool, CollisionQueryError> {
            queries.set(queries.get() + 1);
            Ok(false)
        };

        let config = point_config();
        CollisionValidator::new(&config, &world).validate(Vector2::ZERO, Vector2::new(1.0, 0.0));
        assert_eq!(queries.get(), 1);

        queries.set(0);
        let config = MotionConfiguration::default();
        CollisionValidator::new(&config, &world).validate(Vector2::ZERO, Vector2::new(1.0, 0.0));
        assert_eq!(queries.get(), 5);
    }

    #[test]
    fn test_query_failure_defaults_to_open() {
        let config = point_config();
        let world = |_p: Vector2| -> Result<bool, CollisionQueryError> {
            Err(CollisionQueryError::Unavailable("chunk not loaded".to_string()))
        };
        let validator = CollisionValidator::new(&config, &world);

        let outcome = validator.validate(Vector2::ZERO, Vector2::new(1.0, 0.0));
        assert!(outcome.admitted);
        assert_eq!(outcome.resolved, Vector2::new(1.0, 0.0));
        assert!(matches!(
            outcome.error,
            Some(MovementError::CollisionQueryFailure(_))
        ));
    }

    #[test]
    fn test_bounds_clamp_after_collision() {
        let config = MotionConfiguration {
            collision_radius: 2.0,
            bounds: Some(WorldBounds::new(0.0, 0.0, 50.0, 50.0)),
            ..Default::default()
        };
        let validator = CollisionValidator::new(&config, &OpenWorld);

        let outcome = validator.validate(Vector2::new(47.0, 25.0), Vector2::new(53.0, 25.0));
        assert!(outcome.admitted);
        assert_eq!(outcome.resolved, Vector2::new(48.0, 25.0));
    }

    #[test]
    fn test_collision_disabled_skips_queries() {
        let config = MotionConfiguration {
            collision_enabled: false,
            ..point_config()
        };
        let world = |_p: Vector2| -> Result<bool, CollisionQueryError> { Ok(true) };
        let validator = CollisionValidator::new(&config, &world);

        let outcome = validator.validate(Vector2::ZERO, Vector2::new(5.0, 5.0));
        assert!(outcome.admitted);
        assert_eq!(outcome.resolved, Vector2::new(5.0, 5.0));
    }

    #[test]
    fn test_recovery_escapes_when_stuck() {
        let config = MotionConfiguration {
            recovery: Some(RecoveryConfig {
                rings: 3,
                ring_step: 10.0,
            }),
            ..point_config()
        };
        let grid = TileGrid::from_rows(10.0, &["....", ".##.", ".##.", "...."]);
        let validator = CollisionValidator::new(&config, &grid);

        let stuck = Vector2::new(15.0, 15.0);
        let outcome = validator.validate(stuck, Vector2::new(16.0, 16.0));
        assert!(outcome.admitted);
        assert_eq!(grid.is_blocked(outcome.resolved), Ok(false));
    }

    #[test]
    fn test_recovery_not_used_when_current_is_free() {
        let config = MotionConfiguration {
            recovery: Some(RecoveryConfig::default()),
            ..point_config()
        };
        let world =
            |p: Vector2| -> Result<bool, CollisionQueryError> { Ok(p.x > 10.0 || p.y > 10.0) };
        let validator = CollisionValidator::new(&config, &world);

        let current = Vector2::new(10.0, 10.0);
        let outcome = validator.validate(current, Vector2::new(12.0, 12.0));
        assert!(!outcome.admitted);
        assert_eq!(outcome.resolved, current);
    }
}
