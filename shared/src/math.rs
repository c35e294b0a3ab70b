use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down (screen space), so "forward" is negative y.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector, or zero for a zero vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn distance(&self, other: Vector2) -> f32 {
        (*self - other).magnitude()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Shortens the vector to `max` if it is longer, keeping its direction.
    pub fn clamp_magnitude(&self, max: f32) -> Vector2 {
        let mag = self.magnitude();
        if mag > max && mag > 0.0 {
            self.scale(max / mag)
        } else {
            *self
        }
    }

    /// Moves from `self` toward `target` by at most `max_delta`, never overshooting.
    pub fn move_towards(&self, target: Vector2, max_delta: f32) -> Vector2 {
        let diff = target - *self;
        let dist = diff.magnitude();
        if dist <= max_delta || dist == 0.0 {
            target
        } else {
            *self + diff.scale(max_delta / dist)
        }
    }

    /// Linear interpolation, `t = 0` gives `self`, `t = 1` gives `other`.
    pub fn lerp(&self, other: Vector2, t: f32) -> Vector2 {
        *self + (other - *self).scale(t)
    }

    /// Rotates the vector by `radians`; an orthogonal transform, so length is kept.
    pub fn rotate(&self, radians: f32) -> Vector2 {
        let (sin, cos) = radians.sin_cos();
        Vector2 {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    pub fn with_x(&self, x: f32) -> Vector2 {
        Vector2 { x, y: self.y }
    }

    pub fn with_y(&self, y: f32) -> Vector2 {
        Vector2 { x: self.x, y }
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, other: Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl AddAssign for Vector2 {
    fn add_assign(&mut self, other: Vector2) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, other: Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f32> for Vector2 {
    type Output = Vector2;

    fn mul(self, scalar: f32) -> Vector2 {
        self.scale(scalar)
    }
}

impl Neg for Vector2 {
    type Output = Vector2;

    fn neg(self) -> Vector2 {
        Vector2 {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl From<(f32, f32)> for Vector2 {
    fn from((x, y): (f32, f32)) -> Self {
        Vector2 { x, y }
    }
}

/// Direction of travel with magnitude in `[0, 1]`.
///
/// Input normalization produces unit or zero vectors; vectors received over
/// the wire are only clamped, so an analog stick can still ask for less than
/// full speed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementVector(Vector2);

impl MovementVector {
    pub const ZERO: MovementVector = MovementVector(Vector2::ZERO);

    /// Normalizes any non-zero direction to unit length.
    pub fn from_raw(x: f32, y: f32) -> Self {
        let raw = Vector2::new(x, y);
        if !raw.is_finite() {
            return Self::ZERO;
        }
        MovementVector(raw.normalize())
    }

    /// Keeps the direction but shortens it to at most unit length.
    pub fn clamped(x: f32, y: f32) -> Self {
        let raw = Vector2::new(x, y);
        if !raw.is_finite() {
            return Self::ZERO;
        }
        MovementVector(raw.clamp_magnitude(1.0))
    }

    pub fn as_vector(&self) -> Vector2 {
        self.0
    }

    pub fn magnitude(&self) -> f32 {
        self.0.magnitude()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

/// Principal axis, used to report which axis a wall slide kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}
