//! Client input normalization with edge-triggered actions

use shared::{MovementVector, Vector2};
use std::collections::HashSet;

/// Keyboard keys the movement core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyId {
    W,
    A,
    S,
    D,
    Up,
    Down,
    Left,
    Right,
    Space,
    C,
    E,
    I,
    Tab,
    Escape,
}

/// Gamepad buttons the movement core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    South,
    East,
    West,
    North,
    Start,
}

/// Snapshot of everything held down this frame, polled once per tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeldInput {
    pub keys: HashSet<KeyId>,
    pub buttons: HashSet<ButtonId>,
    pub pointer: Vector2,
}

impl HeldInput {
    pub fn with_keys(keys: &[KeyId]) -> Self {
        Self {
            keys: keys.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn with_buttons(buttons: &[ButtonId]) -> Self {
        Self {
            buttons: buttons.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn is_key_down(&self, key: KeyId) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_button_down(&self, button: ButtonId) -> bool {
        self.buttons.contains(&button)
    }
}

/// Anything that can report held input each frame.
///
/// Returning `None` means no input device is available; the normalizer then
/// yields a zero vector and no actions.
pub trait InputSource {
    fn held_input(&mut self, now_ms: u64) -> Option<HeldInput>;
}

/// Basis transform from screen-relative input to world movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    TopDown,
    /// World axes rotated 45 degrees against the screen.
    Isometric,
}

impl Projection {
    fn apply(&self, v: Vector2) -> Vector2 {
        match self {
            Projection::TopDown => v,
            Projection::Isometric => v.rotate(-std::f32::consts::FRAC_PI_4),
        }
    }
}

/// Discrete, edge-triggered actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Dodge,
    Crouch,
    Interact,
    Inventory,
    Menu,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Dodge,
        Action::Crouch,
        Action::Interact,
        Action::Inventory,
        Action::Menu,
    ];

    fn is_held(&self, held: &HeldInput) -> bool {
        let (keys, buttons): (&[KeyId], &[ButtonId]) = match self {
            Action::Dodge => (&[KeyId::Space], &[ButtonId::South]),
            Action::Crouch => (&[KeyId::C], &[ButtonId::East]),
            Action::Interact => (&[KeyId::E], &[ButtonId::West]),
            Action::Inventory => (&[KeyId::I, KeyId::Tab], &[ButtonId::North]),
            Action::Menu => (&[KeyId::Escape], &[ButtonId::Start]),
        };

        keys.iter().any(|k| held.is_key_down(*k)) || buttons.iter().any(|b| held.is_button_down(*b))
    }
}

/// Normalized result of one frame of input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputFrame {
    pub movement: MovementVector,
    /// Actions whose controls went down this frame.
    pub actions: Vec<Action>,
    /// Current value of the crouch toggle.
    pub crouched: bool,
    pub pointer: Vector2,
}

impl InputFrame {
    pub fn fired(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Turns held controls into a movement vector and action events
pub struct InputNormalizer {
    projection: Projection,
    // Actions held on the previous frame, for edge detection
    armed_held: HashSet<Action>,
    crouched: bool,
}

impl InputNormalizer {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            armed_held: HashSet::new(),
            crouched: false,
        }
    }

    /// Maps the cardinal controls to a unit (or zero) world-space vector.
    ///
    /// Opposing controls cancel. Diagonals come out at unit length, the same
    /// as a single direction.
    pub fn normalize(&self, held: &HeldInput) -> MovementVector {
        let up = held.is_key_down(KeyId::W)
            || held.is_key_down(KeyId::Up)
            || held.is_button_down(ButtonId::DPadUp);
        let down = held.is_key_down(KeyId::S)
            || held.is_key_down(KeyId::Down)
            || held.is_button_down(ButtonId::DPadDown);
        let left = held.is_key_down(KeyId::A)
            || held.is_key_down(KeyId::Left)
            || held.is_button_down(ButtonId::DPadLeft);
        let right = held.is_key_down(KeyId::D)
            || held.is_key_down(KeyId::Right)
            || held.is_button_down(ButtonId::DPadRight);

        let mut raw = Vector2::ZERO;
        if up {
            raw.y -= 1.0;
        }
        if down {
            raw.y += 1.0;
        }
        if left {
            raw.x -= 1.0;
        }
        if right {
            raw.x += 1.0;
        }

        let world = self.projection.apply(raw);
        MovementVector::from_raw(world.x, world.y)
    }

    /// Samples one frame. Actions fire on the press edge only and re-arm on
    /// release; the crouch toggle flips on each press.
    pub fn update(&mut self, held: Option<&HeldInput>) -> InputFrame {
        let Some(held) = held else {
            // No device: everything counts as released so actions re-arm.
            self.armed_held.clear();
            return InputFrame {
                crouched: self.crouched,
                ..Default::default()
            };
        };

        let mut actions = Vec::new();
        for action in Action::ALL {
            let down = action.is_held(held);
            let was_down = self.armed_held.contains(&action);

            if down && !was_down {
                actions.push(action);
                if action == Action::Crouch {
                    self.crouched = !self.crouched;
                }
            }

            if down {
                self.armed_held.insert(action);
            } else {
                self.armed_held.remove(&action);
            }
        }

        InputFrame {
            movement: self.normalize(held),
            actions,
            crouched: self.crouched,
            pointer: held.pointer,
        }
    }

    pub fn is_crouched(&self) -> bool {
        self.crouched
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }
}

impl Default for InputNormalizer {
    fn default() -> Self {
        Self::new(Projection::TopDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const MOVEMENT_KEYS: [KeyId; 8] = [
        KeyId::W,
        KeyId::A,
        KeyId::S,
        KeyId::D,
        KeyId::Up,
        KeyId::Down,
        KeyId::Left,
        KeyId::Right,
    ];

    #[test]
    fn test_no_keys_gives_zero_vector() {
        let normalizer = InputNormalizer::default();
        assert!(normalizer.normalize(&HeldInput::default()).is_zero());
    }

    #[test]
    fn test_single_keys_have_unit_magnitude() {
        let normalizer = InputNormalizer::default();
        for key in MOVEMENT_KEYS {
            let v = normalizer.normalize(&HeldInput::with_keys(&[key]));
            assert_approx_eq!(v.magnitude(), 1.0, 1e-6);
        }
    }

    #[test]
    fn test_every_key_pair_is_unit_or_zero() {
        let normalizer = InputNormalizer::new(Projection::Isometric);
        for a in MOVEMENT_KEYS {
            for b in MOVEMENT_KEYS {
                let v = normalizer.normalize(&HeldInput::with_keys(&[a, b]));
                let m = v.magnitude();
                assert!(m == 0.0 || (m - 1.0).abs() < 1e-6, "{:?}+{:?} gave {}", a, b, m);
            }
        }
    }

    #[test]
    fn test_diagonal_has_no_speed_bonus() {
        let normalizer = InputNormalizer::default();
        let forward = normalizer.normalize(&HeldInput::with_keys(&[KeyId::W]));
        let diagonal = normalizer.normalize(&HeldInput::with_keys(&[KeyId::W, KeyId::D]));

        assert_approx_eq!(forward.magnitude(), 1.0, 1e-6);
        assert_approx_eq!(diagonal.magnitude(), 1.0, 1e-6);
        assert_approx_eq!(diagonal.as_vector().x, -diagonal.as_vector().y, 1e-6);
    }

    #[test]
    fn test_forward_is_negative_y_top_down() {
        let normalizer = InputNormalizer::default();
        let v = normalizer.normalize(&HeldInput::with_keys(&[KeyId::Up]));
        assert_eq!(v.as_vector(), Vector2::new(0.0, -1.0));
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let normalizer = InputNormalizer::default();
        let v = normalizer.normalize(&HeldInput::with_keys(&[KeyId::A, KeyId::D]));
        assert!(v.is_zero());
    }

    #[test]
    fn test_dpad_matches_keys() {
        let normalizer = InputNormalizer::default();
        let keys = normalizer.normalize(&HeldInput::with_keys(&[KeyId::S, KeyId::A]));
        let pad = normalizer.normalize(&HeldInput::with_buttons(&[
            ButtonId::DPadDown,
            ButtonId::DPadLeft,
        ]));
        assert_eq!(keys, pad);
    }

    #[test]
    fn test_isometric_projection_rotates_forward() {
        let normalizer = InputNormalizer::new(Projection::Isometric);
        let v = normalizer
            .normalize(&HeldInput::with_keys(&[KeyId::W]))
            .as_vector();
        assert_approx_eq!(v.magnitude(), 1.0, 1e-6);
        assert!(v.x < 0.0 && v.y < 0.0);
    }

    #[test]
    fn test_action_fires_once_per_press() {
        let mut normalizer = InputNormalizer::default();
        let held = HeldInput::with_keys(&[KeyId::Space]);

        assert!(normalizer.update(Some(&held)).fired(Action::Dodge));
        assert!(!normalizer.update(Some(&held)).fired(Action::Dodge));
        assert!(!normalizer.update(Some(&held)).fired(Action::Dodge));

        normalizer.update(Some(&HeldInput::default()));
        assert!(normalizer.update(Some(&held)).fired(Action::Dodge));
    }

    #[test]
    fn test_alternate_bindings_share_one_edge() {
        let mut normalizer = InputNormalizer::default();

        let frame = normalizer.update(Some(&HeldInput::with_keys(&[KeyId::I])));
        assert!(frame.fired(Action::Inventory));

        let both = HeldInput::with_keys(&[KeyId::I, KeyId::Tab]);
        assert!(!normalizer.update(Some(&both)).fired(Action::Inventory));
    }

    #[test]
    fn test_crouch_toggles_on_each_press() {
        let mut normalizer = InputNormalizer::default();
        let pressed = HeldInput::with_keys(&[KeyId::C]);
        let released = HeldInput::default();

        assert!(normalizer.update(Some(&pressed)).crouched);
        assert!(normalizer.update(Some(&pressed)).crouched);
        assert!(normalizer.update(Some(&released)).crouched);
        assert!(!normalizer.update(Some(&pressed)).crouched);
    }

    #[test]
    fn test_missing_device_yields_zero_and_rearms() {
        let mut normalizer = InputNormalizer::default();
        let held = HeldInput::with_keys(&[KeyId::W, KeyId::Escape]);

        assert!(normalizer.update(Some(&held)).fired(Action::Menu));

        let frame = normalizer.update(None);
        assert!(frame.movement.is_zero());
        assert!(frame.actions.is_empty());

        assert!(normalizer.update(Some(&held)).fired(Action::Menu));
    }

    #[test]
    fn test_pointer_passes_through() {
        let mut normalizer = InputNormalizer::default();
        let held = HeldInput {
            pointer: Vector2::new(320.0, 240.0),
            ..Default::default()
        };
        assert_eq!(normalizer.update(Some(&held)).pointer, Vector2::new(320.0, 240.0));
    }
}
