//! Headless input for running the client without a keyboard.

use crate::input::{HeldInput, InputSource, KeyId};

/// Walks a square patrol and taps dodge on a fixed period.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    /// Milliseconds spent walking each side of the square.
    pub leg_ms: u64,
    /// Milliseconds between dodge taps, 0 disables dodging.
    pub dodge_every_ms: u64,
}

impl Default for ScriptedInput {
    fn default() -> Self {
        Self {
            leg_ms: 1500,
            dodge_every_ms: 4000,
        }
    }
}

impl ScriptedInput {
    const LEGS: [KeyId; 4] = [KeyId::D, KeyId::S, KeyId::A, KeyId::W];
    const TAP_MS: u64 = 50;

    fn held_at(&self, now_ms: u64) -> HeldInput {
        let leg_ms = self.leg_ms.max(1);
        let leg = ((now_ms / leg_ms) % Self::LEGS.len() as u64) as usize;
        let mut held = HeldInput::with_keys(&[Self::LEGS[leg]]);

        if self.dodge_every_ms > 0 && now_ms % self.dodge_every_ms < Self::TAP_MS && now_ms > 0 {
            held.keys.insert(KeyId::Space);
        }
        held
    }
}

impl InputSource for ScriptedInput {
    fn held_input(&mut self, now_ms: u64) -> Option<HeldInput> {
        Some(self.held_at(now_ms))
    }
}

/// No input device at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn held_input(&mut self, _now_ms: u64) -> Option<HeldInput> {
        None
    }
}
