//! Ring of sequenced inputs awaiting server acknowledgment.

use log::debug;
use shared::{BufferedInput, MovementVector, PredictedState};
use std::collections::VecDeque;

/// A recorded input plus the predicted states on either side of it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub input: BufferedInput,
    /// State the frame started from.
    pub before: PredictedState,
    /// State the frame produced.
    pub after: PredictedState,
}

/// Parameters for [`InputBuffer::record`].
#[derive(Debug, Clone, Copy)]
pub struct FrameRecord {
    pub vector: MovementVector,
    pub speed_scale: f32,
    pub issued_at: u64,
    pub frame_delta: f32,
    pub before: PredictedState,
    pub after: PredictedState,
}

/// Sequences stay contiguous from the oldest entry, so lookups are by offset.
#[derive(Debug)]
pub struct InputBuffer {
    entries: VecDeque<HistoryEntry>,
    next_sequence: u32,
    retention_ms: u64,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(retention_ms: u64, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            next_sequence: 1,
            retention_ms,
            capacity: capacity.max(1),
        }
    }

    /// Assigns the next sequence number and stores the frame.
    pub fn record(&mut self, frame: FrameRecord) -> BufferedInput {
        let input = BufferedInput {
            sequence: self.next_sequence,
            vector: frame.vector,
            speed_scale: frame.speed_scale,
            issued_at: frame.issued_at,
            frame_delta: frame.frame_delta,
        };
        self.next_sequence += 1;

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            input,
            before: frame.before,
            after: frame.after,
        });

        input
    }

    /// Drops entries at least `retention_ms` old. Returns how many were removed.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        while let Some(front) = self.entries.front() {
            if now_ms.saturating_sub(front.input.issued_at) < self.retention_ms {
                break;
            }
            self.entries.pop_front();
        }

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Pruned {} expired inputs, {} remain", removed, self.entries.len());
        }
        removed
    }

    fn index_of(&self, sequence: u32) -> Option<usize> {
        let front = self.entries.front()?.input.sequence;
        let offset = sequence.checked_sub(front)? as usize;
        (offset < self.entries.len()).then_some(offset)
    }

    pub fn get(&self, sequence: u32) -> Option<&HistoryEntry> {
        self.index_of(sequence).map(|i| &self.entries[i])
    }

    /// Entries the server has not acknowledged yet, oldest first.
    pub fn unacknowledged(&self, ack: u32) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(move |e| e.input.sequence > ack)
    }

    pub fn unacknowledged_mut(&mut self, ack: u32) -> impl Iterator<Item = &mut HistoryEntry> {
        self.entries
            .iter_mut()
            .filter(move |e| e.input.sequence > ack)
    }

    /// What the client predicted at the moment the server processed `ack`.
    ///
    /// Falls back to the start of the oldest unacknowledged frame when the
    /// acknowledged one has been pruned, and to `current` when nothing is
    /// outstanding.
    pub fn predicted_at(&self, ack: u32, current: PredictedState) -> PredictedState {
        if let Some(entry) = self.get(ack) {
            return entry.after;
        }
        match self.unacknowledged(ack).next() {
            Some(oldest) => oldest.before,
            None => current,
        }
    }

    /// Overwrites the outcome of the acknowledged frame after a correction.
    pub fn rebase(&mut self, ack: u32, state: PredictedState) {
        if let Some(i) = self.index_of(ack) {
            self.entries[i].after = state;
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence of the most recently recorded input, 0 if none yet.
    pub fn latest_sequence(&self) -> u32 {
        self.next_sequence - 1
    }

    pub fn set_limits(&mut self, retention_ms: u64, capacity: usize) {
        self.retention_ms = retention_ms;
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}
