//! Play queue
//!
//! An ordered list of track references (duplicates allowed) together with
//! the current position and the shuffle history.
//!
//! ```text
//! items:    [ 10, 20, 30, 20, 40 ]
//!                     ^ position = 2
//! history:  [ 0, 3 ]  (positions visited before, Normal shuffle only)
//! ```
//!
//! Invariants held by every mutation:
//! - `position` is `None` or `< items.len()`
//! - an empty queue has no position
//! - every history entry is `< items.len()`

use crate::shuffle::Shuffler;
use crate::types::{EnqueueAction, TrackId};

/// Result of [`QueueStore::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Nothing was added
    Unchanged,

    /// Tracks were added, playback untouched
    Queued,

    /// Position moved to the new tracks; caller must open and play
    OpenAndPlay,
}

/// Result of a removal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Removal {
    /// Number of entries deleted
    pub removed: usize,

    /// The current track was among them; caller must reopen or stop
    pub current_removed: bool,
}

impl Removal {
    fn merge(self, other: Removal) -> Removal {
        Removal {
            removed: self.removed + other.removed,
            current_removed: self.current_removed || other.current_removed,
        }
    }
}

/// Ordered track queue with cursor and history
#[derive(Debug, Clone)]
pub struct QueueStore {
    items: Vec<TrackId>,
    position: Option<usize>,
    history: Vec<usize>,
    max_history: usize,
}

impl QueueStore {
    /// Create an empty queue keeping at most `max_history` history entries
    pub fn new(max_history: usize) -> Self {
        Self {
            items: Vec::new(),
            position: None,
            history: Vec::new(),
            max_history,
        }
    }

    pub fn items(&self) -> &[TrackId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Track at the current position
    pub fn current(&self) -> Option<TrackId> {
        self.position.and_then(|pos| self.items.get(pos).copied())
    }

    pub fn get(&self, index: usize) -> Option<TrackId> {
        self.items.get(index).copied()
    }

    pub fn history(&self) -> &[usize] {
        &self.history
    }

    /// Replace the whole queue
    ///
    /// An out-of-range `start` is clamped to the last item. Without a
    /// start the position is a fresh shuffle pick. History is cleared.
    /// Returns `false` (and changes nothing) for an empty list.
    pub fn open(&mut self, list: Vec<TrackId>, start: Option<usize>, shuffler: &mut Shuffler) -> bool {
        if list.is_empty() {
            return false;
        }

        let len = list.len();
        self.items.clear();
        self.ensure_capacity(len);
        self.items.extend(list);
        self.history.clear();

        self.position = match start {
            Some(index) => Some(index.min(len - 1)),
            None => shuffler.pick(len, |_| false, |_| false),
        };
        true
    }

    /// Add tracks according to `action`
    ///
    /// `Next` inserts after the current track, or appends when nothing is
    /// open or the current track is last. `Now` appends and moves the
    /// position to the first appended track. When no position was set the
    /// queue starts at the first item.
    pub fn enqueue(&mut self, list: &[TrackId], action: EnqueueAction) -> EnqueueOutcome {
        if list.is_empty() {
            return EnqueueOutcome::Unchanged;
        }

        self.ensure_capacity(self.items.len() + list.len());

        let insert_after = self
            .position
            .map(|pos| pos + 1)
            .filter(|&next| action == EnqueueAction::Next && next < self.items.len());

        match insert_after {
            Some(index) => {
                self.items.splice(index..index, list.iter().copied());
                // Entries at or past the insertion point moved right
                for entry in &mut self.history {
                    if *entry >= index {
                        *entry += list.len();
                    }
                }
            }
            None => {
                let first_new = self.items.len();
                self.items.extend_from_slice(list);
                if action == EnqueueAction::Now {
                    self.position = Some(first_new);
                    return EnqueueOutcome::OpenAndPlay;
                }
            }
        }

        if self.position.is_none() {
            self.position = Some(0);
            return EnqueueOutcome::OpenAndPlay;
        }
        EnqueueOutcome::Queued
    }

    /// Move one item, shifting the ones in between by a slot
    ///
    /// Both indices are clamped to the last item.
    pub fn move_item(&mut self, from: usize, to: usize) {
        let Some(last) = self.items.len().checked_sub(1) else {
            return;
        };
        let from = from.min(last);
        let to = to.min(last);
        if from == to {
            return;
        }

        if from < to {
            self.items[from..=to].rotate_left(1);
        } else {
            self.items[to..=from].rotate_right(1);
        }

        let shift = |index: usize| -> usize {
            if index == from {
                to
            } else if from < to && (from + 1..=to).contains(&index) {
                index - 1
            } else if to < from && (to..from).contains(&index) {
                index + 1
            } else {
                index
            }
        };

        self.position = self.position.map(shift);
        for entry in &mut self.history {
            *entry = shift(*entry);
        }
    }

    /// Delete the inclusive range `[first, last]`
    ///
    /// The range is clamped to the queue. When the current position falls
    /// inside it, the position lands on `first` (wrapping to 0 past the new
    /// end); a position after the range shifts left.
    pub fn remove_range(&mut self, first: usize, last: usize) -> Removal {
        let len = self.items.len();
        if len == 0 || first > last || first >= len {
            return Removal::default();
        }
        let last = last.min(len - 1);
        let count = last - first + 1;

        let mut current_removed = false;
        self.position = match self.position {
            Some(pos) if (first..=last).contains(&pos) => {
                current_removed = true;
                Some(first)
            }
            Some(pos) if pos > last => Some(pos - count),
            other => other,
        };

        self.items.drain(first..=last);

        self.history.retain(|entry| !(first..=last).contains(entry));
        for entry in &mut self.history {
            if *entry > last {
                *entry -= count;
            }
        }

        if self.items.is_empty() {
            self.position = None;
        } else if self.position.is_some_and(|pos| pos >= self.items.len()) {
            self.position = Some(0);
        }

        Removal {
            removed: count,
            current_removed,
        }
    }

    /// Delete every occurrence of `id`
    pub fn remove_id(&mut self, id: TrackId) -> Removal {
        let mut total = Removal::default();
        let mut index = 0;
        while index < self.items.len() {
            if self.items[index] == id {
                total = total.merge(self.remove_range(index, index));
            } else {
                index += 1;
            }
        }
        total
    }

    /// Jump to `index`; returns `false` when out of range
    pub fn set_position(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.position = Some(index);
        true
    }

    /// Record `position` as visited
    ///
    /// A position equal to the newest entry is not recorded twice. The
    /// oldest entry is dropped once the history is full.
    pub fn push_history(&mut self, position: usize) {
        if position >= self.items.len() || self.history.last() == Some(&position) {
            return;
        }
        self.history.push(position);
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
    }

    pub fn pop_history(&mut self) -> Option<usize> {
        self.history.pop()
    }

    /// Replace the history, keeping only in-range entries
    pub fn set_history(&mut self, history: Vec<usize>) {
        let len = self.items.len();
        self.history = history.into_iter().filter(|&entry| entry < len).collect();
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Positions not present in the history, ascending
    pub fn unplayed(&self) -> Vec<usize> {
        (0..self.items.len())
            .filter(|index| !self.history.contains(index))
            .collect()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.items.clear();
        self.position = None;
        self.history.clear();
    }

    /// Grow storage to twice the requested size when it runs short
    fn ensure_capacity(&mut self, needed: usize) {
        if needed > self.items.capacity() {
            self.items.reserve(needed * 2 - self.items.len());
        }
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new(100)
    }
}
