//! # Undo / Redo Snapshots
//!
//! Every part keeps two bounded stacks of [`UndoState`] snapshots. A
//! snapshot is taken before an edit and replayed to reverse it.
//!
//! ## Capture rules
//!
//! | Part kind | position                | rotation       | parent_rotation    |
//! |-----------|-------------------------|----------------|--------------------|
//! | root      | group absolute position | part rotation  | identity           |
//! | child     | offset from root        | part rotation  | root part rotation |
//!
//! On replay a zero vector or identity rotation means "not captured" and
//! leaves the current value alone. Replaying the root part also replays one
//! step of every child's own history.
//!
//! Snapshots do not lock anything on the scene; callers replay them inside a
//! transaction covering the group.

use std::collections::VecDeque;

use lattice_shared::{Quaternion, Vec3};

use crate::entity::{Part, SceneObjectGroup};

/// Captured transform of one part at one instant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UndoState {
    /// Absolute position (root) or offset position (child).
    pub position: Vec3,
    /// Part rotation.
    pub rotation: Quaternion,
    /// Part scale.
    pub scale: Vec3,
    /// Root part rotation at capture time (children only).
    pub parent_rotation: Quaternion,
}

impl Default for UndoState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quaternion::IDENTITY,
            scale: Vec3::ZERO,
            parent_rotation: Quaternion::IDENTITY,
        }
    }
}

impl UndoState {
    /// Captures the current transform of `part`.
    #[must_use]
    pub fn capture(part: &Part, group: &SceneObjectGroup) -> Self {
        let transform = part.transform();
        if group.is_root(part) {
            Self {
                position: group.absolute_position(),
                rotation: transform.rotation,
                scale: transform.scale,
                parent_rotation: Quaternion::IDENTITY,
            }
        } else {
            Self {
                position: transform.position,
                rotation: transform.rotation,
                scale: transform.scale,
                parent_rotation: group.root_rotation(),
            }
        }
    }

    /// True if `part` currently has exactly this transform.
    #[must_use]
    pub fn compare(&self, part: &Part, group: &SceneObjectGroup) -> bool {
        *self == Self::capture(part, group)
    }

    /// Reverses an edit by restoring this snapshot.
    pub fn playback(&self, part: &Part, group: &SceneObjectGroup) {
        self.replay(part, group, Part::undo);
    }

    /// Reapplies an undone edit by restoring this snapshot.
    pub fn play_forward(&self, part: &Part, group: &SceneObjectGroup) {
        self.replay(part, group, Part::redo);
    }

    fn replay(
        &self,
        part: &Part,
        group: &SceneObjectGroup,
        step_child: fn(&Part, &SceneObjectGroup) -> bool,
    ) {
        part.set_undoing(true);
        let is_root = group.is_root(part);

        if !self.position.is_zero() {
            if is_root {
                group.set_absolute_position(self.position);
            } else {
                part.set_offset_position(self.position);
            }
        }
        if !self.rotation.is_identity() {
            part.set_rotation(self.rotation);
        }
        if !self.scale.is_zero() {
            part.set_scale(self.scale);
        }

        if is_root {
            let parts = group.parts().snapshot();
            for child in parts.iter().filter(|child| child.id() != part.id()) {
                step_child(child, group);
            }
        }
        part.set_undoing(false);
    }
}

/// Bounded LIFO of snapshots. Pushing onto a full stack drops the oldest.
#[derive(Clone, Debug)]
pub struct UndoStack {
    entries: VecDeque<UndoState>,
    capacity: usize,
}

impl UndoStack {
    /// Creates an empty stack. A zero capacity stores nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a snapshot, evicting the oldest if full.
    pub fn push(&mut self, state: UndoState) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(state);
    }

    /// Pops the newest snapshot.
    pub fn pop(&mut self) -> Option<UndoState> {
        self.entries.pop_back()
    }

    /// Newest snapshot.
    #[must_use]
    pub fn peek(&self) -> Option<&UndoState> {
        self.entries.back()
    }

    /// Drops every snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Changes the bound, dropping the oldest entries that no longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }

    /// Maximum depth.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Undo and redo stacks of one part.
#[derive(Clone, Debug)]
pub struct UndoHistory {
    /// Snapshots that reverse past edits.
    pub undo: UndoStack,
    /// Snapshots that reapply undone edits.
    pub redo: UndoStack,
}

impl UndoHistory {
    /// Creates empty stacks of the given depth.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            undo: UndoStack::new(capacity),
            redo: UndoStack::new(capacity),
        }
    }

    /// Changes the depth of both stacks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.undo.set_capacity(capacity);
        self.redo.set_capacity(capacity);
    }
}

impl Part {
    /// Records the current transform ahead of an edit.
    ///
    /// Skipped while the part is replaying, when the newest snapshot already
    /// matches, or when undo is disabled. A stored snapshot clears redo.
    pub fn store_undo_state(&self, group: &SceneObjectGroup) -> bool {
        if self.is_undoing() {
            return false;
        }
        let mut history = self.undo_history().lock();
        if history.undo.capacity() == 0 {
            return false;
        }
        if history.undo.peek().is_some_and(|last| last.compare(self, group)) {
            return false;
        }
        history.undo.push(UndoState::capture(self, group));
        history.redo.clear();
        true
    }

    /// Reverts the newest edit. Returns false if there is nothing to undo.
    pub fn undo(&self, group: &SceneObjectGroup) -> bool {
        let mut history = self.undo_history().lock();
        let Some(state) = history.undo.pop() else {
            return false;
        };
        history.redo.push(UndoState::capture(self, group));
        state.playback(self, group);
        true
    }

    /// Reapplies the newest undone edit. Returns false if there is nothing to redo.
    pub fn redo(&self, group: &SceneObjectGroup) -> bool {
        let mut history = self.undo_history().lock();
        let Some(state) = history.redo.pop() else {
            return false;
        };
        history.undo.push(UndoState::capture(self, group));
        state.play_forward(self, group);
        true
    }

    /// Empties both stacks and records the current transform as the baseline.
    pub fn clear_undo_state(&self, group: &SceneObjectGroup) {
        {
            let mut history = self.undo_history().lock();
            history.undo.clear();
            history.redo.clear();
        }
        self.store_undo_state(group);
    }

    /// Depth of the undo stack.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_history().lock().undo.len()
    }

    /// Depth of the redo stack.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.undo_history().lock().redo.len()
    }
}
