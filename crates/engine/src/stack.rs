// SymStack - Symbolic EVM Stack Tracker
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Persistent symbolic stack

use itertools::Itertools;
use rpds::VectorSync;
use serde::{Deserialize, Serialize};
use symstack_common::types::StackSlot;

/// A persistent symbolic stack, index 0 at the bottom.
///
/// Every method taking `&self` returns a NEW stack that shares structure with
/// the old one, so per-step snapshots cost only the slots that changed. Keep
/// old handles as snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolicStack {
    v: VectorSync<StackSlot>,
}

impl SymbolicStack {
    /// Create a new, empty stack.
    pub fn new() -> Self {
        Self { v: VectorSync::new_sync() }
    }

    /// Return the depth of the stack.
    pub fn len(&self) -> usize {
        self.v.len()
    }

    /// Check if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    /// Push a slot, returning a new stack.
    pub fn push(&self, slot: StackSlot) -> Self {
        Self { v: self.v.push_back(slot) }
    }

    /// Pop the top slot, returning it together with a new stack.
    /// Returns None if the stack is empty.
    pub fn pop(&self) -> Option<(StackSlot, Self)> {
        let slot = self.v.last()?.clone();
        let rest = Self { v: self.v.drop_last()? };
        Some((slot, rest))
    }

    /// Get the slot at `index`, counted from the bottom.
    pub fn get(&self, index: usize) -> Option<&StackSlot> {
        self.v.get(index)
    }

    /// Get a slot counted from the top. `peek(0)` is the top of the stack.
    pub fn peek(&self, depth: usize) -> Option<&StackSlot> {
        if depth >= self.len() {
            return None;
        }
        self.v.get(self.len() - 1 - depth)
    }

    /// The top slot.
    pub fn top(&self) -> Option<&StackSlot> {
        self.v.last()
    }

    /// Replace the slot at `index`, returning a new stack.
    /// Returns None if `index` is out of range.
    pub fn set(&self, index: usize, slot: StackSlot) -> Option<Self> {
        self.v.set(index, slot).map(|v| Self { v })
    }

    /// Replace the slot at `index` in place. Returns false if `index` is out of range.
    pub fn set_mut(&mut self, index: usize, slot: StackSlot) -> bool {
        self.v.set_mut(index, slot)
    }

    /// Mutable access to the slot at `index`, copying it out of shared storage first.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut StackSlot> {
        self.v.get_mut(index)
    }

    /// Push in place.
    pub fn push_mut(&mut self, slot: StackSlot) {
        self.v.push_back_mut(slot);
    }

    /// Pop in place, returning the removed slot.
    pub fn pop_mut(&mut self) -> Option<StackSlot> {
        let slot = self.v.last()?.clone();
        self.v.drop_last_mut();
        Some(slot)
    }

    /// Exchange the slots at `a` and `b`, returning a new stack.
    /// Returns None if either index is out of range.
    pub fn swap(&self, a: usize, b: usize) -> Option<Self> {
        let slot_a = self.get(a)?.clone();
        let slot_b = self.get(b)?.clone();
        self.set(a, slot_b)?.set(b, slot_a)
    }

    /// Keep only the bottom `depth` slots, returning a new stack.
    pub fn truncate(&self, depth: usize) -> Self {
        let mut stack = self.clone();
        while stack.len() > depth {
            stack.v.drop_last_mut();
        }
        stack
    }

    /// Iterate from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &StackSlot> {
        self.v.iter()
    }

    /// Iterate `(index, slot)` pairs from bottom to top.
    pub fn enumerate(&self) -> impl Iterator<Item = (usize, &StackSlot)> {
        self.v.iter().enumerate()
    }

    /// Whether every variable has at most one original (non-copy) slot.
    pub fn has_unique_originals(&self) -> bool {
        self.iter()
            .filter(|slot| slot.is_original_declaration())
            .filter_map(StackSlot::variable_id)
            .all_unique()
    }

    /// Convert the stack to a `Vec<StackSlot>`, bottom first.
    pub fn to_vec(&self) -> Vec<StackSlot> {
        self.v.iter().cloned().collect()
    }
}

impl FromIterator<StackSlot> for SymbolicStack {
    fn from_iter<I: IntoIterator<Item = StackSlot>>(iter: I) -> Self {
        let mut stack = Self::new();
        for slot in iter {
            stack.push_mut(slot);
        }
        stack
    }
}

impl From<Vec<StackSlot>> for SymbolicStack {
    fn from(slots: Vec<StackSlot>) -> Self {
        slots.into_iter().collect()
    }
}
