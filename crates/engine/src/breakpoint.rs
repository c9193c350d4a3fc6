// EVMPG - EVM Playground
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

//! Breakpoint management
//!
//! Breakpoints are instruction ids (byte offsets). They survive resets and
//! new runs of the same code; only [`BreakpointController::reset`] clears them.

use std::collections::BTreeSet;

use evmpg_common::types::Instruction;

/// Set of instruction ids at which auto-advance pauses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointController {
    breakpoints: BTreeSet<usize>,
}

impl BreakpointController {
    /// Create an empty controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint; returns whether it was newly added
    pub fn add(&mut self, id: usize) -> bool {
        self.breakpoints.insert(id)
    }

    /// Remove a breakpoint; returns whether it was present
    pub fn remove(&mut self, id: usize) -> bool {
        self.breakpoints.remove(&id)
    }

    /// Toggle a breakpoint; returns whether it is now set
    pub fn toggle(&mut self, id: usize) -> bool {
        if self.breakpoints.remove(&id) {
            false
        } else {
            self.breakpoints.insert(id);
            true
        }
    }

    /// Check if a breakpoint exists at `id`
    pub fn has(&self, id: usize) -> bool {
        self.breakpoints.contains(&id)
    }

    /// Remove all breakpoints
    pub fn reset(&mut self) {
        self.breakpoints.clear();
    }

    /// Breakpoints in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Breakpoint count
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether no breakpoint is set
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Refresh the `has_breakpoint` flag of every instruction
    pub fn mark(&self, instructions: &mut [Instruction]) {
        for instruction in instructions {
            instruction.has_breakpoint = self.has(instruction.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_idempotent() {
        let mut breakpoints = BreakpointController::new();
        assert!(breakpoints.add(10));
        assert!(!breakpoints.add(10));
        assert!(breakpoints.has(10));
        assert_eq!(breakpoints.len(), 1);

        assert!(breakpoints.remove(10));
        assert!(!breakpoints.remove(10));
        assert!(!breakpoints.has(10));
        assert!(breakpoints.is_empty());
    }

    #[test]
    fn test_toggle_and_order() {
        let mut breakpoints = BreakpointController::new();
        assert!(breakpoints.toggle(20));
        breakpoints.add(3);
        breakpoints.add(11);
        assert_eq!(breakpoints.iter().collect::<Vec<_>>(), [3, 11, 20]);
        assert!(!breakpoints.toggle(20));
        assert_eq!(breakpoints.iter().collect::<Vec<_>>(), [3, 11]);

        breakpoints.reset();
        assert!(breakpoints.is_empty());
    }

    #[test]
    fn test_mark_instructions() {
        let mut breakpoints = BreakpointController::new();
        breakpoints.add(2);

        let mut instructions = vec![
            Instruction::with_value(0, "PUSH1", "01"),
            Instruction::new(2, "DUP1"),
            Instruction::new(3, "STOP"),
        ];
        instructions[2].has_breakpoint = true;
        breakpoints.mark(&mut instructions);

        let flags: Vec<_> = instructions.iter().map(|i| i.has_breakpoint).collect();
        assert_eq!(flags, [false, true, false]);
    }
}
