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

use serde::{Deserialize, Serialize};

/// One persistent storage slot of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
    /// Account address, checksummed hex
    pub address: String,
    /// Slot index, 32-byte hex
    pub slot: String,
    /// Slot value, 32-byte hex
    pub value: String,
}

/// One transient storage key (EIP-1153) of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransientStorageEntry {
    /// Account address, checksummed hex
    pub address: String,
    /// Transient key, 32-byte hex
    pub key: String,
    /// Transient value, 32-byte hex
    pub value: String,
}

/// Snapshot of the machine at one top-level instruction boundary
///
/// A new value is published for every executed top-level instruction and
/// replaces the previous one wholesale. `storage` and `transient_storage`
/// always hold the complete contents of the shadow maps at that point, never
/// a diff against the previous state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    /// Byte offset of the next instruction, `None` before execution starts
    pub program_counter: Option<usize>,
    /// Stack words as lowercase hex without prefix, top of stack first
    pub stack: Vec<String>,
    /// Active memory as hex, exactly `64 * memory word count` characters
    pub memory: String,
    /// All persistent storage known to the shadow
    pub storage: Vec<StorageEntry>,
    /// All transient storage known to the shadow
    pub transient_storage: Vec<TransientStorageEntry>,
    /// Gas used by the transaction so far, decimal
    pub total_gas: Option<String>,
    /// Gas used by the previously executed instruction of the same call
    /// frame, decimal
    ///
    /// This is not the fee of the instruction at `program_counter`; that fee
    /// shows up on the next state of the frame. It is `"0"` at the first step
    /// of every frame.
    pub current_gas: Option<String>,
    /// Output of the run as hex, only on terminal states with output
    pub return_value: Option<String>,
}

impl ExecutionState {
    /// Whether nothing has been executed yet
    pub fn is_initial(&self) -> bool {
        self.program_counter.is_none()
    }

    /// Number of 32-byte words in active memory
    pub fn memory_word_count(&self) -> usize {
        self.memory.len() / 64
    }

    /// Stack word at `index` counted from the top
    pub fn stack_item(&self, index: usize) -> Option<&str> {
        self.stack.get(index).map(String::as_str)
    }
}
