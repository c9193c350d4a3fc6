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

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mnemonic used for bytes that do not decode to an opcode of the active fork
pub const INVALID_MNEMONIC: &str = "INVALID";

/// A decoded instruction row as shown by the UI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    /// Byte offset of the opcode within the bytecode
    pub id: usize,
    /// Mnemonic, or [`INVALID_MNEMONIC`]
    pub name: String,
    /// Push operand as hex, possibly shorter than declared if the code is truncated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Mirrors breakpoint membership of `id`
    #[serde(default)]
    pub has_breakpoint: bool,
}

impl Instruction {
    /// An instruction without immediate data
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), value: None, has_breakpoint: false }
    }

    /// A push instruction carrying `value` as its operand
    pub fn with_value(id: usize, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { id, name: name.into(), value: Some(value.into()), has_breakpoint: false }
    }

    /// An undecodable byte at `id`
    pub fn invalid(id: usize) -> Self {
        Self::new(id, INVALID_MNEMONIC)
    }

    /// Whether the byte did not decode
    pub fn is_invalid(&self) -> bool {
        self.name == INVALID_MNEMONIC
    }

    /// Number of bytes this instruction occupies in the bytecode
    ///
    /// A truncated push operand counts only the bytes actually present.
    pub fn size(&self) -> usize {
        1 + self.value.as_ref().map_or(0, |v| v.len().div_ceil(2))
    }

    /// Byte offset of the instruction that follows this one
    pub fn next_id(&self) -> usize {
        self.id + self.size()
    }

    /// Whether byte `offset` lies within this instruction, operand included
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.id && offset < self.next_id()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} 0x{}", self.name, value),
            None => f.write_str(&self.name),
        }
    }
}
