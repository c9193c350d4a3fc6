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

//! Fork-specific opcode tables
//!
//! The decoder only knows the opcodes that exist on the selected fork: a byte
//! such as `0x5f` is `PUSH0` from Shanghai on and an invalid instruction
//! before. An [`OpcodeTable`] is built once per engine from revm's opcode
//! metadata and the activation fork of each opcode.

use std::fmt;

use evmpg_common::OpcodeTr;
use revm::{bytecode::OpCode, primitives::hardfork::SpecId};

/// Decoding information for one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    /// The opcode byte
    pub code: u8,
    /// Mnemonic, e.g. `PUSH1`
    pub name: &'static str,
    /// Number of immediate bytes following the opcode
    pub immediate_size: usize,
}

/// The set of opcodes defined on one fork, indexed by byte
#[derive(Clone, PartialEq, Eq)]
pub struct OpcodeTable {
    spec: SpecId,
    entries: [Option<OpcodeEntry>; 256],
}

impl OpcodeTable {
    /// Build the table for `spec`
    pub fn for_spec(spec: SpecId) -> Self {
        let mut entries = [None; 256];
        for byte in 0..=u8::MAX {
            let Some(opcode) = OpCode::new(byte) else { continue };
            if !spec.is_enabled_in(opcode.introduced_in()) {
                continue;
            }
            entries[byte as usize] = Some(OpcodeEntry {
                code: byte,
                name: opcode.as_str(),
                immediate_size: opcode.push_size(),
            });
        }
        Self { spec, entries }
    }

    /// The fork this table was built for
    pub fn spec(&self) -> SpecId {
        self.spec
    }

    /// Look up an opcode byte
    pub fn get(&self, byte: u8) -> Option<&OpcodeEntry> {
        self.entries[byte as usize].as_ref()
    }

    /// Whether `byte` is a defined opcode on this fork
    pub fn contains(&self, byte: u8) -> bool {
        self.entries[byte as usize].is_some()
    }

    /// Defined opcodes in byte order
    pub fn iter(&self) -> impl Iterator<Item = &OpcodeEntry> {
        self.entries.iter().flatten()
    }

    /// Number of defined opcodes
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for OpcodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeTable").field("spec", &self.spec).field("len", &self.len()).finish()
    }
}
