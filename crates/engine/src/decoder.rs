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

//! Bytecode decoding for the instruction view
//!
//! Turns a hex string into the list of [`Instruction`] rows the UI shows. The
//! decoder never fails: bytes that are not valid hex or not an opcode of the
//! active fork become `INVALID` rows, and a push whose operand runs past the
//! end of the code keeps whatever hex characters remain.

use evmpg_common::types::Instruction;

use crate::OpcodeTable;

/// Decode a hex string (without `0x` prefix) into instructions
///
/// Instruction ids are byte offsets into the code. The result is deterministic
/// and depends only on `bytecode` and `table`.
///
/// # Examples
/// ```rust
/// use evmpg_engine::{decode, OpcodeTable};
/// use revm::primitives::hardfork::SpecId;
///
/// let table = OpcodeTable::for_spec(SpecId::PRAGUE);
/// let instructions = decode("602a80", &table);
/// assert_eq!(instructions.len(), 2);
/// assert_eq!(instructions[0].value.as_deref(), Some("2a"));
/// assert_eq!(instructions[1].id, 2);
/// ```
pub fn decode(bytecode: &str, table: &OpcodeTable) -> Vec<Instruction> {
    let hex = bytecode.as_bytes();
    let mut instructions = Vec::new();
    let mut cursor = 0;

    while cursor < hex.len() {
        let id = cursor / 2;
        let end = (cursor + 2).min(hex.len());

        let Some(entry) = parse_byte(&hex[cursor..end]).and_then(|byte| table.get(byte)) else {
            instructions.push(Instruction::invalid(id));
            cursor += 2;
            continue;
        };

        if entry.immediate_size == 0 {
            instructions.push(Instruction::new(id, entry.name));
            cursor += 2;
            continue;
        }

        let operand_start = cursor + 2;
        let operand_end = (operand_start + entry.immediate_size * 2).min(hex.len());
        let operand = String::from_utf8_lossy(&hex[operand_start.min(hex.len())..operand_end]);
        instructions.push(Instruction::with_value(id, entry.name, operand));
        cursor = operand_start + entry.immediate_size * 2;
    }

    instructions
}

fn parse_byte(pair: &[u8]) -> Option<u8> {
    if pair.len() != 2 {
        return None;
    }
    let pair = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(pair, 16).ok()
}

/// Find the instruction whose bytes cover `offset`
///
/// Useful when an offset points into the operand of a push.
pub fn find_instruction_containing(
    instructions: &[Instruction],
    offset: usize,
) -> Option<&Instruction> {
    let index = instructions.partition_point(|inst| inst.id <= offset);
    let candidate = instructions.get(index.checked_sub(1)?)?;
    candidate.contains(offset).then_some(candidate)
}

/// Format an instruction as one disassembly line
pub fn format_instruction(instruction: &Instruction, show_pc: bool) -> String {
    if show_pc {
        format!("{:04x}: {}", instruction.id, instruction)
    } else {
        instruction.to_string()
    }
}
