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

use revm::{bytecode::OpCode, primitives::hardfork::SpecId};

/// Extended trait for EVM opcode classification
///
/// Provides the questions the playground asks about an opcode that revm's
/// [`OpCode`] does not answer directly: which storage an opcode writes, how
/// many immediate bytes follow it, and from which fork on it exists.
pub trait OpcodeTr {
    /// Check if this opcode writes persistent contract storage
    ///
    /// # Example
    /// ```rust
    /// use revm::bytecode::OpCode;
    /// use evmpg_common::OpcodeTr;
    ///
    /// assert!(OpCode::SSTORE.writes_storage());
    /// assert!(!OpCode::SLOAD.writes_storage());
    /// assert!(!OpCode::TSTORE.writes_storage());
    /// ```
    fn writes_storage(&self) -> bool;

    /// Check if this opcode writes transient storage (EIP-1153)
    ///
    /// Note: `TLOAD` (0x5C) only reads transient storage and doesn't modify it.
    fn writes_transient_storage(&self) -> bool;

    /// Number of immediate operand bytes for `PUSH1`..`PUSH32`, zero otherwise
    fn push_size(&self) -> usize;

    /// The first hardfork in which this opcode is defined
    fn introduced_in(&self) -> SpecId;
}

impl OpcodeTr for OpCode {
    fn writes_storage(&self) -> bool {
        *self == Self::SSTORE
    }

    fn writes_transient_storage(&self) -> bool {
        *self == Self::TSTORE
    }

    fn push_size(&self) -> usize {
        match self.get() {
            op @ 0x60..=0x7f => (op - 0x5f) as usize,
            _ => 0,
        }
    }

    fn introduced_in(&self) -> SpecId {
        match *self {
            Self::DELEGATECALL => SpecId::HOMESTEAD,
            Self::RETURNDATASIZE | Self::RETURNDATACOPY | Self::STATICCALL | Self::REVERT => {
                SpecId::BYZANTIUM
            }
            Self::SHL | Self::SHR | Self::SAR | Self::EXTCODEHASH | Self::CREATE2 => {
                SpecId::PETERSBURG
            }
            Self::CHAINID | Self::SELFBALANCE => SpecId::ISTANBUL,
            Self::BASEFEE => SpecId::LONDON,
            Self::PUSH0 => SpecId::SHANGHAI,
            Self::TLOAD | Self::TSTORE | Self::MCOPY | Self::BLOBHASH | Self::BLOBBASEFEE => {
                SpecId::CANCUN
            }
            // CLZ (EIP-7939)
            _ if self.get() == 0x1e => SpecId::OSAKA,
            _ => SpecId::FRONTIER,
        }
    }
}
