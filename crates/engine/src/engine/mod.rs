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

//! The EVM engine seam
//!
//! The playground does not interpret bytecode itself. An [`EvmEngine`] runs a
//! transaction and calls back into a [`StepHandler`] before every instruction
//! and into a [`StorageBackend`] after every storage mutation. The session only
//! talks to the engine through this trait, which lets tests drive the stepping
//! machinery with scripted engines.

mod revm_engine;
pub use revm_engine::RevmEngine;

use alloy_primitives::{Address, Bytes, TxKind, U256};
use revm::primitives::hardfork::SpecId;
use thiserror::Error;

use crate::{OpcodeTable, StorageBackend};

/// Errors reported by an engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The transaction was rejected before execution (nonce, balance, gas limit, ...)
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The state database failed
    #[error("database error: {0}")]
    Database(String),

    /// The engine worker stopped without reporting a result
    #[error("engine worker stopped before the run finished")]
    WorkerStopped,
}

/// Engine state at an instruction boundary, before the instruction executes
#[derive(Debug, Clone, Copy)]
pub struct RawStep<'a> {
    /// Call depth, 0 for the frame started by the transaction
    pub depth: usize,
    /// Program counter of the instruction about to execute
    pub pc: usize,
    /// Opcode about to execute
    pub opcode: u8,
    /// Gas remaining in the current frame
    pub gas_left: u64,
    /// Gas consumed in this frame since the previous step of the same frame
    pub opcode_fee: u64,
    /// Stack, bottom first
    pub stack: &'a [U256],
    /// Active memory
    pub memory: &'a [u8],
    /// Number of active 32-byte memory words
    pub memory_word_count: usize,
}

/// Decision of a [`StepHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    /// Execute the instruction
    Continue,
    /// Halt the transaction; its state changes are not committed
    Abort,
}

/// Callback invoked by the engine at every instruction boundary of every frame
pub trait StepHandler {
    /// Inspect the step and decide whether execution continues
    fn on_step(&mut self, step: &RawStep<'_>) -> StepControl;
}

/// A transaction ready for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sender, as recovered from the signature
    pub caller: Address,
    /// Contract creation or call target
    pub kind: TxKind,
    /// Wei transferred with the transaction
    pub value: U256,
    /// Calldata or init code
    pub data: Bytes,
    /// Gas limit
    pub gas_limit: u64,
    /// Sender nonce
    pub nonce: u64,
}

impl TransactionRequest {
    /// Whether this transaction creates a contract
    pub fn is_create(&self) -> bool {
        self.kind.is_create()
    }
}

/// Result of a completed transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Return or revert data
    pub return_value: Bytes,
    /// Gas used by the transaction
    pub total_gas_spent: u64,
    /// Address of the created contract, for successful creations
    pub created_address: Option<Address>,
    /// Execution exception such as `revert` or an out-of-gas halt
    pub exception: Option<String>,
    /// The step handler aborted the run and nothing was committed
    pub aborted: bool,
}

/// An EVM implementation the playground can drive step by step
pub trait EvmEngine: Send + 'static {
    /// Specification the engine runs with
    fn spec(&self) -> SpecId;

    /// Opcodes defined on [`Self::spec`]
    fn opcode_table(&self) -> &OpcodeTable;

    /// Chain id used for transactions and `CHAINID`
    fn chain_id(&self) -> u64;

    /// Replace the code of `address`, keeping its balance, nonce and storage
    fn install_code(&mut self, address: Address, code: Bytes) -> Result<(), EngineError>;

    /// Runtime code of `address`, empty for accounts without code
    fn account_code(&mut self, address: Address) -> Result<Bytes, EngineError>;

    /// Set the balance of `address`
    fn fund_account(&mut self, address: Address, balance: U256) -> Result<(), EngineError>;

    /// Current nonce of `address`
    fn account_nonce(&mut self, address: Address) -> Result<u64, EngineError>;

    /// Execute `tx`, reporting every step to `handler` and every storage
    /// mutation to `backend`, and commit the result unless the handler aborted
    fn run_transaction(
        &mut self,
        tx: &TransactionRequest,
        handler: &mut dyn StepHandler,
        backend: &mut dyn StorageBackend,
    ) -> Result<RunOutcome, EngineError>;
}
