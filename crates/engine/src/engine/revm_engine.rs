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

//! [`EvmEngine`] implementation on top of revm
//!
//! State lives in an in-memory [`CacheDB`]. Every transaction runs on a fresh
//! mainnet context over a copy of that database with a [`StepInspector`]
//! attached; the resulting state diff is committed back unless the step
//! handler aborted the run.

use alloy_primitives::{Address, Bytes, B256, U256};
use evmpg_common::OpcodeTr;
use revm::{
    bytecode::{Bytecode, OpCode},
    context::{
        result::{ExecutionResult, Output},
        ContextTr, TxEnv,
    },
    database::{CacheDB, EmptyDB},
    interpreter::{
        interpreter_types::{InputsTr, Jumps, LoopControl},
        CallInputs, CallOutcome, CreateInputs, CreateOutcome, InstructionResult, Interpreter,
        InterpreterAction,
    },
    primitives::hardfork::SpecId,
    Context, Database, DatabaseCommit, ExecuteEvm, InspectEvm, Inspector, MainBuilder,
    MainContext,
};
use tracing::{debug, trace};

use super::{
    EngineError, EvmEngine, RawStep, RunOutcome, StepControl, StepHandler, TransactionRequest,
};
use crate::{OpcodeTable, StorageBackend};

/// Block gas limit of the playground chain
const BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// revm-backed engine with in-memory state
#[derive(Debug)]
pub struct RevmEngine {
    db: CacheDB<EmptyDB>,
    spec: SpecId,
    chain_id: u64,
    opcodes: OpcodeTable,
}

impl RevmEngine {
    /// Create an engine with empty state
    pub fn new(spec: SpecId, chain_id: u64) -> Self {
        Self {
            db: CacheDB::new(EmptyDB::default()),
            spec,
            chain_id,
            opcodes: OpcodeTable::for_spec(spec),
        }
    }

    /// Value of a persistent storage slot
    pub fn storage(&mut self, address: Address, slot: U256) -> Result<U256, EngineError> {
        self.db.storage(address, slot).map_err(|e| EngineError::Database(e.to_string()))
    }

    fn account(&mut self, address: Address) -> Result<revm::state::AccountInfo, EngineError> {
        let info = self.db.basic(address).map_err(|e| EngineError::Database(e.to_string()))?;
        Ok(info.unwrap_or_default())
    }

    fn tx_env(&self, tx: &TransactionRequest) -> Result<TxEnv, EngineError> {
        TxEnv::builder()
            .caller(tx.caller)
            .kind(tx.kind)
            .value(tx.value)
            .data(tx.data.clone())
            .gas_limit(tx.gas_limit)
            .gas_price(0)
            .nonce(tx.nonce)
            .chain_id(Some(self.chain_id))
            .build()
            .map_err(|e| EngineError::InvalidTransaction(format!("{e:?}")))
    }
}

impl EvmEngine for RevmEngine {
    fn spec(&self) -> SpecId {
        self.spec
    }

    fn opcode_table(&self) -> &OpcodeTable {
        &self.opcodes
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn install_code(&mut self, address: Address, code: Bytes) -> Result<(), EngineError> {
        let mut info = self.account(address)?;
        let bytecode = Bytecode::new_raw(code);
        info.code_hash = bytecode.hash_slow();
        info.code = Some(bytecode);
        self.db.insert_account_info(address, info);
        Ok(())
    }

    fn account_code(&mut self, address: Address) -> Result<Bytes, EngineError> {
        let info = self.account(address)?;
        let code = match info.code {
            Some(code) => code,
            None => self
                .db
                .code_by_hash(info.code_hash)
                .map_err(|e| EngineError::Database(e.to_string()))?,
        };
        Ok(code.original_bytes())
    }

    fn fund_account(&mut self, address: Address, balance: U256) -> Result<(), EngineError> {
        let mut info = self.account(address)?;
        info.balance = balance;
        self.db.insert_account_info(address, info);
        Ok(())
    }

    fn account_nonce(&mut self, address: Address) -> Result<u64, EngineError> {
        Ok(self.account(address)?.nonce)
    }

    fn run_transaction(
        &mut self,
        tx: &TransactionRequest,
        handler: &mut dyn StepHandler,
        backend: &mut dyn StorageBackend,
    ) -> Result<RunOutcome, EngineError> {
        let tx_env = self.tx_env(tx)?;
        let (spec, chain_id) = (self.spec, self.chain_id);

        let ctx = Context::mainnet()
            .with_db(self.db.clone())
            .modify_block_chained(|b| {
                b.gas_limit = BLOCK_GAS_LIMIT.max(tx.gas_limit);
                b.prevrandao = Some(B256::ZERO);
            })
            .modify_cfg_chained(|c| {
                c.chain_id = chain_id;
                c.spec = spec;
            });

        let mut inspector = StepInspector::new(handler, backend);
        let mut evm = ctx.build_mainnet_with_inspector(&mut inspector);

        let result = evm
            .inspect_one_tx(tx_env)
            .map_err(|e| EngineError::InvalidTransaction(format!("{e:?}")))?;
        let changes = evm.finalize();
        drop(evm);

        let aborted = inspector.aborted;
        if aborted {
            debug!("Run aborted by the step handler, discarding state changes");
        } else {
            self.db.commit(changes);
        }

        let total_gas_spent = result.gas_used();
        let outcome = match result {
            ExecutionResult::Success { output, .. } => {
                let created_address = match &output {
                    Output::Create(_, address) => *address,
                    Output::Call(_) => None,
                };
                RunOutcome {
                    return_value: output.into_data(),
                    total_gas_spent,
                    created_address,
                    exception: None,
                    aborted,
                }
            }
            ExecutionResult::Revert { output, .. } => RunOutcome {
                return_value: output,
                total_gas_spent,
                created_address: None,
                exception: Some("revert".to_string()),
                aborted,
            },
            ExecutionResult::Halt { reason, .. } => RunOutcome {
                return_value: Bytes::new(),
                total_gas_spent,
                created_address: None,
                exception: Some(format!("{reason:?}")),
                aborted,
            },
        };

        Ok(outcome)
    }
}

/// A storage write observed at `step`, applied once the instruction succeeded
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    transient: bool,
    address: Address,
    key: U256,
    value: U256,
}

/// Per-frame bookkeeping
#[derive(Debug, Clone, Copy, Default)]
struct Frame {
    /// Gas remaining at the previous step of this frame
    gas_mark: Option<u64>,
    /// The frame runs init code
    is_create: bool,
}

/// Inspector forwarding steps to a [`StepHandler`] and storage writes to a
/// [`StorageBackend`]
struct StepInspector<'a> {
    handler: &'a mut dyn StepHandler,
    backend: &'a mut dyn StorageBackend,
    frames: Vec<Frame>,
    pending: Option<PendingWrite>,
    aborted: bool,
}

impl<'a> StepInspector<'a> {
    fn new(handler: &'a mut dyn StepHandler, backend: &'a mut dyn StorageBackend) -> Self {
        Self { handler, backend, frames: Vec::new(), pending: None, aborted: false }
    }

    fn enter_frame(&mut self, is_create: bool) {
        self.frames.push(Frame { gas_mark: None, is_create });
        self.backend.checkpoint();
    }

    fn exit_frame(&mut self, success: bool) {
        self.frames.pop();
        self.pending = None;
        if success {
            self.backend.commit();
        } else {
            self.backend.revert();
        }
    }

    fn halt(interp: &mut Interpreter) {
        interp.bytecode.set_action(InterpreterAction::new_return(
            InstructionResult::Revert,
            Bytes::new(),
            interp.gas,
        ));
    }
}

impl<CTX: ContextTr> Inspector<CTX> for StepInspector<'_> {
    fn initialize_interp(&mut self, interp: &mut Interpreter, _context: &mut CTX) {
        // Storage of a freshly created account starts empty.
        if self.frames.last().is_some_and(|frame| frame.is_create) {
            self.backend.clear_address(interp.input.target_address());
        }
    }

    fn step(&mut self, interp: &mut Interpreter, _context: &mut CTX) {
        if self.aborted {
            Self::halt(interp);
            return;
        }

        let gas_left = interp.gas.remaining();
        let depth = self.frames.len().saturating_sub(1);
        let opcode_fee = match self.frames.last_mut() {
            Some(frame) => {
                let fee = frame.gas_mark.map_or(0, |mark| mark.saturating_sub(gas_left));
                frame.gas_mark = Some(gas_left);
                fee
            }
            None => 0,
        };

        let op = interp.bytecode.opcode();
        let control = {
            let memory = interp.memory.context_memory();
            let step = RawStep {
                depth,
                pc: interp.bytecode.pc(),
                opcode: op,
                gas_left,
                opcode_fee,
                stack: interp.stack.data(),
                memory: &memory,
                memory_word_count: memory.len() / 32,
            };
            self.handler.on_step(&step)
        };

        if control == StepControl::Abort {
            trace!(depth, "Step handler aborted the run");
            self.aborted = true;
            Self::halt(interp);
            return;
        }

        let Some(opcode) = OpCode::new(op) else { return };
        if opcode.writes_storage() || opcode.writes_transient_storage() {
            if let (Ok(key), Ok(value)) = (interp.stack.peek(0), interp.stack.peek(1)) {
                self.pending = Some(PendingWrite {
                    transient: opcode.writes_transient_storage(),
                    address: interp.input.target_address(),
                    key,
                    value,
                });
            }
        }
    }

    fn step_end(&mut self, interp: &mut Interpreter, _context: &mut CTX) {
        let Some(write) = self.pending.take() else { return };
        // A failed store (out of gas, static context) ends the frame instead.
        if interp.bytecode.is_end() {
            return;
        }
        if write.transient {
            self.backend.set_transient(write.address, write.key, write.value);
        } else {
            self.backend.set_slot(write.address, write.key, write.value);
        }
    }

    fn call(&mut self, _context: &mut CTX, _inputs: &mut CallInputs) -> Option<CallOutcome> {
        self.enter_frame(false);
        None
    }

    fn call_end(&mut self, _context: &mut CTX, _inputs: &CallInputs, outcome: &mut CallOutcome) {
        self.exit_frame(outcome.result.is_ok());
    }

    fn create(&mut self, _context: &mut CTX, _inputs: &mut CreateInputs) -> Option<CreateOutcome> {
        self.enter_frame(true);
        None
    }

    fn create_end(
        &mut self,
        _context: &mut CTX,
        _inputs: &CreateInputs,
        outcome: &mut CreateOutcome,
    ) {
        self.exit_frame(outcome.result.is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShadowStorage;
    use alloy_primitives::TxKind;

    const CALLER: Address = Address::repeat_byte(0x11);
    const TARGET: Address = Address::repeat_byte(0x22);

    #[derive(Default)]
    struct Recorder {
        steps: Vec<(usize, usize, u8, u64)>,
        abort_after: Option<usize>,
    }

    impl StepHandler for Recorder {
        fn on_step(&mut self, step: &RawStep<'_>) -> StepControl {
            self.steps.push((step.depth, step.pc, step.opcode, step.opcode_fee));
            match self.abort_after {
                Some(limit) if self.steps.len() > limit => StepControl::Abort,
                _ => StepControl::Continue,
            }
        }
    }

    fn engine_with_code(code: &str) -> RevmEngine {
        let mut engine = RevmEngine::new(SpecId::PRAGUE, 1);
        engine.fund_account(CALLER, U256::from(10u64).pow(U256::from(18u64))).unwrap();
        engine.install_code(TARGET, hex::decode(code).unwrap().into()).unwrap();
        engine
    }

    fn call(engine: &mut RevmEngine, data: Bytes) -> TransactionRequest {
        TransactionRequest {
            caller: CALLER,
            kind: TxKind::Call(TARGET),
            value: U256::ZERO,
            data,
            gas_limit: 1_000_000,
            nonce: engine.account_nonce(CALLER).unwrap(),
        }
    }

    #[test]
    fn test_steps_and_return_value() {
        // PUSH1 42 PUSH1 00 MSTORE PUSH1 20 PUSH1 00 RETURN
        let mut engine = engine_with_code("602a60005260206000f3");
        let tx = call(&mut engine, Bytes::new());
        let mut recorder = Recorder::default();
        let mut shadow = ShadowStorage::new();

        let outcome = engine.run_transaction(&tx, &mut recorder, &mut shadow).unwrap();

        let pcs: Vec<_> = recorder.steps.iter().map(|s| s.1).collect();
        assert_eq!(pcs, [0, 2, 4, 5, 7, 9]);
        assert!(recorder.steps.iter().all(|s| s.0 == 0));
        assert_eq!(recorder.steps[0].3, 0);
        // PUSH1 costs 3 gas
        assert_eq!(recorder.steps[1].3, 3);
        assert_eq!(outcome.exception, None);
        assert_eq!(U256::from_be_slice(&outcome.return_value), U256::from(0x2a));
        assert!(outcome.total_gas_spent > 21_000);
        assert_eq!(engine.account_nonce(CALLER).unwrap(), 1);
    }

    #[test]
    fn test_storage_writes_reach_backend() {
        // PUSH1 01 PUSH1 05 SSTORE PUSH1 02 PUSH1 07 TSTORE STOP
        let mut engine = engine_with_code("6001600555600260075d00");
        let tx = call(&mut engine, Bytes::new());
        let mut shadow = ShadowStorage::new();

        let outcome =
            engine.run_transaction(&tx, &mut Recorder::default(), &mut shadow).unwrap();

        assert_eq!(outcome.exception, None);
        assert_eq!(shadow.slot(TARGET, U256::from(5)), Some(U256::from(1)));
        assert_eq!(shadow.transient(TARGET, U256::from(7)), Some(U256::from(2)));
        assert_eq!(shadow.checkpoint_depth(), 0);
        assert_eq!(engine.storage(TARGET, U256::from(5)).unwrap(), U256::from(1));
    }

    #[test]
    fn test_revert_discards_shadow_writes() {
        // PUSH1 01 PUSH1 05 SSTORE PUSH1 00 DUP1 REVERT
        let mut engine = engine_with_code("6001600555600080fd");
        let tx = call(&mut engine, Bytes::new());
        let mut shadow = ShadowStorage::new();

        let outcome =
            engine.run_transaction(&tx, &mut Recorder::default(), &mut shadow).unwrap();

        assert_eq!(outcome.exception.as_deref(), Some("revert"));
        assert!(shadow.snapshot().storage.is_empty());
        assert_eq!(engine.storage(TARGET, U256::from(5)).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_abort_does_not_commit() {
        let mut engine = engine_with_code("6001600555600260075d00");
        let tx = call(&mut engine, Bytes::new());
        let mut recorder = Recorder { abort_after: Some(3), ..Default::default() };
        let mut shadow = ShadowStorage::new();

        let outcome = engine.run_transaction(&tx, &mut recorder, &mut shadow).unwrap();

        assert!(outcome.aborted);
        assert_eq!(recorder.steps.len(), 4);
        assert!(shadow.snapshot().storage.is_empty());
        assert_eq!(engine.account_nonce(CALLER).unwrap(), 0);
        assert_eq!(engine.storage(TARGET, U256::from(5)).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_create_reports_address() {
        // init code returning the one-byte runtime code 0x00:
        // PUSH1 00 PUSH1 00 MSTORE8 PUSH1 01 PUSH1 00 RETURN
        let mut engine = RevmEngine::new(SpecId::PRAGUE, 1);
        engine.fund_account(CALLER, U256::from(10u64).pow(U256::from(18u64))).unwrap();
        let tx = TransactionRequest {
            caller: CALLER,
            kind: TxKind::Create,
            value: U256::ZERO,
            data: hex::decode("600060005360016000f3").unwrap().into(),
            gas_limit: 1_000_000,
            nonce: 0,
        };

        let outcome = engine
            .run_transaction(&tx, &mut Recorder::default(), &mut ShadowStorage::new())
            .unwrap();

        let created = outcome.created_address.unwrap();
        assert_eq!(created, CALLER.create(0));
        assert_eq!(engine.account_code(created).unwrap().as_ref(), &[0x00]);
    }
}
