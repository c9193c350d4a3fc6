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

//! Execution session
//!
//! An [`ExecutionSession`] owns one engine instance together with everything
//! the UI layer observes: the decoded instructions of the loaded code, the
//! breakpoint set, the storage shadow, the step bridge and the deployed
//! contract address. Only one run is in flight at a time.
//!
//! A run executes on a blocking worker thread that holds the engine for the
//! whole transaction. While a run is paused the session therefore refuses
//! anything that needs the engine and reports [`SessionError::Busy`].

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxKind, U256};
use evmpg_common::{
    types::{ExecutionState, Instruction},
    ExecutionConfig, Hardfork, PlaygroundConfig,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinHandle},
};
use tracing::{debug, info};

use crate::{
    decode, BreakpointController, BridgeHandler, BridgeMode, EngineError, EvmEngine,
    OpcodeTable, RevmEngine, SharedShadow, StepBridge, TransactionRequest, Wallet, WalletError,
};

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// A run is still in flight
    #[error("a run is already in progress")]
    Busy,

    /// No contract has been deployed in this session
    #[error("no contract has been deployed")]
    NotDeployed,

    /// Input is not valid hex
    #[error("invalid hex input: {0}")]
    InvalidHex(String),

    /// The creation transaction did not produce a contract
    #[error("deployment failed: {0}")]
    DeploymentFailed(String),

    /// The engine rejected or failed to run a transaction
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The transaction could not be signed
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// The engine worker panicked or was cancelled
    #[error("engine worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Builds a fresh engine for a fork and chain id
pub type EngineFactory<E> = Box<dyn Fn(Hardfork, u64) -> Result<E, EngineError> + Send + Sync>;

/// Top-level lifecycle coordinator
pub struct ExecutionSession<E: EvmEngine = RevmEngine> {
    execution: ExecutionConfig,
    chain_id: u64,
    fork: watch::Sender<Hardfork>,
    factory: EngineFactory<E>,
    engine: Arc<Mutex<E>>,
    opcodes: OpcodeTable,
    wallet: Wallet,
    shadow: SharedShadow,
    bridge: StepBridge,
    breakpoints: BreakpointController,
    instructions: Vec<Instruction>,
    deployed_contract_address: Option<Address>,
    worker: Option<JoinHandle<()>>,
}

impl ExecutionSession<RevmEngine> {
    /// Create a session backed by revm
    pub fn new(config: &PlaygroundConfig) -> Result<Self, SessionError> {
        let factory: EngineFactory<RevmEngine> =
            Box::new(|fork, chain_id| Ok(RevmEngine::new(fork.spec_id(), chain_id)));
        Self::with_factory(config, factory)
    }
}

impl<E: EvmEngine> ExecutionSession<E> {
    /// Create a session whose engines are built by `factory`
    pub fn with_factory(
        config: &PlaygroundConfig,
        factory: EngineFactory<E>,
    ) -> Result<Self, SessionError> {
        let wallet = Wallet::from_private_key(&config.execution.sender_private_key)?;
        let engine = prepare_engine(
            &factory,
            config.chain.fork,
            config.chain.chain_id,
            &wallet,
            &config.execution,
        )?;
        let opcodes = engine.opcode_table().clone();
        let (fork, _) = watch::channel(config.chain.fork);

        info!(fork = %config.chain.fork, sender = %wallet.address(), "Created execution session");

        Ok(Self {
            execution: config.execution.clone(),
            chain_id: config.chain.chain_id,
            fork,
            factory,
            engine: Arc::new(Mutex::new(engine)),
            opcodes,
            wallet,
            shadow: SharedShadow::new(),
            bridge: StepBridge::new(),
            breakpoints: BreakpointController::new(),
            instructions: Vec::new(),
            deployed_contract_address: None,
            worker: None,
        })
    }

    /// Decode `bytecode` with the opcode table of the selected fork
    pub fn load_instructions(&mut self, bytecode: &str) {
        let mut instructions = decode(strip_hex_prefix(bytecode), &self.opcodes);
        self.breakpoints.mark(&mut instructions);
        debug!(count = instructions.len(), "Loaded instructions");
        self.instructions = instructions;
    }

    /// Install `bytecode` at the fixed contract address and start a paused call into it
    pub async fn start_execution(
        &mut self,
        bytecode: &str,
        value: U256,
        calldata: &str,
    ) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let code = parse_hex(bytecode)?;
        let data = parse_hex(calldata)?;
        let address = self.execution.contract_address;

        self.engine.lock().install_code(address, code)?;
        self.load_instructions(bytecode);
        self.shadow.with(|shadow| shadow.clear_transient());

        let tx = self.build_transaction(TxKind::Call(address), value, data)?;
        self.start_transaction(tx).await
    }

    /// Start a paused contract-creation run of `bytecode`
    ///
    /// The instructions shown are those of the init code; the created address
    /// is published once the run finishes.
    pub async fn start_deployment(
        &mut self,
        bytecode: &str,
        value: U256,
    ) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let code = parse_hex(bytecode)?;
        self.load_instructions(bytecode);

        let tx = self.build_transaction(TxKind::Create, value, code)?;
        self.start_transaction(tx).await
    }

    /// Deploy `bytecode` and return the created address
    pub async fn deploy(&mut self, bytecode: &str, value: U256) -> Result<Address, SessionError> {
        self.start_deployment(bytecode, value).await?;
        self.finish().await?;

        match self.bridge.outcome().and_then(|outcome| outcome.created_address) {
            Some(address) => {
                info!(%address, "Deployed contract");
                Ok(address)
            }
            None => Err(SessionError::DeploymentFailed(
                self.vm_error().unwrap_or("no contract was created").to_string(),
            )),
        }
    }

    /// Start a paused call into the deployed contract
    pub async fn call_contract(&mut self, calldata: &str, value: U256) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let address = self.deployed_contract_address.ok_or(SessionError::NotDeployed)?;
        let data = parse_hex(calldata)?;

        let code = self.engine.lock().account_code(address)?;
        self.load_instructions(&hex::encode(&code));

        let tx = self.build_transaction(TxKind::Call(address), value, data)?;
        self.start_transaction(tx).await
    }

    /// Start a run of `tx`, paused before its first instruction
    pub async fn start_transaction(&mut self, tx: TransactionRequest) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.join_worker().await?;

        self.shadow.with(|shadow| {
            shadow.clear_transient();
            shadow.discard_checkpoints();
        });

        let (events, receiver) = mpsc::unbounded_channel();
        self.bridge.begin(receiver);

        let mut handler = BridgeHandler::new(events, self.shadow.clone(), tx.gas_limit);
        let mut backend = self.shadow.clone();
        let engine = Arc::clone(&self.engine);

        info!(
            caller = %tx.caller,
            create = tx.is_create(),
            nonce = tx.nonce,
            "Starting transaction"
        );
        self.worker = Some(tokio::task::spawn_blocking(move || {
            let result = engine.lock().run_transaction(&tx, &mut handler, &mut backend);
            handler.finish(result);
        }));

        let result = self.bridge.start().await;
        self.sync_outcome();
        result?;
        Ok(())
    }

    /// Execute one top-level instruction; a no-op when nothing is paused
    pub async fn step(&mut self) -> Result<(), SessionError> {
        let result = self.bridge.step().await;
        self.sync_outcome();
        Ok(result?)
    }

    /// Run until a breakpoint or the end of the run
    pub async fn continue_execution(&mut self) -> Result<(), SessionError> {
        let result = self.bridge.continue_execution(&self.breakpoints).await;
        self.sync_outcome();
        Ok(result?)
    }

    /// Run to the end, ignoring breakpoints
    pub async fn finish(&mut self) -> Result<(), SessionError> {
        let result = self.bridge.finish().await;
        self.sync_outcome();
        Ok(result?)
    }

    /// Add a breakpoint at instruction `id`
    pub fn add_breakpoint(&mut self, id: usize) {
        self.breakpoints.add(id);
        self.breakpoints.mark(&mut self.instructions);
    }

    /// Remove the breakpoint at instruction `id`
    pub fn remove_breakpoint(&mut self, id: usize) {
        self.breakpoints.remove(id);
        self.breakpoints.mark(&mut self.instructions);
    }

    /// Toggle the breakpoint at instruction `id`; returns whether it is now set
    pub fn toggle_breakpoint(&mut self, id: usize) -> bool {
        let set = self.breakpoints.toggle(id);
        self.breakpoints.mark(&mut self.instructions);
        set
    }

    /// Remove every breakpoint
    pub fn reset_breakpoints(&mut self) {
        self.breakpoints.reset();
        self.breakpoints.mark(&mut self.instructions);
    }

    /// Abandon any paused run and clear everything but the breakpoints
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.bridge.reset();
        self.join_worker().await?;
        self.instructions.clear();
        self.deployed_contract_address = None;
        debug!("Session reset");
        Ok(())
    }

    /// Switch to `fork`
    ///
    /// The engine for the new fork is in place before the selection is
    /// published, so subscribers never see a fork whose opcode table is not
    /// the active one.
    pub async fn select_fork(&mut self, fork: Hardfork) -> Result<(), SessionError> {
        self.bridge.abandon();
        self.join_worker().await?;

        let engine =
            prepare_engine(&self.factory, fork, self.chain_id, &self.wallet, &self.execution)?;
        self.opcodes = engine.opcode_table().clone();
        self.engine = Arc::new(Mutex::new(engine));
        self.shadow.with(|shadow| {
            shadow.clear_persistent();
            shadow.clear_transient();
            shadow.discard_checkpoints();
        });

        self.fork.send_replace(fork);
        info!(%fork, "Selected fork");
        self.reset().await
    }

    /// Receiver notified on every published execution state
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.bridge.subscribe()
    }

    /// Receiver notified when the selected fork changes
    pub fn subscribe_fork(&self) -> watch::Receiver<Hardfork> {
        self.fork.subscribe()
    }

    /// Currently selected fork
    pub fn fork(&self) -> Hardfork {
        *self.fork.borrow()
    }

    /// Opcode table of the selected fork
    pub fn opcode_table(&self) -> &OpcodeTable {
        &self.opcodes
    }

    /// Latest published execution state
    pub fn state(&self) -> ExecutionState {
        self.bridge.state()
    }

    /// Every state published in the current run, in order
    pub fn timeline(&self) -> &[ExecutionState] {
        self.bridge.timeline()
    }

    /// Instructions of the loaded code, with breakpoint flags
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Breakpoint set
    pub fn breakpoints(&self) -> &BreakpointController {
        &self.breakpoints
    }

    /// Mode of the step bridge
    pub fn mode(&self) -> BridgeMode {
        self.bridge.mode()
    }

    /// Whether a run is in flight
    pub fn is_executing(&self) -> bool {
        self.bridge.is_running()
    }

    /// Execution exception of the last finished run
    pub fn vm_error(&self) -> Option<&str> {
        self.bridge.vm_error()
    }

    /// Address created by the last successful deployment
    pub fn deployed_contract_address(&self) -> Option<Address> {
        self.deployed_contract_address
    }

    /// Address of the funded sender
    pub fn sender(&self) -> Address {
        self.wallet.address()
    }

    /// Shared storage shadow
    pub fn shadow(&self) -> &SharedShadow {
        &self.shadow
    }

    /// Run `f` against the engine
    ///
    /// Fails with [`SessionError::Busy`] while a run holds the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R, SessionError> {
        self.ensure_idle()?;
        let mut engine = self.engine.lock();
        Ok(f(&mut engine))
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.bridge.is_running() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn build_transaction(
        &self,
        kind: TxKind,
        value: U256,
        data: Bytes,
    ) -> Result<TransactionRequest, SessionError> {
        let nonce = self.engine.lock().account_nonce(self.wallet.address())?;
        let tx = self.wallet.transaction(
            self.chain_id,
            nonce,
            kind,
            value,
            data,
            self.execution.gas_limit,
        )?;
        Ok(tx)
    }

    async fn join_worker(&mut self) -> Result<(), SessionError> {
        if let Some(worker) = self.worker.take() {
            worker.await?;
        }
        Ok(())
    }

    fn sync_outcome(&mut self) {
        if let Some(address) = self.bridge.outcome().and_then(|outcome| outcome.created_address) {
            self.deployed_contract_address = Some(address);
        }
    }
}

fn prepare_engine<E: EvmEngine>(
    factory: &EngineFactory<E>,
    fork: Hardfork,
    chain_id: u64,
    wallet: &Wallet,
    execution: &ExecutionConfig,
) -> Result<E, EngineError> {
    let mut engine = factory(fork, chain_id)?;
    engine.fund_account(wallet.address(), execution.initial_balance)?;
    Ok(engine)
}

fn strip_hex_prefix(input: &str) -> &str {
    let input = input.trim();
    input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")).unwrap_or(input)
}

fn parse_hex(input: &str) -> Result<Bytes, SessionError> {
    hex::decode(strip_hex_prefix(input))
        .map(Bytes::from)
        .map_err(|e| SessionError::InvalidHex(format!("{input}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x6001").unwrap(), Bytes::from_static(&[0x60, 0x01]));
        assert_eq!(parse_hex(" 6001 ").unwrap(), Bytes::from_static(&[0x60, 0x01]));
        assert!(parse_hex("").unwrap().is_empty());
        assert!(matches!(parse_hex("0x600"), Err(SessionError::InvalidHex(_))));
        assert!(matches!(parse_hex("zz"), Err(SessionError::InvalidHex(_))));
    }

    #[tokio::test]
    async fn test_breakpoints_are_mirrored_on_instructions() {
        let mut session = ExecutionSession::new(&PlaygroundConfig::default()).unwrap();
        session.load_instructions("0x6001600201");
        session.add_breakpoint(2);
        assert!(session.instructions()[1].has_breakpoint);

        assert!(!session.toggle_breakpoint(2));
        assert!(!session.instructions()[1].has_breakpoint);

        session.add_breakpoint(4);
        session.load_instructions("6001600201");
        assert!(session.instructions()[2].has_breakpoint);

        session.reset().await.unwrap();
        assert!(session.instructions().is_empty());
        assert!(session.breakpoints().has(4));
    }
}
