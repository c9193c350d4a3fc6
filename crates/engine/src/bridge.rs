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

//! Step bridge between a running engine and the controller
//!
//! The engine runs on a blocking worker. Before every top-level instruction
//! its [`BridgeHandler`] captures an [`ExecutionState`], sends it to the
//! controller together with a one-shot continuation, and blocks until the
//! continuation fires. Nested frames are not steppable and run through
//! without stopping.
//!
//! The controller side, [`StepBridge`], publishes every state it receives and
//! decides when to fire the stored continuation: once per
//! [`step`](StepBridge::step), or in a loop while auto-advancing until a
//! breakpoint or the end of the run. Dropping the continuation abandons the
//! run; the worker then aborts it without committing any state.

use evmpg_common::types::ExecutionState;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    BreakpointController, EngineError, RawStep, RunOutcome, SharedShadow, StepControl,
    StepHandler, StorageSnapshot,
};

/// Message from the engine worker to the controller
#[derive(Debug)]
pub enum BridgeEvent {
    /// A top-level instruction is about to execute
    Step {
        /// State before the instruction
        state: ExecutionState,
        /// Fire to execute the instruction; drop to abort the run
        resume: oneshot::Sender<()>,
    },
    /// The run is over
    Finished(Result<RunOutcome, EngineError>),
}

/// Worker-side [`StepHandler`] that suspends the engine at every top-level step
#[derive(Debug)]
pub struct BridgeHandler {
    events: mpsc::UnboundedSender<BridgeEvent>,
    shadow: SharedShadow,
    gas_limit: u64,
}

impl BridgeHandler {
    /// Create a handler reporting to `events`
    pub fn new(
        events: mpsc::UnboundedSender<BridgeEvent>,
        shadow: SharedShadow,
        gas_limit: u64,
    ) -> Self {
        Self { events, shadow, gas_limit }
    }

    /// Report the final result of the run
    pub fn finish(self, result: Result<RunOutcome, EngineError>) {
        if self.events.send(BridgeEvent::Finished(result)).is_err() {
            debug!("Run finished after the controller went away");
        }
    }
}

impl StepHandler for BridgeHandler {
    fn on_step(&mut self, step: &RawStep<'_>) -> StepControl {
        if step.depth > 0 {
            return StepControl::Continue;
        }

        let state = capture_state(step, self.gas_limit, self.shadow.snapshot());
        let (resume, resumed) = oneshot::channel();
        if self.events.send(BridgeEvent::Step { state, resume }).is_err() {
            return StepControl::Abort;
        }

        match resumed.blocking_recv() {
            Ok(()) => StepControl::Continue,
            Err(_) => StepControl::Abort,
        }
    }
}

/// Build the published state for a top-level step
pub fn capture_state(
    step: &RawStep<'_>,
    gas_limit: u64,
    storage: StorageSnapshot,
) -> ExecutionState {
    let mut memory = hex::encode(step.memory);
    memory.truncate(step.memory_word_count * 64);

    ExecutionState {
        program_counter: Some(step.pc),
        stack: step.stack.iter().rev().map(|word| format!("{word:x}")).collect(),
        memory,
        storage: storage.storage,
        transient_storage: storage.transient_storage,
        total_gas: Some(gas_limit.saturating_sub(step.gas_left).to_string()),
        current_gas: Some(step.opcode_fee.to_string()),
        return_value: None,
    }
}

/// Run state of the bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeMode {
    /// No run attached
    #[default]
    Idle,
    /// Advancing until a breakpoint or the end of the run
    RunningAutoAdvance,
    /// Waiting for a command
    RunningPaused,
    /// The run completed
    Finished,
}

/// What processing one event led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Suspended before the instruction at `pc`
    Paused {
        /// Program counter of the next instruction
        pc: usize,
    },
    /// The run completed
    Finished,
}

/// Controller side of the bridge
#[derive(Debug)]
pub struct StepBridge {
    mode: BridgeMode,
    events: Option<mpsc::UnboundedReceiver<BridgeEvent>>,
    continuation: Option<oneshot::Sender<()>>,
    state: watch::Sender<ExecutionState>,
    timeline: Vec<ExecutionState>,
    outcome: Option<RunOutcome>,
    vm_error: Option<String>,
}

impl Default for StepBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl StepBridge {
    /// Create an idle bridge publishing the initial state
    pub fn new() -> Self {
        let (state, _) = watch::channel(ExecutionState::default());
        Self {
            mode: BridgeMode::Idle,
            events: None,
            continuation: None,
            state,
            timeline: Vec::new(),
            outcome: None,
            vm_error: None,
        }
    }

    /// Current mode
    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    /// Whether a run is attached and not finished
    pub fn is_running(&self) -> bool {
        matches!(self.mode, BridgeMode::RunningAutoAdvance | BridgeMode::RunningPaused)
    }

    /// Latest published state
    pub fn state(&self) -> ExecutionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every published state
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state.subscribe()
    }

    /// States published during the current run, in order
    pub fn timeline(&self) -> &[ExecutionState] {
        &self.timeline
    }

    /// Outcome of the last completed run
    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Execution exception of the last completed run
    pub fn vm_error(&self) -> Option<&str> {
        self.vm_error.as_deref()
    }

    /// Attach a new run; the bridge starts paused regardless of the previous mode
    pub fn begin(&mut self, events: mpsc::UnboundedReceiver<BridgeEvent>) {
        self.abandon();
        self.events = Some(events);
        self.mode = BridgeMode::RunningPaused;
        self.timeline.clear();
        self.outcome = None;
        self.vm_error = None;
    }

    /// Wait for the first event of the run
    pub async fn start(&mut self) -> Result<Progress, EngineError> {
        self.next_event().await
    }

    /// Execute exactly one top-level instruction
    ///
    /// Does nothing when no continuation is stored, e.g. after the run finished.
    pub async fn step(&mut self) -> Result<(), EngineError> {
        if self.resume() {
            self.next_event().await?;
        }
        Ok(())
    }

    /// Advance until an instruction with a breakpoint or the end of the run
    pub async fn continue_execution(
        &mut self,
        breakpoints: &BreakpointController,
    ) -> Result<(), EngineError> {
        self.auto_advance(Some(breakpoints)).await
    }

    /// Advance to the end of the run, ignoring breakpoints
    pub async fn finish(&mut self) -> Result<(), EngineError> {
        self.auto_advance(None).await
    }

    async fn auto_advance(
        &mut self,
        breakpoints: Option<&BreakpointController>,
    ) -> Result<(), EngineError> {
        if self.continuation.is_none() {
            return Ok(());
        }

        self.mode = BridgeMode::RunningAutoAdvance;
        while self.mode == BridgeMode::RunningAutoAdvance {
            if !self.resume() {
                break;
            }
            if let Progress::Paused { pc } = self.next_event().await? {
                if breakpoints.is_some_and(|breakpoints| breakpoints.has(pc)) {
                    debug!(pc, "Hit breakpoint");
                    self.mode = BridgeMode::RunningPaused;
                }
            }
        }
        Ok(())
    }

    /// Drop the stored continuation, abandoning any run in flight
    pub fn abandon(&mut self) {
        if self.continuation.take().is_some() {
            warn!("Abandoning a paused run");
        }
        self.events = None;
        self.mode = BridgeMode::Idle;
    }

    /// Abandon the run and return to the initial state
    pub fn reset(&mut self) {
        self.abandon();
        self.timeline.clear();
        self.outcome = None;
        self.vm_error = None;
        self.state.send_replace(ExecutionState::default());
    }

    fn resume(&mut self) -> bool {
        let Some(resume) = self.continuation.take() else {
            debug!("No stored continuation, ignoring resume");
            return false;
        };
        if resume.send(()).is_err() {
            debug!("Engine side of the run is gone, ignoring stale continuation");
        }
        true
    }

    async fn next_event(&mut self) -> Result<Progress, EngineError> {
        let event = match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        };

        match event {
            Some(BridgeEvent::Step { state, resume }) => {
                let pc = state.program_counter.unwrap_or_default();
                self.publish(state);
                self.continuation = Some(resume);
                Ok(Progress::Paused { pc })
            }
            Some(BridgeEvent::Finished(result)) => self.complete(result),
            None => self.complete(Err(EngineError::WorkerStopped)),
        }
    }

    fn complete(
        &mut self,
        result: Result<RunOutcome, EngineError>,
    ) -> Result<Progress, EngineError> {
        self.mode = BridgeMode::Finished;
        self.events = None;
        self.continuation = None;

        let outcome = result?;
        let mut terminal = self.state();
        terminal.total_gas = Some(outcome.total_gas_spent.to_string());
        if !outcome.return_value.is_empty() {
            terminal.return_value = Some(hex::encode(&outcome.return_value));
        }
        self.publish(terminal);

        info!(
            gas_used = outcome.total_gas_spent,
            exception = ?outcome.exception,
            created = ?outcome.created_address,
            "Run finished"
        );
        self.vm_error = outcome.exception.clone();
        self.outcome = Some(outcome);
        Ok(Progress::Finished)
    }

    fn publish(&mut self, state: ExecutionState) {
        debug!(pc = ?state.program_counter, "Publishing execution state");
        self.timeline.push(state.clone());
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use crate::StorageBackend;

    fn raw_step<'a>(depth: usize, pc: usize, stack: &'a [U256], memory: &'a [u8]) -> RawStep<'a> {
        RawStep {
            depth,
            pc,
            opcode: 0x01,
            gas_left: 900,
            opcode_fee: 3,
            stack,
            memory,
            memory_word_count: memory.len() / 32,
        }
    }

    #[test]
    fn test_capture_state() {
        let mut shadow = SharedShadow::new();
        shadow.set_slot(Address::ZERO, U256::from(1), U256::from(2));

        let stack = [U256::from(1), U256::from(0xabcu64)];
        let mut memory = [0u8; 40];
        memory[31] = 0x2a;
        let state = capture_state(&raw_step(0, 4, &stack, &memory), 1000, shadow.snapshot());

        assert_eq!(state.program_counter, Some(4));
        assert_eq!(state.stack, ["abc", "1"]);
        assert_eq!(state.memory.len(), 64);
        assert!(state.memory.ends_with("2a"));
        assert_eq!(state.total_gas.as_deref(), Some("100"));
        assert_eq!(state.current_gas.as_deref(), Some("3"));
        assert_eq!(state.storage.len(), 1);
        assert!(state.return_value.is_none());
    }

    #[test]
    fn test_nested_steps_are_not_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handler = BridgeHandler::new(tx, SharedShadow::new(), 1000);

        let control = handler.on_step(&raw_step(1, 7, &[], &[]));
        assert_eq!(control, StepControl::Continue);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_controller_aborts() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut handler = BridgeHandler::new(tx, SharedShadow::new(), 1000);
        assert_eq!(handler.on_step(&raw_step(0, 0, &[], &[])), StepControl::Abort);
    }

    #[tokio::test]
    async fn test_step_without_run_is_noop() {
        let mut bridge = StepBridge::new();
        bridge.step().await.unwrap();
        bridge.finish().await.unwrap();
        assert_eq!(bridge.mode(), BridgeMode::Idle);
        assert!(bridge.timeline().is_empty());
        assert!(bridge.state().is_initial());
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&BridgeMode::RunningPaused).unwrap();
        assert_eq!(json, "\"runningPaused\"");
        let mode: BridgeMode = serde_json::from_str("\"runningAutoAdvance\"").unwrap();
        assert_eq!(mode, BridgeMode::RunningAutoAdvance);
    }

    #[tokio::test]
    async fn test_worker_loss_finishes_run() {
        let (tx, rx) = mpsc::unbounded_channel::<BridgeEvent>();
        let mut bridge = StepBridge::new();
        bridge.begin(rx);
        assert!(bridge.is_running());
        drop(tx);

        assert_eq!(bridge.start().await, Err(EngineError::WorkerStopped));
        assert_eq!(bridge.mode(), BridgeMode::Finished);
        assert!(!bridge.is_running());
    }
}
