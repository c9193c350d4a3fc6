use std::sync::Arc;

use alloy_primitives::{address, Address, Bytes, U256};
use evmpg_common::{logging::ensure_test_logging, Hardfork, PlaygroundConfig};
use evmpg_engine::{
    BridgeMode, EngineError, EngineFactory, EvmEngine, ExecutionSession, OpcodeTable, RawStep,
    RunOutcome, StepControl, StepHandler, StorageBackend, TransactionRequest,
};
use parking_lot::Mutex;
use revm::primitives::hardfork::SpecId;

const CONTRACT: Address = address!("0x00000000000000000000000000000000000000aa");
const NESTED: Address = address!("0x00000000000000000000000000000000000000bb");

/// Storage effect applied after a scripted step executes
#[derive(Debug, Clone)]
enum Effect {
    Write(Address, u64, u64),
    Transient(Address, u64, u64),
    Checkpoint,
    Commit,
    Revert,
}

#[derive(Debug, Clone)]
struct ScriptedStep {
    depth: usize,
    pc: usize,
    effects: Vec<Effect>,
}

fn step(depth: usize, pc: usize) -> ScriptedStep {
    ScriptedStep { depth, pc, effects: Vec::new() }
}

fn step_with(depth: usize, pc: usize, effects: Vec<Effect>) -> ScriptedStep {
    ScriptedStep { depth, pc, effects }
}

/// Engine replaying a fixed list of steps for every transaction
struct ScriptedEngine {
    opcodes: OpcodeTable,
    script: Vec<ScriptedStep>,
    runs: Arc<Mutex<Vec<RunOutcome>>>,
}

impl EvmEngine for ScriptedEngine {
    fn spec(&self) -> SpecId {
        self.opcodes.spec()
    }

    fn opcode_table(&self) -> &OpcodeTable {
        &self.opcodes
    }

    fn chain_id(&self) -> u64 {
        1
    }

    fn install_code(&mut self, _address: Address, _code: Bytes) -> Result<(), EngineError> {
        Ok(())
    }

    fn account_code(&mut self, _address: Address) -> Result<Bytes, EngineError> {
        Ok(Bytes::new())
    }

    fn fund_account(&mut self, _address: Address, _balance: U256) -> Result<(), EngineError> {
        Ok(())
    }

    fn account_nonce(&mut self, _address: Address) -> Result<u64, EngineError> {
        Ok(0)
    }

    fn run_transaction(
        &mut self,
        tx: &TransactionRequest,
        handler: &mut dyn StepHandler,
        backend: &mut dyn StorageBackend,
    ) -> Result<RunOutcome, EngineError> {
        let stack = [U256::from(1)];
        let mut outcome = RunOutcome {
            return_value: Bytes::from_static(&[0xbe, 0xef]),
            ..Default::default()
        };

        for (index, scripted) in self.script.iter().enumerate() {
            let used = 3 * index as u64;
            let raw = RawStep {
                depth: scripted.depth,
                pc: scripted.pc,
                opcode: 0x5b,
                gas_left: tx.gas_limit - used,
                opcode_fee: if index == 0 { 0 } else { 3 },
                stack: &stack,
                memory: &[],
                memory_word_count: 0,
            };
            if handler.on_step(&raw) == StepControl::Abort {
                outcome.aborted = true;
                break;
            }

            for effect in &scripted.effects {
                match *effect {
                    Effect::Write(address, slot, value) => {
                        backend.set_slot(address, U256::from(slot), U256::from(value))
                    }
                    Effect::Transient(address, key, value) => {
                        backend.set_transient(address, U256::from(key), U256::from(value))
                    }
                    Effect::Checkpoint => backend.checkpoint(),
                    Effect::Commit => backend.commit(),
                    Effect::Revert => backend.revert(),
                }
            }
            outcome.total_gas_spent = used + 3;
        }

        self.runs.lock().push(outcome.clone());
        Ok(outcome)
    }
}

fn scripted_session(
    script: Vec<ScriptedStep>,
) -> (ExecutionSession<ScriptedEngine>, Arc<Mutex<Vec<RunOutcome>>>) {
    ensure_test_logging(None);
    let runs = Arc::new(Mutex::new(Vec::new()));
    let engine_runs = Arc::clone(&runs);
    let factory: EngineFactory<ScriptedEngine> = Box::new(move |fork, _chain_id| {
        Ok(ScriptedEngine {
            opcodes: OpcodeTable::for_spec(fork.spec_id()),
            script: script.clone(),
            runs: Arc::clone(&engine_runs),
        })
    });
    let session = ExecutionSession::with_factory(&PlaygroundConfig::default(), factory).unwrap();
    (session, runs)
}

fn pcs(session: &ExecutionSession<ScriptedEngine>) -> Vec<usize> {
    session.timeline().iter().filter_map(|state| state.program_counter).collect()
}

#[tokio::test]
async fn test_nested_steps_never_publish() {
    let (mut session, _) = scripted_session(vec![
        step(0, 0),
        step(1, 0),
        step(1, 1),
        step(0, 2),
        step(2, 7),
        step(1, 3),
        step(0, 3),
    ]);

    session.start_execution("00", U256::ZERO, "").await.unwrap();
    while session.is_executing() {
        session.step().await.unwrap();
    }

    // Three top-level states plus the terminal one
    assert_eq!(pcs(&session), [0, 2, 3, 3]);
}

#[tokio::test]
async fn test_nested_steps_never_hit_breakpoints() {
    let (mut session, _) =
        scripted_session(vec![step(0, 0), step(1, 7), step(1, 8), step(0, 2), step(0, 8)]);
    session.add_breakpoint(7);
    session.add_breakpoint(8);

    session.start_execution("00", U256::ZERO, "").await.unwrap();
    session.continue_execution().await.unwrap();

    assert_eq!(session.mode(), BridgeMode::RunningPaused);
    assert_eq!(pcs(&session), [0, 2, 8]);
}

#[tokio::test]
async fn test_every_state_carries_full_storage() {
    let (mut session, _) = scripted_session(vec![
        step_with(0, 0, vec![Effect::Write(CONTRACT, 1, 1)]),
        step_with(0, 1, vec![Effect::Write(CONTRACT, 2, 2)]),
        step_with(0, 2, vec![Effect::Write(NESTED, 9, 9)]),
        step_with(0, 3, vec![Effect::Write(CONTRACT, 1, 0)]),
        step(0, 4),
    ]);

    session.start_execution("00", U256::ZERO, "").await.unwrap();
    session.finish().await.unwrap();

    let sizes: Vec<usize> = session.timeline().iter().map(|state| state.storage.len()).collect();
    assert_eq!(sizes, [0, 1, 2, 3, 2, 2]);

    let last = session.state();
    let entries: Vec<(&str, &str)> =
        last.storage.iter().map(|e| (e.address.as_str(), e.slot.as_str())).collect();
    let contract = CONTRACT.to_string();
    let nested = NESTED.to_string();
    assert_eq!(entries[0].0, contract);
    assert!(entries[0].1.ends_with("02"));
    assert_eq!(entries[1].0, nested);
}

#[tokio::test]
async fn test_reverted_frame_leaves_no_trace() {
    let (mut session, _) = scripted_session(vec![
        step_with(0, 0, vec![Effect::Write(CONTRACT, 1, 1)]),
        step_with(1, 0, vec![Effect::Checkpoint, Effect::Write(NESTED, 1, 1)]),
        step_with(1, 1, vec![Effect::Transient(NESTED, 5, 5), Effect::Revert]),
        step_with(0, 1, vec![Effect::Checkpoint, Effect::Write(NESTED, 2, 2)]),
        step_with(1, 0, vec![Effect::Commit]),
        step(0, 2),
    ]);

    session.start_execution("00", U256::ZERO, "").await.unwrap();
    session.finish().await.unwrap();

    let after_revert = &session.timeline()[1];
    assert_eq!(after_revert.program_counter, Some(1));
    assert_eq!(after_revert.storage.len(), 1);
    assert!(after_revert.transient_storage.is_empty());

    let last = session.state();
    assert_eq!(last.storage.len(), 2);
    assert_eq!(session.shadow().with(|shadow| shadow.checkpoint_depth()), 0);
}

#[tokio::test]
async fn test_gas_accounting() {
    let (mut session, _) = scripted_session(vec![step(0, 0), step(0, 1), step(0, 2)]);
    session.start_execution("00", U256::ZERO, "").await.unwrap();
    session.finish().await.unwrap();

    let gas: Vec<(Option<&str>, Option<&str>)> = session
        .timeline()
        .iter()
        .map(|state| (state.total_gas.as_deref(), state.current_gas.as_deref()))
        .collect();
    assert_eq!(gas[0], (Some("0"), Some("0")));
    assert_eq!(gas[1], (Some("3"), Some("3")));
    assert_eq!(gas[2], (Some("6"), Some("3")));
    // Terminal state reports the gas used by the whole transaction
    assert_eq!(gas[3].0, Some("9"));
    assert_eq!(session.state().return_value.as_deref(), Some("beef"));
}

#[tokio::test]
async fn test_reset_aborts_engine_side() {
    let (mut session, runs) = scripted_session(vec![step(0, 0), step(0, 1), step(0, 2)]);
    session.start_execution("00", U256::ZERO, "").await.unwrap();
    session.step().await.unwrap();

    session.reset().await.unwrap();
    let runs = runs.lock();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].aborted);
}

#[tokio::test]
async fn test_fork_change_while_paused() {
    let (mut session, runs) = scripted_session(vec![step(0, 0), step(0, 1)]);
    session.start_execution("00", U256::ZERO, "").await.unwrap();

    let shanghai = Hardfork::from_name("shanghai").unwrap();
    session.select_fork(shanghai).await.unwrap();

    assert!(runs.lock()[0].aborted);
    assert!(!session.is_executing());
    assert_eq!(session.opcode_table().spec(), SpecId::SHANGHAI);
    assert!(session.with_engine(|engine| engine.spec()).unwrap() == SpecId::SHANGHAI);
}
