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

//! Interactive stepping console
//!
//! Reads one command per line from stdin and drives an [`ExecutionSession`]
//! the way a UI would: stepping, continuing to breakpoints, inspecting the
//! published state and switching forks.

use std::{fmt::Write as _, io::Write as _};

use alloy_primitives::U256;
use evmpg_common::{
    types::{ExecutionState, Instruction},
    Hardfork,
};
use evmpg_engine::{find_instruction_containing, format_instruction, ExecutionSession};
use eyre::{bail, eyre, Result, WrapErr};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  step [n]              execute the next n top-level instructions (alias: s)
  continue              run to the next breakpoint or the end (alias: c)
  finish                run to the end, ignoring breakpoints (alias: f)
  break <pc>            set a breakpoint at an instruction offset (alias: b)
  delete <pc>           remove a breakpoint (alias: d)
  state                 show stack, memory, storage and gas
  code                  show the decoded instructions
  call [data] [value]   call the deployed contract
  restart               run the program again from the start
  reset                 abandon the run and clear the session
  fork [name]           list forks or switch to one
  help                  show this message
  quit                  leave the playground (alias: q)";

/// The program given on the command line
#[derive(Debug, Clone)]
pub struct Program {
    /// Bytecode, hex encoded
    pub bytecode: String,
    /// Calldata, hex encoded
    pub calldata: String,
    /// Wei sent with the transaction
    pub value: U256,
    /// Whether the bytecode is init code
    pub deploy: bool,
}

/// A console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Execute a number of top-level instructions
    Step(usize),
    /// Run to the next breakpoint
    Continue,
    /// Run to the end
    Finish,
    /// Set a breakpoint
    Break(usize),
    /// Remove a breakpoint
    Delete(usize),
    /// Show the current state
    State,
    /// Show the decoded instructions
    Code,
    /// Call the deployed contract
    Call {
        /// Calldata, hex encoded
        calldata: String,
        /// Wei sent with the call
        value: U256,
    },
    /// Run the program again
    Restart,
    /// Reset the session
    Reset,
    /// List forks, or switch to one
    Fork(Option<Hardfork>),
    /// Show help
    Help,
    /// Leave the console
    Quit,
}

impl Command {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else { return Ok(None) };
        let args: Vec<&str> = words.collect();

        let command = match name {
            "step" | "s" | "next" | "n" => match args.first() {
                Some(count) => {
                    Self::Step(count.parse().wrap_err_with(|| format!("invalid count `{count}`"))?)
                }
                None => Self::Step(1),
            },
            "continue" | "c" => Self::Continue,
            "finish" | "f" => Self::Finish,
            "break" | "b" => Self::Break(parse_offset(required(&args, "break <pc>")?)?),
            "delete" | "d" => Self::Delete(parse_offset(required(&args, "delete <pc>")?)?),
            "state" | "st" => Self::State,
            "code" | "l" => Self::Code,
            "call" => {
                let value = match args.get(1) {
                    Some(value) => {
                        value.parse().wrap_err_with(|| format!("invalid value `{value}`"))?
                    }
                    None => U256::ZERO,
                };
                Self::Call {
                    calldata: args.first().map(|data| data.to_string()).unwrap_or_default(),
                    value,
                }
            }
            "restart" | "r" => Self::Restart,
            "reset" => Self::Reset,
            "fork" => match args.first() {
                Some(name) => Self::Fork(Some(name.parse()?)),
                None => Self::Fork(None),
            },
            "help" | "h" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => bail!("unknown command `{other}`, try `help`"),
        };
        Ok(Some(command))
    }
}

fn required<'a>(args: &[&'a str], usage: &str) -> Result<&'a str> {
    args.first().copied().ok_or_else(|| eyre!("usage: {usage}"))
}

/// Parse an instruction offset, decimal or `0x`-prefixed hex
pub fn parse_offset(input: &str) -> Result<usize> {
    let parsed = match input.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.wrap_err_with(|| format!("invalid offset `{input}`"))
}

/// Whether the console keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Console driving one session
pub struct Repl {
    session: ExecutionSession,
    program: Program,
}

impl Repl {
    /// Create a console for `program`
    pub fn new(session: ExecutionSession, program: Program) -> Self {
        Self { session, program }
    }

    /// Start the program, paused at its first instruction
    pub async fn start(&mut self) -> Result<()> {
        if self.program.deploy {
            self.session.start_deployment(&self.program.bytecode, self.program.value).await?;
        } else {
            self.session
                .start_execution(&self.program.bytecode, self.program.value, &self.program.calldata)
                .await?;
        }
        self.print_location();
        Ok(())
    }

    /// Run to completion and print the final state
    pub async fn run_batch(&mut self) -> Result<()> {
        self.session.finish().await?;
        self.print_location();
        println!("{}", render_state(&self.session.state()));
        Ok(())
    }

    /// Read and execute commands until `quit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        println!("Type `help` for a list of commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("evmpg> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else { break };
            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("error: {e}");
                    continue;
                }
            };

            match self.execute(command).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => println!("error: {e:#}"),
            }
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Step(count) => {
                for _ in 0..count {
                    if !self.session.is_executing() {
                        break;
                    }
                    self.session.step().await?;
                }
                self.print_location();
            }
            Command::Continue => {
                self.session.continue_execution().await?;
                self.print_location();
            }
            Command::Finish => {
                self.session.finish().await?;
                self.print_location();
            }
            Command::Break(pc) => {
                self.session.add_breakpoint(pc);
                println!("Breakpoint set at {pc:#06x}");
            }
            Command::Delete(pc) => {
                self.session.remove_breakpoint(pc);
                println!("Breakpoint removed at {pc:#06x}");
            }
            Command::State => println!("{}", render_state(&self.session.state())),
            Command::Code => {
                let pc = self.session.state().program_counter;
                print!("{}", render_code(self.session.instructions(), pc));
            }
            Command::Call { calldata, value } => {
                self.session.call_contract(&calldata, value).await?;
                self.print_location();
            }
            Command::Restart => {
                self.session.reset().await?;
                self.start().await?;
            }
            Command::Reset => {
                self.session.reset().await?;
                println!("Session reset; `restart` runs the program again");
            }
            Command::Fork(None) => {
                let current = self.session.fork();
                for fork in Hardfork::all() {
                    let marker = if *fork == current { "*" } else { " " };
                    println!("{marker} {fork}");
                }
            }
            Command::Fork(Some(fork)) => {
                self.session.select_fork(fork).await?;
                println!("Switched to {fork}; `restart` runs the program again");
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn print_location(&self) {
        let state = self.session.state();
        if self.session.is_executing() {
            let Some(pc) = state.program_counter else { return };
            match find_instruction_containing(self.session.instructions(), pc) {
                Some(instruction) => println!("-> {}", format_instruction(instruction, true)),
                None => println!("-> {pc:04x}"),
            }
            return;
        }

        if state.is_initial() {
            return;
        }
        println!("Execution finished, gas used {}", state.total_gas.as_deref().unwrap_or("0"));
        if let Some(error) = self.session.vm_error() {
            println!("VM error: {error}");
        }
        if let Some(value) = &state.return_value {
            println!("Returned 0x{value}");
        }
        if let Some(address) = self.session.deployed_contract_address() {
            println!("Contract at {address}");
        }
    }
}

/// Render a state for the console
pub fn render_state(state: &ExecutionState) -> String {
    let mut out = String::new();
    let pc = state.program_counter.map_or_else(|| "-".to_string(), |pc| format!("{pc:#06x}"));
    let _ = writeln!(out, "pc:     {pc}");
    let _ = writeln!(
        out,
        "gas:    total {}, last {}",
        state.total_gas.as_deref().unwrap_or("-"),
        state.current_gas.as_deref().unwrap_or("-")
    );

    let _ = writeln!(out, "stack:  {} items", state.stack.len());
    let mut index = 0;
    while let Some(item) = state.stack_item(index) {
        let _ = writeln!(out, "  [{index}] 0x{item}");
        index += 1;
    }

    let _ = writeln!(out, "memory: {} words", state.memory_word_count());
    for (index, word) in state.memory.as_bytes().chunks(64).enumerate() {
        let _ = writeln!(out, "  {:04x}: {}", index * 32, String::from_utf8_lossy(word));
    }

    let _ = writeln!(out, "storage:");
    for entry in &state.storage {
        let _ = writeln!(out, "  {} {} = {}", entry.address, entry.slot, entry.value);
    }
    let _ = writeln!(out, "transient storage:");
    for entry in &state.transient_storage {
        let _ = writeln!(out, "  {} {} = {}", entry.address, entry.key, entry.value);
    }

    if let Some(value) = &state.return_value {
        let _ = writeln!(out, "return: 0x{value}");
    }
    out.trim_end().to_string()
}

/// Render the instruction list, marking breakpoints and the current instruction
pub fn render_code(instructions: &[Instruction], pc: Option<usize>) -> String {
    let mut out = String::new();
    for instruction in instructions {
        let current = if pc == Some(instruction.id) { "->" } else { "  " };
        let breakpoint = if instruction.has_breakpoint { "*" } else { " " };
        let line = format_instruction(instruction, true);
        if instruction.is_invalid() {
            let _ = writeln!(out, "{current}{breakpoint} {line}  ; not an opcode on this fork");
        } else {
            let _ = writeln!(out, "{current}{breakpoint} {line}");
        }
    }
    out
}
