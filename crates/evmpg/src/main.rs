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

//! EVMPG - EVM Playground
//!
//! Step through EVM bytecode one instruction at a time.

use std::path::PathBuf;

use alloy_primitives::U256;
use clap::Parser;
use evmpg_common::{Hardfork, PlaygroundConfig};
use evmpg_engine::ExecutionSession;
use eyre::Result;

mod repl;

use repl::{Program, Repl};

/// Command-line interface for the playground
#[derive(Debug, Parser)]
#[command(name = "evmpg")]
#[command(about = "EVM Playground - Step through EVM bytecode one instruction at a time")]
#[command(version)]
pub struct Cli {
    /// Bytecode to run, hex encoded
    pub bytecode: String,

    /// Hardfork to run with, e.g. `cancun` (overrides the configuration)
    #[arg(long)]
    pub fork: Option<Hardfork>,

    /// Configuration file (default: $EVMPG_CONFIG or <config dir>/evmpg/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Calldata sent to the bytecode, hex encoded
    #[arg(long, default_value = "")]
    pub calldata: String,

    /// Wei sent with the transaction
    #[arg(long, default_value = "0")]
    pub value: U256,

    /// Treat the bytecode as init code and step through the deployment
    #[arg(long)]
    pub deploy: bool,

    /// Run to completion, print the final state and exit
    #[arg(long)]
    pub batch: bool,

    /// Also write logs to a rolling file
    #[arg(long)]
    pub log_file: bool,

    /// Write the effective configuration back to the configuration file
    #[arg(long)]
    pub save_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PlaygroundConfig::load_from(path)?,
        None => PlaygroundConfig::load()?,
    };
    if let Some(fork) = cli.fork {
        config.chain.fork = fork;
    }

    evmpg_common::logging::init_logging("evmpg", cli.log_file || config.logging.file_logging)?;
    if cli.save_config {
        match &cli.config {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
    }
    tracing::info!("Running on {} (chain id {})", config.chain.fork, config.chain.chain_id);

    let session = ExecutionSession::new(&config)?;
    let program = Program {
        bytecode: cli.bytecode,
        calldata: cli.calldata,
        value: cli.value,
        deploy: cli.deploy,
    };

    let mut repl = Repl::new(session, program);
    repl.start().await?;

    if cli.batch {
        repl.run_batch().await
    } else {
        repl.run().await
    }
}
