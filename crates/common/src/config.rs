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

//! Playground configuration
//!
//! The configuration is a small TOML file:
//!
//! ```toml
//! [chain]
//! chain_id = 1
//! fork = "Prague"
//!
//! [execution]
//! gas_limit = 10000000
//! sender_private_key = "0xac09...ff80"
//! contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! initial_balance = "0x3635c9adc5dea00000"
//!
//! [logging]
//! file_logging = false
//! ```
//!
//! Every section and field is optional; missing values fall back to
//! [`PlaygroundConfig::default`].

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use alloy_primitives::{address, b256, Address, B256, U256};
use eyre::{eyre, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    env::{EVMPG_CONFIG, EVMPG_FORK},
    Hardfork,
};

/// Key of the first well-known development account, funded on every engine.
pub const DEFAULT_SENDER_PRIVATE_KEY: B256 =
    b256!("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");

/// Address where bytecode run through `start_execution` is installed.
pub const DEFAULT_CONTRACT_ADDRESS: Address =
    address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");

/// Gas limit of every transaction built by the session.
///
/// Kept below the EIP-7825 per-transaction cap so it is valid on every fork.
pub const DEFAULT_GAS_LIMIT: u64 = 10_000_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaygroundConfig {
    /// Chain parameters
    pub chain: ChainConfig,
    /// Transaction parameters
    pub execution: ExecutionConfig,
    /// Logging parameters
    pub logging: LoggingConfig,
}

/// Chain parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain id used for signing and the `CHAINID` opcode
    pub chain_id: u64,
    /// Hardfork the engine runs with
    pub fork: Hardfork,
}

/// Transaction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Gas limit of every transaction
    pub gas_limit: u64,
    /// Private key of the funded sender account
    pub sender_private_key: B256,
    /// Fixed address that receives code run through `start_execution`
    pub contract_address: Address,
    /// Balance given to the sender when an engine is created
    pub initial_balance: U256,
}

/// Logging parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a rolling log file in addition to the console
    pub file_logging: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { chain_id: 1, fork: Hardfork::default() }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            sender_private_key: DEFAULT_SENDER_PRIVATE_KEY,
            contract_address: DEFAULT_CONTRACT_ADDRESS,
            // 1000 ether
            initial_balance: U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64)),
        }
    }
}

impl PlaygroundConfig {
    /// Default location of the configuration file
    ///
    /// `$EVMPG_CONFIG` when set, `<config dir>/evmpg/config.toml` otherwise.
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = env::var(EVMPG_CONFIG) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let dir = dirs_next::config_dir()
            .ok_or_else(|| eyre!("Unable to determine the configuration directory"))?;
        Ok(dir.join("evmpg").join("config.toml"))
    }

    /// Load the configuration from [`Self::config_path`]
    ///
    /// Unlike [`Self::load_from`], a missing file is not an error.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::read_file(&path)?
        } else {
            debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load the configuration from an explicit file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::read_file(path.as_ref())?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from the environment
    ///
    /// Only [`EVMPG_FORK`] is recognised; an unknown fork name is ignored.
    pub fn apply_env_overrides(&mut self) {
        let Ok(name) = env::var(EVMPG_FORK) else { return };
        match name.parse::<Hardfork>() {
            Ok(fork) => self.chain.fork = fork,
            Err(err) => warn!("Ignoring {}: {}", EVMPG_FORK, err),
        }
    }

    /// Save the configuration to [`Self::config_path`]
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_path()?)
    }

    /// Save the configuration to an explicit file, creating parent directories
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }
}
