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

//! EVMPG Common - Shared functionality for the EVM playground
//!
//! This crate provides the types exchanged between the stepping engine and
//! any user interface (execution snapshots, decoded instructions), together
//! with the hardfork catalog, configuration and logging setup shared by the
//! engine crate and the `evmpg` binary.

/// Common types exchanged with the UI layer: execution snapshots and decoded instructions
pub mod types;

/// Playground configuration loaded from TOML
pub mod config;
/// Environment variable names used by the playground
pub mod env;
/// Hardfork catalog mapping display names to revm specification ids
pub mod fork;
/// Logging setup and utilities for consistent logging across components
pub mod logging;
/// Extended opcode classification used by engine adapters
pub mod opcode;

pub use config::*;
pub use fork::*;
pub use logging::*;
pub use opcode::*;
