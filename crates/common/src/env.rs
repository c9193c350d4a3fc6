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

//! Environment variable name constants for playground configuration.
//!
//! # Environment Variables
//!
//! - [`EVMPG_CONFIG`] - Path of the TOML configuration file
//! - [`EVMPG_FORK`] - Overrides the configured hardfork
//! - [`EVMPG_LOG_DIR`] - Overrides the directory used for file logging

/// Environment variable for specifying the configuration file.
///
/// When not set, the configuration is read from `<config dir>/evmpg/config.toml`
/// and defaults are used if that file does not exist.
///
/// # Examples
///
/// ```bash
/// EVMPG_CONFIG=./playground.toml evmpg 6042600055
/// ```
pub const EVMPG_CONFIG: &str = "EVMPG_CONFIG";

/// Environment variable overriding the hardfork selected in the configuration.
///
/// The value is a fork name as accepted by [`crate::Hardfork::from_name`]
/// (case-insensitive, e.g. `cancun` or `Shanghai`). Unknown names are ignored
/// with a warning.
pub const EVMPG_FORK: &str = "EVMPG_FORK";

/// Environment variable for the directory that receives rolling log files.
///
/// # Default
///
/// `<temp dir>/evmpg-logs/<component>`
pub const EVMPG_LOG_DIR: &str = "EVMPG_LOG_DIR";
