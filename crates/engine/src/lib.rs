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

//! EVMPG Engine - the stepping core of the EVM playground
//!
//! [`ExecutionSession`] deploys and runs bytecode on an [`EvmEngine`] one
//! top-level instruction at a time. The [`StepBridge`] turns the engine's
//! per-instruction callback into a pausable run, the [`ShadowStorage`] mirrors
//! every storage write so each published state carries the full storage, the
//! [`BreakpointController`] decides where auto-advance stops, and the decoder
//! renders bytecode as an instruction list.

pub mod breakpoint;
pub use breakpoint::*;

pub mod bridge;
pub use bridge::*;

pub mod decoder;
pub use decoder::*;

pub mod engine;
pub use engine::*;

pub mod opcodes;
pub use opcodes::*;

pub mod session;
pub use session::*;

pub mod shadow;
pub use shadow::*;

pub mod wallet;
pub use wallet::*;
