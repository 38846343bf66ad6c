// SymStack - Symbolic EVM Stack Tracker
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

//! SymStack Engine - symbolic EVM stack tracking for source-level debugging
//!
//! The engine replays an execution trace one opcode at a time and keeps a
//! shadow stack whose slots carry source-level identities instead of values:
//!
//! - [`resolver`] maps opcode mnemonics to their stack effect
//! - [`transition`] derives each step's symbolic stack from the previous one
//! - [`manager`] stores per-step snapshots and the variable lifecycle index
//! - [`session`] drives a whole trace through the engine, call frames included
//!
//! Nothing in this crate panics on malformed traces. Anomalies are returned
//! as [`Diagnostic`] values and logged, and the replay carries on.

pub mod config;
pub use config::*;

pub mod diagnostic;
pub use diagnostic::*;

pub mod manager;
pub use manager::*;

pub mod resolver;
pub use resolver::*;

pub mod session;
pub use session::*;

pub mod stack;
pub use stack::*;

pub mod transition;
pub use transition::*;
