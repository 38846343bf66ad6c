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

// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
// SPDX-License-Identifier: AGPL-3.0
//! SymStack Common - Shared functionality for SymStack components
//!
//! This crate provides the data model shared by the engine, the command-line
//! front-end and the integration tests: symbolic stack slots, variable
//! descriptors, trace files, plus logging and runtime assertion helpers.

/// Common types used throughout SymStack including stack slots, variables and traces
pub mod types;

/// Logging setup and utilities for consistent logging across SymStack components
pub mod logging;
/// Path-scoped runtime assertions controlled by the `SYMSTACK_ASSERT` environment variable
pub mod macros;

pub use logging::*;
pub use types::*;
