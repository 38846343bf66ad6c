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

//! Path-based conditional assertion macros
//!
//! The symbolic stack engine never panics on malformed traces, but its own
//! bookkeeping has invariants worth checking while developing (for example,
//! at most one original declaration per variable per step). These macros
//! check them only when the module path is enabled via the `SYMSTACK_ASSERT`
//! environment variable, similar to how `RUST_LOG` controls logging.
//!
//! # Environment Variable Syntax
//!
//! - **Enable all assertions**: `SYMSTACK_ASSERT=*` or `SYMSTACK_ASSERT=all`
//! - **Enable specific crate**: `SYMSTACK_ASSERT=symstack_engine`
//! - **Enable specific module**: `SYMSTACK_ASSERT=symstack_engine::manager`
//! - **Multiple targets**: comma-separated
//!
//! A pattern matches its module and every submodule. When the variable is
//! unset or empty, all assertions are **disabled**.
//!
//! # Usage in Code
//!
//! ```ignore
//! use symstack_common::{symstack_assert, symstack_assert_eq};
//!
//! fn push_slot(depth: usize, limit: usize) {
//!     symstack_assert!(depth <= limit, "depth {depth} above {limit}");
//! }
//! ```

use once_cell::sync::Lazy;
use std::env;

/// Global storage for assertion target patterns from the SYMSTACK_ASSERT environment variable
static ASSERTION_TARGETS: Lazy<Vec<String>> = Lazy::new(|| match env::var("SYMSTACK_ASSERT") {
    Ok(val) if !val.is_empty() => parse_targets(&val),
    _ => Vec::new(),
});

fn parse_targets(val: &str) -> Vec<String> {
    val.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn matches_targets(targets: &[String], module_path: &str) -> bool {
    targets
        .iter()
        .any(|target| target == "*" || target == "all" || module_path.starts_with(target.as_str()))
}

/// Check if assertions are enabled for the given module path
///
/// Used internally by the assertion macros. Returns `true` if any configured
/// target is a wildcard or a prefix of `module_path`.
pub fn is_assertion_enabled(module_path: &str) -> bool {
    matches_targets(&ASSERTION_TARGETS, module_path)
}

/// Marked cold to hint that assertion checks are rarely taken
#[cold]
#[inline(never)]
pub fn cold_path() {}

/// Assert a condition only when enabled via `SYMSTACK_ASSERT` environment variable.
///
/// ```ignore
/// use symstack_common::symstack_assert;
///
/// let value = 42;
/// symstack_assert!(value == 42, "value should be 42, got {}", value);
/// ```
#[macro_export]
macro_rules! symstack_assert {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert!($($arg)*);
        }
    };
}

/// Assert two expressions are equal only when enabled via `SYMSTACK_ASSERT`.
///
/// ```ignore
/// use symstack_common::symstack_assert_eq;
///
/// symstack_assert_eq!(1 + 1, 2, "arithmetic is broken");
/// ```
#[macro_export]
macro_rules! symstack_assert_eq {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert_eq!($($arg)*);
        }
    };
}

/// Debug assert that only executes when `SYMSTACK_ASSERT` is set and in debug builds.
///
/// In release builds, this macro compiles to nothing.
#[macro_export]
macro_rules! symstack_debug_assert {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        {
            $crate::symstack_assert!($($arg)*);
        }
    };
}
