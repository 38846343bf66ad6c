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

//! Execution traces and variable bindings as read from disk.
//!
//! Traces follow the struct-log shape produced by `debug_traceTransaction`:
//! either a bare array of steps or an object with a `structLogs` array. Each
//! step carries the opcode mnemonic, the call depth and, when the tracer kept
//! it, the concrete stack *before* the opcode executed.

use std::{fs, ops::Deref, path::Path};

use alloy_primitives::U256;
use eyre::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{Lifecycle, ScopeId, VariableDescriptor};

fn default_depth() -> usize {
    1
}

/// One executed instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// Program counter
    #[serde(default)]
    pub pc: u64,
    /// Opcode mnemonic
    pub op: String,
    /// Call depth, starting at 1 for the outermost frame
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Remaining gas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    /// Concrete stack before the opcode executed, bottom first
    #[serde(
        default,
        deserialize_with = "deserialize_words",
        skip_serializing_if = "Option::is_none"
    )]
    pub stack: Option<Vec<U256>>,
}

impl TraceStep {
    /// A step in the outermost frame without a recorded stack
    pub fn new(op: impl Into<String>) -> Self {
        Self { pc: 0, op: op.into(), depth: 1, gas: None, stack: None }
    }

    /// Set the call depth
    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Set the program counter
    pub fn at_pc(mut self, pc: u64) -> Self {
        self.pc = pc;
        self
    }

    /// Attach the concrete pre-execution stack
    pub fn with_stack(mut self, stack: Vec<U256>) -> Self {
        self.stack = Some(stack);
        self
    }
}

/// Parse a stack word, accepting both `0x`-prefixed and bare hex
pub fn parse_stack_word(word: &str) -> Result<U256> {
    let digits = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")).unwrap_or(word);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|e| eyre::eyre!("invalid stack word {word:?}: {e}"))
}

fn deserialize_words<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<U256>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
    raw.map(|words| {
        words
            .iter()
            .map(|word| parse_stack_word(word).map_err(serde::de::Error::custom))
            .collect::<std::result::Result<Vec<_>, _>>()
    })
    .transpose()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceFile {
    Steps(Vec<TraceStep>),
    StructLogs {
        #[serde(rename = "structLogs")]
        struct_logs: Vec<TraceStep>,
    },
}

/// An execution trace, one entry per executed opcode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Trace {
    inner: Vec<TraceStep>,
}

impl Deref for Trace {
    type Target = Vec<TraceStep>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<Vec<TraceStep>> for Trace {
    fn from(inner: Vec<TraceStep>) -> Self {
        Self { inner }
    }
}

impl FromIterator<TraceStep> for Trace {
    fn from_iter<I: IntoIterator<Item = TraceStep>>(iter: I) -> Self {
        Self { inner: iter.into_iter().collect() }
    }
}

impl Trace {
    /// Build a single-frame trace from opcode mnemonics
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a str>) -> Self {
        ops.into_iter().map(TraceStep::new).collect()
    }

    /// Parse a trace from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let file: TraceFile =
            serde_json::from_str(content).wrap_err("Failed to parse trace as JSON")?;
        let inner = match file {
            TraceFile::Steps(steps) => steps,
            TraceFile::StructLogs { struct_logs } => struct_logs,
        };
        Ok(Self { inner })
    }

    /// Read and parse a trace file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read trace file: {path:?}"))?;
        Self::from_json(&content).with_context(|| format!("Invalid trace file: {path:?}"))
    }

    /// Consume the trace and return its steps
    pub fn into_steps(self) -> Vec<TraceStep> {
        self.inner
    }
}

/// A variable binding to apply once a given step has been replayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingRequest {
    /// Step whose stack receives the binding
    pub step: usize,
    /// Target index, bottom first. May be negative for return-parameter conventions.
    pub stack_index: isize,
    /// Lifecycle to record
    #[serde(default)]
    pub lifecycle: Lifecycle,
    /// Enclosing function scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_scope_id: Option<ScopeId>,
    /// The declaration being bound
    pub variable: VariableDescriptor,
}

impl BindingRequest {
    /// A `declared` binding without function scope
    pub fn new(step: usize, stack_index: isize, variable: VariableDescriptor) -> Self {
        Self {
            step,
            stack_index,
            lifecycle: Lifecycle::Declared,
            function_scope_id: None,
            variable,
        }
    }

    /// Set the lifecycle
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Set the function scope
    pub fn in_scope(mut self, scope: impl Into<ScopeId>) -> Self {
        self.function_scope_id = Some(scope.into());
        self
    }
}

/// Parse a JSON array of binding requests
pub fn bindings_from_json(content: &str) -> Result<Vec<BindingRequest>> {
    serde_json::from_str(content).wrap_err("Failed to parse bindings as JSON")
}

/// Read and parse a bindings file
pub fn bindings_from_json_file(path: impl AsRef<Path>) -> Result<Vec<BindingRequest>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bindings file: {path:?}"))?;
    bindings_from_json(&content).with_context(|| format!("Invalid bindings file: {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_struct_logs() {
        let trace = Trace::from_json(
            r#"{
                "gas": 21000,
                "failed": false,
                "structLogs": [
                    {"pc": 0, "op": "PUSH1", "gas": 100, "depth": 1, "stack": []},
                    {"pc": 2, "op": "PUSH1", "gas": 97, "depth": 1, "stack": ["0x80"]},
                    {"pc": 4, "op": "MSTORE", "gas": 94, "depth": 1, "stack": ["0x80", "0x40"]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(trace.len(), 3);
        assert_eq!(trace[2].op, "MSTORE");
        assert_eq!(trace[2].pc, 4);
        assert_eq!(trace[1].gas, Some(97));
        assert_eq!(trace[2].stack, Some(vec![U256::from(0x80), U256::from(0x40)]));
    }

    #[test]
    fn test_parse_bare_array_with_defaults() {
        let trace = Trace::from_json(r#"[{"op": "PUSH0"}, {"op": "POP", "depth": 2}]"#).unwrap();

        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].depth, 1);
        assert_eq!(trace[0].pc, 0);
        assert_eq!(trace[0].stack, None);
        assert_eq!(trace[1].depth, 2);
    }

    #[test]
    fn test_stack_words_with_and_without_prefix() {
        assert_eq!(parse_stack_word("0xff").unwrap(), U256::from(255));
        let padded = format!("{}ff", "0".repeat(62));
        assert_eq!(parse_stack_word(&padded).unwrap(), U256::from(255));
        assert_eq!(parse_stack_word("0x").unwrap(), U256::ZERO);
        assert!(parse_stack_word("0xzz").is_err());
    }

    #[test]
    fn test_invalid_trace_is_an_error() {
        assert!(Trace::from_json(r#"{"structLogs": [{"pc": 0}]}"#).is_err());
        assert!(Trace::from_json("not json").is_err());
        assert!(Trace::from_json(r#"[{"op": "PUSH1", "stack": ["0xnothex"]}]"#).is_err());
    }

    #[test]
    fn test_bindings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"step": 2, "stackIndex": 0, "lifecycle": "declared", "functionScopeId": 4,
                  "variable": {{"id": 9, "name": "y", "isParameter": true}}}},
                {{"step": 5, "stackIndex": -1, "variable": {{"id": 10, "name": "", "isReturnParameter": true}}}}
            ]"#
        )
        .unwrap();

        let bindings = bindings_from_json_file(file.path()).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].function_scope_id, Some(ScopeId(4)));
        assert!(bindings[0].variable.is_parameter);
        assert_eq!(bindings[1].stack_index, -1);
        assert_eq!(bindings[1].lifecycle, Lifecycle::Declared);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Trace::from_json_file("/nonexistent/trace.json").unwrap_err();
        assert!(format!("{err:?}").contains("trace.json"));
    }
}
