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

//! Test utilities for integration tests

use std::sync::{Arc, Mutex};

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging for a test
    pub fn init_test_environment() {
        symstack_common::logging::ensure_test_logging(None);
    }
}

/// Struct-log fixtures, written the way a node's tracer emits them
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use eyre::{Result, WrapErr};
    use serde_json::{json, Value};
    use symstack_common::types::Trace;

    /// Builds a `{"structLogs": [...]}` trace one opcode at a time
    #[derive(Debug, Clone)]
    pub struct TraceBuilder {
        steps: Vec<Value>,
        depth: usize,
        pc: u64,
    }

    impl Default for TraceBuilder {
        fn default() -> Self {
            Self { steps: Vec::new(), depth: 1, pc: 0 }
        }
    }

    impl TraceBuilder {
        /// Start in the outermost frame
        pub fn new() -> Self {
            Self::default()
        }

        /// Append one opcode without a recorded stack
        pub fn op(mut self, op: &str) -> Self {
            self.steps.push(json!({
                "pc": self.pc,
                "op": op,
                "depth": self.depth,
                "gas": 100_000,
            }));
            self.pc += 1;
            self
        }

        /// Append several opcodes
        pub fn ops(self, ops: &[&str]) -> Self {
            ops.iter().fold(self, |builder, op| builder.op(op))
        }

        /// Append one opcode with the concrete stack it saw, bottom first
        pub fn op_with_stack(mut self, op: &str, stack: &[u64]) -> Self {
            let words: Vec<String> = stack.iter().map(|word| format!("0x{word:x}")).collect();
            self.steps.push(json!({
                "pc": self.pc,
                "op": op,
                "depth": self.depth,
                "gas": 100_000,
                "stack": words,
            }));
            self.pc += 1;
            self
        }

        /// Following opcodes run in a callee frame
        pub fn enter_call(mut self) -> Self {
            self.depth += 1;
            self.pc = 0;
            self
        }

        /// Following opcodes run in the caller again
        pub fn leave_call(mut self) -> Self {
            self.depth = self.depth.saturating_sub(1).max(1);
            self
        }

        /// The trace as tracer JSON
        pub fn to_json(&self) -> String {
            json!({ "gas": 21_000, "failed": false, "structLogs": self.steps }).to_string()
        }

        /// Parse the trace
        pub fn build(&self) -> Result<Trace> {
            Trace::from_json(&self.to_json()).wrap_err("Fixture trace should parse")
        }

        /// Write the trace to `dir/trace.json`
        pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
            let path = dir.join("trace.json");
            std::fs::write(&path, self.to_json())
                .wrap_err_with(|| format!("Failed to write trace fixture: {path:?}"))?;
            Ok(path)
        }
    }

    /// A binding request as the decoder emits it
    pub fn binding(step: usize, stack_index: isize, id: u64, name: &str) -> Value {
        json!({ "step": step, "stackIndex": stack_index, "variable": { "id": id, "name": name } })
    }

    /// A parameter binding within `scope`
    pub fn parameter_binding(
        step: usize,
        stack_index: isize,
        id: u64,
        name: &str,
        scope: u64,
    ) -> Value {
        json!({
            "step": step,
            "stackIndex": stack_index,
            "lifecycle": "assigned",
            "functionScopeId": scope,
            "variable": { "id": id, "name": name, "type": "uint256", "isParameter": true },
        })
    }

    /// Write binding requests to `dir/bindings.json`
    pub fn write_bindings(dir: &Path, bindings: Vec<Value>) -> Result<PathBuf> {
        let path = dir.join("bindings.json");
        std::fs::write(&path, Value::Array(bindings).to_string())
            .wrap_err_with(|| format!("Failed to write bindings fixture: {path:?}"))?;
        Ok(path)
    }
}

/// Logging utilities for testing
pub mod logging {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    /// A warning seen by [`WarningCapture`]
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct CapturedWarning {
        /// The `kind` field, if the event carried one
        pub kind: Option<String>,
        /// The formatted message
        pub message: String,
    }

    /// A tracing layer that captures warning events
    #[derive(Clone, Default)]
    pub struct WarningCapture {
        warnings: Arc<Mutex<Vec<CapturedWarning>>>,
    }

    impl WarningCapture {
        /// Create a new WarningCapture instance
        pub fn new() -> Self {
            Self::default()
        }

        /// Retrieve captured warnings
        pub fn get_warnings(&self) -> Vec<CapturedWarning> {
            self.warnings.lock().unwrap().clone()
        }

        /// Kinds of the captured warnings, in emission order
        pub fn kinds(&self) -> Vec<String> {
            self.get_warnings().into_iter().filter_map(|warning| warning.kind).collect()
        }
    }

    #[derive(Default)]
    struct WarningVisitor {
        warning: CapturedWarning,
    }

    impl tracing::field::Visit for WarningVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            match field.name() {
                "message" => self.warning.message = format!("{value:?}"),
                "kind" => self.warning.kind = Some(format!("{value:?}").trim_matches('"').into()),
                _ => {}
            }
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            match field.name() {
                "message" => self.warning.message = value.to_string(),
                "kind" => self.warning.kind = Some(value.to_string()),
                _ => {}
            }
        }
    }

    impl<S> tracing_subscriber::Layer<S> for WarningCapture
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().level() == &Level::WARN {
                let mut visitor = WarningVisitor::default();
                event.record(&mut visitor);
                self.warnings.lock().unwrap().push(visitor.warning);
            }
        }
    }

    /// Run `f` with a thread-local subscriber that captures its warnings
    pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, WarningCapture) {
        let capture = WarningCapture::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, capture)
    }
}
