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

//! Engine configuration, loadable from TOML.

use std::{env, fs, path::Path};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum depth of the EVM stack
pub const EVM_STACK_LIMIT: usize = 1024;

/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "SYMSTACK_CONFIG";

/// Configuration for the symbolic stack engine
///
/// Missing fields in a TOML file take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Depth above which a stack overflow diagnostic is reported
    pub max_stack_depth: usize,
    /// Keep variable identity in place when SWAP exchanges a variable with a temporary
    pub pin_swapped_variables: bool,
    /// Record `derived_from` provenance on produced slots
    pub track_provenance: bool,
    /// Compare symbolic depth against concrete stacks recorded in the trace
    pub check_concrete_depth: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: EVM_STACK_LIMIT,
            pin_swapped_variables: true,
            track_provenance: true,
            check_concrete_depth: true,
        }
    }
}

impl EngineConfig {
    /// Set the maximum stack depth
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Enable or disable SWAP identity pinning
    pub fn with_swap_pinning(mut self, enabled: bool) -> Self {
        self.pin_swapped_variables = enabled;
        self
    }

    /// Enable or disable provenance recording
    pub fn with_provenance(mut self, enabled: bool) -> Self {
        self.track_provenance = enabled;
        self
    }

    /// Enable or disable the concrete depth check
    pub fn with_concrete_depth_check(mut self, enabled: bool) -> Self {
        self.check_concrete_depth = enabled;
        self
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse engine config as TOML")
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        let config = Self::from_toml_str(&content)?;

        debug!("Loaded engine configuration from {:?}", path);
        Ok(config)
    }

    /// Load the file named by `SYMSTACK_CONFIG`, or fall back to defaults when unset
    pub fn discover() -> Result<Self> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => {
                debug!("{} not set, using default engine configuration", CONFIG_ENV_VAR);
                Ok(Self::default())
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved engine configuration to {:?}", path);
        Ok(())
    }
}
