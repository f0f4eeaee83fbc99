// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
mod types;
mod error;
mod provider;
mod anthropic;
mod mock;

pub use types::*;
pub use error::ModelError;
pub use provider::ModelProvider;
pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, Script, ScriptedMockProvider};

use opsy_config::AnthropicConfig;

/// Construct the boxed backend described by the configuration.
pub fn from_config(cfg: &AnthropicConfig) -> Result<Box<dyn ModelProvider>, ModelError> {
    Ok(Box::new(AnthropicProvider::from_config(cfg)?))
}
