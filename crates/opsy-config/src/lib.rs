// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
mod schema;
mod loader;

pub use schema::*;
pub use loader::{load, ConfigError};
