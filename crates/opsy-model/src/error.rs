// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Failures talking to a model backend.  All of them end the current run.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API key not set (configure anthropic.api_key or ANTHROPIC_API_KEY)")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    Decode(String),
}
