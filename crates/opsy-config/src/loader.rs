// Copyright (c) 2025-2026 Opsy Contributors
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/opsy/config.yaml"));

    // 2. Home / XDG
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".opsy/config.yaml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("opsy/config.yaml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".opsy/config.yaml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// environment overrides.  The `extra` argument may provide an explicit path
/// (e.g. `--config` CLI flag); unlike the search paths it must exist.
pub fn load(extra: Option<&Path>) -> Result<Config, ConfigError> {
    let mut merged = Value::Mapping(Default::default());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_yaml(&mut merged, read_layer(&path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_yaml(&mut merged, read_layer(p)?);
    }

    let mut config: Config = serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
        path: extra.map(Path::to_path_buf).unwrap_or_default(),
        source,
    })?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn read_layer(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Environment variables win over every file layer.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let api_key = lookup("OPSY_ANTHROPIC_API_KEY")
        .or_else(|| lookup("ANTHROPIC_API_KEY"))
        .filter(|k| !k.is_empty());
    if let Some(key) = api_key {
        config.anthropic.api_key = Some(key);
    }
    if let Some(dir) = lookup("OPSY_TOOLS_DIR").filter(|d| !d.is_empty()) {
        config.tools.directory = dir;
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.  Empty
/// documents (`null`) leave `dst` untouched.
fn merge_yaml(dst: &mut Value, src: Value) {
    match (dst, src) {
        (_, Value::Null) => {}
        (Value::Mapping(d), Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
