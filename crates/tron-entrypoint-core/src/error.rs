// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;

/// Exit code for every failure that happens before the node is launched.
pub const EXIT_CODE_FATAL: i32 = 1;

/// Errors that stop the entrypoint before or while launching the node
#[derive(Debug, thiserror::Error)]
pub enum EntrypointError {
    #[error("Invalid {name}: {value}. Must be one of: \"true\", \"false\"")]
    InvalidBoolean { name: &'static str, value: String },

    #[error("Invalid {name}: {value}. Must be valid UTF-8")]
    NotUnicode { name: String, value: String },

    #[error("Invalid NETWORK: {0}. Must be one of: \"mainnet\", \"nile\"")]
    InvalidNetwork(String),

    #[error("Invalid {name}: {value}. {reason}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be specified when event plugin is enabled")]
    MissingVariable(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config file does not exist: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Config file is not readable: {}: {source}", .path.display())]
    ConfigUnreadable { path: PathBuf, source: io::Error },

    #[error("Failed to write config file {}: {source}", .path.display())]
    ConfigWrite { path: PathBuf, source: io::Error },

    #[error("Invalid template pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("FullNode.jar does not exist: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Failed while waiting for the node process: {0}")]
    Wait(io::Error),
}

impl EntrypointError {
    /// Exit code the entrypoint terminates with for this error.
    pub fn exit_code(&self) -> i32 {
        EXIT_CODE_FATAL
    }
}
