// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration derivation, config rendering and process supervision for the TRON
//! full node container.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod command;
pub mod config;
pub mod entrypoint;
pub mod env;
pub mod error;
pub mod jvm;
pub mod supervisor;
pub mod template;
pub mod tuning;

pub use command::{build_command, LaunchCommand};
pub use config::{LaunchPaths, Network, RuntimeConfig, Settings};
pub use entrypoint::{Entrypoint, Launch};
pub use env::{EnvSource, ProcessEnv};
pub use error::EntrypointError;
pub use supervisor::{SupervisedExit, Supervisor};
