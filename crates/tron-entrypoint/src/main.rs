// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use anyhow::Context;
use std::{env, io, process};
use tracing::{debug, error, info, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use tron_entrypoint_core::error::EXIT_CODE_FATAL;
use tron_entrypoint_core::{Entrypoint, ProcessEnv};

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
pub async fn main() {
    init_logging();

    // The flow runs in its own task so that a panic becomes an exit code.
    let code = match tokio::spawn(run()).await {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            report_fatal(&format!("{e:#}"));
            EXIT_CODE_FATAL
        }
        Err(e) => {
            report_fatal(&format!("Entrypoint failed unexpectedly: {e}"));
            EXIT_CODE_FATAL
        }
    };
    process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let entrypoint = Entrypoint::default();
    let (launch, exit) = entrypoint
        .run(&ProcessEnv)
        .await
        .context("Failed to launch the TRON node")?;

    if let Some(report) =
        exit.failure_report(launch.config.jvm.heap_gb, launch.config.resources.cpu_count)
    {
        eprint!("{report}");
    }
    info!("Node exited with code {}", exit.code);
    Ok(exit.code)
}

/// Fatal errors reach stderr even when `LOG_LEVEL` filters out errors.
fn report_fatal(message: &str) {
    if tracing::enabled!(Level::ERROR) {
        error!("{message}");
    } else {
        eprintln!("{} | {} | {message}", logger::PREFIX, Level::ERROR);
    }
}

fn init_logging() {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or(DEFAULT_LOG_LEVEL.to_string());
    let env_filter = EnvFilter::try_new(&log_level).unwrap_or_else(|e| {
        eprintln!("Invalid LOG_LEVEL {log_level}: {e}, using {DEFAULT_LOG_LEVEL}");
        EnvFilter::new(DEFAULT_LOG_LEVEL)
    });

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(io::stderr.with_max_level(Level::WARN).or_else(io::stdout))
        .event_format(logger::Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install the log subscriber: {e}");
    }
    debug!("Logging subsystem enabled");
}
