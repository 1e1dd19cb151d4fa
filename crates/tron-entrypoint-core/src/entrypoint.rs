// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info, warn};
use tron_resources::ResourceDetector;

use crate::command::{build_command, LaunchCommand};
use crate::config::{LaunchPaths, RuntimeConfig, Settings};
use crate::env::EnvSource;
use crate::error::EntrypointError;
use crate::supervisor::{SupervisedExit, Supervisor};
use crate::template::TemplateRenderer;

/// A rendered config and the command ready to launch the node with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub config: RuntimeConfig,
    pub command: LaunchCommand,
}

/// The node entrypoint: settings, detection, rendering, launch.
#[derive(Debug, Clone, Default)]
pub struct Entrypoint {
    pub paths: LaunchPaths,
    pub detector: ResourceDetector,
    pub supervisor: Supervisor,
}

impl Entrypoint {
    /// Everything up to, but not including, starting the node.
    ///
    /// The environment is fully validated before the filesystem is touched.
    pub fn prepare<S: EnvSource + ?Sized>(&self, env: &S) -> Result<Launch, EntrypointError> {
        let settings = Settings::from_env(env)?;
        info!("Network: {}", settings.network);

        let resources = self
            .detector
            .detect(settings.cpu_count_override, settings.memory_gb_override);
        info!(
            "Using {} CPUs and {}GB memory (from {})",
            resources.cpu_count, resources.memory_gb, resources.memory_source
        );

        let config = RuntimeConfig::assemble(settings, resources, self.paths.clone());
        log_summary(&config);
        for warning in config
            .jvm
            .memory_warnings(self.detector.container_memory_limit_gb())
        {
            warn!("{warning}");
        }

        let renderer = TemplateRenderer::new()?;
        let style = renderer.render_file(config.config_file(), &config)?;
        debug!(
            "Rendered {} ({style:?} style)",
            config.config_file().display()
        );

        let command = build_command(&config)?;
        info!("Executing: {command}");
        Ok(Launch { config, command })
    }

    /// Prepares and runs the node, returning once it has exited.
    pub async fn run<S: EnvSource + ?Sized>(
        &self,
        env: &S,
    ) -> Result<(Launch, SupervisedExit), EntrypointError> {
        let launch = self.prepare(env)?;
        let exit = self.supervisor.run(&launch.command).await?;
        Ok((launch, exit))
    }
}

fn log_summary(config: &RuntimeConfig) {
    let jvm = &config.jvm;
    let node = &config.node;
    info!(
        "JVM memory: heap {}GB, direct {}, metaspace {}/{}, code cache {}",
        jvm.heap_gb,
        jvm.max_direct_memory,
        jvm.metaspace_size,
        jvm.max_metaspace_size,
        jvm.code_cache
    );
    info!("Total estimated JVM memory: {}GB", jvm.estimated_total_gb());
    info!(
        "GC: {:?}, ConcGCThreads {}, ParallelGCThreads {}",
        jvm.collector, jvm.conc_gc_threads, jvm.parallel_gc_threads
    );
    info!(
        "Node tuning: rpc threads {}, max connections {}, http connections {}, global QPS {}",
        node.rpc_thread_count, node.max_connections, node.max_http_connections, node.global_qps
    );
    debug!("Full node tuning: {node:?}");
}
