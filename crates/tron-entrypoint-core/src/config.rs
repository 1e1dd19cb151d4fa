// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;
use tron_resources::DetectedResources;

use crate::env::{EnvReader, EnvSource};
use crate::error::EntrypointError;
use crate::jvm::{resolve_heap_gb, HeapSource, JvmTuning};
use crate::tuning::NodeTuning;

pub const DEFAULT_P2P_PORT: u16 = 28888;
pub const DEFAULT_FULL_NODE_PORT: u16 = 8090;
pub const DEFAULT_RPC_FULL_NODE_PORT: u16 = 8545;
pub const DEFAULT_RPC_SOLIDITY_NODE_PORT: u16 = 8555;
pub const DEFAULT_VM_MAX_TIME_RATIO: f64 = 20.0;
/// An empty quoted string, what the node config expects for "no filter".
pub const EMPTY_FILTER: &str = "\"\"";

pub const MAINNET_CONFIG_PATH: &str = "/etc/tron/mainnet_config.conf";
pub const NILE_CONFIG_PATH: &str = "/etc/tron/nile_config.conf";
pub const FULL_NODE_JAR_PATH: &str = "/usr/local/tron/FullNode.jar";
pub const DATA_DIR_PATH: &str = "/data";
pub const KAFKA_PLUGIN_PATH: &str = "/usr/local/tron/plugins/plugin-kafka-1.0.0.zip";
pub const JAVA_PROGRAM: &str = "java";

/// The TRON network the node joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Nile,
}

impl FromStr for Network {
    type Err = EntrypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "nile" => Ok(Network::Nile),
            other => Err(EntrypointError::InvalidNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Nile => f.write_str("nile"),
        }
    }
}

/// Which event triggers the kafka plugin publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSettings {
    pub block: bool,
    pub transaction: bool,
    pub contract_event: bool,
    pub contract_log: bool,
    pub solidity_block: bool,
    pub solidity_event: bool,
    pub solidity_log: bool,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            block: true,
            transaction: true,
            contract_event: true,
            contract_log: false,
            solidity_block: false,
            solidity_event: false,
            solidity_log: false,
        }
    }
}

/// Event subscription settings, present only when the plugin is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPluginSettings {
    pub kafka_server: String,
    pub triggers: TriggerSettings,
    /// Already quoted and joined, ready for the config array.
    pub address_filter: String,
    pub topic_filter: String,
}

impl EventPluginSettings {
    fn from_reader<S: EnvSource + ?Sized>(
        reader: &EnvReader<'_, S>,
    ) -> Result<Self, EntrypointError> {
        let kafka_server = reader
            .string("EVENT_PLUGIN_KAFKA_SERVER")?
            .filter(|server| !server.trim().is_empty())
            .ok_or(EntrypointError::MissingVariable("EVENT_PLUGIN_KAFKA_SERVER"))?;

        let defaults = TriggerSettings::default();
        let triggers = TriggerSettings {
            block: reader.boolean_or("EVENT_PLUGIN_BLOCK_TRIGGER_ENABLED", defaults.block)?,
            transaction: reader.boolean_or(
                "EVENT_PLUGIN_TRANSACTION_TRIGGER_ENABLED",
                defaults.transaction,
            )?,
            contract_event: reader.boolean_or(
                "EVENT_PLUGIN_CONTRACTEVENT_TRIGGER_ENABLED",
                defaults.contract_event,
            )?,
            contract_log: reader.boolean_or(
                "EVENT_PLUGIN_CONTRACTLOG_TRIGGER_ENABLED",
                defaults.contract_log,
            )?,
            solidity_block: reader.boolean_or(
                "EVENT_PLUGIN_SOLIDITY_BLOCK_TRIGGER_ENABLED",
                defaults.solidity_block,
            )?,
            solidity_event: reader.boolean_or(
                "EVENT_PLUGIN_SOLIDITY_EVENT_TRIGGER_ENABLED",
                defaults.solidity_event,
            )?,
            solidity_log: reader.boolean_or(
                "EVENT_PLUGIN_SOLIDITY_LOG_TRIGGER_ENABLED",
                defaults.solidity_log,
            )?,
        };

        Ok(Self {
            kafka_server,
            triggers,
            address_filter: reader
                .filter_list("EVENT_PLUGIN_ADDRESS_FILTER")?
                .unwrap_or_else(|| EMPTY_FILTER.to_string()),
            topic_filter: reader
                .filter_list("EVENT_PLUGIN_TOPIC_FILTER")?
                .unwrap_or_else(|| EMPTY_FILTER.to_string()),
        })
    }
}

/// Validated settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub network: Network,
    pub witness: bool,
    pub p2p_port: u16,
    pub full_node_port: u16,
    pub solidity_node_port: Option<u16>,
    pub rpc_full_node_port: u16,
    pub rpc_solidity_node_port: u16,
    pub vm_max_time_ratio: f64,
    pub event_plugin: Option<EventPluginSettings>,
    pub cpu_count_override: Option<i64>,
    pub memory_gb_override: Option<i64>,
    pub heap_gb_override: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            witness: false,
            p2p_port: DEFAULT_P2P_PORT,
            full_node_port: DEFAULT_FULL_NODE_PORT,
            solidity_node_port: None,
            rpc_full_node_port: DEFAULT_RPC_FULL_NODE_PORT,
            rpc_solidity_node_port: DEFAULT_RPC_SOLIDITY_NODE_PORT,
            vm_max_time_ratio: DEFAULT_VM_MAX_TIME_RATIO,
            event_plugin: None,
            cpu_count_override: None,
            memory_gb_override: None,
            heap_gb_override: None,
        }
    }
}

impl Settings {
    /// Reads and validates every setting. Touches nothing but `source`.
    pub fn from_env<S: EnvSource + ?Sized>(source: &S) -> Result<Self, EntrypointError> {
        let reader = EnvReader::new(source);

        let network = match reader.string("NETWORK")? {
            Some(value) => value.parse::<Network>()?,
            None => Network::default(),
        };
        let witness = reader.boolean_or("WITNESS_MODE", false)?;
        let event_plugin_enabled = reader.boolean_or("EVENT_PLUGIN_ENABLED", false)?;

        let p2p_port = reader.integer("P2P_PORT")?.unwrap_or(DEFAULT_P2P_PORT);
        let full_node_port = reader
            .integer("FULL_NODE_PORT")?
            .unwrap_or(DEFAULT_FULL_NODE_PORT);
        let solidity_node_port = reader.integer("SOLIDITY_NODE_PORT")?;
        let rpc_full_node_port = reader
            .integer("RPC_FULL_NODE")?
            .unwrap_or(DEFAULT_RPC_FULL_NODE_PORT);
        let rpc_solidity_node_port = reader
            .integer("RPC_SOLIDITY_NODE")?
            .unwrap_or(DEFAULT_RPC_SOLIDITY_NODE_PORT);
        let vm_max_time_ratio = reader
            .double("VM_MAX_TIME_RATIO")?
            .unwrap_or(DEFAULT_VM_MAX_TIME_RATIO);

        let event_plugin = if event_plugin_enabled {
            Some(EventPluginSettings::from_reader(&reader)?)
        } else {
            None
        };

        let cpu_count_override = reader.positive_rounded("SYSTEM_CPU_COUNT", "auto-detection")?;
        let memory_gb_override = reader.positive_rounded("SYSTEM_MEMORY_GB", "auto-detection")?;
        let heap_gb_override = reader
            .positive_rounded(
                "JAVA_HEAP_SIZE",
                "auto-detecting heap size from system memory",
            )?
            .and_then(|gb| u32::try_from(gb).ok());

        let settings = Self {
            network,
            witness,
            p2p_port,
            full_node_port,
            solidity_node_port,
            rpc_full_node_port,
            rpc_solidity_node_port,
            vm_max_time_ratio,
            event_plugin,
            cpu_count_override,
            memory_gb_override,
            heap_gb_override,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), EntrypointError> {
        let ports = [
            ("P2P_PORT", Some(self.p2p_port)),
            ("FULL_NODE_PORT", Some(self.full_node_port)),
            ("SOLIDITY_NODE_PORT", self.solidity_node_port),
            ("RPC_FULL_NODE", Some(self.rpc_full_node_port)),
            ("RPC_SOLIDITY_NODE", Some(self.rpc_solidity_node_port)),
        ];
        for (name, port) in ports {
            if port == Some(0) {
                return Err(EntrypointError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if !(self.vm_max_time_ratio.is_finite() && self.vm_max_time_ratio > 0.0) {
            return Err(EntrypointError::InvalidConfig(format!(
                "VM_MAX_TIME_RATIO must be a positive number, got {}",
                self.vm_max_time_ratio
            )));
        }

        if let Some(plugin) = &self.event_plugin {
            if plugin.kafka_server.trim().is_empty() {
                return Err(EntrypointError::MissingVariable(
                    "EVENT_PLUGIN_KAFKA_SERVER",
                ));
            }
        }

        Ok(())
    }

    pub fn event_plugin_enabled(&self) -> bool {
        self.event_plugin.is_some()
    }
}

/// Fixed filesystem locations inside the node image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPaths {
    pub mainnet_config: PathBuf,
    pub nile_config: PathBuf,
    pub jar: PathBuf,
    pub data_dir: PathBuf,
    pub kafka_plugin: PathBuf,
    /// Resolved through `PATH` when not absolute.
    pub java: PathBuf,
}

impl Default for LaunchPaths {
    fn default() -> Self {
        Self {
            mainnet_config: PathBuf::from(MAINNET_CONFIG_PATH),
            nile_config: PathBuf::from(NILE_CONFIG_PATH),
            jar: PathBuf::from(FULL_NODE_JAR_PATH),
            data_dir: PathBuf::from(DATA_DIR_PATH),
            kafka_plugin: PathBuf::from(KAFKA_PLUGIN_PATH),
            java: PathBuf::from(JAVA_PROGRAM),
        }
    }
}

impl LaunchPaths {
    pub fn config_file(&self, network: Network) -> &Path {
        match network {
            Network::Mainnet => &self.mainnet_config,
            Network::Nile => &self.nile_config,
        }
    }
}

/// Everything needed to render the node config and build its command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub settings: Settings,
    pub resources: DetectedResources,
    pub node: NodeTuning,
    pub jvm: JvmTuning,
    pub heap_source: HeapSource,
    pub paths: LaunchPaths,
}

impl RuntimeConfig {
    pub fn assemble(settings: Settings, resources: DetectedResources, paths: LaunchPaths) -> Self {
        let (heap_gb, heap_source) = resolve_heap_gb(
            settings.heap_gb_override,
            resources.memory_gb,
            settings.network,
        );
        match heap_source {
            HeapSource::Override => info!("Using JAVA_HEAP_SIZE from environment: {heap_gb}GB"),
            HeapSource::Calculated => info!(
                "Calculated heap size: {heap_gb}GB (from {}GB system memory)",
                resources.memory_gb
            ),
            HeapSource::NetworkDefault => info!(
                "Could not detect system memory, using default heap size for {}: {heap_gb}GB",
                settings.network
            ),
        }

        Self {
            node: NodeTuning::derive(resources.cpu_count, resources.memory_gb),
            jvm: JvmTuning::derive(heap_gb, resources.cpu_count),
            heap_source,
            settings,
            resources,
            paths,
        }
    }

    pub fn config_file(&self) -> &Path {
        self.paths.config_file(self.settings.network)
    }

    /// The plugin archive path, or an empty string when the event plugin is off.
    pub fn plugin_path(&self) -> String {
        if self.settings.event_plugin_enabled() {
            self.paths.kafka_plugin.display().to_string()
        } else {
            String::new()
        }
    }
}
