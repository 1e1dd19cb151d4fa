// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::PathBuf;

use crate::config::RuntimeConfig;
use crate::error::EntrypointError;

pub const EVENT_SUBSCRIBE_FLAG: &str = "--es";
pub const WITNESS_FLAG: &str = "--witness";

/// The node's command line, one token per argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// `java <jvm flags> -jar <jar> -c <config> -d <data dir> [--es] [--witness]`
pub fn build_command(config: &RuntimeConfig) -> Result<LaunchCommand, EntrypointError> {
    let paths = &config.paths;
    if !paths.jar.is_file() {
        return Err(EntrypointError::ArtifactMissing(paths.jar.clone()));
    }

    let mut args = config.jvm.flags(&paths.data_dir);
    args.extend([
        "-jar".to_string(),
        paths.jar.display().to_string(),
        "-c".to_string(),
        config.config_file().display().to_string(),
        "-d".to_string(),
        paths.data_dir.display().to_string(),
    ]);
    if config.settings.event_plugin_enabled() {
        args.push(EVENT_SUBSCRIBE_FLAG.to_string());
    }
    if config.settings.witness {
        args.push(WITNESS_FLAG.to_string());
    }

    Ok(LaunchCommand {
        program: paths.java.clone(),
        args,
        working_dir: paths.data_dir.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        EventPluginSettings, LaunchPaths, Network, Settings, TriggerSettings, EMPTY_FILTER,
    };
    use tron_resources::{DetectedResources, MemorySource};

    fn config_in(dir: &std::path::Path, settings: Settings) -> RuntimeConfig {
        let paths = LaunchPaths {
            jar: dir.join("FullNode.jar"),
            ..Default::default()
        };
        RuntimeConfig::assemble(
            settings,
            DetectedResources {
                cpu_count: 4,
                memory_gb: 16,
                memory_source: MemorySource::CgroupV1,
            },
            paths,
        )
    }

    #[test]
    fn test_missing_jar() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_command(&config_in(dir.path(), Settings::default())).unwrap_err();
        assert!(matches!(err, EntrypointError::ArtifactMissing(_)));
        assert!(err.to_string().contains("FullNode.jar"));
    }

    #[test]
    fn test_command_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("FullNode.jar"), b"jar").unwrap();
        let config = config_in(
            dir.path(),
            Settings {
                network: Network::Nile,
                ..Default::default()
            },
        );
        let command = build_command(&config).unwrap();

        assert_eq!(command.program, PathBuf::from("java"));
        assert_eq!(command.working_dir, PathBuf::from("/data"));
        let tail: Vec<&str> = command.args.iter().rev().take(6).rev().map(String::as_str).collect();
        let jar = dir.path().join("FullNode.jar").display().to_string();
        assert_eq!(
            tail,
            ["-jar", jar.as_str(), "-c", "/etc/tron/nile_config.conf", "-d", "/data"]
        );
        assert!(command.args.contains(&"-Xmx10G".to_string()));
        assert!(!command.args.iter().any(|a| a == "--es" || a == "--witness"));
    }

    #[test]
    fn test_optional_flags_come_last() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("FullNode.jar"), b"jar").unwrap();
        let config = config_in(
            dir.path(),
            Settings {
                witness: true,
                event_plugin: Some(EventPluginSettings {
                    kafka_server: "kafka:9092".to_string(),
                    triggers: TriggerSettings::default(),
                    address_filter: EMPTY_FILTER.to_string(),
                    topic_filter: EMPTY_FILTER.to_string(),
                }),
                ..Default::default()
            },
        );
        let command = build_command(&config).unwrap();
        let n = command.args.len();
        assert_eq!(&command.args[n - 2..], ["--es", "--witness"]);

        let line = command.to_string();
        assert!(line.starts_with("java -XX:"));
        assert!(line.ends_with("-d /data --es --witness"));
    }
}
