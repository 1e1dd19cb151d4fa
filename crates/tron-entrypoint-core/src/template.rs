// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rewrites the node's config template with the computed runtime values.
//!
//! Two template styles are supported. Placeholder-style templates carry `{TOKEN}`
//! markers for ports and the VM ratio. Legacy templates carry literal values which are
//! rewritten line by line. Tuning tokens are substituted in both.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::config::{RuntimeConfig, TriggerSettings, EMPTY_FILTER};
use crate::error::EntrypointError;

pub const SOLIDITY_NODE_PORT_TOKEN: &str = "{SOLIDITY_NODE_PORT}";

/// Any of these marks a template as placeholder-style.
pub const PLACEHOLDER_STYLE_MARKERS: [&str; 5] = [
    "{FULL_NODE_PORT}",
    SOLIDITY_NODE_PORT_TOKEN,
    "{RPC_FULL_NODE}",
    "{RPC_SOLIDITY_NODE}",
    "{VM_MAX_TIME_RATIO_PLACEHOLDER}",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStyle {
    Placeholder,
    Legacy,
}

impl TemplateStyle {
    pub fn detect(content: &str) -> Self {
        if PLACEHOLDER_STYLE_MARKERS
            .iter()
            .any(|marker| content.contains(marker))
        {
            TemplateStyle::Placeholder
        } else {
            TemplateStyle::Legacy
        }
    }
}

/// Renders `f64` the way the node's config has always received it: `20.0`, `5.5`.
pub fn format_ratio(value: f64) -> String {
    let rendered = value.to_string();
    if rendered.contains(['.', 'e', 'E']) || !value.is_finite() {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

/// Token name (without braces) to replacement value.
pub fn token_values(config: &RuntimeConfig) -> Vec<(&'static str, String)> {
    let settings = &config.settings;
    let node = &config.node;
    let (kafka_server, triggers, address_filter, topic_filter) = match &settings.event_plugin {
        Some(plugin) => (
            plugin.kafka_server.clone(),
            plugin.triggers,
            plugin.address_filter.clone(),
            plugin.topic_filter.clone(),
        ),
        None => (
            String::new(),
            TriggerSettings::default(),
            EMPTY_FILTER.to_string(),
            EMPTY_FILTER.to_string(),
        ),
    };

    let mut values = vec![
        ("VM_MAX_TIME_RATIO_PLACEHOLDER", format_ratio(settings.vm_max_time_ratio)),
        ("PLUGIN_PATH_PLACEHOLDER", config.plugin_path()),
        ("KAFKA_SERVER_PLACEHOLDER", kafka_server),
        ("BLOCK_TRIGGER_PLACEHOLDER", triggers.block.to_string()),
        ("TRANSACTION_TRIGGER_PLACEHOLDER", triggers.transaction.to_string()),
        ("CONTRACTEVENT_TRIGGER_PLACEHOLDER", triggers.contract_event.to_string()),
        ("CONTRACTLOG_TRIGGER_PLACEHOLDER", triggers.contract_log.to_string()),
        ("SOLIDITY_BLOCK_TRIGGER_PLACEHOLDER", triggers.solidity_block.to_string()),
        ("SOLIDITY_EVENT_TRIGGER_PLACEHOLDER", triggers.solidity_event.to_string()),
        ("SOLIDITY_LOG_TRIGGER_PLACEHOLDER", triggers.solidity_log.to_string()),
        ("CONTRACT_ADDRESS_FILTER_PLACEHOLDER", address_filter),
        ("CONTRACT_TOPIC_FILTER_PLACEHOLDER", topic_filter),
        ("RPC_FULL_NODE", settings.rpc_full_node_port.to_string()),
        ("RPC_SOLIDITY_NODE", settings.rpc_solidity_node_port.to_string()),
        ("FULL_NODE_PORT", settings.full_node_port.to_string()),
        ("RPC_THREAD_COUNT", node.rpc_thread_count.to_string()),
        ("RPC_MAX_CONCURRENT_CALLS", node.rpc_max_concurrent_calls.to_string()),
        ("RPC_FLOW_CONTROL_WINDOW", node.rpc_flow_control_window.to_string()),
        ("RPC_MAX_MESSAGE_SIZE", node.rpc_max_message_size.to_string()),
        ("RPC_MAX_HEADER_LIST_SIZE", node.rpc_max_header_list_size.to_string()),
        ("MAX_CONNECTIONS", node.max_connections.to_string()),
        ("MAX_CONNECTIONS_WITH_SAME_IP", node.max_connections_with_same_ip.to_string()),
        ("MAX_HTTP_CONNECT_NUMBER", node.max_http_connections.to_string()),
        ("STORAGE_MAX_OPEN_FILES", node.max_open_files.to_string()),
        ("STORAGE_MAX_OPEN_FILES_M", node.max_open_files_m.to_string()),
        ("STORAGE_MAX_OPEN_FILES_L", node.max_open_files_l.to_string()),
        ("STORAGE_WRITE_BUFFER_SIZE", node.storage_write_buffer_size.to_string()),
        ("STORAGE_CACHE_SIZE", node.storage_cache_size.to_string()),
        ("DB_COMPACT_THREADS", node.db_compact_threads.to_string()),
        ("DB_MAX_BYTES_FOR_LEVEL_BASE", node.db_max_bytes_for_level_base.to_string()),
        ("DB_TARGET_FILE_SIZE_BASE", node.db_target_file_size_base.to_string()),
        ("GLOBAL_QPS", node.global_qps.to_string()),
        ("GLOBAL_IP_QPS", node.global_ip_qps.to_string()),
    ];
    if let Some(port) = settings.solidity_node_port {
        values.push(("SOLIDITY_NODE_PORT", port.to_string()));
    }
    values
}

/// Compiled line patterns shared by every render.
#[derive(Debug)]
pub struct TemplateRenderer {
    token: Regex,
    listen_port: Regex,
    full_node_port: Regex,
    solidity_port: Regex,
    solidity_token_line: Regex,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, EntrypointError> {
        Ok(Self {
            token: Regex::new(r"\{([A-Z_]+)\}")?,
            listen_port: assignment_line("listen\\.port")?,
            full_node_port: assignment_line("fullNodePort")?,
            solidity_port: assignment_line("solidityPort")?,
            solidity_token_line: Regex::new(r"(?m)^[^\r\n]*\{SOLIDITY_NODE_PORT\}[^\r\n]*(?:\r?\n|$)")?,
        })
    }

    pub fn render(&self, content: &str, config: &RuntimeConfig) -> (String, TemplateStyle) {
        let settings = &config.settings;
        let style = TemplateStyle::detect(content);
        let mut rendered = content.to_string();

        if style == TemplateStyle::Legacy {
            rendered = set_assignment(&self.listen_port, &rendered, settings.p2p_port);
            rendered = set_assignment(&self.full_node_port, &rendered, settings.full_node_port);
            if let Some(port) = settings.solidity_node_port {
                rendered = set_assignment(&self.solidity_port, &rendered, port);
            }
        }

        if settings.solidity_node_port.is_none() {
            rendered = self
                .solidity_token_line
                .replace_all(&rendered, "")
                .into_owned();
        }

        rendered = self.replace_tokens(&rendered, &token_values(config));

        if style == TemplateStyle::Placeholder {
            rendered = set_assignment(&self.listen_port, &rendered, settings.p2p_port);
        }

        (rendered, style)
    }

    /// Single pass over the content; unknown `{NAME}` markers are left alone, and
    /// substituted values are never rescanned.
    fn replace_tokens(&self, content: &str, values: &[(&'static str, String)]) -> String {
        let lookup: HashMap<&str, &str> = values
            .iter()
            .map(|(token, value)| (*token, value.as_str()))
            .collect();
        self.token
            .replace_all(content, |caps: &Captures| {
                match lookup.get(&caps[1]) {
                    Some(value) => (*value).to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Reads, renders and rewrites the config file in place.
    pub fn render_file(
        &self,
        path: &Path,
        config: &RuntimeConfig,
    ) -> Result<TemplateStyle, EntrypointError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EntrypointError::ConfigMissing(path.to_path_buf()));
            }
            Err(e) => {
                return Err(EntrypointError::ConfigUnreadable {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let (rendered, style) = self.render(&content, config);
        debug!("Rendering {} as a {style:?}-style template", path.display());

        fs::write(path, rendered).map_err(|e| EntrypointError::ConfigWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(style)
    }
}

fn assignment_line(key: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?m)^([ \t]*){key}[ \t]*=[^\r\n]*"))
}

fn set_assignment(pattern: &Regex, content: &str, value: u16) -> String {
    pattern
        .replace_all(content, |caps: &Captures| {
            let key = caps[0]
                .trim_start()
                .split(|c: char| c == '=' || c.is_whitespace())
                .next()
                .unwrap_or_default();
            format!("{}{key} = {value}", &caps[1])
        })
        .into_owned()
}
