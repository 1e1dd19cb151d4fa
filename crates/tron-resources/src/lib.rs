// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host resource detection for the TRON node entrypoint.
//!
//! The CPU count comes from an explicit override or from the host. Memory is taken
//! from the first source below that yields a usable value:
//!
//! 1. an explicit override
//! 2. the cgroup v1 limit (`memory.limit_in_bytes`)
//! 3. the cgroup v2 limit (`memory.max`)
//! 4. `MemTotal` from `/proc/meminfo`
//!
//! A source that is missing, unreadable, unparseable or reports "unlimited" is logged
//! and skipped. If nothing works the memory size is [`UNKNOWN_MEMORY_GB`] and callers
//! use their fixed fallbacks.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod cgroup;
pub mod cpu;
pub mod meminfo;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use cgroup::CgroupLimit;

pub const CGROUP_V1_MEMORY_LIMIT_PATH: &str = "/sys/fs/cgroup/memory/memory.limit_in_bytes";
pub const CGROUP_V2_MEMORY_MAX_PATH: &str = "/sys/fs/cgroup/memory.max";
pub const PROC_MEMINFO_PATH: &str = "/proc/meminfo";

/// Memory size reported when no source could be read.
pub const UNKNOWN_MEMORY_GB: i64 = -1;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;
const KB_PER_GB: u64 = 1024 * 1024;

/// Locations of the pseudo-files consulted during memory detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    pub cgroup_v1_memory_limit: PathBuf,
    pub cgroup_v2_memory_max: PathBuf,
    pub meminfo: PathBuf,
}

impl Default for ResourcePaths {
    fn default() -> Self {
        Self {
            cgroup_v1_memory_limit: PathBuf::from(CGROUP_V1_MEMORY_LIMIT_PATH),
            cgroup_v2_memory_max: PathBuf::from(CGROUP_V2_MEMORY_MAX_PATH),
            meminfo: PathBuf::from(PROC_MEMINFO_PATH),
        }
    }
}

/// Where the detected memory size came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySource {
    Override,
    CgroupV1,
    CgroupV2,
    MemInfo,
    Unknown,
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemorySource::Override => "SYSTEM_MEMORY_GB override",
            MemorySource::CgroupV1 => "cgroup v1 memory limit",
            MemorySource::CgroupV2 => "cgroup v2 memory limit",
            MemorySource::MemInfo => "system total memory",
            MemorySource::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// CPU and memory figures the node is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedResources {
    /// Always at least 1.
    pub cpu_count: u32,
    /// Whole gigabytes; `<= 0` means unknown.
    pub memory_gb: i64,
    pub memory_source: MemorySource,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceDetector {
    paths: ResourcePaths,
}

impl ResourceDetector {
    pub fn new(paths: ResourcePaths) -> Self {
        Self { paths }
    }

    pub fn detect(
        &self,
        cpu_override: Option<i64>,
        memory_override: Option<i64>,
    ) -> DetectedResources {
        let cpu_count = cpu::detect_cpu_count(cpu_override);
        let (memory_gb, memory_source) = self.detect_memory_gb(memory_override);
        DetectedResources {
            cpu_count,
            memory_gb,
            memory_source,
        }
    }

    /// Returns the memory size in whole gigabytes and the source it came from.
    pub fn detect_memory_gb(&self, memory_override: Option<i64>) -> (i64, MemorySource) {
        if let Some(memory_gb) = memory_override.filter(|gb| *gb > 0) {
            info!("Using SYSTEM_MEMORY_GB from environment: {memory_gb}");
            return (memory_gb, MemorySource::Override);
        }

        if let Some(memory_gb) = cgroup_limit_gb(&self.paths.cgroup_v1_memory_limit) {
            info!("Detected container memory limit (cgroup v1): {memory_gb}GB");
            return (memory_gb, MemorySource::CgroupV1);
        }

        if let Some(memory_gb) = cgroup_limit_gb(&self.paths.cgroup_v2_memory_max) {
            info!("Detected container memory limit (cgroup v2): {memory_gb}GB");
            return (memory_gb, MemorySource::CgroupV2);
        }

        if let Some(memory_gb) = meminfo_total_gb(&self.paths.meminfo) {
            info!("Detected system total memory: {memory_gb}GB");
            return (memory_gb, MemorySource::MemInfo);
        }

        warn!("Could not detect system memory, falling back to fixed defaults");
        (UNKNOWN_MEMORY_GB, MemorySource::Unknown)
    }

    /// The container memory limit alone, ignoring overrides and `/proc/meminfo`.
    pub fn container_memory_limit_gb(&self) -> Option<i64> {
        cgroup_limit_gb(&self.paths.cgroup_v1_memory_limit)
            .or_else(|| cgroup_limit_gb(&self.paths.cgroup_v2_memory_max))
    }
}

fn cgroup_limit_gb(path: &Path) -> Option<i64> {
    match cgroup::read_memory_limit(path) {
        Ok(CgroupLimit::Bytes(bytes)) => {
            let gb = bytes / BYTES_PER_GB;
            if gb == 0 {
                debug!(
                    "Memory limit in {} is below 1GB ({bytes} bytes), ignoring",
                    path.display()
                );
                return None;
            }
            i64::try_from(gb).ok()
        }
        Ok(CgroupLimit::Unlimited) => {
            debug!("No memory limit set in {}", path.display());
            None
        }
        Err(e) => {
            log_read_failure(path, &e);
            None
        }
    }
}

fn meminfo_total_gb(path: &Path) -> Option<i64> {
    match meminfo::read_mem_total_kb(path) {
        Ok(kb) => {
            let gb = kb / KB_PER_GB;
            if gb == 0 {
                debug!("Total memory in {} is below 1GB", path.display());
                return None;
            }
            i64::try_from(gb).ok()
        }
        Err(e) => {
            log_read_failure(path, &e);
            None
        }
    }
}

fn log_read_failure(path: &Path, error: &io::Error) {
    if error.kind() == io::ErrorKind::NotFound {
        debug!("Could not read {}: {error}", path.display());
    } else {
        warn!("Could not detect memory from {}: {error}", path.display());
    }
}
