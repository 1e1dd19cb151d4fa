// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JVM options for the node, derived from the heap size and CPU count.

use std::fmt;
use std::path::Path;

use crate::config::Network;
use crate::tuning;

/// Heaps at or above this size use G1; smaller ones use CMS.
pub const G1_MIN_HEAP_GB: u32 = 8;
/// Largest heap for which compressed oops still work and pre-touching stays fast.
pub const COMPRESSED_OOPS_MAX_HEAP_GB: u32 = 32;
/// Estimated JVM footprint above which a high-usage warning is logged.
pub const HIGH_MEMORY_WARNING_GB: u32 = 20;
/// Memory the container should keep free beyond the JVM's estimated footprint.
pub const CONTAINER_HEADROOM_GB: u32 = 4;

/// A JVM memory size, held in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MemSize(u32);

impl MemSize {
    pub const fn mib(mib: u32) -> Self {
        Self(mib)
    }

    pub const fn gib(gib: u32) -> Self {
        Self(gib * 1024)
    }

    pub fn as_mib(self) -> u32 {
        self.0
    }

    /// Size in GB, rounded half up.
    pub fn rounded_gb(self) -> u32 {
        (self.0 + 512) / 1024
    }
}

/// Renders in the JVM's own syntax, `4G` or `1536m`.
impl fmt::Display for MemSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1024 == 0 {
            write!(f, "{}G", self.0 / 1024)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapSource {
    Override,
    Calculated,
    NetworkDefault,
}

/// Picks the heap size: a valid override, else the calculated size, else the
/// network default.
pub fn resolve_heap_gb(
    heap_override: Option<u32>,
    memory_gb: i64,
    network: Network,
) -> (u32, HeapSource) {
    if let Some(heap_gb) = heap_override.filter(|gb| *gb > 0) {
        return (heap_gb, HeapSource::Override);
    }
    match tuning::heap_size_gb(memory_gb, network) {
        Some(heap_gb) => (heap_gb, HeapSource::Calculated),
        None => (tuning::default_heap_gb(network), HeapSource::NetworkDefault),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collector {
    G1 {
        region_size: MemSize,
        max_pause_millis: u32,
        initiating_heap_occupancy_percent: u32,
    },
    ConcMarkSweep,
}

impl Collector {
    fn for_heap(heap_gb: u32) -> Self {
        if heap_gb < G1_MIN_HEAP_GB {
            return Collector::ConcMarkSweep;
        }
        let region_size = match heap_gb {
            gb if gb >= 64 => MemSize::mib(32),
            gb if gb >= 32 => MemSize::mib(16),
            gb if gb >= 16 => MemSize::mib(8),
            _ => MemSize::mib(4),
        };
        let (max_pause_millis, initiating_heap_occupancy_percent) = match heap_gb {
            gb if gb >= 32 => (250, 40),
            gb if gb >= 16 => (150, 45),
            _ => (100, 50),
        };
        Collector::G1 {
            region_size,
            max_pause_millis,
            initiating_heap_occupancy_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JvmTuning {
    pub heap_gb: u32,
    pub cpu_count: u32,
    pub conc_gc_threads: u32,
    pub parallel_gc_threads: u32,
    pub code_cache: MemSize,
    pub metaspace_size: MemSize,
    pub max_metaspace_size: MemSize,
    pub max_direct_memory: MemSize,
    pub collector: Collector,
    pub use_numa: bool,
    pub always_pre_touch: bool,
    pub aggressive_tiered_compilation: bool,
    pub compressed_oops: bool,
    pub aggressive_opts: bool,
}

impl JvmTuning {
    pub fn derive(heap_gb: u32, cpu_count: u32) -> Self {
        let code_cache = if heap_gb >= 48 && cpu_count >= 12 {
            MemSize::mib(768)
        } else if heap_gb >= 32 || cpu_count >= 8 {
            MemSize::mib(512)
        } else {
            MemSize::mib(256)
        };

        let (metaspace_size, max_metaspace_size, max_direct_memory) = match heap_gb {
            gb if gb >= 36 => (MemSize::mib(512), MemSize::gib(2), MemSize::gib(4)),
            gb if gb >= 24 => (MemSize::mib(512), MemSize::mib(1536), MemSize::gib(3)),
            gb if gb >= 16 => (MemSize::mib(256), MemSize::gib(1), MemSize::gib(2)),
            _ => (MemSize::mib(256), MemSize::mib(512), MemSize::gib(1)),
        };

        Self {
            heap_gb,
            cpu_count,
            conc_gc_threads: (cpu_count / 4).clamp(2, 16),
            parallel_gc_threads: (cpu_count / 2).clamp(2, 32),
            code_cache,
            metaspace_size,
            max_metaspace_size,
            max_direct_memory,
            collector: Collector::for_heap(heap_gb),
            use_numa: heap_gb >= 32 && cpu_count >= 16,
            always_pre_touch: heap_gb <= COMPRESSED_OOPS_MAX_HEAP_GB,
            aggressive_tiered_compilation: cpu_count >= 8,
            compressed_oops: heap_gb <= COMPRESSED_OOPS_MAX_HEAP_GB,
            aggressive_opts: heap_gb >= 16,
        }
    }

    /// Heap plus the direct memory and metaspace ceilings, in GB.
    pub fn estimated_total_gb(&self) -> u32 {
        self.heap_gb
            .saturating_add(self.max_direct_memory.rounded_gb())
            .saturating_add(self.max_metaspace_size.rounded_gb())
    }

    /// Warnings about the expected footprint versus the container's memory limit.
    pub fn memory_warnings(&self, container_limit_gb: Option<i64>) -> Vec<String> {
        let mut warnings = Vec::new();
        let total = self.estimated_total_gb();
        if total > HIGH_MEMORY_WARNING_GB {
            warnings.push(format!(
                "Total estimated memory usage ({total}GB) is high. Make sure the container has enough memory allocated."
            ));
        }
        if let Some(limit_gb) = container_limit_gb {
            let recommended = i64::from(total) + i64::from(CONTAINER_HEADROOM_GB);
            if limit_gb < recommended {
                warnings.push(format!(
                    "Container memory limit ({limit_gb}GB) may be too low for estimated usage ({total}GB). Recommended: at least {recommended}GB, e.g. docker run --memory={recommended}g ..."
                ));
            }
        }
        warnings
    }

    /// The complete JVM option list, one option per element.
    pub fn flags(&self, data_dir: &Path) -> Vec<String> {
        let mut flags = vec![
            format!("-XX:ReservedCodeCacheSize={}", self.code_cache),
            format!("-XX:MetaspaceSize={}", self.metaspace_size),
            format!("-XX:MaxMetaspaceSize={}", self.max_metaspace_size),
            format!("-XX:MaxDirectMemorySize={}", self.max_direct_memory),
            "-XX:+HeapDumpOnOutOfMemoryError".to_string(),
        ];

        match self.collector {
            Collector::G1 {
                region_size,
                max_pause_millis,
                initiating_heap_occupancy_percent,
            } => {
                flags.extend([
                    format!(
                        "-XX:HeapDumpPath={}",
                        data_dir.join("heap_dump.hprof").display()
                    ),
                    "-XX:+PrintGCDetails".to_string(),
                    "-XX:+PrintGCDateStamps".to_string(),
                    "-XX:+PrintGCApplicationStoppedTime".to_string(),
                    format!("-Xloggc:{}", data_dir.join("gc.log").display()),
                    "-XX:+UseG1GC".to_string(),
                    format!("-XX:MaxGCPauseMillis={max_pause_millis}"),
                    format!("-XX:G1HeapRegionSize={region_size}"),
                    format!("-XX:InitiatingHeapOccupancyPercent={initiating_heap_occupancy_percent}"),
                    format!("-XX:ConcGCThreads={}", self.conc_gc_threads),
                    format!("-XX:ParallelGCThreads={}", self.parallel_gc_threads),
                    "-XX:+ParallelRefProcEnabled".to_string(),
                    "-XX:+UseStringDeduplication".to_string(),
                    "-XX:+DisableExplicitGC".to_string(),
                ]);
            }
            Collector::ConcMarkSweep => {
                flags.extend([
                    "-XX:+PrintGCDetails".to_string(),
                    "-XX:+PrintGCDateStamps".to_string(),
                    "-XX:+UseConcMarkSweepGC".to_string(),
                    "-XX:NewRatio=2".to_string(),
                    "-XX:+CMSScavengeBeforeRemark".to_string(),
                    "-XX:+ParallelRefProcEnabled".to_string(),
                    "-XX:+UseCMSInitiatingOccupancyOnly".to_string(),
                    "-XX:CMSInitiatingOccupancyFraction=70".to_string(),
                    format!("-XX:ParallelGCThreads={}", self.parallel_gc_threads),
                ]);
            }
        }

        flags.push(format!("-Xms{}G", self.heap_gb));
        flags.push(format!("-Xmx{}G", self.heap_gb));
        flags.push(toggle("AlwaysPreTouch", self.always_pre_touch));
        flags.push(toggle("UseNUMA", self.use_numa));
        flags.push("-XX:+TieredCompilation".to_string());
        if self.aggressive_tiered_compilation {
            flags.push("-XX:TieredStopAtLevel=4".to_string());
            flags.push("-XX:CompileThreshold=10000".to_string());
        }
        flags.push(toggle("UseCompressedOops", self.compressed_oops));
        flags.push(toggle("UseCompressedClassPointers", self.compressed_oops));
        if self.aggressive_opts {
            flags.push("-XX:+AggressiveOpts".to_string());
        }
        flags
    }
}

fn toggle(option: &str, enabled: bool) -> String {
    let sign = if enabled { '+' } else { '-' };
    format!("-XX:{sign}{option}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;
    use std::path::PathBuf;

    fn data_dir() -> PathBuf {
        PathBuf::from("/data")
    }

    #[test]
    fn test_mem_size_display() {
        assert_eq!(MemSize::gib(4).to_string(), "4G");
        assert_eq!(MemSize::mib(512).to_string(), "512m");
        assert_eq!(MemSize::mib(1536).to_string(), "1536m");
        assert_eq!(MemSize::mib(1536).rounded_gb(), 2);
        assert_eq!(MemSize::mib(512).rounded_gb(), 1);
        assert_eq!(MemSize::mib(256).rounded_gb(), 0);
    }

    #[test]
    fn test_resolve_heap() {
        assert_eq!(
            resolve_heap_gb(Some(10), 64, Network::Mainnet),
            (10, HeapSource::Override)
        );
        assert_eq!(
            resolve_heap_gb(None, 64, Network::Mainnet),
            (32, HeapSource::Calculated)
        );
        assert_eq!(
            resolve_heap_gb(Some(0), -1, Network::Mainnet),
            (30, HeapSource::NetworkDefault)
        );
        assert_eq!(
            resolve_heap_gb(None, -1, Network::Nile),
            (6, HeapSource::NetworkDefault)
        );
    }

    #[duplicate_item(
        test_name               heap    cpu     conc    parallel    reserved_code   max_meta            direct;
        [test_derive_small]     [4]     [2]     [2]     [2]         [mib(256)]      [mib(512)]          [gib(1)];
        [test_derive_medium]    [16]    [8]     [2]     [4]         [mib(512)]      [gib(1)]            [gib(2)];
        [test_derive_large]     [24]    [16]    [4]     [8]         [mib(512)]      [mib(1536)]         [gib(3)];
        [test_derive_huge]      [48]    [128]   [16]    [32]        [mib(768)]      [gib(2)]            [gib(4)];
    )]
    #[test]
    fn test_name() {
        let tuning = JvmTuning::derive(heap, cpu);
        assert_eq!(tuning.conc_gc_threads, conc);
        assert_eq!(tuning.parallel_gc_threads, parallel);
        assert_eq!(tuning.code_cache, MemSize::reserved_code);
        assert_eq!(tuning.max_metaspace_size, MemSize::max_meta);
        assert_eq!(tuning.max_direct_memory, MemSize::direct);
    }

    #[test]
    fn test_small_heap_uses_cms() {
        let tuning = JvmTuning::derive(6, 4);
        assert_eq!(tuning.collector, Collector::ConcMarkSweep);
        let flags = tuning.flags(&data_dir());
        assert!(flags.contains(&"-XX:+UseConcMarkSweepGC".to_string()));
        assert!(!flags.iter().any(|f| f == "-XX:+UseG1GC"));
        assert!(flags.contains(&"-Xms6G".to_string()));
        assert!(flags.contains(&"-Xmx6G".to_string()));
    }

    #[test]
    fn test_g1_settings_by_heap() {
        assert_eq!(
            JvmTuning::derive(8, 4).collector,
            Collector::G1 {
                region_size: MemSize::mib(4),
                max_pause_millis: 100,
                initiating_heap_occupancy_percent: 50,
            }
        );
        assert_eq!(
            JvmTuning::derive(32, 4).collector,
            Collector::G1 {
                region_size: MemSize::mib(16),
                max_pause_millis: 250,
                initiating_heap_occupancy_percent: 40,
            }
        );
    }

    #[test]
    fn test_g1_flags_for_mainnet_sized_node() {
        let flags = JvmTuning::derive(32, 16).flags(&data_dir());
        for expected in [
            "-XX:+UseG1GC",
            "-XX:G1HeapRegionSize=16m",
            "-XX:MaxGCPauseMillis=250",
            "-XX:HeapDumpPath=/data/heap_dump.hprof",
            "-Xloggc:/data/gc.log",
            "-XX:+AlwaysPreTouch",
            "-XX:+UseNUMA",
            "-XX:TieredStopAtLevel=4",
            "-XX:+UseCompressedOops",
            "-XX:+AggressiveOpts",
        ] {
            assert!(flags.contains(&expected.to_string()), "missing {expected}");
        }
        assert!(flags.iter().all(|flag| !flag.contains(char::is_whitespace)));
    }

    #[test]
    fn test_large_heap_disables_compressed_oops_and_pre_touch() {
        let flags = JvmTuning::derive(40, 4).flags(&data_dir());
        assert!(flags.contains(&"-XX:-UseCompressedOops".to_string()));
        assert!(flags.contains(&"-XX:-UseCompressedClassPointers".to_string()));
        assert!(flags.contains(&"-XX:-AlwaysPreTouch".to_string()));
        assert!(flags.contains(&"-XX:-UseNUMA".to_string()));
    }

    #[test]
    fn test_estimated_total_and_warnings() {
        let tuning = JvmTuning::derive(32, 8);
        // 32 heap + 3G direct + 1536m metaspace (rounds to 2)
        assert_eq!(tuning.estimated_total_gb(), 37);

        let warnings = tuning.memory_warnings(Some(40));
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("--memory=41g"));

        assert_eq!(tuning.memory_warnings(None).len(), 1);
        assert!(JvmTuning::derive(6, 2).memory_warnings(Some(16)).is_empty());
    }
}
