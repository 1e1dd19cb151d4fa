// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Node tuning derived from the CPU count and memory size.
//!
//! Every function here is pure and total. Memory is in whole gigabytes and any value
//! `<= 0` means "unknown", which selects the documented fallback rather than feeding
//! the formula. Continuous formulas are clamped to fixed floors and ceilings; the
//! storage settings are tier tables keyed on memory size.

use crate::config::Network;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Share of memory given to the Java heap. The rest is left for metaspace, direct
/// buffers, the storage engine's off-heap caches and the OS.
pub const HEAP_MEMORY_FRACTION: f64 = 0.65;
pub const MAINNET_MIN_HEAP_GB: u32 = 8;
pub const MAINNET_MAX_HEAP_GB: u32 = 32;
pub const TESTNET_MIN_HEAP_GB: u32 = 4;
pub const TESTNET_MAX_HEAP_GB: u32 = 12;
/// Heap used when memory could not be detected.
pub const MAINNET_DEFAULT_HEAP_GB: u32 = 30;
pub const TESTNET_DEFAULT_HEAP_GB: u32 = 6;

pub const MAX_RPC_THREADS: u32 = 32;

pub const CONNECTIONS_PER_GB: i64 = 5;
pub const MIN_CONNECTIONS: u32 = 100;
pub const MAX_CONNECTIONS: u32 = 1000;
/// Per-address connection cap, as a divisor of the total cap (5%).
pub const SAME_IP_CONNECTION_DIVISOR: u32 = 20;
pub const MIN_CONNECTIONS_WITH_SAME_IP: u32 = 5;

pub const HTTP_CONNECTIONS_PER_GB: i64 = 3;
pub const MIN_HTTP_CONNECTIONS: u32 = 50;
pub const MAX_HTTP_CONNECTIONS: u32 = 500;

pub const DEFAULT_STORAGE_CACHE_SIZE: u64 = 512 * MIB;
pub const DEFAULT_STORAGE_WRITE_BUFFER_SIZE: u64 = 64 * MIB;
pub const DEFAULT_MAX_OPEN_FILES: u32 = 50_000;

pub const MIN_DB_COMPACT_THREADS: u32 = 2;

pub const QPS_PER_CORE: u64 = 2000;
pub const MAX_GLOBAL_QPS: u32 = 50_000;
/// Per-address QPS, as a divisor of the global QPS (20%).
pub const IP_QPS_DIVISOR: u32 = 5;

pub const RPC_CALLS_PER_CORE: u32 = 4;
pub const MAX_RPC_CONCURRENT_CALLS: u32 = 50;

/// Memory tier above which the larger RPC window, message and header limits apply.
pub const LARGE_MEMORY_TIER_GB: i64 = 64;

/// Smallest heap allowed on `network`.
pub fn min_heap_gb(network: Network) -> u32 {
    match network {
        Network::Mainnet => MAINNET_MIN_HEAP_GB,
        Network::Nile => TESTNET_MIN_HEAP_GB,
    }
}

/// Largest heap allowed on `network`.
pub fn max_heap_gb(network: Network) -> u32 {
    match network {
        Network::Mainnet => MAINNET_MAX_HEAP_GB,
        Network::Nile => TESTNET_MAX_HEAP_GB,
    }
}

/// Heap used on `network` when memory is unknown.
pub fn default_heap_gb(network: Network) -> u32 {
    match network {
        Network::Mainnet => MAINNET_DEFAULT_HEAP_GB,
        Network::Nile => TESTNET_DEFAULT_HEAP_GB,
    }
}

/// `memory_gb × 0.65`, truncated and clamped to the network's heap range.
///
/// Returns `None` when memory is unknown; the caller then uses
/// [`default_heap_gb`].
pub fn heap_size_gb(memory_gb: i64, network: Network) -> Option<u32> {
    if memory_gb <= 0 {
        return None;
    }
    let calculated = (memory_gb as f64 * HEAP_MEMORY_FRACTION) as i64;
    let min = min_heap_gb(network);
    let max = max_heap_gb(network);
    Some(calculated.clamp(i64::from(min), i64::from(max)) as u32)
}

pub fn rpc_thread_count(cpu_count: u32) -> u32 {
    cpu_count.clamp(1, MAX_RPC_THREADS)
}

pub fn max_connections(memory_gb: i64) -> u32 {
    if memory_gb <= 0 {
        return MIN_CONNECTIONS;
    }
    clamp_scaled(memory_gb, CONNECTIONS_PER_GB, MIN_CONNECTIONS, MAX_CONNECTIONS)
}

pub fn max_http_connections(memory_gb: i64) -> u32 {
    if memory_gb <= 0 {
        return MIN_HTTP_CONNECTIONS;
    }
    clamp_scaled(
        memory_gb,
        HTTP_CONNECTIONS_PER_GB,
        MIN_HTTP_CONNECTIONS,
        MAX_HTTP_CONNECTIONS,
    )
}

pub fn max_connections_with_same_ip(max_connections: u32) -> u32 {
    (max_connections / SAME_IP_CONNECTION_DIVISOR).max(MIN_CONNECTIONS_WITH_SAME_IP)
}

/// Storage engine block cache, in bytes.
pub fn storage_cache_size(memory_gb: i64) -> u64 {
    match memory_gb {
        gb if gb <= 0 => DEFAULT_STORAGE_CACHE_SIZE,
        gb if gb >= 64 => 2 * GIB,
        gb if gb >= 50 => GIB,
        gb if gb >= 32 => 512 * MIB,
        gb if gb >= 16 => 256 * MIB,
        _ => 128 * MIB,
    }
}

/// Storage engine write buffer, in bytes.
pub fn storage_write_buffer_size(memory_gb: i64) -> u64 {
    match memory_gb {
        gb if gb <= 0 => DEFAULT_STORAGE_WRITE_BUFFER_SIZE,
        gb if gb >= 50 => 128 * MIB,
        gb if gb >= 32 => 64 * MIB,
        _ => 32 * MIB,
    }
}

pub fn max_open_files(memory_gb: i64) -> u32 {
    match memory_gb {
        gb if gb <= 0 => DEFAULT_MAX_OPEN_FILES,
        gb if gb >= 64 => 100_000,
        gb if gb >= 32 => 50_000,
        _ => 25_000,
    }
}

pub fn db_compact_threads(cpu_count: u32) -> u32 {
    (cpu_count / 2).max(MIN_DB_COMPACT_THREADS)
}

/// Level-1 size target, in MB. Also used as the target file size base.
pub fn db_max_bytes_for_level_base(memory_gb: i64) -> u32 {
    match memory_gb {
        gb if gb >= 64 => 512,
        gb if gb >= 32 => 256,
        _ => 128,
    }
}

/// Extra QPS headroom granted to large-memory hosts.
pub fn qps_memory_multiplier(memory_gb: i64) -> f64 {
    match memory_gb {
        gb if gb >= 64 => 1.3,
        gb if gb >= 32 => 1.2,
        _ => 1.0,
    }
}

pub fn global_qps(cpu_count: u32, memory_gb: i64) -> u32 {
    let base = u64::from(cpu_count.max(1)).saturating_mul(QPS_PER_CORE);
    let scaled = (base as f64 * qps_memory_multiplier(memory_gb)) as u64;
    scaled.min(u64::from(MAX_GLOBAL_QPS)) as u32
}

pub fn global_ip_qps(global_qps: u32) -> u32 {
    global_qps / IP_QPS_DIVISOR
}

pub fn rpc_max_concurrent_calls(cpu_count: u32) -> u32 {
    cpu_count
        .max(1)
        .saturating_mul(RPC_CALLS_PER_CORE)
        .min(MAX_RPC_CONCURRENT_CALLS)
}

/// gRPC flow control window, in bytes.
pub fn rpc_flow_control_window(memory_gb: i64) -> u32 {
    if memory_gb >= LARGE_MEMORY_TIER_GB {
        2 * 1024 * 1024
    } else {
        1024 * 1024
    }
}

/// gRPC inbound message cap, in bytes.
pub fn rpc_max_message_size(memory_gb: i64) -> u32 {
    if memory_gb >= LARGE_MEMORY_TIER_GB {
        8 * 1024 * 1024
    } else {
        4 * 1024 * 1024
    }
}

/// gRPC header list cap, in bytes.
pub fn rpc_max_header_list_size(memory_gb: i64) -> u32 {
    if memory_gb >= LARGE_MEMORY_TIER_GB {
        16384
    } else {
        8192
    }
}

fn clamp_scaled(memory_gb: i64, per_gb: i64, min: u32, max: u32) -> u32 {
    memory_gb
        .saturating_mul(per_gb)
        .clamp(i64::from(min), i64::from(max)) as u32
}

/// Every value written into the node config's tuning placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTuning {
    pub rpc_thread_count: u32,
    pub rpc_max_concurrent_calls: u32,
    pub rpc_flow_control_window: u32,
    pub rpc_max_message_size: u32,
    pub rpc_max_header_list_size: u32,
    pub max_connections: u32,
    pub max_connections_with_same_ip: u32,
    pub max_http_connections: u32,
    pub storage_cache_size: u64,
    pub storage_write_buffer_size: u64,
    pub max_open_files: u32,
    pub max_open_files_m: u32,
    pub max_open_files_l: u32,
    pub db_compact_threads: u32,
    pub db_max_bytes_for_level_base: u32,
    pub db_target_file_size_base: u32,
    pub global_qps: u32,
    pub global_ip_qps: u32,
}

impl NodeTuning {
    pub fn derive(cpu_count: u32, memory_gb: i64) -> Self {
        let max_connections = max_connections(memory_gb);
        let max_open_files = max_open_files(memory_gb);
        let db_max_bytes_for_level_base = db_max_bytes_for_level_base(memory_gb);
        let global_qps = global_qps(cpu_count, memory_gb);
        Self {
            rpc_thread_count: rpc_thread_count(cpu_count),
            rpc_max_concurrent_calls: rpc_max_concurrent_calls(cpu_count),
            rpc_flow_control_window: rpc_flow_control_window(memory_gb),
            rpc_max_message_size: rpc_max_message_size(memory_gb),
            rpc_max_header_list_size: rpc_max_header_list_size(memory_gb),
            max_connections,
            max_connections_with_same_ip: max_connections_with_same_ip(max_connections),
            max_http_connections: max_http_connections(memory_gb),
            storage_cache_size: storage_cache_size(memory_gb),
            storage_write_buffer_size: storage_write_buffer_size(memory_gb),
            max_open_files,
            max_open_files_m: max_open_files + max_open_files / 2,
            max_open_files_l: max_open_files * 2,
            db_compact_threads: db_compact_threads(cpu_count),
            db_max_bytes_for_level_base,
            db_target_file_size_base: db_max_bytes_for_level_base,
            global_qps,
            global_ip_qps: global_ip_qps(global_qps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;
    use proptest::prelude::*;

    #[test]
    fn test_heap_examples() {
        assert_eq!(heap_size_gb(100, Network::Mainnet), Some(MAINNET_MAX_HEAP_GB));
        assert_eq!(heap_size_gb(50, Network::Mainnet), Some(32));
        assert_eq!(heap_size_gb(32, Network::Mainnet), Some(20));
        assert_eq!(heap_size_gb(8, Network::Mainnet), Some(8));
        assert_eq!(heap_size_gb(8, Network::Nile), Some(5));
        assert_eq!(heap_size_gb(2, Network::Nile), Some(TESTNET_MIN_HEAP_GB));
        assert_eq!(heap_size_gb(64, Network::Nile), Some(TESTNET_MAX_HEAP_GB));
    }

    #[test]
    fn test_heap_unknown_memory() {
        assert_eq!(heap_size_gb(0, Network::Mainnet), None);
        assert_eq!(heap_size_gb(-1, Network::Nile), None);
        assert_eq!(default_heap_gb(Network::Mainnet), 30);
        assert_eq!(default_heap_gb(Network::Nile), 6);
    }

    #[test]
    fn test_unknown_memory_fallbacks() {
        for memory_gb in [0, -1, i64::MIN] {
            assert_eq!(max_connections(memory_gb), 100);
            assert_eq!(max_http_connections(memory_gb), 50);
            assert_eq!(storage_cache_size(memory_gb), 512 * MIB);
            assert_eq!(storage_write_buffer_size(memory_gb), 64 * MIB);
            assert_eq!(max_open_files(memory_gb), 50_000);
            assert_eq!(db_max_bytes_for_level_base(memory_gb), 128);
            assert_eq!(global_qps(4, memory_gb), 8000);
        }
    }

    #[duplicate_item(
        test_name                       memory_gb   cache           write_buffer    open_files;
        [test_tier_small]               [8]         [128 * MIB]     [32 * MIB]      [25_000];
        [test_tier_16]                  [16]        [256 * MIB]     [32 * MIB]      [25_000];
        [test_tier_32]                  [32]        [512 * MIB]     [64 * MIB]      [50_000];
        [test_tier_50]                  [50]        [GIB]           [128 * MIB]     [50_000];
        [test_tier_64]                  [64]        [2 * GIB]       [128 * MIB]     [100_000];
        [test_tier_huge]                [4096]      [2 * GIB]       [128 * MIB]     [100_000];
    )]
    #[test]
    fn test_name() {
        assert_eq!(storage_cache_size(memory_gb), cache);
        assert_eq!(storage_write_buffer_size(memory_gb), write_buffer);
        assert_eq!(max_open_files(memory_gb), open_files);
    }

    #[test]
    fn test_connections() {
        assert_eq!(max_connections(10), 100);
        assert_eq!(max_connections(50), 250);
        assert_eq!(max_connections(500), 1000);
        assert_eq!(max_http_connections(50), 150);
        assert_eq!(max_connections_with_same_ip(100), 5);
        assert_eq!(max_connections_with_same_ip(1000), 50);
    }

    #[test]
    fn test_qps() {
        assert_eq!(global_qps(8, 16), 16_000);
        assert_eq!(global_qps(8, 32), 19_200);
        assert_eq!(global_qps(8, 64), 20_800);
        assert_eq!(global_qps(64, 128), MAX_GLOBAL_QPS);
        assert_eq!(global_ip_qps(20_000), 4_000);
    }

    #[test]
    fn test_cpu_derived() {
        assert_eq!(rpc_thread_count(1), 1);
        assert_eq!(rpc_thread_count(96), 32);
        assert_eq!(db_compact_threads(1), 2);
        assert_eq!(db_compact_threads(16), 8);
        assert_eq!(rpc_max_concurrent_calls(4), 16);
        assert_eq!(rpc_max_concurrent_calls(64), 50);
    }

    #[test]
    fn test_rpc_limits_by_tier() {
        assert_eq!(rpc_flow_control_window(63), 1_048_576);
        assert_eq!(rpc_flow_control_window(64), 2_097_152);
        assert_eq!(rpc_max_message_size(64), 8_388_608);
        assert_eq!(rpc_max_header_list_size(-1), 8192);
    }

    #[test]
    fn test_derive_node_tuning() {
        let tuning = NodeTuning::derive(16, 64);
        assert_eq!(tuning.max_open_files, 100_000);
        assert_eq!(tuning.max_open_files_m, 150_000);
        assert_eq!(tuning.max_open_files_l, 200_000);
        assert_eq!(tuning.db_target_file_size_base, 512);
        assert_eq!(tuning.max_connections, 320);
        assert_eq!(tuning.max_connections_with_same_ip, 16);
        assert_eq!(tuning.global_qps, 41_600);
        assert_eq!(tuning.global_ip_qps, 8_320);
    }

    proptest! {
        #[test]
        fn prop_heap_within_network_range(memory_gb in 1i64..=i64::MAX, mainnet in any::<bool>()) {
            let network = if mainnet { Network::Mainnet } else { Network::Nile };
            let heap = heap_size_gb(memory_gb, network).unwrap();
            prop_assert!(heap >= min_heap_gb(network));
            prop_assert!(heap <= max_heap_gb(network));
        }

        #[test]
        fn prop_heap_monotonic(a in 1i64..100_000, b in 1i64..100_000, mainnet in any::<bool>()) {
            let network = if mainnet { Network::Mainnet } else { Network::Nile };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(heap_size_gb(lo, network) <= heap_size_gb(hi, network));
        }

        #[test]
        fn prop_memory_calculators_bounded_and_monotonic(a in any::<i64>(), b in any::<i64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for memory_gb in [lo, hi] {
                let connections = max_connections(memory_gb);
                prop_assert!((MIN_CONNECTIONS..=MAX_CONNECTIONS).contains(&connections));
                let http = max_http_connections(memory_gb);
                prop_assert!((MIN_HTTP_CONNECTIONS..=MAX_HTTP_CONNECTIONS).contains(&http));
                prop_assert!(storage_cache_size(memory_gb) > 0);
                prop_assert!(storage_write_buffer_size(memory_gb) > 0);
                prop_assert!(max_open_files(memory_gb) > 0);
            }
            if lo > 0 {
                prop_assert!(max_connections(lo) <= max_connections(hi));
                prop_assert!(max_http_connections(lo) <= max_http_connections(hi));
                prop_assert!(storage_cache_size(lo) <= storage_cache_size(hi));
                prop_assert!(storage_write_buffer_size(lo) <= storage_write_buffer_size(hi));
                prop_assert!(max_open_files(lo) <= max_open_files(hi));
            }
            prop_assert!(db_max_bytes_for_level_base(lo) <= db_max_bytes_for_level_base(hi));
        }

        #[test]
        fn prop_cpu_calculators_bounded(cpu in any::<u32>(), memory_gb in any::<i64>()) {
            prop_assert!((1..=MAX_RPC_THREADS).contains(&rpc_thread_count(cpu)));
            prop_assert!(db_compact_threads(cpu) >= MIN_DB_COMPACT_THREADS);
            let qps = global_qps(cpu, memory_gb);
            prop_assert!(qps >= 2000 && qps <= MAX_GLOBAL_QPS);
            prop_assert!(global_ip_qps(qps) > 0);
            prop_assert!((1..=MAX_RPC_CONCURRENT_CALLS).contains(&rpc_max_concurrent_calls(cpu)));
        }

        #[test]
        fn prop_qps_monotonic_in_cpu(a in 1u32..10_000, b in 1u32..10_000, memory_gb in any::<i64>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(global_qps(lo, memory_gb) <= global_qps(hi, memory_gb));
        }
    }
}
