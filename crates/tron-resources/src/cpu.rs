// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tracing::{debug, info};

/// Returns the number of CPUs the node should be tuned for.
///
/// A positive override wins. Otherwise the host's logical CPU count is used, which
/// `num_cpus` already narrows to the process's affinity mask.
pub fn detect_cpu_count(cpu_override: Option<i64>) -> u32 {
    if let Some(count) = cpu_override.filter(|count| *count > 0) {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        info!("Using SYSTEM_CPU_COUNT from environment: {count}");
        return count;
    }

    let host_cpu_count = num_cpus::get().max(1);
    debug!("Detected host CPU count: {host_cpu_count}");
    u32::try_from(host_cpu_count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_is_used() {
        assert_eq!(detect_cpu_count(Some(12)), 12);
    }

    #[test]
    fn test_non_positive_override_falls_back_to_host() {
        let host = detect_cpu_count(None);
        assert!(host >= 1);
        assert_eq!(detect_cpu_count(Some(0)), host);
        assert_eq!(detect_cpu_count(Some(-4)), host);
    }

    #[test]
    fn test_huge_override_saturates() {
        assert_eq!(detect_cpu_count(Some(i64::MAX)), u32::MAX);
    }
}
