// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Container memory limits from the cgroup filesystem.
//!
//! Two layouts are understood:
//!
//! - cgroup v1: `memory/memory.limit_in_bytes` holds a byte count. An unset limit is
//!   reported as `PAGE_COUNTER_MAX` rounded down to the page size, e.g.
//!   `9223372036854771712` on 4 KiB pages.
//! - cgroup v2: `memory.max` holds a byte count or the literal `max`.

use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Any limit at or above this value is the kernel's "no limit" sentinel, not a real
/// container size.
pub const UNLIMITED_THRESHOLD_BYTES: u64 = 1 << 62;

const UNLIMITED_V2_LITERAL: &str = "max";

/// A memory limit read from a cgroup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupLimit {
    Bytes(u64),
    Unlimited,
}

/// Reads and parses a cgroup memory limit file (v1 or v2 layout).
pub fn read_memory_limit(path: &Path) -> Result<CgroupLimit, io::Error> {
    let contents = fs::read_to_string(path)?;
    debug!("Contents of {}: {}", path.display(), contents.trim());
    parse_memory_limit(&contents).map_err(|reason| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {reason}", path.display()),
        )
    })
}

/// Parses the contents of a cgroup memory limit file.
pub fn parse_memory_limit(contents: &str) -> Result<CgroupLimit, String> {
    let value = contents.trim();
    if value.is_empty() {
        return Err("file is empty".to_string());
    }
    if value == UNLIMITED_V2_LITERAL {
        return Ok(CgroupLimit::Unlimited);
    }

    let bytes = value
        .parse::<u64>()
        .map_err(|e| format!("failed to parse memory limit {value:?}: {e}"))?;
    if bytes == 0 {
        return Err("memory limit is zero".to_string());
    }
    if bytes >= UNLIMITED_THRESHOLD_BYTES {
        return Ok(CgroupLimit::Unlimited);
    }
    Ok(CgroupLimit::Bytes(bytes))
}
