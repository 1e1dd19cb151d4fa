// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Total system memory from `/proc/meminfo`.

use std::fs;
use std::io;
use std::path::Path;

const MEM_TOTAL_PREFIX: &str = "MemTotal:";

/// Reads the `MemTotal` value, in kB, from a meminfo file.
pub fn read_mem_total_kb(path: &Path) -> Result<u64, io::Error> {
    let contents = fs::read_to_string(path)?;
    parse_mem_total_kb(&contents).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("No parseable {MEM_TOTAL_PREFIX} line in {}", path.display()),
        )
    })
}

/// Finds the `MemTotal:` line and returns its numeric field.
///
/// Only the first `MemTotal:` line is considered, as the kernel never writes two.
pub fn parse_mem_total_kb(contents: &str) -> Option<u64> {
    let line = contents
        .lines()
        .find(|line| line.starts_with(MEM_TOTAL_PREFIX))?;
    line.split_whitespace().nth(1)?.parse::<u64>().ok()
}
