// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

pub const STDOUT_BUFFER_BYTES: usize = 1024 * 1024;
pub const STDERR_BUFFER_BYTES: usize = 512 * 1024;

/// The most recent lines of one output stream, bounded by a byte budget.
///
/// Every line costs its length plus one byte for the terminator. When a new line does
/// not fit, the oldest lines are evicted until it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    used_bytes: usize,
    budget: usize,
    evicted: usize,
}

impl OutputBuffer {
    pub fn new(budget: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            used_bytes: 0,
            budget,
            evicted: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.budget == 0 {
            self.evicted += 1;
            return;
        }

        let line = keep_tail(line, self.budget - 1);
        let cost = line.len() + 1;
        while self.used_bytes + cost > self.budget {
            match self.lines.pop_front() {
                Some(oldest) => {
                    self.used_bytes -= oldest.len() + 1;
                    self.evicted += 1;
                }
                None => break,
            }
        }
        self.used_bytes += cost;
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Lines dropped to stay within the budget.
    pub fn evicted(&self) -> usize {
        self.evicted
    }
}

/// Truncates `line` to at most `max_bytes` trailing bytes, on a char boundary.
fn keep_tail(line: String, max_bytes: usize) -> String {
    if line.len() <= max_bytes {
        return line;
    }
    let mut start = line.len() - max_bytes;
    while !line.is_char_boundary(start) {
        start += 1;
    }
    line[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keeps_lines_in_order() {
        let mut buffer = OutputBuffer::new(64);
        buffer.push("first".to_string());
        buffer.push("second".to_string());
        assert_eq!(buffer.lines().collect::<Vec<_>>(), ["first", "second"]);
        assert_eq!(buffer.used_bytes(), 13);
        assert_eq!(buffer.evicted(), 0);
    }

    #[test]
    fn test_evicts_oldest_first() {
        // Each line costs 4 bytes, so 3 fit in 12.
        let mut buffer = OutputBuffer::new(12);
        for line in ["aaa", "bbb", "ccc", "ddd"] {
            buffer.push(line.to_string());
        }
        assert_eq!(buffer.lines().collect::<Vec<_>>(), ["bbb", "ccc", "ddd"]);
        assert_eq!(buffer.evicted(), 1);
        assert_eq!(buffer.used_bytes(), 12);
    }

    #[test]
    fn test_oversized_line_keeps_its_tail() {
        let mut buffer = OutputBuffer::new(8);
        buffer.push("old".to_string());
        buffer.push("0123456789abcdef".to_string());
        assert_eq!(buffer.lines().collect::<Vec<_>>(), ["9abcdef"]);
        assert_eq!(buffer.used_bytes(), 8);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut buffer = OutputBuffer::new(4);
        // Three 2-byte chars: the 3-byte tail would split one, so only 2 bytes remain.
        buffer.push("ééé".to_string());
        assert_eq!(buffer.lines().collect::<Vec<_>>(), ["é"]);
    }

    #[test]
    fn test_zero_budget_keeps_nothing() {
        let mut buffer = OutputBuffer::new(0);
        buffer.push("line".to_string());
        assert!(buffer.is_empty());
        assert_eq!(buffer.evicted(), 1);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_budget(
            budget in 1usize..256,
            lines in proptest::collection::vec(".{0,64}", 0..64),
        ) {
            let mut buffer = OutputBuffer::new(budget);
            for line in &lines {
                buffer.push(line.clone());
                prop_assert!(buffer.used_bytes() <= budget);
            }
            let total: usize = buffer.lines().map(|l| l.len() + 1).sum();
            prop_assert_eq!(total, buffer.used_bytes());
            if let Some(last) = lines.last() {
                // The newest line is always retained, possibly truncated.
                let kept = buffer.lines().last().unwrap_or_default();
                prop_assert!(last.ends_with(kept));
            }
        }
    }
}
