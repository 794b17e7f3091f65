// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Byte stream → line assembly.
//!
//! Subprocess output arrives in arbitrary chunks. Bytes are appended to
//! a carry buffer, split on `\n`, and the trailing partial fragment is
//! retained until the next chunk (or flushed at exit). Lines are
//! trimmed; carriage returns from PTY-attached agents disappear with
//! the trim.

use crate::ansi::AnsiStripper;

/// Incremental line assembler with optional ANSI stripping.
pub struct LineAssembler {
    carry: Vec<u8>,
    stripper: Option<AnsiStripper>,
}

impl LineAssembler {
    /// Assembler for clean pipe output.
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            stripper: None,
        }
    }

    /// Assembler for PTY output: escapes are stripped before splitting.
    pub fn stripping_ansi() -> Self {
        Self {
            carry: Vec::new(),
            stripper: Some(AnsiStripper::new()),
        }
    }

    /// Feed a chunk; returns every complete line it finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let cleaned = match &mut self.stripper {
            Some(stripper) => stripper.strip(bytes),
            None => bytes.to_vec(),
        };
        self.carry.extend_from_slice(&cleaned);

        let mut lines = Vec::new();
        while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.carry.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        lines
    }

    /// Flush the final partial line at stream end.
    pub fn flush(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.carry).trim().to_string();
        self.carry.clear();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "line_tests.rs"]
mod tests;
