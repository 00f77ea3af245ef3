//! Line-oriented cleanup for raw tabular text.
//!
//! Each line is cleaned independently:
//! 1. invalid UTF-8 sequences are dropped (not replaced)
//! 2. NUL characters are removed
//! 3. `\r\n`, `\r` and `\n` all terminate a line; output uses `\n` only
//! 4. lines that are empty or whitespace-only are dropped
//!
//! [`normalize`] is lazy: only one raw line is buffered at a time.

use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Lazily yields cleaned lines (without terminators) from a reader.
pub struct NormalizedLines<R> {
    reader: R,
    pending: VecDeque<String>,
    done: bool,
}

/// Stream `reader` through the normalizer.
pub fn normalize<R: BufRead>(reader: R) -> NormalizedLines<R> {
    NormalizedLines {
        reader,
        pending: VecDeque::new(),
        done: false,
    }
}

/// Normalize everything from `reader` into `\n`-terminated bytes.
pub fn normalize_to_vec<R: BufRead>(reader: R) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    for line in normalize(reader) {
        out.extend_from_slice(line?.as_bytes());
        out.push(b'\n');
    }
    Ok(out)
}

impl<R: BufRead> Iterator for NormalizedLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }

            let mut raw = Vec::new();
            match self.reader.read_until(b'\n', &mut raw) {
                Ok(0) => self.done = true,
                // A bare `\r` inside the chunk is a terminator too
                Ok(_) => self.pending.extend(
                    raw.split(|b| *b == b'\n' || *b == b'\r')
                        .filter_map(clean_line),
                ),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Clean a single raw line. `None` means the line is dropped.
pub fn clean_line(raw: &[u8]) -> Option<String> {
    let mut line = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        line.push_str(chunk.valid());
    }
    line.retain(|c| c != '\0');

    if line.trim().is_empty() {
        None
    } else {
        Some(line)
    }
}
