use std::collections::VecDeque;

/// A byte- and line-bounded accumulator that keeps the *end* of a stream
/// rather than the beginning, since the last lines of a failing command are
/// almost always the useful ones. Evicts from the front as new bytes arrive
/// past either cap, and always yields valid UTF-8 by trimming any partial
/// multi-byte sequence left dangling at the front after an eviction.
#[derive(Debug)]
pub struct TailBuffer {
    cap_bytes: usize,
    cap_lines: usize,
    data: VecDeque<u8>,
    truncated: bool,
}

impl TailBuffer {
    pub fn new(cap_bytes: usize, cap_lines: usize) -> Self {
        TailBuffer { cap_bytes: cap_bytes.max(1), cap_lines: cap_lines.max(1), data: VecDeque::new(), truncated: false }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.data.extend(chunk.iter().copied());

        while self.data.len() > self.cap_bytes {
            self.data.pop_front();
            self.truncated = true;
        }

        let mut newline_count = self.data.iter().filter(|&&b| b == b'\n').count();
        while newline_count >= self.cap_lines {
            match self.data.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.data.drain(..=pos);
                    self.truncated = true;
                    newline_count -= 1;
                }
                None => break,
            }
        }
    }

    /// Consumes the buffer, returning the retained text and whether anything
    /// was dropped to stay within the caps.
    pub fn finish(self) -> (String, bool) {
        let bytes: Vec<u8> = self.data.into_iter().collect();
        (trim_to_utf8_boundary(&bytes), self.truncated)
    }
}

fn trim_to_utf8_boundary(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned(),
    }
}
