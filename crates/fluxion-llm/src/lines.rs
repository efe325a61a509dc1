//! Newline framing for streamed response bodies
//!
//! Network chunks can end in the middle of a multi-byte character, so bytes
//! are buffered raw and only complete lines are decoded.

/// Byte buffer that yields complete `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=pos).collect();
        Some(decode(&line[..pos]))
    }

    /// Whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.bytes);
        Some(decode(&rest))
    }
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // A complete line is only invalid when the server sent bad bytes.
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_split_across_chunks() {
        let line = "{\"response\":\"café\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::new();
        buffer.extend(&line[..split]);
        assert_eq!(buffer.next_line(), None);

        buffer.extend(&line[split..]);
        assert_eq!(buffer.next_line().as_deref(), Some("{\"response\":\"café\"}"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_multiple_lines_and_tail() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"one\ntwo\nthr");
        assert_eq!(buffer.next_line().as_deref(), Some("one"));
        assert_eq!(buffer.next_line().as_deref(), Some("two"));
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.finish().as_deref(), Some("thr"));
    }
}
