//! Line sanitizer
//!
//! Normalizes the raw pseudo-terminal byte stream into plain text lines for
//! pattern matching. Cursor-right escapes become runs of spaces (the monitor
//! uses them to column-align its fixed-width status dumps); every other
//! escape sequence and control byte is stripped. The escape state survives
//! chunk boundaries, so sequences split across reads sanitize identically.

use regex::Regex;

/// Parser state for escape sequences that may span chunks.
#[derive(Debug, Clone)]
enum EscState {
    Plain,
    /// Saw ESC, waiting for the introducer byte.
    Esc,
    /// Inside a CSI sequence, collecting parameter bytes.
    Csi(String),
    /// Inside an OSC sequence, skipping until its terminator.
    Osc,
}

/// Accumulates sanitized text and emits complete lines.
///
/// Lines end at `\n` (a trailing `\r` is dropped). The interactive prompt
/// carries no newline, so a pending partial buffer that matches the prompt
/// pattern is flushed as a line of its own.
#[derive(Debug)]
pub struct LineAssembler {
    state: EscState,
    buf: String,
    prompt: Regex,
}

impl LineAssembler {
    pub fn new(prompt: Regex) -> Self {
        Self {
            state: EscState::Plain,
            buf: String::new(),
            prompt,
        }
    }

    /// Sanitize one raw chunk and return the complete lines it produced.
    pub fn push_chunk(&mut self, raw: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in raw {
            self.state = match std::mem::replace(&mut self.state, EscState::Plain) {
                EscState::Plain => match byte {
                    0x1b => EscState::Esc,
                    b'\n' => {
                        lines.push(std::mem::take(&mut self.buf));
                        EscState::Plain
                    }
                    b'\r' => EscState::Plain,
                    b'\t' => {
                        self.buf.push('\t');
                        EscState::Plain
                    }
                    0x00..=0x1f | 0x7f => EscState::Plain,
                    _ => {
                        self.buf.push(char::from(byte));
                        EscState::Plain
                    }
                },
                EscState::Esc => match byte {
                    b'[' => EscState::Csi(String::new()),
                    b']' => EscState::Osc,
                    _ => EscState::Plain,
                },
                EscState::Csi(mut params) => {
                    if (0x40..=0x7e).contains(&byte) {
                        if byte == b'C' {
                            let n = params.parse::<usize>().unwrap_or(1).max(1);
                            self.buf.extend(std::iter::repeat(' ').take(n));
                        }
                        EscState::Plain
                    } else {
                        params.push(char::from(byte));
                        EscState::Csi(params)
                    }
                }
                EscState::Osc => match byte {
                    0x07 => EscState::Plain,
                    0x1b => EscState::Esc,
                    _ => EscState::Osc,
                },
            };
        }
        if !self.buf.is_empty() && self.prompt.is_match(&self.buf) {
            lines.push(std::mem::take(&mut self.buf));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;

    fn assembler() -> LineAssembler {
        LineAssembler::new(wire::PROMPT.clone())
    }

    #[test]
    fn test_crlf_lines_split_cleanly() {
        let mut asm = assembler();
        let lines = asm.push_chunk(b"first\r\nsecond\r\n");
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_cursor_right_becomes_spaces() {
        let mut asm = assembler();
        let lines = asm.push_chunk(b"ACC=3F\x1b[4CB=00\r\n");
        assert_eq!(lines, vec!["ACC=3F    B=00"]);
    }

    #[test]
    fn test_other_escapes_and_controls_are_stripped() {
        let mut asm = assembler();
        let lines = asm.push_chunk(b"\x1b[2J\x1b[1;1H\x07ok\x1b]0;title\x07!\r\n");
        assert_eq!(lines, vec!["ok!"]);
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut asm = assembler();
        assert!(asm.push_chunk(b"A\x1b[").is_empty());
        assert!(asm.push_chunk(b"3").is_empty());
        let lines = asm.push_chunk(b"CB\r\n");
        assert_eq!(lines, vec!["A   B"]);
    }

    #[test]
    fn test_prompt_without_newline_is_flushed() {
        let mut asm = assembler();
        let lines = asm.push_chunk(b"done\r\n> ");
        assert_eq!(lines, vec!["done", "> "]);
        // The buffer is consumed; the following echo starts a fresh line.
        let lines = asm.push_chunk(b"regs\r\n");
        assert_eq!(lines, vec!["regs"]);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole_chunk() {
        let stream: &[u8] = b"ACC=3F\x1b[2CB=00\r\nStop at 0004\r\n";
        let mut whole = assembler();
        let expected = whole.push_chunk(stream);

        let mut split = assembler();
        let mut got = Vec::new();
        for byte in stream {
            got.extend(split.push_chunk(std::slice::from_ref(byte)));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_prompt_flush_is_chunking_insensitive() {
        // A byte-at-a-time prompt flushes as soon as it matches; the exact
        // text may differ from the whole-chunk flush, but both must satisfy
        // the prompt pattern and neither may leak into the next line.
        let mut split = assembler();
        let mut got = Vec::new();
        for byte in b"ok\r\n> " {
            got.extend(split.push_chunk(std::slice::from_ref(byte)));
        }
        assert_eq!(got[0], "ok");
        assert!(wire::PROMPT.is_match(&got[1]));
        let next = split.push_chunk(b"regs\r\n");
        assert!(next.iter().all(|l| !l.contains('>')));
    }
}
