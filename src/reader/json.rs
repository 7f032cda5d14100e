use std::io::{BufReader, Read};

use anyhow::{Context, Result};
use serde_json::Value;

use super::record::RawRecord;
use super::RecordDecoder;

/// Streaming decoder for whole-file JSON arrays.
///
/// Source files can be orders of magnitude larger than memory, so the
/// array is never parsed as one document. The decoder scans element
/// boundaries byte-by-byte (tracking brace depth and string state) and
/// parses one element at a time. A syntactically broken element becomes a
/// `Malformed` record; only I/O failures are real errors.
pub struct JsonArrayDecoder<R: Read> {
    reader: BufReader<R>,
    peeked: Option<u8>,
    started: bool,
    finished: bool,
    index: u64,
}

impl<R: Read> JsonArrayDecoder<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
            peeked: None,
            started: false,
            finished: false,
            index: 0,
        }
    }

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            let mut buf = [0u8; 1];
            let n = self
                .reader
                .read(&mut buf)
                .context("Failed to read source file")?;
            if n == 1 {
                self.peeked = Some(buf[0]);
            }
        }
        Ok(self.peeked)
    }

    fn consume_byte(&mut self) {
        self.peeked = None;
    }

    /// Skip whitespace, leaving the next significant byte peeked
    fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        loop {
            match self.peek_byte()? {
                Some(b) if b.is_ascii_whitespace() => self.consume_byte(),
                other => return Ok(other),
            }
        }
    }

    /// Capture the raw text of one array element.
    ///
    /// Ends at the `,` or `]` that follows the element (neither is
    /// consumed). Returns `None` on end of input mid-element.
    fn capture_element(&mut self) -> Result<Option<String>> {
        let mut out: Vec<u8> = Vec::new();
        let mut depth: u32 = 0;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let byte = match self.peek_byte()? {
                Some(b) => b,
                None => return Ok(None),
            };

            if in_string {
                out.push(byte);
                self.consume_byte();
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => {
                    in_string = true;
                    out.push(byte);
                    self.consume_byte();
                }
                b'{' | b'[' => {
                    depth += 1;
                    out.push(byte);
                    self.consume_byte();
                }
                b'}' | b']' if depth > 0 => {
                    depth -= 1;
                    out.push(byte);
                    self.consume_byte();
                    // A compound element ends at its closing brace
                    if depth == 0 {
                        break;
                    }
                }
                b',' | b']' if depth == 0 => break,
                _ => {
                    out.push(byte);
                    self.consume_byte();
                }
            }
        }

        Ok(Some(String::from_utf8_lossy(&out).into_owned()))
    }

    fn malformed(&mut self, error: impl Into<String>) -> RawRecord {
        let record = RawRecord::Malformed {
            index: self.index,
            error: error.into(),
        };
        self.index += 1;
        record
    }
}

impl<R: Read> RecordDecoder for JsonArrayDecoder<R> {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        if self.finished {
            return Ok(None);
        }

        if !self.started {
            match self.skip_whitespace()? {
                // Empty input is an empty dataset, not an error
                None => {
                    self.finished = true;
                    return Ok(None);
                }
                Some(b'[') => {
                    self.consume_byte();
                    self.started = true;
                }
                Some(other) => {
                    self.finished = true;
                    return Ok(Some(self.malformed(format!(
                        "expected JSON array, found '{}'",
                        other as char
                    ))));
                }
            }
        }

        match self.skip_whitespace()? {
            None => {
                self.finished = true;
                return Ok(Some(self.malformed("unexpected end of input")));
            }
            Some(b']') => {
                self.consume_byte();
                self.finished = true;
                return Ok(None);
            }
            Some(_) => {}
        }

        let text = match self.capture_element()? {
            Some(text) => text,
            None => {
                self.finished = true;
                return Ok(Some(self.malformed("unexpected end of input")));
            }
        };

        // Step past the separator so the next call starts on an element
        if let Some(b',') = self.skip_whitespace()? {
            self.consume_byte();
        }

        let record = match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                let record = RawRecord::Parsed {
                    index: self.index,
                    body,
                };
                self.index += 1;
                record
            }
            Err(e) => self.malformed(e.to_string()),
        };

        Ok(Some(record))
    }
}
