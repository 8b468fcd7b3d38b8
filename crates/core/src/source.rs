//! JSON-lines record source.
//!
//! Reads one JSON value per line from any `BufRead`. Blank lines are skipped.
//! A line that is not valid JSON (or not valid UTF-8) is yielded as
//! [`SourceRecord::Malformed`] so the build pass can count and skip it; only
//! genuine read failures surface as `Err`.

use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// One logical input record as seen by a build pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    /// A parsed structured record.
    Parsed { line: u64, value: Value },
    /// A line that could not be parsed.
    Malformed { line: u64, reason: String },
}

impl SourceRecord {
    /// 1-based position of the record in its source.
    pub fn line(&self) -> u64 {
        match self {
            SourceRecord::Parsed { line, .. } | SourceRecord::Malformed { line, .. } => *line,
        }
    }
}

/// Wraps in-memory values as a record stream, numbering them from 1.
pub fn from_values<I>(values: I) -> impl Iterator<Item = io::Result<SourceRecord>>
where
    I: IntoIterator<Item = Value>,
{
    values.into_iter().enumerate().map(|(i, value)| {
        Ok(SourceRecord::Parsed {
            line: i as u64 + 1,
            value,
        })
    })
}

/// Iterator over the records of a JSON-lines stream.
pub struct JsonLinesSource<R> {
    reader: R,
    line: u64,
    buf: Vec<u8>,
}

impl JsonLinesSource<BufReader<File>> {
    /// Opens a JSON-lines file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: Vec::with_capacity(512),
        }
    }

    /// Number of lines consumed so far, blank lines included.
    pub fn lines_read(&self) -> u64 {
        self.line
    }
}

impl<R: BufRead> Iterator for JsonLinesSource<R> {
    type Item = io::Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line += 1;
            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let line = self.line;
            let record = match serde_json::from_slice::<Value>(&self.buf) {
                Ok(value) => SourceRecord::Parsed { line, value },
                Err(e) => SourceRecord::Malformed {
                    line,
                    reason: e.to_string(),
                },
            };
            return Some(Ok(record));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_reads_lines_and_skips_blanks() {
        let input = "{\"id\": \"a\"}\n\n  \n{\"id\": \"b\"}";
        let records: Vec<SourceRecord> = JsonLinesSource::new(Cursor::new(input))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(
            records,
            vec![
                SourceRecord::Parsed {
                    line: 1,
                    value: json!({"id": "a"})
                },
                SourceRecord::Parsed {
                    line: 4,
                    value: json!({"id": "b"})
                },
            ]
        );
    }

    #[test]
    fn test_malformed_line_is_yielded_not_fatal() {
        let input = b"{\"id\": 1}\n{not json\n\xff\xfe\n{\"id\": 2}\n".to_vec();
        let records: Vec<SourceRecord> = JsonLinesSource::new(Cursor::new(input))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 4);
        assert!(matches!(records[1], SourceRecord::Malformed { line: 2, .. }));
        assert!(matches!(records[2], SourceRecord::Malformed { line: 3, .. }));
        assert_eq!(records[3].line(), 4);
    }

    #[test]
    fn test_crlf_line_endings() {
        let input = "{\"id\": \"a\"}\r\n{\"id\": \"b\"}\r\n";
        let records: Vec<SourceRecord> = JsonLinesSource::new(Cursor::new(input))
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| matches!(r, SourceRecord::Parsed { .. })));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(JsonLinesSource::open("/nonexistent/records.jsonl").is_err());
    }
}
