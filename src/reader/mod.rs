//! Chunked, bounded-memory reading of source files.

pub mod csv;
pub mod json;
pub mod record;

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};

use crate::datasets::SourceFormat;

pub use record::RawRecord;

/// Per-format decoder producing the canonical record shape
pub trait RecordDecoder {
    /// The next record, or `None` at end of stream. Errors are I/O level;
    /// undecodable records come back as `RawRecord::Malformed`.
    fn next_record(&mut self) -> Result<Option<RawRecord>>;
}

/// Streams a source file in bounded-size batches of records.
///
/// At most `chunk_size` decoded records are held in memory at a time, no
/// matter how large the file is.
pub struct ChunkedReader {
    decoder: Box<dyn RecordDecoder>,
    chunk_size: usize,
}

impl ChunkedReader {
    pub fn open(path: &Path, format: SourceFormat, chunk_size: usize) -> Result<Self> {
        assert!(chunk_size > 0, "chunk_size must be positive");
        let file =
            File::open(path).with_context(|| format!("Failed to open source file: {:?}", path))?;

        let decoder: Box<dyn RecordDecoder> = match format {
            SourceFormat::JsonArray => Box::new(json::JsonArrayDecoder::new(file)),
            SourceFormat::Csv => Box::new(csv::CsvDecoder::new(file)?),
        };

        Ok(Self {
            decoder,
            chunk_size,
        })
    }

    #[cfg(test)]
    pub fn from_decoder(decoder: Box<dyn RecordDecoder>, chunk_size: usize) -> Self {
        Self {
            decoder,
            chunk_size,
        }
    }

    /// The next batch of up to `chunk_size` records, or `None` at end
    pub fn next_chunk(&mut self) -> Result<Option<Vec<RawRecord>>> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.decoder.next_record()? {
                Some(record) => chunk.push(record),
                None => break,
            }
        }

        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::json::JsonArrayDecoder;
    use super::*;

    fn reader_over(input: &'static str, chunk_size: usize) -> ChunkedReader {
        ChunkedReader::from_decoder(
            Box::new(JsonArrayDecoder::new(input.as_bytes())),
            chunk_size,
        )
    }

    #[test]
    fn five_records_with_chunk_size_two_gives_three_chunks() {
        let mut reader = reader_over(r#"[{"a":1},{"a":2},{"a":3},{"a":4},{"a":5}]"#, 2);

        let sizes: Vec<usize> = std::iter::from_fn(|| reader.next_chunk().unwrap())
            .map(|c| c.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn chunks_preserve_file_order() {
        let mut reader = reader_over(r#"[{"a":1},{"a":2},{"a":3}]"#, 2);
        let mut indices = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            indices.extend(chunk.iter().map(|r| r.index()));
        }
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn empty_source_gives_no_chunks() {
        let mut reader = reader_over("[]", 100);
        assert!(reader.next_chunk().unwrap().is_none());
    }
}
