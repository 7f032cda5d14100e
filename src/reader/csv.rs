use std::io::Read;

use anyhow::{Context, Result};
use csv::StringRecordsIntoIter;
use serde_json::{Map, Value};

use super::record::RawRecord;
use super::RecordDecoder;

/// Decoder for row-oriented CSV sources with a header line.
///
/// Each row becomes a JSON object keyed by the header names, so CSV and
/// JSON datasets flow through the same mapping path. Field values stay
/// strings; numeric coercion happens in the mapper.
pub struct CsvDecoder<R: Read> {
    headers: csv::StringRecord,
    records: StringRecordsIntoIter<R>,
    index: u64,
}

impl<R: Read> CsvDecoder<R> {
    pub fn new(source: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(source);
        let headers = reader
            .headers()
            .context("Failed to read CSV header line")?
            .clone();
        Ok(Self {
            headers,
            records: reader.into_records(),
            index: 0,
        })
    }
}

impl<R: Read> RecordDecoder for CsvDecoder<R> {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let row = match self.records.next() {
            None => return Ok(None),
            Some(row) => row,
        };

        let index = self.index;
        self.index += 1;

        let record = match row {
            Ok(fields) => {
                let mut body = Map::new();
                for (header, field) in self.headers.iter().zip(fields.iter()) {
                    body.insert(header.to_string(), Value::String(field.to_string()));
                }
                RawRecord::Parsed {
                    index,
                    body: Value::Object(body),
                }
            }
            Err(e) => {
                // Broken rows (bad UTF-8, wrong field count) are data
                // problems; only I/O failures stop the stream.
                if e.is_io_error() {
                    return Err(e).context("Failed to read CSV source");
                }
                RawRecord::Malformed {
                    index,
                    error: e.to_string(),
                }
            }
        };

        Ok(Some(record))
    }
}
