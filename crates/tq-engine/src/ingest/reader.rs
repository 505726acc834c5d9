//! Chunked CSV reading.

use std::fs::File;
use std::io;
use std::path::Path;
use tq_core::{Result, TrafficError, TrafficObservation};

/// One data row: its source line and either the observation or why it
/// did not parse.
#[derive(Debug)]
pub struct ParsedRow {
    pub line: u64,
    pub observation: Result<TrafficObservation>,
}

/// Yields rows in chunks of at most `chunk_size`. The header row is
/// consumed by the CSV reader and never yielded.
pub struct ChunkReader<R: io::Read> {
    records: csv::StringRecordsIntoIter<R>,
    chunk_size: usize,
    /// Fallback line counter for records without a position.
    line: u64,
}

impl ChunkReader<File> {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TrafficError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => TrafficError::Io(e),
        })?;
        Ok(Self::from_reader(file, chunk_size))
    }
}

impl<R: io::Read> ChunkReader<R> {
    pub fn from_reader(reader: R, chunk_size: usize) -> Self {
        let records = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader)
            .into_records();
        Self {
            records,
            chunk_size: chunk_size.max(1),
            line: 1,
        }
    }

    fn next_row(&mut self) -> Option<ParsedRow> {
        let next = self.records.next()?;
        self.line += 1;
        Some(match next {
            Ok(record) => {
                let line = record.position().map_or(self.line, |p| p.line());
                let columns: Vec<&str> = record.iter().collect();
                ParsedRow {
                    line,
                    observation: TrafficObservation::from_columns(line, &columns),
                }
            }
            Err(e) => {
                let line = e.position().map_or(self.line, |p| p.line());
                ParsedRow {
                    line,
                    observation: Err(TrafficError::parse(line, e.to_string())),
                }
            }
        })
    }
}

impl<R: io::Read> Iterator for ChunkReader<R> {
    type Item = Vec<ParsedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.next_row() {
                Some(row) => chunk.push(row),
                None => break,
            }
        }
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}
