//! Bulk record parsing for delimited text payloads
//!
//! Price dumps and similar bulk downloads are parsed line by line. A few bad
//! lines are tolerated; past a threshold the whole parse is abandoned so a
//! broken download is never half-trusted.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::error::CacheError;

/// Default number of malformed records tolerated before giving up
pub const DEFAULT_MAX_MALFORMED: usize = 20;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How to split and screen the lines of a payload
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Discard the first line as a column header
    pub skip_header: bool,
    /// Field separator
    pub delimiter: char,
    /// Lines with fewer fields are skipped without counting as malformed
    pub min_fields: usize,
    /// Abort once more than this many records fail to parse
    pub max_malformed: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            skip_header: true,
            delimiter: ',',
            min_fields: 1,
            max_malformed: DEFAULT_MAX_MALFORMED,
        }
    }
}

/// Parses every line of `reader` with `parse`
///
/// # Arguments
/// * `reader` - Source of text lines
/// * `options` - Header, delimiter and error tolerance settings
/// * `parse` - Turns the fields of one line into a record, or explains why it can't
///
/// # Returns
/// * `Ok(Vec<T>)` with every record that parsed
/// * `Err(CacheError::MalformedRecords)` once more than `max_malformed` lines failed
/// * `Err(CacheError::Io)` if reading fails
pub fn parse_records<R, T, F>(
    mut reader: R,
    options: &IngestOptions,
    mut parse: F,
) -> Result<Vec<T>, CacheError>
where
    R: BufRead,
    F: FnMut(&[&str]) -> Result<T, String>,
{
    let mut records = Vec::new();
    let mut malformed = 0;
    let mut buf = Vec::new();

    for index in 0.. {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if index == 0 && options.skip_header {
            continue;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim_end_matches(['\n', '\r']),
            Err(e) => {
                reject(&mut malformed, index, format!("invalid UTF-8: {}", e), options)?;
                continue;
            }
        };

        let fields: Vec<&str> = line.split(options.delimiter).map(str::trim).collect();
        if line.trim().is_empty() || fields.len() < options.min_fields {
            continue;
        }

        match parse(&fields) {
            Ok(record) => records.push(record),
            Err(reason) => reject(&mut malformed, index, reason, options)?,
        }
    }

    Ok(records)
}

/// Counts one malformed record, failing once the limit is exceeded
fn reject(
    malformed: &mut usize,
    index: usize,
    reason: String,
    options: &IngestOptions,
) -> Result<(), CacheError> {
    *malformed += 1;
    debug!(line = index + 1, reason = %reason, "Skipping malformed record");
    if *malformed > options.max_malformed {
        return Err(CacheError::MalformedRecords {
            count: *malformed,
            last: reason,
        });
    }
    Ok(())
}

/// Opens a text payload, transparently decompressing gzip content
///
/// Every member of a concatenated gzip stream is read.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>, CacheError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read = read_prefix(&mut file, &mut magic)?;

    let file = File::open(path)?;
    if read == GZIP_MAGIC.len() && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    #[derive(Debug, PartialEq)]
    struct Median {
        type_id: u32,
        sell: f32,
        buy: f32,
    }

    fn parse_median(fields: &[&str]) -> Result<Median, String> {
        Ok(Median {
            type_id: fields[0].parse().map_err(|e| format!("type id: {}", e))?,
            sell: fields[1].parse().map_err(|e| format!("sell: {}", e))?,
            buy: fields[2].parse().map_err(|e| format!("buy: {}", e))?,
        })
    }

    fn median_options() -> IngestOptions {
        IngestOptions {
            min_fields: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_parses_records_after_header() {
        let input = "typeID,sellMedian,buyMedian\n34,2.5,2.1\n35,6.0,5.5\n";
        let records = parse_records(Cursor::new(input), &median_options(), parse_median).unwrap();

        assert_eq!(
            records,
            vec![
                Median { type_id: 34, sell: 2.5, buy: 2.1 },
                Median { type_id: 35, sell: 6.0, buy: 5.5 },
            ]
        );
    }

    #[test]
    fn test_short_and_blank_lines_are_ignored() {
        let input = "header\n34,2.5\n\n35,6.0,5.5\n";
        let records = parse_records(Cursor::new(input), &median_options(), parse_median).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].type_id, 35);
    }

    #[test]
    fn test_tolerates_up_to_max_malformed() {
        let mut input = String::from("header\n");
        for _ in 0..DEFAULT_MAX_MALFORMED {
            input.push_str("x,y,z\n");
        }
        input.push_str("34,1,1\n");

        let records = parse_records(Cursor::new(input), &median_options(), parse_median).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_aborts_past_max_malformed_with_count() {
        let mut input = String::from("header\n");
        for _ in 0..=DEFAULT_MAX_MALFORMED {
            input.push_str("x,1,1\n");
        }

        let err = parse_records(Cursor::new(input), &median_options(), parse_median).unwrap_err();
        match err {
            CacheError::MalformedRecords { count, last } => {
                assert_eq!(count, DEFAULT_MAX_MALFORMED + 1);
                assert!(last.starts_with("type id"));
            }
            other => panic!("Expected MalformedRecords, got {:?}", other),
        }
    }

    #[test]
    fn test_open_text_reads_plain_and_gzip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let body = "typeID,sell,buy\n34,2.5,2.1\n";

        let plain = temp_dir.path().join("medians.txt");
        fs::write(&plain, body).unwrap();

        let gz = temp_dir.path().join("medians.txt.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body.as_bytes()).unwrap();
        fs::write(&gz, encoder.finish().unwrap()).unwrap();

        for path in [&plain, &gz] {
            let reader = open_text(path).expect("Should open payload");
            let records = parse_records(reader, &median_options(), parse_median).unwrap();
            assert_eq!(records, vec![Median { type_id: 34, sell: 2.5, buy: 2.1 }]);
        }
    }

    #[test]
    fn test_invalid_utf8_line_counts_as_malformed() {
        let input: &[u8] = b"header\n34,1\n35,caf\xe9\n36,2\r\n";
        let records = parse_records(Cursor::new(input), &IngestOptions::default(), |fields| {
            fields[0].parse::<u32>().map_err(|e| e.to_string())
        })
        .expect("One badly encoded line is tolerated");

        assert_eq!(records, vec![34, 36]);
    }

    #[test]
    fn test_invalid_utf8_lines_respect_max_malformed() {
        let options = IngestOptions {
            skip_header: false,
            max_malformed: 1,
            ..Default::default()
        };
        let input: &[u8] = b"\xff\n\xfe\n34\n";

        let err = parse_records(Cursor::new(input), &options, |fields| {
            fields[0].parse::<u32>().map_err(|e| e.to_string())
        })
        .unwrap_err();
        match err {
            CacheError::MalformedRecords { count, last } => {
                assert_eq!(count, 2);
                assert!(last.starts_with("invalid UTF-8"));
            }
            other => panic!("Expected MalformedRecords, got {:?}", other),
        }
    }

    #[test]
    fn test_open_text_reads_every_gzip_member() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("medians.txt.gz");

        let mut contents = Vec::new();
        for part in ["typeID,sell,buy\n34,2.5,2.1\n", "35,6.0,5.5\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part.as_bytes()).unwrap();
            contents.extend(encoder.finish().unwrap());
        }
        fs::write(&path, contents).unwrap();

        let reader = open_text(&path).expect("Should open payload");
        let records = parse_records(reader, &median_options(), parse_median).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].type_id, 35);
    }

    #[test]
    fn test_open_text_handles_tiny_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("one.txt");
        fs::write(&path, "x").unwrap();

        let mut reader = open_text(&path).unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "x");
    }
}
