//! CSV loading with encoding and delimiter auto-detection.
//!
//! Produces positional rows aligned to the header line. Values are trimmed,
//! empty cells become null, short records are padded with nulls.

use serde::Serialize;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{FieldList, ReportRow};

/// A parsed CSV table with detection metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CsvTable {
    /// Column headers, in file order
    pub headers: FieldList,
    /// Data rows, one cell per header
    pub rows: Vec<ReportRow>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => {
            let codec = encoding_rs::Encoding::for_label(other.as_bytes())
                .ok_or_else(|| CsvError::EncodingError(format!("unsupported encoding '{other}'")))?;
            codec.decode(bytes).0.into_owned()
        }
    };
    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = (',', 0);
    for sep in [';', ',', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best.1 {
            best = (sep, count);
        }
    }
    best.0
}

/// Parse CSV text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: char) -> CsvResult<CsvTable> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: FieldList = reader
        .headers()
        .map_err(|e| parse_error(&e))?
        .iter()
        .map(String::from)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| parse_error(&e))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row: ReportRow = (0..headers.len())
            .map(|i| record.get(i).filter(|v| !v.is_empty()).map(String::from))
            .collect();
        rows.push(row);
    }

    Ok(CsvTable {
        headers,
        rows,
        encoding: "utf-8".to_string(),
        delimiter,
    })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<CsvTable> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    let mut table = parse_str(&content, delimiter)?;
    table.encoding = encoding;
    Ok(table)
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<CsvTable> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

fn parse_error(err: &csv::Error) -> CsvError {
    let line = err
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or_default();
    CsvError::ParseError {
        line,
        message: err.to_string(),
    }
}
