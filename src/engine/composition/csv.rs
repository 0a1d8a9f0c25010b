//! Minimal CSV reader for data-video tables

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RenderError, Result};

/// Header plus rows; rows are padded or truncated to the header width
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RenderError::InvalidSpec(format!("cannot read CSV {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut records = parse_records(text.trim_start_matches('\u{feff}'))?.into_iter();
        let header = records
            .next()
            .ok_or_else(|| RenderError::InvalidSpec("CSV is empty".into()))?;

        let width = header.len();
        let rows = records
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Ok(Self { header, rows })
    }
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => quoted = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if quoted {
        return Err(RenderError::InvalidSpec("CSV has an unterminated quoted field".into()));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_quotes() {
        let table = Table::parse(
            "city,population,note\n\"Paris\",2100000,\"capital, \"\"city of light\"\"\"\nLyon,516000\n",
        )
        .unwrap();

        assert_eq!(table.header, vec!["city", "population", "note"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][2], "capital, \"city of light\"");
        assert_eq!(table.rows[1], vec!["Lyon", "516000", ""]);
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let table = Table::parse("a,b\r\n\r\n1,2\r\n").unwrap();
        assert_eq!(table.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn test_multiline_quoted_field() {
        let table = Table::parse("k,v\nx,\"line one\nline two\"").unwrap();
        assert_eq!(table.rows[0][1], "line one\nline two");
    }

    #[test]
    fn test_errors() {
        assert!(Table::parse("").is_err());
        assert!(Table::parse("a,\"open").is_err());
        assert!(Table::read(Path::new("/definitely/missing.csv")).is_err());
    }
}
