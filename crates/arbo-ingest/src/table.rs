//! Raw delimited tables: delimiter inference, text decoding and CSV reading.

use std::{borrow::Cow, path::Path};

use crate::Result;

/// Bytes inspected when guessing the field delimiter.
const SNIFF_BYTES: usize = 4096;

/// A delimited text table with its header row, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
  pub headers:       Vec<String>,
  pub rows:          Vec<Vec<String>>,
  pub delimiter:     u8,
  /// `;`-delimited sources write decimals as `12,3`.
  pub decimal_comma: bool,
}

impl RawTable {
  /// Read a table from `path`.
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
    let bytes = std::fs::read(path)?;
    Self::from_bytes(&bytes)
  }

  /// Read a table from raw bytes, decoding UTF-8 first and Latin-1 otherwise.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
    let decoded = decode(bytes);
    let text = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);
    let delimiter = infer_delimiter(text.as_bytes());

    let mut reader = csv::ReaderBuilder::new()
      .delimiter(delimiter)
      .has_headers(true)
      .flexible(true)
      .trim(csv::Trim::All)
      .from_reader(text.as_bytes());

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
      let record = record?;
      if record.iter().all(str::is_empty) {
        continue;
      }
      rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Self { headers, rows, delimiter, decimal_comma: delimiter == b';' })
  }

  /// The cell at `(row, col)`, empty when the row is short.
  pub fn cell(&self, row: usize, col: usize) -> &str {
    self.rows[row].get(col).map(String::as_str).unwrap_or("")
  }

  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

/// `;` when the head of the input holds more semicolons than commas.
pub fn infer_delimiter(bytes: &[u8]) -> u8 {
  let head = &bytes[..bytes.len().min(SNIFF_BYTES)];
  let semis = head.iter().filter(|&&b| b == b';').count();
  let commas = head.iter().filter(|&&b| b == b',').count();
  if semis > commas { b';' } else { b',' }
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
  match std::str::from_utf8(bytes) {
    Ok(s) => Cow::Borrowed(s),
    Err(_) => {
      tracing::debug!("input is not valid UTF-8, decoding as Latin-1");
      Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn semicolon_wins_when_more_frequent() {
    assert_eq!(infer_delimiter(b"Data;Temp;Chuva\n2024-01-01;22,5;1,0\n"), b';');
    assert_eq!(infer_delimiter(b"date,temp\n2024-01-01,22.5\n"), b',');
    assert_eq!(infer_delimiter(b""), b',');
  }

  #[test]
  fn reads_semicolon_table_with_decimal_comma() {
    let t = RawTable::from_bytes(b"Data;Temp\n2024-01-01;22,5\n\n2024-01-02;23,0\n").unwrap();
    assert_eq!(t.headers, vec!["Data", "Temp"]);
    assert_eq!(t.len(), 2);
    assert!(t.decimal_comma);
    assert_eq!(t.cell(1, 1), "23,0");
  }

  #[test]
  fn latin1_falls_back() {
    let bytes = b"munic\xedpio,casos\nTe\xf3filo Otoni,3\n";
    let t = RawTable::from_bytes(bytes).unwrap();
    assert_eq!(t.headers[0], "município");
    assert_eq!(t.cell(0, 0), "Teófilo Otoni");
  }

  #[test]
  fn short_rows_read_as_empty_cells() {
    let t = RawTable::from_bytes(b"date,temp,prec\n2024-01-01,20\n").unwrap();
    assert_eq!(t.cell(0, 2), "");
  }

  #[test]
  fn bom_is_stripped() {
    let t = RawTable::from_bytes("\u{feff}date,cases\n2024-01-01,1\n".as_bytes()).unwrap();
    assert_eq!(t.headers[0], "date");
  }
}
