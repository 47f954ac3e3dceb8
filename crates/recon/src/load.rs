//! CSV → [`Dataset`] with per-column type inference.

use std::path::Path;

use crate::dataset::{Column, ColumnType, Dataset, Value};
use crate::error::ReconError;
use crate::parse::{parse_bool, parse_financial_number, parse_timestamp};

/// Load a CSV/TSV file, sniffing the delimiter.
pub fn load_csv_file(path: &Path) -> Result<Dataset, ReconError> {
    let content = read_file_as_utf8(path)
        .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))?;
    load_csv_str(&content)
}

pub fn load_csv_str(content: &str) -> Result<Dataset, ReconError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    load_csv_with_delimiter(content, sniff_delimiter(content))
}

pub fn load_csv_with_delimiter(content: &str, delimiter: u8) -> Result<Dataset, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        // Short rows are padded with empty fields; extra fields are dropped
        for (i, values) in raw.iter_mut().enumerate() {
            values.push(record.get(i).unwrap_or("").to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, values)| infer_column(name, values))
        .collect();
    Dataset::new(columns)
}

const DELIMITERS: [u8; 4] = [b'\t', b';', b',', b'|'];
const SNIFF_RECORDS: usize = 10;

/// The candidate whose header splits into the most fields and that the
/// following records agree with. Ties go to the earlier candidate; comma
/// when nothing splits the header.
fn sniff_delimiter(content: &str) -> u8 {
    DELIMITERS
        .iter()
        .rev()
        .filter_map(|&d| delimiter_score(content, d).map(|score| (score, d)))
        .max_by_key(|&(score, _)| score)
        .map_or(b',', |(_, d)| d)
}

/// Records agreeing with the header width, times that width. `None` when
/// the header does not split.
fn delimiter_score(content: &str, delimiter: u8) -> Option<usize> {
    let widths: Vec<usize> = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
        .records()
        .take(SNIFF_RECORDS)
        .map_while(Result::ok)
        .map(|r| r.len())
        .collect();
    let header = *widths.first()?;
    if header < 2 {
        return None;
    }
    Some(widths.iter().filter(|&&w| w == header).count() * header)
}

/// Excel exports are often Windows-1252 rather than UTF-8.
fn read_file_as_utf8(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).or_else(|e| {
        log::debug!("{} is not valid UTF-8, decoding as Windows-1252", path.display());
        let (decoded, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(e.as_bytes());
        Ok(decoded.into_owned())
    })
}

// ---------------------------------------------------------------------------
// Type inference
// ---------------------------------------------------------------------------

/// Share of present cells that must read as numbers for a column to load as
/// numeric with the rest kept as text.
const MOSTLY_NUMERIC: f64 = 0.9;

/// Booleans, then numbers, then timestamps; anything else is text. A type
/// applies when every non-empty value parses as it, except that a mostly
/// numeric column still loads as numeric: its stray cells stay text so role
/// discovery can report them as coerced when the column becomes a measure.
fn infer_column(name: String, raw: Vec<String>) -> Column {
    let present: Vec<&str> = raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();

    let typed = |parse: &dyn Fn(&str) -> Option<Value>| -> Option<Vec<Value>> {
        if present.is_empty() || !present.iter().all(|s| parse(s).is_some()) {
            return None;
        }
        Some(
            raw.iter()
                .map(|s| parse(s.trim()).unwrap_or(Value::Missing))
                .collect(),
        )
    };

    if let Some(values) = typed(&|s| parse_bool(s).map(Value::Bool)) {
        return Column::new(name, ColumnType::Boolean, values);
    }
    if let Some(values) = typed(&|s| parse_financial_number(s).map(Value::Number)) {
        return Column::new(name, ColumnType::Numeric, values);
    }
    if let Some(values) = typed(&|s| parse_timestamp(s).map(Value::Timestamp)) {
        return Column::new(name, ColumnType::Timestamp, values);
    }

    let numeric = present.iter().filter(|s| parse_financial_number(s).is_some()).count();
    if numeric > 0 && numeric as f64 >= MOSTLY_NUMERIC * present.len() as f64 {
        let values = raw
            .into_iter()
            .map(|s| match s.trim() {
                "" => Value::Missing,
                t => parse_financial_number(t).map_or_else(|| Value::Text(t.to_string()), Value::Number),
            })
            .collect();
        return Column::new(name, ColumnType::Numeric, values);
    }

    let values = raw
        .into_iter()
        .map(|s| if s.is_empty() { Value::Missing } else { Value::Text(s) })
        .collect();
    Column::new(name, ColumnType::String, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn infers_types() {
        let ds = load_csv_str(
            "id,amount,posted,active,region\n\
             1,\"$1,200.50\",2024-03-01,true,east\n\
             2,(3.00),2024-03-02,FALSE,\n\
             3,,2024-03-03,,west\n",
        )
        .unwrap();
        assert_eq!(ds.row_count(), 3);
        let dtypes: Vec<_> = ds.columns().iter().map(|c| c.dtype).collect();
        assert_eq!(
            dtypes,
            vec![
                ColumnType::Numeric,
                ColumnType::Numeric,
                ColumnType::Timestamp,
                ColumnType::Boolean,
                ColumnType::String,
            ]
        );
        assert_eq!(ds.value(0, "amount"), &Value::Number(1200.5));
        assert_eq!(ds.value(1, "amount"), &Value::Number(-3.0));
        assert_eq!(ds.value(2, "amount"), &Value::Missing);
        assert_eq!(ds.value(1, "region"), &Value::Missing);
    }

    #[test]
    fn mixed_column_stays_text() {
        let ds = load_csv_str("k,v\na,1\nb,x\n").unwrap();
        assert_eq!(ds.column("v").unwrap().dtype, ColumnType::String);
        assert_eq!(ds.value(0, "v"), &Value::Text("1".into()));
    }

    #[test]
    fn mostly_numeric_column_keeps_stray_cells() {
        let rows: String = (1..=10).map(|i| format!("r{i},{}\n", if i == 4 { "n/a".to_string() } else { i.to_string() })).collect();
        let ds = load_csv_str(&format!("k,v\n{rows}")).unwrap();
        assert_eq!(ds.column("v").unwrap().dtype, ColumnType::Numeric);
        assert_eq!(ds.value(0, "v"), &Value::Number(1.0));
        assert_eq!(ds.value(3, "v"), &Value::Text("n/a".into()));
    }

    #[test]
    fn sniffs_semicolons_and_pads_short_rows() {
        let ds = load_csv_str("a;b;c\n1;2;3\n4;5\n").unwrap();
        assert_eq!(ds.column_names(), vec!["a", "b", "c"]);
        assert_eq!(ds.value(1, "c"), &Value::Missing);
    }

    #[test]
    fn sniff_prefers_the_consistent_delimiter() {
        assert_eq!(sniff_delimiter("a|b|c\n1|2|3\n"), b'|');
        assert_eq!(sniff_delimiter("a\tb\n\"x,y\"\t1\n"), b'\t');
        assert_eq!(sniff_delimiter("single\n1\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn header_only_file() {
        let ds = load_csv_str("a,b\n").unwrap();
        assert_eq!(ds.row_count(), 0);
        assert_eq!(ds.columns().len(), 2);
    }

    #[test]
    fn windows_1252_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // "café" with 0xE9 for é
        file.write_all(b"name,amt\ncaf\xe9,1\n").unwrap();
        let ds = load_csv_file(file.path()).unwrap();
        assert_eq!(ds.value(0, "name"), &Value::Text("café".into()));
    }
}
