//! CSV log encoding
//!
//! ```text
//! timestamp,RPM,Speed,VIN
//! kind,numeric,numeric,text
//! 2024-03-01T12:30:05Z,800,0,"WVWZZZ1JZXW000001"
//! 2024-03-01T12:30:06Z,NULL,5,NULL
//! ```
//!
//! Numbers are written in shortest round-trip form, text is always quoted
//! (quotes doubled, CR/LF/backslash escaped so every row stays on one line),
//! and `NULL` unquoted marks an absent value. Older logs without the `kind`
//! row are read with every column numeric and unparseable cells absent.

use obd_session::{ParameterKind, Record, Sample, Value};

use super::{format_timestamp, parse_timestamp, Column};

const ABSENT: &str = "NULL";
const TIMESTAMP: &str = "timestamp";
const KIND: &str = "kind";

/// A parsed cell
#[derive(Debug, PartialEq)]
pub(crate) struct Cell {
    pub text: String,
    pub quoted: bool,
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\"\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn header_cell(name: &str) -> String {
    let plain = !name.is_empty()
        && name.trim() == name
        && !name.contains([',', '"', '\\', '\n', '\r']);
    if plain {
        name.to_string()
    } else {
        quote(name)
    }
}

pub(crate) fn encode_header(columns: &[Column]) -> String {
    let mut names = String::from(TIMESTAMP);
    let mut kinds = String::from(KIND);
    for column in columns {
        names.push(',');
        names.push_str(&header_cell(&column.name));
        kinds.push(',');
        kinds.push_str(column.kind.as_str());
    }
    format!("{}\n{}\n", names, kinds)
}

pub(crate) fn encode_entry(record: &Record) -> String {
    let mut row = format_timestamp(&record.timestamp);
    for sample in &record.samples {
        row.push(',');
        match &sample.value {
            Value::Numeric(v) => row.push_str(&v.to_string()),
            Value::Text(text) => row.push_str(&quote(text)),
            Value::Absent => row.push_str(ABSENT),
        }
    }
    row.push('\n');
    row
}

/// Split one row into cells
pub(crate) fn split_row(line: &str) -> Result<Vec<Cell>, String> {
    let mut cells = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        let mut text = String::new();
        let quoted = chars.peek() == Some(&'"');

        if quoted {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        text.push('"');
                    }
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('\\') => text.push('\\'),
                        Some('n') => text.push('\n'),
                        Some('r') => text.push('\r'),
                        other => return Err(format!("invalid escape \\{:?}", other)),
                    },
                    Some(c) => text.push(c),
                    None => return Err("unterminated quoted cell".to_string()),
                }
            }
            match chars.next() {
                Some(',') => {}
                None => {
                    cells.push(Cell { text, quoted });
                    return Ok(cells);
                }
                Some(c) => return Err(format!("unexpected {:?} after quoted cell", c)),
            }
        } else {
            loop {
                match chars.next() {
                    Some(',') => break,
                    Some('"') => return Err("stray quote in unquoted cell".to_string()),
                    Some(c) => text.push(c),
                    None => {
                        cells.push(Cell { text, quoted });
                        return Ok(cells);
                    }
                }
            }
        }

        cells.push(Cell { text, quoted });
    }
}

/// Parse the column names of the first row
pub(crate) fn parse_header(line: &str) -> Result<Vec<String>, String> {
    let cells = split_row(line)?;
    let mut cells = cells.into_iter();
    match cells.next() {
        Some(first) if first.text.eq_ignore_ascii_case(TIMESTAMP) => {}
        _ => return Err("header must start with a timestamp column".to_string()),
    }
    let names: Vec<String> = cells.map(|c| c.text).collect();
    if names.iter().any(|n| n.is_empty()) {
        return Err("header has an empty column name".to_string());
    }
    Ok(names)
}

/// Parse the kind row; `None` when the line is not a kind row
pub(crate) fn parse_kinds(line: &str, names: &[String]) -> Option<Vec<Column>> {
    let cells = split_row(line).ok()?;
    let (first, rest) = cells.split_first()?;
    if first.quoted || first.text != KIND || rest.len() != names.len() {
        return None;
    }
    names
        .iter()
        .zip(rest)
        .map(|(name, cell)| {
            Some(Column {
                name: name.clone(),
                kind: ParameterKind::parse(&cell.text)?,
            })
        })
        .collect()
}

/// Decode one data row
///
/// `legacy` relaxes numeric cells: anything unparseable becomes absent
/// instead of failing the row.
pub(crate) fn decode_entry(
    line: &str,
    columns: &[Column],
    legacy: bool,
    tick: u64,
) -> Result<Record, String> {
    let cells = split_row(line)?;
    if cells.len() != columns.len() + 1 {
        return Err(format!(
            "expected {} cells, found {}",
            columns.len() + 1,
            cells.len()
        ));
    }

    let timestamp = parse_timestamp(&cells[0].text)?;
    let mut samples = Vec::with_capacity(columns.len());

    for (cell, column) in cells[1..].iter().zip(columns) {
        let value = if !cell.quoted && cell.text == ABSENT {
            Value::Absent
        } else {
            match column.kind {
                ParameterKind::Numeric => match (cell.quoted, cell.text.trim().parse::<f64>()) {
                    (false, Ok(v)) if v.is_finite() => Value::Numeric(v),
                    _ if legacy => Value::Absent,
                    _ => return Err(format!("{}: invalid number {:?}", column.name, cell.text)),
                },
                ParameterKind::Text if cell.quoted => Value::Text(cell.text.clone()),
                ParameterKind::Text => {
                    return Err(format!("{}: unquoted text {:?}", column.name, cell.text))
                }
            }
        };
        samples.push(Sample {
            name: column.name.clone(),
            kind: column.kind,
            value,
        });
    }

    Ok(Record::new(timestamp, tick, samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column {
                name: "RPM".into(),
                kind: ParameterKind::Numeric,
            },
            Column {
                name: "VIN".into(),
                kind: ParameterKind::Text,
            },
        ]
    }

    #[test]
    fn test_header_layout() {
        let header = encode_header(&columns());
        assert_eq!(header, "timestamp,RPM,VIN\nkind,numeric,text\n");
    }

    #[test]
    fn test_header_quotes_awkward_names() {
        let header = encode_header(&[Column {
            name: "Fuel, Level".into(),
            kind: ParameterKind::Numeric,
        }]);
        let first = header.lines().next().unwrap();
        assert_eq!(parse_header(first).unwrap(), vec!["Fuel, Level"]);
    }

    #[test]
    fn test_split_row_quoting() {
        let cells = split_row(r#"a,"b,""c""",NULL,"",,"x\ny""#).unwrap();
        let texts: Vec<_> = cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b,\"c\"", "NULL", "", "", "x\ny"]);
        assert!(cells[1].quoted);
        assert!(!cells[2].quoted);
        assert!(cells[3].quoted);
        assert!(!cells[4].quoted);
    }

    #[test]
    fn test_split_row_rejects_broken_quotes() {
        assert!(split_row(r#"a,"unterminated"#).is_err());
        assert!(split_row(r#"a,"x"y"#).is_err());
        assert!(split_row(r#"a,b"c"#).is_err());
    }

    #[test]
    fn test_absent_vs_text_null_vs_empty() {
        let line = "2024-03-01T12:30:05Z,NULL,\"NULL\"";
        let record = decode_entry(line, &columns(), false, 0).unwrap();
        assert_eq!(record.samples[0].value, Value::Absent);
        assert_eq!(record.samples[1].value, Value::Text("NULL".into()));

        let line = "2024-03-01T12:30:05Z,0,\"\"";
        let record = decode_entry(line, &columns(), false, 0).unwrap();
        assert_eq!(record.samples[0].value, Value::Numeric(0.0));
        assert_eq!(record.samples[1].value, Value::Text(String::new()));
    }

    #[test]
    fn test_kind_row_detection() {
        let names = vec!["RPM".to_string(), "VIN".to_string()];
        assert_eq!(parse_kinds("kind,numeric,text", &names), Some(columns()));
        assert_eq!(parse_kinds("kind,numeric", &names), None);
        assert_eq!(parse_kinds("2024-03-01T12:30:05Z,800,900", &names), None);
    }

    #[test]
    fn test_strict_vs_legacy_numbers() {
        let numeric = vec![Column {
            name: "RPM".into(),
            kind: ParameterKind::Numeric,
        }];
        let line = "2024-03-01T12:30:05.123456,800.0 revolutions_per_minute";
        assert!(decode_entry(line, &numeric, false, 0).is_err());
        let record = decode_entry(line, &numeric, true, 0).unwrap();
        assert_eq!(record.samples[0].value, Value::Absent);

        assert!(decode_entry("2024-03-01T12:30:05Z,NaN", &numeric, false, 0).is_err());
        assert!(decode_entry("2024-03-01T12:30:05Z,1,2", &numeric, false, 0).is_err());
    }
}
