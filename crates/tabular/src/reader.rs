//! Delimited-text decoding with column type inference.

use crate::error::Result;
use crate::frame::{Cell, Column, Frame};

/// Inferred type for a whole column.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Dtype {
    Int,
    Float,
    Bool,
    Str,
}

/// Decode delimited-text bytes into a typed [`Frame`].
///
/// The first row is the header. Each column gets a single type chosen by
/// scanning every field: integer when all present fields parse as `i64`,
/// float when all parse as `f64`, boolean when all are `true`/`false` in any
/// case, text otherwise. Empty fields decode to null in every column, and
/// non-finite floats (NaN, inf) decode to null since JSON cannot carry them.
///
/// Ragged rows and invalid UTF-8 are errors; the caller picks the fallback.
pub fn parse_frame(bytes: &[u8]) -> Result<Frame> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(Frame::new());
    }

    // Column types depend on every row, so collect raw fields first.
    let mut raw_columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            raw_columns[i].push(field.to_string());
        }
    }

    let columns = headers
        .iter()
        .zip(raw_columns)
        .map(|(name, raw)| {
            let dtype = infer_dtype(&raw);
            Column {
                name: name.to_string(),
                values: raw.iter().map(|field| decode_field(field, dtype)).collect(),
            }
        })
        .collect();

    Ok(Frame { columns })
}

/// Pick the narrowest type that fits every present field in the column.
fn infer_dtype(raw: &[String]) -> Dtype {
    let mut any_present = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;

    for field in raw {
        if field.is_empty() {
            continue;
        }
        any_present = true;
        if all_int && field.parse::<i64>().is_err() {
            all_int = false;
        }
        if all_float && field.parse::<f64>().is_err() {
            all_float = false;
        }
        if all_bool && !is_bool_field(field) {
            all_bool = false;
        }
    }

    // An all-empty column has no evidence either way; any dtype decodes
    // empty fields to null.
    if !any_present || all_int {
        Dtype::Int
    } else if all_float {
        Dtype::Float
    } else if all_bool {
        Dtype::Bool
    } else {
        Dtype::Str
    }
}

fn is_bool_field(field: &str) -> bool {
    field.eq_ignore_ascii_case("true") || field.eq_ignore_ascii_case("false")
}

fn decode_field(field: &str, dtype: Dtype) -> Cell {
    if field.is_empty() {
        return Cell::Null;
    }
    match dtype {
        Dtype::Int => field.parse::<i64>().map_or(Cell::Null, Cell::Int),
        Dtype::Float => match field.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Float(v),
            _ => Cell::Null,
        },
        Dtype::Bool => Cell::Bool(field.eq_ignore_ascii_case("true")),
        Dtype::Str => Cell::Str(field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_columns() {
        let frame = parse_frame(b"a,b\n1,2\n3,\n").unwrap();
        assert_eq!(frame.row_count(), 2);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"a":[1,3],"b":[2,null]}"#);
    }

    #[test]
    fn test_parse_empty_input() {
        let frame = parse_frame(b"").unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.column_count(), 0);
    }

    #[test]
    fn test_parse_header_only() {
        let frame = parse_frame(b"x,y,z\n").unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.column_count(), 3);
    }

    #[test]
    fn test_int_column_promotes_to_float() {
        let frame = parse_frame(b"v\n1\n2.5\n").unwrap();
        assert_eq!(
            frame.column("v").unwrap().values,
            vec![Cell::Float(1.0), Cell::Float(2.5)]
        );
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        let frame = parse_frame(b"v\nNaN\n1.5\ninf\n").unwrap();
        assert_eq!(
            frame.column("v").unwrap().values,
            vec![Cell::Null, Cell::Float(1.5), Cell::Null]
        );
    }

    #[test]
    fn test_bool_column() {
        let frame = parse_frame(b"flag,n\ntrue,1\nFalse,2\n,3\n").unwrap();
        assert_eq!(
            frame.column("flag").unwrap().values,
            vec![Cell::Bool(true), Cell::Bool(false), Cell::Null]
        );
    }

    #[test]
    fn test_mixed_column_keeps_raw_text() {
        // One non-numeric value turns the whole column to text, so numeric
        // forms like "007" keep their original spelling.
        let frame = parse_frame(b"id\n007\nx9\n").unwrap();
        assert_eq!(
            frame.column("id").unwrap().values,
            vec![Cell::Str("007".to_string()), Cell::Str("x9".to_string())]
        );
    }

    #[test]
    fn test_all_empty_column_is_null() {
        let frame = parse_frame(b"a,b\n1,\n2,\n").unwrap();
        assert_eq!(
            frame.column("b").unwrap().values,
            vec![Cell::Null, Cell::Null]
        );
    }

    #[test]
    fn test_column_order_matches_source() {
        let frame = parse_frame(b"z,m,a\n1,2,3\n").unwrap();
        let names: Vec<&str> = frame.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["z", "m", "a"]);
    }

    #[test]
    fn test_ragged_row_is_error() {
        assert!(parse_frame(b"a,b\n1\n").is_err());
    }

    #[test]
    fn test_invalid_utf8_is_error() {
        assert!(parse_frame(b"a\n\xff\xfe\n").is_err());
    }

    #[test]
    fn test_quoted_fields() {
        let frame = parse_frame(b"name,qty\n\"spring, coil\",4\n").unwrap();
        assert_eq!(
            frame.column("name").unwrap().values,
            vec![Cell::Str("spring, coil".to_string())]
        );
        assert_eq!(frame.column("qty").unwrap().values, vec![Cell::Int(4)]);
    }

    #[test]
    fn test_scientific_notation_is_float() {
        let frame = parse_frame(b"v\n1e3\n").unwrap();
        assert_eq!(frame.column("v").unwrap().values, vec![Cell::Float(1000.0)]);
    }
}
