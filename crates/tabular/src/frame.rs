//! Column-oriented frame representation.
//!
//! A [`Frame`] is the JSON-safe form of a tabular resource: named columns in
//! source order, each holding one typed value per data row. Serialization
//! produces the wire shape directly, a JSON object mapping column name to an
//! array of values (`{"a":[1,3],"b":[2,null]}`).

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// A single typed value inside a column.
///
/// Values JSON cannot carry (missing fields, NaN, infinities) are `Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A named column with one value per data row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name from the header row.
    pub name: String,
    /// Values in row order.
    pub values: Vec<Cell>,
}

impl Column {
    /// Create an empty column with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }
}

/// An ordered collection of columns decoded from one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Columns in source order.
    pub columns: Vec<Column>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the frame holds no data rows (header-only or no columns).
    pub fn is_empty(&self) -> bool {
        self.columns.first().is_none_or(|c| c.values.is_empty())
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Serializes as a JSON map in column order; entry order is the emit order,
/// so the wire shape preserves the source column order.
impl Serialize for Frame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in &self.columns {
            map.serialize_entry(&column.name, &column.values)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        Frame {
            columns: vec![
                Column {
                    name: "a".to_string(),
                    values: vec![Cell::Int(1), Cell::Int(3)],
                },
                Column {
                    name: "b".to_string(),
                    values: vec![Cell::Int(2), Cell::Null],
                },
            ],
        }
    }

    #[test]
    fn test_serialize_column_map() {
        let json = serde_json::to_string(&sample_frame()).unwrap();
        assert_eq!(json, r#"{"a":[1,3],"b":[2,null]}"#);
    }

    #[test]
    fn test_serialize_preserves_column_order() {
        let frame = Frame {
            columns: vec![
                Column::new("zebra"),
                Column::new("apple"),
                Column::new("mango"),
            ],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"zebra":[],"apple":[],"mango":[]}"#);
    }

    #[test]
    fn test_cell_variants_serialize() {
        let values = vec![
            Cell::Null,
            Cell::Bool(true),
            Cell::Int(-7),
            Cell::Float(1.5),
            Cell::Str("x".to_string()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,true,-7,1.5,"x"]"#);
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::new();
        assert!(frame.is_empty());
        assert_eq!(frame.row_count(), 0);
        assert_eq!(serde_json::to_string(&frame).unwrap(), "{}");
    }

    #[test]
    fn test_header_only_frame_is_empty() {
        let frame = Frame {
            columns: vec![Column::new("a"), Column::new("b")],
        };
        assert!(frame.is_empty());
        assert_eq!(frame.column_count(), 2);
    }

    #[test]
    fn test_column_lookup() {
        let frame = sample_frame();
        assert_eq!(frame.column("b").unwrap().values[1], Cell::Null);
        assert!(frame.column("missing").is_none());
    }
}
