//! Tabular resource decoding for the streaming gateway.
//!
//! This crate:
//! - Decodes delimited-text bytes (CSV with a header row) into a typed,
//!   column-oriented [`Frame`]
//! - Infers one type per column (integer, float, boolean, text)
//! - Maps everything JSON cannot carry (empty fields, NaN, infinities) to null
//! - Serializes frames directly into the wire shape: a JSON object of
//!   column name to value array, in source column order
//!
//! Decoding is pure: the caller owns file I/O and decides what a missing or
//! malformed resource means.

pub mod error;
pub mod frame;
pub mod reader;

pub use error::{Result, TabularError};
pub use frame::{Cell, Column, Frame};
pub use reader::parse_frame;
