//! Row model shared by the query layer and the cache

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single value read from the relational store.
///
/// Serialized untagged so a normalized row-set is plain JSON. Date and time
/// variants never survive normalization, so decoding cached JSON only ever
/// produces the scalar variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

impl CellValue {
    /// Numeric view used by charting; `None` for non-numeric cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

/// Column name to value, in select-list order.
pub type Row = IndexMap<String, CellValue>;
