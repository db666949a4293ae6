use std::str::FromStr;

use crate::error::SortError;

/// Field type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// String
    String,
    /// Signed 64 bit integer
    Integer,
    /// 64 bit floating point number
    Number,
}

impl FromStr for FieldType {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "s" => Ok(FieldType::String),
            "integer" | "int" | "i" => Ok(FieldType::Integer),
            "number" | "n" => Ok(FieldType::Number),
            other => Err(SortError::config(format!("unknown field type: {other}"))),
        }
    }
}
