//! Raw identifier values as they arrive from table cells and boundary properties.

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;

/// A cell or property value usable as a region identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionValue {
    Text(String),
    Number(f64),
}

impl RegionValue {
    /// Convert a JSON value. Only strings and numbers qualify.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RegionValue::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(RegionValue::Number),
            _ => None,
        }
    }

    /// The untouched textual form. Numbers use plain decimal notation.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            RegionValue::Text(s) => Cow::Borrowed(s.as_str()),
            RegionValue::Number(n) => Cow::Owned(format_number(*n)),
        }
    }

    /// Lowercased and trimmed text; numbers are only stringified.
    pub fn folded(&self) -> String {
        match self {
            RegionValue::Text(s) => s.trim().to_lowercase(),
            RegionValue::Number(n) => format_number(*n),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, RegionValue::Number(_))
    }
}

impl fmt::Display for RegionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for RegionValue {
    fn from(s: &str) -> Self {
        RegionValue::Text(s.to_string())
    }
}

impl From<String> for RegionValue {
    fn from(s: String) -> Self {
        RegionValue::Text(s)
    }
}

impl From<f64> for RegionValue {
    fn from(n: f64) -> Self {
        RegionValue::Number(n)
    }
}

impl From<i64> for RegionValue {
    fn from(n: i64) -> Self {
        RegionValue::Number(n as f64)
    }
}

impl From<i32> for RegionValue {
    fn from(n: i32) -> Self {
        RegionValue::Number(f64::from(n))
    }
}

/// Decimal rendering without locale: integral values have no fraction.
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
