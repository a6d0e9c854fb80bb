//! Dynamic runtime values.
//!
//! Compiled functions operate on [`Value`], a superset of JSON that also
//! carries the shapes JSON cannot represent natively (undefined, bigint,
//! symbols, regular expressions, dates, functions). Objects keep insertion
//! order so stringification matches the order a caller built them in.
pub mod bigint;

use chrono::{DateTime, Datelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::RunError;

pub use bigint::BigInt;

pub type Object = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    BigInt(BigInt),
    /// Symbols are identified by their description.
    Symbol(String),
    RegExp(RegExp),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(Object),
    /// Opaque callable; only its name survives.
    Function(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegExp {
    pub source: String,
    pub flags: String,
}

static UNDEFINED: Value = Value::Undefined;

impl Value {
    /// Name used in diagnostics; follows the engine's kind names.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::BigInt(_) => "bigint",
            Value::Symbol(_) => "symbol",
            Value::RegExp(_) => "regexp",
            Value::Date(_) => "Date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Property read. Missing keys and non-objects read as `undefined`.
    pub fn get(&self, key: &str) -> &Value {
        match self {
            Value::Object(map) => map.get(key).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Element read. Out of range and non-arrays read as `undefined`.
    pub fn at(&self, index: usize) -> &Value {
        match self {
            Value::Array(items) => items.get(index).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Object(map) => map.get_mut(key),
            _ => None,
        }
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Value> {
        match self {
            Value::Array(items) => items.get_mut(index),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    pub fn symbol(description: impl Into<String>) -> Self {
        Value::Symbol(description.into())
    }

    pub fn regexp(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Value::RegExp(RegExp { source: source.into(), flags: flags.into() })
    }

    pub fn bigint(n: i64) -> Self {
        Value::BigInt(BigInt::from(n))
    }

    /// Date from epoch milliseconds; `None` outside chrono's range.
    pub fn date_millis(ms: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(ms).map(Value::Date)
    }

    /// Date truncated to whole milliseconds.
    pub fn date(d: DateTime<Utc>) -> Self {
        match DateTime::from_timestamp_millis(d.timestamp_millis()) {
            Some(ms) => Value::Date(ms),
            None => Value::Date(d),
        }
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    // ————————————————————————————————————————————————————————————————————————
    // JSON BOUNDARY
    // ————————————————————————————————————————————————————————————————————————

    /// Plain mapping from parsed JSON. No revival happens here; that is the
    /// job of a compiled jsonDecode function.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(xs) => Value::Array(xs.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()
            ),
        }
    }

    /// Conversion with `JSON.stringify` semantics: undefined, functions and
    /// symbols vanish from objects and become `null` inside arrays, non-finite
    /// numbers become `null`, dates use ISO text and regexps serialize as `{}`.
    /// A bare bigint cannot be represented and is an error.
    pub fn to_json(&self) -> Result<serde_json::Value, RunError> {
        Ok(self.to_json_slot()?.unwrap_or(serde_json::Value::Null))
    }

    fn to_json_slot(&self) -> Result<Option<serde_json::Value>, RunError> {
        let json = match self {
            Value::Undefined | Value::Function(_) | Value::Symbol(_) => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => json_number(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::BigInt(b) => return Err(RunError::BigIntNotSerializable(b.to_string())),
            Value::RegExp(_) => serde_json::Value::Object(Map::new()),
            Value::Date(d) => serde_json::Value::String(iso_string(d)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_json_slot()?.unwrap_or(serde_json::Value::Null));
                }
                serde_json::Value::Array(out)
            }
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    if let Some(json) = v.to_json_slot()? {
                        out.insert(k.clone(), json);
                    }
                }
                serde_json::Value::Object(out)
            }
        };
        Ok(Some(json))
    }
}

/// ISO-8601 text with millisecond precision and a `Z` suffix. Years outside
/// `0..=9999` use the signed six-digit form (`+012000-01-01T00:00:00.000Z`).
pub fn iso_string(d: &DateTime<Utc>) -> String {
    let rest = d.format("-%m-%dT%H:%M:%S%.3fZ");
    match d.year() {
        year @ 0..=9999 => format!("{year:04}{rest}"),
        year => {
            let sign = if year < 0 { '-' } else { '+' };
            format!("{sign}{:06}{rest}", year.unsigned_abs())
        }
    }
}

/// Whether `d` is representable as a `Date`: whole milliseconds only.
pub fn is_millis(d: &DateTime<Utc>) -> bool {
    d.timestamp_subsec_nanos() % 1_000_000 == 0
}

// Integral values go out as integers so `1` does not become `1.0`.
fn json_number(n: f64) -> serde_json::Value {
    const SAFE: f64 = 9_007_199_254_740_992.0;
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= SAFE {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<BigInt> for Value {
    fn from(b: BigInt) -> Self {
        Value::BigInt(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_json_follows_stringify_rules() {
        let v = Value::object([
            ("a", Value::Undefined),
            ("b", Value::array([Value::Undefined, Value::Number(f64::NAN), Value::from(2.5)])),
            ("c", Value::symbol("x")),
            ("d", Value::regexp("a+", "g")),
            ("e", Value::from(3)),
        ]);
        assert_eq!(v.to_json().unwrap(), json!({"b": [null, null, 2.5], "d": {}, "e": 3}));
    }

    #[test]
    fn bigint_has_no_plain_json_form() {
        let v = Value::array([Value::bigint(7)]);
        assert!(matches!(v.to_json(), Err(RunError::BigIntNotSerializable(_))));
    }

    #[test]
    fn dates_serialize_as_iso_text() {
        let v = Value::date_millis(0).unwrap();
        assert_eq!(v.to_json().unwrap(), json!("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn far_years_use_six_digit_text() {
        let d = DateTime::parse_from_rfc3339("9999-12-31T23:59:59.999Z").unwrap().with_timezone(&Utc);
        assert_eq!(iso_string(&d), "9999-12-31T23:59:59.999Z");
        let d = d.with_year(12000).unwrap();
        assert_eq!(iso_string(&d), "+012000-12-31T23:59:59.999Z");
        let d = d.with_year(-5).unwrap();
        assert_eq!(iso_string(&d), "-000005-12-31T23:59:59.999Z");
    }

    #[test]
    fn dates_truncate_to_milliseconds() {
        let fine = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        assert!(!is_millis(&fine));
        let v = Value::date(fine);
        assert_eq!(v, Value::date_millis(1_700_000_000_123).unwrap());
    }

    #[test]
    fn from_json_preserves_key_order() {
        let v = Value::from_json(json!({"z": 1, "a": 2}));
        let Value::Object(map) = v else { panic!("expected object") };
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a"]);
    }

    #[test]
    fn missing_reads_are_undefined() {
        let v = Value::from_json(json!({"a": [1]}));
        assert!(v.get("nope").is_undefined());
        assert!(v.get("a").at(3).is_undefined());
        assert!(Value::Null.get("a").is_undefined());
    }
}
