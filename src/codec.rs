//! Reversible JSON encodings for values JSON cannot carry natively.
//!
//! | kind      | encoded form                |
//! |-----------|-----------------------------|
//! | bigint    | decimal digit string        |
//! | symbol    | `"Symbol:" + description`   |
//! | regexp    | `"/source/flags"`           |
//! | Date      | ISO-8601 text, ms precision |
//! | undefined | `null`                      |
//!
//! Encoding only touches values of the expected variant; anything else was
//! already invalid for the type and is left alone. Decoding is strict and
//! reports malformed input as [`RunError::Decode`].
use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::value::{is_millis, iso_string, BigInt, Value};

pub const SYMBOL_PREFIX: &str = "Symbol:";

static REGEXP_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^/(.*)/([dgimsuvy]*)$").expect("static regexp literal pattern")
});

static EXTENDED_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]\d{6})(-\d{2}-\d{2}T[\d:.]+Z)$").expect("static extended year pattern")
});

/// Inverse of [`iso_string`], including the signed six-digit year form.
/// Instants finer than a millisecond are rejected.
pub fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    let parsed = match EXTENDED_YEAR.captures(text) {
        Some(caps) => {
            let year: i32 = caps[1].parse().ok()?;
            if year == 0 && caps[1].starts_with('-') {
                return None;
            }
            // 2000 is a leap year, so Feb 29 parses before the real year is set.
            let base = DateTime::parse_from_rfc3339(&format!("2000{}", &caps[2])).ok()?;
            base.with_timezone(&Utc).with_year(year)?
        }
        None => DateTime::parse_from_rfc3339(text).ok()?.with_timezone(&Utc),
    };
    is_millis(&parsed).then_some(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Codec {
    BigInt,
    Symbol,
    RegExp,
    Date,
    Undefined,
}

impl Codec {
    pub fn name(self) -> &'static str {
        match self {
            Codec::BigInt => "bigint",
            Codec::Symbol => "symbol",
            Codec::RegExp => "regexp",
            Codec::Date => "Date",
            Codec::Undefined => "undefined",
        }
    }

    pub fn encode(self, v: &mut Value) {
        let encoded = match (self, &*v) {
            (Codec::BigInt, Value::BigInt(b)) => Value::String(b.to_string()),
            (Codec::Symbol, Value::Symbol(d)) => Value::String(format!("{SYMBOL_PREFIX}{d}")),
            (Codec::RegExp, Value::RegExp(r)) => Value::String(format!("/{}/{}", r.source, r.flags)),
            (Codec::Date, Value::Date(d)) => Value::String(iso_string(d)),
            (Codec::Undefined, Value::Undefined) => Value::Null,
            _ => return,
        };
        *v = encoded;
    }

    pub fn decode(self, v: &mut Value) -> Result<(), RunError> {
        let decoded = match (self, &*v) {
            (Codec::Undefined, Value::Null) => Value::Undefined,
            (Codec::Undefined, _) => return Ok(()),
            (Codec::BigInt, Value::String(s)) => {
                Value::BigInt(BigInt::parse(s).ok_or_else(|| self.mismatch(v))?)
            }
            (Codec::Symbol, Value::String(s)) => {
                let description = s.strip_prefix(SYMBOL_PREFIX).ok_or_else(|| self.mismatch(v))?;
                Value::Symbol(description.to_string())
            }
            (Codec::RegExp, Value::String(s)) => {
                let caps = REGEXP_LITERAL.captures(s).ok_or_else(|| self.mismatch(v))?;
                Value::regexp(&caps[1], &caps[2])
            }
            (Codec::Date, Value::String(s)) => Value::Date(parse_iso(s).ok_or_else(|| self.mismatch(v))?),
            _ => return Err(self.mismatch(v)),
        };
        *v = decoded;
        Ok(())
    }

    /// Append the encoded form as JSON text.
    pub fn write_json(self, v: &Value, out: &mut String) -> Result<(), RunError> {
        let mut encoded = v.clone();
        self.encode(&mut encoded);
        write_json(&encoded, out)
    }

    fn mismatch(self, found: &Value) -> RunError {
        let found = match found {
            Value::String(s) => format!("string {s:?}"),
            other => other.type_name().to_string(),
        };
        RunError::Decode { expected: self.name(), found }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// JSON TEXT
// ————————————————————————————————————————————————————————————————————————————

/// Append `value` as JSON text with `JSON.stringify` semantics.
/// Top-level undefined, symbols and functions produce `null`.
pub fn write_json(value: &Value, out: &mut String) -> Result<(), RunError> {
    match value {
        Value::Undefined | Value::Function(_) | Value::Symbol(_) | Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(*n, out),
        Value::String(s) => write_string(s, out),
        Value::BigInt(b) => return Err(RunError::BigIntNotSerializable(b.to_string())),
        Value::RegExp(_) => out.push_str("{}"),
        Value::Date(d) => write_string(&iso_string(d), out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut first = true;
            for (k, v) in map {
                if matches!(v, Value::Undefined | Value::Function(_) | Value::Symbol(_)) {
                    continue;
                }
                if !first {
                    out.push(',');
                }
                first = false;
                write_string(k, out);
                out.push(':');
                write_json(v, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

pub fn write_string(s: &str, out: &mut String) {
    // serde_json escapes exactly the characters JSON.stringify does.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

pub fn write_number(n: f64, out: &mut String) {
    if n.is_finite() {
        out.push_str(&js_number_text(n));
    } else {
        out.push_str("null");
    }
}

/// Shortest round-trip decimal text using the ECMAScript `Number::toString`
/// layout rules (plain notation for exponents in `[-7, 21)`, otherwise
/// `d.ddde±x`).
pub fn js_number_text(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n < 0.0 {
        return format!("-{}", js_number_text(-n));
    }
    let sci = format!("{n:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    // value = 0.digits × 10^point
    let point = exp.parse::<i32>().unwrap_or(0) + 1;

    if k <= point && point <= 21 {
        let mut s = digits;
        s.extend(std::iter::repeat_n('0', (point - k) as usize));
        s
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let e = point - 1;
        let sign = if e < 0 { '-' } else { '+' };
        let (head, tail) = digits.split_at(1);
        if tail.is_empty() {
            format!("{head}e{sign}{}", e.abs())
        } else {
            format!("{head}.{tail}e{sign}{}", e.abs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_match_js_layout() {
        let cases: &[(f64, &str)] = &[
            (1.0, "1"),
            (-1.5, "-1.5"),
            (0.1, "0.1"),
            (123456789.0, "123456789"),
            (1e21, "1e+21"),
            (1e20, "100000000000000000000"),
            (1.5e-7, "1.5e-7"),
            (0.000001, "0.000001"),
            (2.5e30, "2.5e+30"),
            (-0.0, "0"),
        ];
        for (n, want) in cases {
            assert_eq!(js_number_text(*n), *want, "formatting {n}");
        }
    }

    #[test]
    fn codecs_reverse_themselves() {
        let samples = [
            (Codec::BigInt, Value::bigint(-42)),
            (Codec::Symbol, Value::symbol("tag")),
            (Codec::RegExp, Value::regexp("a/b+", "gi")),
            (Codec::Date, Value::date_millis(1_700_000_000_123).unwrap()),
            (Codec::Undefined, Value::Undefined),
        ];
        for (codec, original) in samples {
            let mut v = original.clone();
            codec.encode(&mut v);
            assert_ne!(v, original, "{} should change shape", codec.name());
            codec.decode(&mut v).unwrap();
            assert_eq!(v, original);
        }
    }

    #[test]
    fn dates_survive_every_year_range() {
        for ms in [-62_198_755_200_000i64, 0, 253_402_300_799_999, 316_536_681_600_000, 8_000_000_000_000_000] {
            let original = Value::date_millis(ms).unwrap();
            let mut v = original.clone();
            Codec::Date.encode(&mut v);
            Codec::Date.decode(&mut v).unwrap();
            assert_eq!(v, original, "{ms}");
        }
        assert!(parse_iso("+012000-02-29T00:00:00.000Z").is_some());
        assert!(parse_iso("+012001-02-29T00:00:00.000Z").is_none());
        assert!(parse_iso("-000000-01-01T00:00:00.000Z").is_none());
        assert!(parse_iso("2023-11-14T22:13:20.123456Z").is_none());
    }

    #[test]
    fn encoded_forms_are_stable() {
        let mut v = Value::regexp("^x$", "m");
        Codec::RegExp.encode(&mut v);
        assert_eq!(v, Value::from("/^x$/m"));

        let mut v = Value::symbol("");
        Codec::Symbol.encode(&mut v);
        assert_eq!(v, Value::from("Symbol:"));
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        let mut v = Value::from("12x");
        assert!(matches!(Codec::BigInt.decode(&mut v), Err(RunError::Decode { expected: "bigint", .. })));
        let mut v = Value::from("nope");
        assert!(Codec::Symbol.decode(&mut v).is_err());
        let mut v = Value::from(3);
        assert!(Codec::Date.decode(&mut v).is_err());
    }

    #[test]
    fn write_json_skips_undefined_members() {
        let v = Value::object([("a", Value::Undefined), ("b", Value::array([Value::Undefined, Value::from(1)]))]);
        let mut out = String::new();
        write_json(&v, &mut out).unwrap();
        assert_eq!(out, r#"{"b":[null,1]}"#);
    }
}
