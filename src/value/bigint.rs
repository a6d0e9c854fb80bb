use std::fmt;
use serde::{Deserialize, Serialize};

/// Arbitrary precision integer kept in canonical decimal form.
///
/// The engine never does arithmetic on these; it only validates, compares and
/// moves them across the JSON boundary, so the canonical text is the value.
/// Canonical means: optional leading `-`, no leading zeros, and no `-0`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BigInt(String);

impl BigInt {
    /// Parse decimal digit text. Returns `None` for anything that is not an
    /// optionally signed run of ASCII digits.
    pub fn parse(src: &str) -> Option<Self> {
        let (negative, digits) = match src.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, src),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            return Some(Self("0".to_string()));
        }
        let text = if negative { format!("-{trimmed}") } else { trimmed.to_string() };
        Some(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.starts_with('-')
    }
}

impl From<i64> for BigInt {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<i128> for BigInt {
    fn from(n: i128) -> Self {
        Self(n.to_string())
    }
}

impl TryFrom<String> for BigInt {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("invalid bigint text: {s:?}"))
    }
}

impl From<BigInt> for String {
    fn from(b: BigInt) -> Self {
        b.0
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_leading_zeros_and_negative_zero() {
        assert_eq!(BigInt::parse("000123").unwrap().as_str(), "123");
        assert_eq!(BigInt::parse("-0").unwrap().as_str(), "0");
        assert_eq!(BigInt::parse("-0042").unwrap().as_str(), "-42");
        assert_eq!(BigInt::parse("0").unwrap(), BigInt::from(0i64));
    }

    #[test]
    fn rejects_non_digit_text() {
        assert!(BigInt::parse("").is_none());
        assert!(BigInt::parse("-").is_none());
        assert!(BigInt::parse("12a").is_none());
        assert!(BigInt::parse("1.5").is_none());
        assert!(BigInt::parse("+5").is_none());
    }

    #[test]
    fn keeps_precision_beyond_machine_integers() {
        let big = "123456789012345678901234567890123456789";
        assert_eq!(BigInt::parse(big).unwrap().to_string(), big);
    }
}
