//! Leaf types: keywords, literals, enums and `Date`.
use chrono::DateTime;

use crate::codec::Codec;
use crate::descriptor::Literal;
use crate::error::CompileError;
use crate::ir::{Check, Emit, Kind, Report, Transform};
use crate::jit::op::CompileOp;
use crate::mock::MockCtx;
use crate::runtype::{CompileRunType, RunTypeNode};
use crate::value::{BigInt, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Atomic {
    Never,
    Any,
    Unknown,
    Void,
    /// The `object` keyword: any non-primitive.
    Object,
    String,
    Number,
    Boolean,
    Symbol,
    BigInt,
    Null,
    Undefined,
    RegExp,
    Date,
    Literal(Literal),
    /// `(member name, value)` in declaration order.
    Enum(Vec<(String, Literal)>),
}

impl Atomic {
    pub fn name(&self) -> &'static str {
        match self {
            Atomic::Never => "never",
            Atomic::Any => "any",
            Atomic::Unknown => "unknown",
            Atomic::Void => "void",
            Atomic::Object => "object",
            Atomic::String => "string",
            Atomic::Number => "number",
            Atomic::Boolean => "boolean",
            Atomic::Symbol => "symbol",
            Atomic::BigInt => "bigint",
            Atomic::Null => "null",
            Atomic::Undefined => "undefined",
            Atomic::RegExp => "regexp",
            Atomic::Date => "Date",
            Atomic::Literal(_) => "literal",
            Atomic::Enum(_) => "enum",
        }
    }

    /// Text used for `expected` in validation errors.
    pub fn expected(&self) -> String {
        match self {
            Atomic::Literal(lit) => lit.to_string(),
            other => other.name().to_string(),
        }
    }

    /// The codec that carries this type through JSON, if plain JSON cannot.
    pub fn codec(&self) -> Option<Codec> {
        match self {
            Atomic::BigInt => Some(Codec::BigInt),
            Atomic::Symbol => Some(Codec::Symbol),
            Atomic::RegExp => Some(Codec::RegExp),
            Atomic::Date => Some(Codec::Date),
            Atomic::Void | Atomic::Undefined => Some(Codec::Undefined),
            Atomic::Literal(lit) => literal_codec(lit),
            _ => None,
        }
    }

    fn check(&self, cop: &CompileOp<'_>) -> Result<Check, CompileError> {
        let check = match self {
            Atomic::Never => return Err(cop.never()),
            Atomic::Any | Atomic::Unknown => Check::Always,
            Atomic::Void | Atomic::Undefined => Check::Is(Kind::Undefined),
            Atomic::Object => Check::Is(Kind::NonPrimitive),
            Atomic::String => Check::Is(Kind::String),
            Atomic::Number => Check::FiniteNumber,
            Atomic::Boolean => Check::Is(Kind::Boolean),
            Atomic::Symbol => Check::Is(Kind::Symbol),
            Atomic::BigInt => Check::Is(Kind::BigInt),
            Atomic::Null => Check::Is(Kind::Null),
            Atomic::RegExp => Check::Is(Kind::RegExp),
            Atomic::Date => Check::Is(Kind::Date),
            Atomic::Literal(lit) => Check::Equals(lit.clone()),
            Atomic::Enum(members) => Check::OneOf(members.iter().map(|(_, v)| v.clone()).collect()),
        };
        Ok(check)
    }
}

pub(crate) fn literal_codec(lit: &Literal) -> Option<Codec> {
    match lit {
        Literal::Bigint(_) => Some(Codec::BigInt),
        Literal::Symbol(_) => Some(Codec::Symbol),
        Literal::Regexp(_) => Some(Codec::RegExp),
        _ => None,
    }
}

impl CompileRunType for Atomic {
    fn is_type(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Check, CompileError> {
        self.check(cop)
    }

    fn type_errors(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Report>, CompileError> {
        let check = self.check(cop)?;
        if check == Check::Always {
            return Ok(Vec::new());
        }
        Ok(vec![Report::Expect { check, path: cop.path(), expected: self.expected(), then: Vec::new() }])
    }

    fn json_encode(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        if *self == Atomic::Never {
            return Err(cop.never());
        }
        Ok(self.codec().map(Transform::Encode).into_iter().collect())
    }

    fn json_decode(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        if *self == Atomic::Never {
            return Err(cop.never());
        }
        Ok(self.codec().map(Transform::Decode).into_iter().collect())
    }

    fn json_stringify(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Emit, CompileError> {
        if *self == Atomic::Never {
            return Err(cop.never());
        }
        Ok(self.codec().map_or(Emit::Json, Emit::Encoded))
    }

    fn mock(&self, _node: &RunTypeNode, ctx: &mut MockCtx<'_>) -> Result<Value, CompileError> {
        let value = match self {
            Atomic::Never => return Err(ctx.uninhabited()),
            Atomic::Any | Atomic::Unknown => match ctx.rng().u8(0..4) {
                0 => Value::Null,
                1 => Value::Bool(ctx.rng().bool()),
                2 => Value::Number(ctx.number()),
                _ => Value::String(ctx.string()),
            },
            Atomic::Void | Atomic::Undefined => Value::Undefined,
            Atomic::Object => Value::object([("key", Value::String(ctx.string()))]),
            Atomic::String => Value::String(ctx.string()),
            Atomic::Number => Value::Number(ctx.number()),
            Atomic::Boolean => Value::Bool(ctx.rng().bool()),
            Atomic::Symbol => Value::Symbol(ctx.string()),
            Atomic::BigInt => Value::BigInt(BigInt::from(ctx.rng().i64(..))),
            Atomic::Null => Value::Null,
            Atomic::RegExp => {
                let (source, flags) = SAMPLE_PATTERNS[ctx.rng().usize(..SAMPLE_PATTERNS.len())];
                Value::regexp(source, flags)
            }
            Atomic::Date => {
                let ms = ctx.rng().i64(0..LATEST_MOCK_DATE_MS);
                Value::Date(DateTime::from_timestamp_millis(ms).unwrap_or_default())
            }
            Atomic::Literal(lit) => lit.to_value(),
            Atomic::Enum(members) => {
                if members.is_empty() {
                    return Err(ctx.uninhabited());
                }
                members[ctx.rng().usize(..members.len())].1.to_value()
            }
        };
        Ok(value)
    }
}

// 2100-01-01T00:00:00Z
const LATEST_MOCK_DATE_MS: i64 = 4_102_444_800_000;

const SAMPLE_PATTERNS: &[(&str, &str)] = &[
    ("^[a-z]+$", "i"),
    ("\\d{3}-\\d{4}", ""),
    ("a/b", "g"),
    ("(foo|bar)+", "gm"),
    ("", ""),
];
