// Strongly-typed IR emitted by the RunType nodes and run by `exec`.
//
// Every compile target has its own fragment type:
//   isType        -> Check      (pure boolean expression)
//   typeErrors    -> Report[]   (statements appending {path, expected})
//   jsonEncode    -> Transform[] (in-place statements; empty = passthrough)
//   jsonDecode    -> Transform[]
//   jsonStringify -> Emit       (expression producing JSON text)
//
// A whole function is a `JitFn`: key + parameter names + body. It is plain
// data so a built function set can be persisted and restored verbatim.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::descriptor::Literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpKind {
    IsType,
    TypeErrors,
    JsonEncode,
    JsonDecode,
    JsonStringify,
}

impl OpKind {
    pub const ALL: [OpKind; 5] = [
        OpKind::IsType,
        OpKind::TypeErrors,
        OpKind::JsonEncode,
        OpKind::JsonDecode,
        OpKind::JsonStringify,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OpKind::IsType => "isType",
            OpKind::TypeErrors => "typeErrors",
            OpKind::JsonEncode => "jsonEncode",
            OpKind::JsonDecode => "jsonDecode",
            OpKind::JsonStringify => "jsonStringify",
        }
    }

    pub fn params(self) -> &'static [&'static str] {
        match self {
            OpKind::TypeErrors => &["v", "path"],
            _ => &["v"],
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cache key: `{jitId}:{op}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FnKey {
    pub jit_id: String,
    pub op: OpKind,
}

impl FnKey {
    pub fn new(jit_id: impl Into<String>, op: OpKind) -> Self {
        Self { jit_id: jit_id.into(), op }
    }
}

impl fmt::Display for FnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.jit_id, self.op)
    }
}

/// How a child is reached from its parent value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    Prop(String),
    Index(usize),
}

/// One step of a literal error path. `Loop(d)` is filled in from the `d`-th
/// enclosing loop variable (element index or key) when the error is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Loop(u8),
}

/// Keys covered by an index signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyFilter {
    String,
    /// Only keys that read as numbers.
    Number,
}

impl KeyFilter {
    pub fn accepts(self, key: &str) -> bool {
        match self {
            KeyFilter::String => true,
            KeyFilter::Number => key.parse::<f64>().is_ok_and(f64::is_finite),
        }
    }
}

/// Runtime kind tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kind {
    String,
    Boolean,
    BigInt,
    Symbol,
    RegExp,
    Date,
    Array,
    /// Plain object (not array, date or regexp).
    Object,
    /// Anything `typeof === "object"` and non-null.
    NonPrimitive,
    Null,
    Undefined,
    Function,
}

// ————————————————————————————————————————————————————————————————————————————
// FRAGMENTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Check {
    Always,
    Is(Kind),
    FiniteNumber,
    Equals(Literal),
    OneOf(Vec<Literal>),
    /// Array length upper bound.
    MaxLen(usize),
    All(Vec<Check>),
    Any(Vec<Check>),
    /// `optional` lets `undefined` pass without evaluating `check`.
    At { access: Access, optional: bool, check: Box<Check> },
    Each { from: usize, check: Box<Check> },
    EachKey { filter: KeyFilter, skip: Vec<String>, check: Box<Check> },
    Call(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Report {
    /// Record `{path, expected}` when `check` fails, otherwise run `then`.
    Expect { check: Check, path: Vec<PathSegment>, expected: String, then: Vec<Report> },
    At { access: Access, optional: bool, body: Vec<Report> },
    Each { from: usize, body: Vec<Report> },
    EachKey { filter: KeyFilter, skip: Vec<String>, body: Vec<Report> },
    /// Cached function call; `path` is appended to the caller's path.
    Call { jit_id: String, path: Vec<PathSegment> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transform {
    Encode(Codec),
    Decode(Codec),
    At { access: Access, optional: bool, body: Vec<Transform> },
    /// `null` at this slot decodes to an omitted (undefined) element.
    Absent(Access),
    Each { from: usize, body: Vec<Transform> },
    EachKey { filter: KeyFilter, skip: Vec<String>, body: Vec<Transform> },
    /// Encode through the first member whose check passes and wrap the
    /// result as `[index, value]`.
    Tag { union: String, arms: Vec<TagArm> },
    /// Inverse of `Tag`: route `[index, value]` to the member's decoder.
    Untag { arms: Vec<Vec<Transform>> },
    /// Hand a decoded plain object to the class reviver of that name.
    Revive(String),
    Call(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagArm {
    pub check: Check,
    pub body: Vec<Transform>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Emit {
    /// Plain JSON text of the current value.
    Json,
    Encoded(Codec),
    /// Walks the value's own keys in order; declared keys use their emitter,
    /// other keys use the index emitter when it accepts them, else plain JSON.
    Object { props: Vec<EmitProp>, index: Option<EmitIndex> },
    Array { item: Box<Emit> },
    Tuple { elems: Vec<Emit>, rest: Option<Box<Emit>> },
    /// Always tagged: `[index, member]`.
    Union { union: String, arms: Vec<(Check, Emit)> },
    Call(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitProp {
    pub name: String,
    pub optional: bool,
    pub emit: Emit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitIndex {
    pub filter: KeyFilter,
    pub emit: Box<Emit>,
}

// ————————————————————————————————————————————————————————————————————————————
// FUNCTIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "body", rename_all = "camelCase")]
pub enum Code {
    IsType(Check),
    TypeErrors(Vec<Report>),
    JsonEncode(Vec<Transform>),
    JsonDecode(Vec<Transform>),
    JsonStringify(Emit),
}

impl Code {
    pub fn op(&self) -> OpKind {
        match self {
            Code::IsType(_) => OpKind::IsType,
            Code::TypeErrors(_) => OpKind::TypeErrors,
            Code::JsonEncode(_) => OpKind::JsonEncode,
            Code::JsonDecode(_) => OpKind::JsonDecode,
            Code::JsonStringify(_) => OpKind::JsonStringify,
        }
    }
}

/// A compiled function as a codifiable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitFn {
    pub key: FnKey,
    pub params: Vec<String>,
    pub code: Code,
}

impl JitFn {
    pub fn new(jit_id: impl Into<String>, code: Code) -> Self {
        let op = code.op();
        Self {
            key: FnKey::new(jit_id, op),
            params: op.params().iter().map(|p| p.to_string()).collect(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_as_id_colon_op() {
        let key = FnKey::new("{a:string}", OpKind::TypeErrors);
        assert_eq!(key.to_string(), "{a:string}:typeErrors");
    }

    #[test]
    fn number_key_filter_accepts_numeric_text_only() {
        assert!(KeyFilter::Number.accepts("12"));
        assert!(KeyFilter::Number.accepts("-1.5"));
        assert!(!KeyFilter::Number.accepts("x1"));
        assert!(!KeyFilter::Number.accepts("NaN"));
        assert!(KeyFilter::String.accepts("anything"));
    }

    #[test]
    fn functions_record_their_parameter_names() {
        let f = JitFn::new("string", Code::TypeErrors(Vec::new()));
        assert_eq!(f.params, ["v", "path"]);
        assert_eq!(f.key.op, OpKind::TypeErrors);
    }
}
