// src/exec.rs
//! Interpreter for compiled functions.
//!
//! Runs [`Code`] bodies against [`Value`]s. Calls between functions are
//! resolved by key against one read-locked snapshot of the registry table,
//! so a call in progress never observes a half-built function set.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::{write_json, write_string, Codec};
use crate::error::RunError;
use crate::ir::{
    Access, Check, Code, Emit, FnKey, Kind, OpKind, PathSegment, Report, Transform,
};
use crate::jit::cache::FnTable;
use crate::value::{is_millis, Value};

// -------------------- public result types --------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathItem {
    Key(String),
    Index(usize),
}

impl From<&str> for PathItem {
    fn from(k: &str) -> Self {
        PathItem::Key(k.to_string())
    }
}

impl From<usize> for PathItem {
    fn from(i: usize) -> Self {
        PathItem::Index(i)
    }
}

/// One validation failure: where, and what was expected there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: Vec<PathItem>,
    pub expected: String,
}

// -------------------- class revivers --------------------

pub type Reviver = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Revivers turn a decoded plain object back into a class instance.
#[derive(Clone, Default)]
pub struct ClassRegistry {
    revivers: HashMap<String, Reviver>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, reviver: impl Fn(Value) -> Value + Send + Sync + 'static) {
        self.revivers.insert(name.into(), Arc::new(reviver));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.revivers.contains_key(name)
    }

    fn revive(&self, name: &str, v: Value) -> Result<Value, RunError> {
        let reviver = self.revivers.get(name).ok_or_else(|| RunError::MissingReviver(name.to_string()))?;
        Ok(reviver(v))
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.revivers.keys().collect();
        names.sort();
        f.debug_struct("ClassRegistry").field("classes", &names).finish()
    }
}

// -------------------- interpreter --------------------

static PLAIN: Emit = Emit::Json;

pub struct Exec<'r> {
    fns: &'r FnTable,
    classes: &'r ClassRegistry,
}

/// Where reported paths start (the caller's path at the call site) and the
/// current values of the loop variables in this function.
#[derive(Default)]
struct ErrFrame {
    prefix: Vec<PathItem>,
    loops: Vec<PathItem>,
}

impl<'r> Exec<'r> {
    pub fn new(fns: &'r FnTable, classes: &'r ClassRegistry) -> Self {
        Self { fns, classes }
    }

    fn code(&self, jit_id: &str, op: OpKind) -> Result<&'r Code, RunError> {
        let key = FnKey::new(jit_id, op);
        self.fns.get(&key).map(|f| &f.code).ok_or_else(|| RunError::MissingFunction(key.to_string()))
    }

    // ---- entry points ------------------------------------------------------

    pub fn run_is_type(&self, key: &FnKey, v: &Value) -> Result<bool, RunError> {
        match self.code(&key.jit_id, OpKind::IsType)? {
            Code::IsType(check) => Ok(self.check(check, v)),
            _ => Err(RunError::MissingFunction(key.to_string())),
        }
    }

    pub fn run_type_errors(&self, key: &FnKey, v: &Value) -> Result<Vec<ValidationError>, RunError> {
        let mut errors = Vec::new();
        match self.code(&key.jit_id, OpKind::TypeErrors)? {
            Code::TypeErrors(body) => self.report(body, v, &mut ErrFrame::default(), &mut errors)?,
            _ => return Err(RunError::MissingFunction(key.to_string())),
        }
        Ok(errors)
    }

    /// Apply an encode or decode function in place.
    pub fn run_transform(&self, key: &FnKey, v: &mut Value) -> Result<(), RunError> {
        match self.code(&key.jit_id, key.op)? {
            Code::JsonEncode(body) | Code::JsonDecode(body) => self.transform(body, v, key.op),
            _ => Err(RunError::MissingFunction(key.to_string())),
        }
    }

    pub fn run_stringify(&self, key: &FnKey, v: &Value) -> Result<String, RunError> {
        let mut out = String::new();
        match self.code(&key.jit_id, OpKind::JsonStringify)? {
            Code::JsonStringify(emit) if self.omits(emit, v) => out.push_str("null"),
            Code::JsonStringify(emit) => self.emit(emit, v, &mut out)?,
            _ => return Err(RunError::MissingFunction(key.to_string())),
        }
        Ok(out)
    }

    // ---- isType ------------------------------------------------------------

    pub fn check(&self, check: &Check, v: &Value) -> bool {
        match check {
            Check::Always => true,
            Check::Is(kind) => is_kind(*kind, v),
            Check::FiniteNumber => matches!(v, Value::Number(n) if n.is_finite()),
            Check::Equals(lit) => lit.matches(v),
            Check::OneOf(lits) => lits.iter().any(|l| l.matches(v)),
            Check::MaxLen(max) => v.array_len().is_some_and(|len| len <= *max),
            Check::All(checks) => checks.iter().all(|c| self.check(c, v)),
            Check::Any(checks) => checks.iter().any(|c| self.check(c, v)),
            Check::At { access, optional, check } => {
                let child = read(v, access);
                (*optional && child.is_undefined()) || self.check(check, child)
            }
            Check::Each { from, check } => match v {
                Value::Array(items) => items.iter().skip(*from).all(|x| self.check(check, x)),
                _ => false,
            },
            Check::EachKey { filter, skip, check } => match v {
                Value::Object(map) => map
                    .iter()
                    .filter(|(k, _)| filter.accepts(k) && !skip.contains(k))
                    .all(|(_, x)| self.check(check, x)),
                _ => false,
            },
            Check::Call(jit_id) => match self.code(jit_id, OpKind::IsType) {
                Ok(Code::IsType(check)) => self.check(check, v),
                _ => {
                    tracing::error!(jit_id = %jit_id, "isType call to a missing function");
                    false
                }
            },
        }
    }

    // ---- typeErrors --------------------------------------------------------

    fn report(
        &self,
        body: &[Report],
        v: &Value,
        frame: &mut ErrFrame,
        errors: &mut Vec<ValidationError>,
    ) -> Result<(), RunError> {
        for stmt in body {
            match stmt {
                Report::Expect { check, path, expected, then } => {
                    if self.check(check, v) {
                        self.report(then, v, frame, errors)?;
                    } else {
                        errors.push(ValidationError { path: resolve(frame, path), expected: expected.clone() });
                    }
                }
                Report::At { access, optional, body } => {
                    let child = read(v, access);
                    if *optional && child.is_undefined() {
                        continue;
                    }
                    self.report(body, child, frame, errors)?;
                }
                Report::Each { from, body } => {
                    if let Value::Array(items) = v {
                        for (i, item) in items.iter().enumerate().skip(*from) {
                            frame.loops.push(PathItem::Index(i));
                            let out = self.report(body, item, frame, errors);
                            frame.loops.pop();
                            out?;
                        }
                    }
                }
                Report::EachKey { filter, skip, body } => {
                    if let Value::Object(map) = v {
                        for (k, item) in map.iter().filter(|(k, _)| filter.accepts(k) && !skip.contains(k)) {
                            frame.loops.push(PathItem::Key(k.clone()));
                            let out = self.report(body, item, frame, errors);
                            frame.loops.pop();
                            out?;
                        }
                    }
                }
                Report::Call { jit_id, path } => match self.code(jit_id, OpKind::TypeErrors)? {
                    Code::TypeErrors(callee) => {
                        let mut inner = ErrFrame { prefix: resolve(frame, path), loops: Vec::new() };
                        self.report(callee, v, &mut inner, errors)?;
                    }
                    _ => return Err(RunError::MissingFunction(format!("{jit_id}:typeErrors"))),
                },
            }
        }
        Ok(())
    }

    // ---- jsonEncode / jsonDecode -------------------------------------------

    fn transform(&self, body: &[Transform], v: &mut Value, op: OpKind) -> Result<(), RunError> {
        for stmt in body {
            match stmt {
                Transform::Encode(codec) => codec.encode(v),
                Transform::Decode(codec) => codec.decode(v)?,
                Transform::At { access, optional, body } => {
                    if let Some(child) = slot(v, access) {
                        if *optional && child.is_undefined() {
                            continue;
                        }
                        self.transform(body, child, op)?;
                    }
                }
                Transform::Absent(access) => {
                    if let Some(child) = slot(v, access) {
                        if matches!(child, Value::Null) {
                            *child = Value::Undefined;
                        }
                    }
                }
                Transform::Each { from, body } => {
                    if let Value::Array(items) = v {
                        for item in items.iter_mut().skip(*from) {
                            self.transform(body, item, op)?;
                        }
                    }
                }
                Transform::EachKey { filter, skip, body } => {
                    if let Value::Object(map) = v {
                        for (k, item) in map.iter_mut() {
                            if filter.accepts(k) && !skip.contains(k) {
                                self.transform(body, item, op)?;
                            }
                        }
                    }
                }
                Transform::Tag { union, arms } => {
                    let index = arms
                        .iter()
                        .position(|arm| self.check(&arm.check, v))
                        .ok_or_else(|| RunError::NoUnionMember(union.clone()))?;
                    self.transform(&arms[index].body, v, op)?;
                    let inner = std::mem::replace(v, Value::Undefined);
                    *v = Value::Array(vec![Value::Number(index as f64), inner]);
                }
                Transform::Untag { arms } => {
                    let (index, mut inner) = untag(v)?;
                    let arm = arms.get(index).ok_or(RunError::BadUnionTag { index, arms: arms.len() })?;
                    self.transform(arm, &mut inner, op)?;
                    *v = inner;
                }
                Transform::Revive(name) => {
                    let plain = std::mem::replace(v, Value::Undefined);
                    *v = self.classes.revive(name, plain)?;
                }
                Transform::Call(jit_id) => match self.code(jit_id, op)? {
                    Code::JsonEncode(callee) | Code::JsonDecode(callee) => self.transform(callee, v, op)?,
                    _ => return Err(RunError::MissingFunction(format!("{jit_id}:{op}"))),
                },
            }
        }
        Ok(())
    }

    // ---- jsonStringify -----------------------------------------------------

    fn emit(&self, emit: &Emit, v: &Value, out: &mut String) -> Result<(), RunError> {
        match emit {
            Emit::Json => write_json(v, out),
            Emit::Encoded(codec) => codec.write_json(v, out),
            Emit::Object { props, index } => {
                let Value::Object(map) = v else { return write_json(v, out) };
                out.push('{');
                let mut first = true;
                for (k, item) in map {
                    let emitter = match props.iter().find(|p| p.name == *k) {
                        Some(p) if p.optional && item.is_undefined() => continue,
                        Some(p) => &p.emit,
                        None => match index {
                            Some(ix) if ix.filter.accepts(k) => ix.emit.as_ref(),
                            _ => &PLAIN,
                        },
                    };
                    if self.omits(emitter, item) {
                        continue;
                    }
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    write_string(k, out);
                    out.push(':');
                    self.emit(emitter, item, out)?;
                }
                out.push('}');
                Ok(())
            }
            Emit::Array { item } => {
                let Value::Array(items) = v else { return write_json(v, out) };
                self.emit_elements(items, |_| item.as_ref(), out)
            }
            Emit::Tuple { elems, rest } => {
                let Value::Array(items) = v else { return write_json(v, out) };
                self.emit_elements(items, |i| elems.get(i).or(rest.as_deref()).unwrap_or(&PLAIN), out)
            }
            Emit::Union { union, arms } => {
                let index = arms
                    .iter()
                    .position(|(check, _)| self.check(check, v))
                    .ok_or_else(|| RunError::NoUnionMember(union.clone()))?;
                let arm = &arms[index].1;
                out.push('[');
                out.push_str(&index.to_string());
                out.push(',');
                if self.omits(arm, v) {
                    out.push_str("null");
                } else {
                    self.emit(arm, v, out)?;
                }
                out.push(']');
                Ok(())
            }
            Emit::Call(jit_id) => match self.code(jit_id, OpKind::JsonStringify)? {
                Code::JsonStringify(callee) => self.emit(callee, v, out),
                _ => Err(RunError::MissingFunction(format!("{jit_id}:jsonStringify"))),
            },
        }
    }

    fn emit_elements<'e>(
        &self,
        items: &[Value],
        emitter_at: impl Fn(usize) -> &'e Emit,
        out: &mut String,
    ) -> Result<(), RunError> {
        out.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let emitter = emitter_at(i);
            if self.omits(emitter, item) {
                out.push_str("null");
            } else {
                self.emit(emitter, item, out)?;
            }
        }
        out.push(']');
        Ok(())
    }

    /// Whether `emitter` produces no text for `v` (JSON drops the slot, or
    /// writes `null` inside arrays).
    fn omits(&self, emitter: &Emit, v: &Value) -> bool {
        if !matches!(v, Value::Undefined | Value::Function(_) | Value::Symbol(_)) {
            return false;
        }
        match emitter {
            Emit::Encoded(Codec::Undefined) => !v.is_undefined(),
            Emit::Encoded(Codec::Symbol) => !matches!(v, Value::Symbol(_)),
            Emit::Union { .. } => false,
            Emit::Call(jit_id) => match self.code(jit_id, OpKind::JsonStringify) {
                Ok(Code::JsonStringify(callee)) => self.omits(callee, v),
                _ => true,
            },
            _ => true,
        }
    }
}

// -------------------- helpers --------------------

fn is_kind(kind: Kind, v: &Value) -> bool {
    match kind {
        Kind::String => matches!(v, Value::String(_)),
        Kind::Boolean => matches!(v, Value::Bool(_)),
        Kind::BigInt => matches!(v, Value::BigInt(_)),
        Kind::Symbol => matches!(v, Value::Symbol(_)),
        Kind::RegExp => matches!(v, Value::RegExp(_)),
        Kind::Date => matches!(v, Value::Date(d) if is_millis(d)),
        Kind::Array => matches!(v, Value::Array(_)),
        Kind::Object => matches!(v, Value::Object(_)),
        Kind::NonPrimitive => matches!(
            v,
            Value::Object(_) | Value::Array(_) | Value::Date(_) | Value::RegExp(_) | Value::Function(_)
        ),
        Kind::Null => matches!(v, Value::Null),
        Kind::Undefined => matches!(v, Value::Undefined),
        Kind::Function => matches!(v, Value::Function(_)),
    }
}

fn read<'v>(v: &'v Value, access: &Access) -> &'v Value {
    match access {
        Access::Prop(name) => v.get(name),
        Access::Index(i) => v.at(*i),
    }
}

fn slot<'v>(v: &'v mut Value, access: &Access) -> Option<&'v mut Value> {
    match access {
        Access::Prop(name) => v.get_mut(name),
        Access::Index(i) => v.at_mut(*i),
    }
}

fn resolve(frame: &ErrFrame, path: &[PathSegment]) -> Vec<PathItem> {
    let mut out = frame.prefix.clone();
    for seg in path {
        out.push(match seg {
            PathSegment::Key(k) => PathItem::Key(k.clone()),
            PathSegment::Index(i) => PathItem::Index(*i),
            PathSegment::Loop(d) => frame.loops.get(*d as usize).cloned().unwrap_or(PathItem::Index(0)),
        });
    }
    out
}

/// Split an encoded `[index, value]` pair.
fn untag(v: &mut Value) -> Result<(usize, Value), RunError> {
    let found = v.type_name();
    let malformed = || RunError::Decode { expected: "union tag", found: found.to_string() };
    let Value::Array(items) = v else { return Err(malformed()) };
    let index = match items.as_slice() {
        [Value::Number(n), _] if *n >= 0.0 && n.fract() == 0.0 => *n as usize,
        _ => return Err(malformed()),
    };
    let inner = items.pop().unwrap_or(Value::Undefined);
    Ok((index, inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EmitProp, JitFn, KeyFilter, TagArm};

    fn table(fns: Vec<JitFn>) -> FnTable {
        fns.into_iter().map(|f| (f.key.clone(), Arc::new(f))).collect()
    }

    #[test]
    fn loop_variables_fill_error_paths() {
        let body = vec![Report::Expect {
            check: Check::Is(Kind::Array),
            path: vec![],
            expected: "array".into(),
            then: vec![Report::Each {
                from: 0,
                body: vec![Report::Expect {
                    check: Check::Is(Kind::String),
                    path: vec![PathSegment::Loop(0)],
                    expected: "string".into(),
                    then: vec![],
                }],
            }],
        }];
        let fns = table(vec![JitFn::new("array<string>", Code::TypeErrors(body))]);
        let classes = ClassRegistry::new();
        let exec = Exec::new(&fns, &classes);
        let key = FnKey::new("array<string>", OpKind::TypeErrors);
        let v = Value::array([Value::from("a"), Value::from(1), Value::from("c")]);
        let errors = exec.run_type_errors(&key, &v).unwrap();
        assert_eq!(errors, vec![ValidationError { path: vec![PathItem::Index(1)], expected: "string".into() }]);
    }

    #[test]
    fn calls_prefix_the_caller_path() {
        let inner = vec![Report::Expect { check: Check::Is(Kind::String), path: vec![], expected: "string".into(), then: vec![] }];
        let outer = vec![Report::Call { jit_id: "inner".into(), path: vec![PathSegment::Key("a".into())] }];
        let fns = table(vec![
            JitFn::new("inner", Code::TypeErrors(inner)),
            JitFn::new("outer", Code::TypeErrors(outer)),
        ]);
        let classes = ClassRegistry::new();
        let exec = Exec::new(&fns, &classes);
        let v = Value::object([("a", Value::from(3))]);
        // The callee sees the caller's value; its paths start at the call path.
        let errors = exec.run_type_errors(&FnKey::new("outer", OpKind::TypeErrors), &v).unwrap();
        assert_eq!(errors[0].path, vec![PathItem::from("a")]);
    }

    #[test]
    fn tag_and_untag_are_inverse() {
        let enc = vec![Transform::Tag {
            union: "u".into(),
            arms: vec![
                TagArm { check: Check::Is(Kind::String), body: vec![] },
                TagArm { check: Check::Is(Kind::BigInt), body: vec![Transform::Encode(Codec::BigInt)] },
            ],
        }];
        let dec = vec![Transform::Untag { arms: vec![vec![], vec![Transform::Decode(Codec::BigInt)]] }];
        let fns = table(vec![JitFn::new("u", Code::JsonEncode(enc)), JitFn::new("u", Code::JsonDecode(dec))]);
        let classes = ClassRegistry::new();
        let exec = Exec::new(&fns, &classes);

        let mut v = Value::bigint(9);
        exec.run_transform(&FnKey::new("u", OpKind::JsonEncode), &mut v).unwrap();
        assert_eq!(v, Value::array([Value::from(1), Value::from("9")]));
        exec.run_transform(&FnKey::new("u", OpKind::JsonDecode), &mut v).unwrap();
        assert_eq!(v, Value::bigint(9));

        let mut bad = Value::array([Value::from(5), Value::Null]);
        assert_eq!(
            exec.run_transform(&FnKey::new("u", OpKind::JsonDecode), &mut bad),
            Err(RunError::BadUnionTag { index: 5, arms: 2 })
        );
    }

    #[test]
    fn stringify_walks_value_key_order() {
        let emit = Emit::Object {
            props: vec![
                EmitProp { name: "at".into(), optional: false, emit: Emit::Encoded(Codec::Date) },
                EmitProp { name: "note".into(), optional: true, emit: Emit::Json },
            ],
            index: Some(crate::ir::EmitIndex { filter: KeyFilter::String, emit: Box::new(Emit::Encoded(Codec::BigInt)) }),
        };
        let fns = table(vec![JitFn::new("o", Code::JsonStringify(emit))]);
        let classes = ClassRegistry::new();
        let exec = Exec::new(&fns, &classes);
        let v = Value::object([
            ("n", Value::bigint(2)),
            ("note", Value::Undefined),
            ("at", Value::date_millis(0).unwrap()),
        ]);
        let text = exec.run_stringify(&FnKey::new("o", OpKind::JsonStringify), &v).unwrap();
        assert_eq!(text, r#"{"n":"2","at":"1970-01-01T00:00:00.000Z"}"#);
    }

    #[test]
    fn revivers_run_after_decoding() {
        let mut classes = ClassRegistry::new();
        classes.register("Point", |v| Value::object([("revived", Value::Bool(true)), ("from", v)]));
        let fns = table(vec![JitFn::new("p", Code::JsonDecode(vec![Transform::Revive("Point".into())]))]);
        let exec = Exec::new(&fns, &classes);
        let mut v = Value::object([("x", Value::from(1))]);
        exec.run_transform(&FnKey::new("p", OpKind::JsonDecode), &mut v).unwrap();
        assert_eq!(v.get("revived"), &Value::Bool(true));
    }
}
