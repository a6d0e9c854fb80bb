//! Type descriptors: the reflected, structural description of declared types.
//!
//! Descriptors arrive from a reflection step outside this crate as an arena
//! ([`TypeGraph`]) whose nodes reference each other by [`TypeId`]. Referencing
//! by id is what lets a graph describe recursive types (`type T = { next?: T }`)
//! without ownership cycles. The graph is read-only input to the engine; the
//! builder helpers below exist for callers (and tests) that assemble graphs
//! by hand.
//!
//! JSON form (`serde`):
//!
//! ```json
//! { "roots": { "User": 2 },
//!   "nodes": [ { "kind": "string" },
//!              { "kind": "property", "name": "id", "ty": 0 },
//!              { "kind": "objectLiteral", "members": [1], "typeName": "User" } ] }
//! ```
use std::fmt;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::value::{BigInt, RegExp, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    #[serde(flatten)]
    pub kind: TypeKind,
    /// Declared alias / interface name, when the type had one.
    #[serde(default, rename = "typeName", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeKind {
    Never,
    Any,
    Unknown,
    Void,
    Object,
    String,
    Number,
    Boolean,
    Symbol,
    Bigint,
    Null,
    Undefined,
    Regexp,
    Literal { value: Literal },
    Array { item: TypeId },
    /// Members are `tupleMember` nodes.
    Tuple { members: Vec<TypeId> },
    TupleMember {
        ty: TypeId,
        #[serde(default)]
        optional: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// `...T[]` inside a tuple or parameter list; `ty` is the element type.
    Rest { ty: TypeId },
    /// Members are `property`, `indexSignature`, `method` or
    /// `methodSignature` nodes.
    ObjectLiteral { members: Vec<TypeId> },
    Property {
        name: String,
        ty: TypeId,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        readonly: bool,
    },
    IndexSignature { key: TypeId, ty: TypeId },
    Union { members: Vec<TypeId> },
    Intersection { members: Vec<TypeId> },
    Function {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        params: Vec<TypeId>,
        ret: TypeId,
    },
    Method {
        name: String,
        params: Vec<TypeId>,
        ret: TypeId,
        #[serde(default)]
        optional: bool,
    },
    MethodSignature {
        name: String,
        params: Vec<TypeId>,
        ret: TypeId,
        #[serde(default)]
        optional: bool,
    },
    CallSignature { params: Vec<TypeId>, ret: TypeId },
    /// A rest parameter has a `rest` node as its type.
    Parameter {
        name: String,
        ty: TypeId,
        #[serde(default)]
        optional: bool,
    },
    Promise { ty: TypeId },
    /// Members are `enumMember` nodes.
    Enum { members: Vec<TypeId> },
    EnumMember { name: String, value: Literal },
    /// Class instances. The class named `Date` is the native date.
    Class {
        name: String,
        #[serde(default)]
        members: Vec<TypeId>,
    },
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Never => "never",
            TypeKind::Any => "any",
            TypeKind::Unknown => "unknown",
            TypeKind::Void => "void",
            TypeKind::Object => "object",
            TypeKind::String => "string",
            TypeKind::Number => "number",
            TypeKind::Boolean => "boolean",
            TypeKind::Symbol => "symbol",
            TypeKind::Bigint => "bigint",
            TypeKind::Null => "null",
            TypeKind::Undefined => "undefined",
            TypeKind::Regexp => "regexp",
            TypeKind::Literal { .. } => "literal",
            TypeKind::Array { .. } => "array",
            TypeKind::Tuple { .. } => "tuple",
            TypeKind::TupleMember { .. } => "tupleMember",
            TypeKind::Rest { .. } => "rest",
            TypeKind::ObjectLiteral { .. } => "objectLiteral",
            TypeKind::Property { .. } => "property",
            TypeKind::IndexSignature { .. } => "indexSignature",
            TypeKind::Union { .. } => "union",
            TypeKind::Intersection { .. } => "intersection",
            TypeKind::Function { .. } => "function",
            TypeKind::Method { .. } => "method",
            TypeKind::MethodSignature { .. } => "methodSignature",
            TypeKind::CallSignature { .. } => "callSignature",
            TypeKind::Parameter { .. } => "parameter",
            TypeKind::Promise { .. } => "promise",
            TypeKind::Enum { .. } => "enum",
            TypeKind::EnumMember { .. } => "enumMember",
            TypeKind::Class { .. } => "class",
        }
    }

    pub fn is_function_like(&self) -> bool {
        matches!(
            self,
            TypeKind::Function { .. }
                | TypeKind::Method { .. }
                | TypeKind::MethodSignature { .. }
                | TypeKind::CallSignature { .. }
        )
    }

    /// Child references in canonical (declaration) order.
    pub fn children(&self) -> Vec<TypeId> {
        match self {
            TypeKind::Array { item } => vec![*item],
            TypeKind::TupleMember { ty, .. }
            | TypeKind::Rest { ty }
            | TypeKind::Property { ty, .. }
            | TypeKind::Parameter { ty, .. }
            | TypeKind::Promise { ty } => vec![*ty],
            TypeKind::IndexSignature { key, ty } => vec![*key, *ty],
            TypeKind::Tuple { members }
            | TypeKind::ObjectLiteral { members }
            | TypeKind::Union { members }
            | TypeKind::Intersection { members }
            | TypeKind::Enum { members }
            | TypeKind::Class { members, .. } => members.clone(),
            TypeKind::Function { params, ret, .. }
            | TypeKind::Method { params, ret, .. }
            | TypeKind::MethodSignature { params, ret, .. }
            | TypeKind::CallSignature { params, ret } => {
                let mut out = params.clone();
                out.push(*ret);
                out
            }
            _ => Vec::new(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LITERALS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Literal {
    String(String),
    Number(OrderedFloat<f64>),
    Boolean(bool),
    Bigint(BigInt),
    /// Symbol literals compare by description.
    Symbol(String),
    /// Regexp literals compare by source and flags.
    Regexp(RegExp),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Number(n) => Value::Number(n.0),
            Literal::Boolean(b) => Value::Bool(*b),
            Literal::Bigint(b) => Value::BigInt(b.clone()),
            Literal::Symbol(d) => Value::Symbol(d.clone()),
            Literal::Regexp(r) => Value::RegExp(r.clone()),
        }
    }

    pub fn matches(&self, v: &Value) -> bool {
        match (self, v) {
            (Literal::String(a), Value::String(b)) => a == b,
            (Literal::Number(a), Value::Number(b)) => a.0 == *b,
            (Literal::Boolean(a), Value::Bool(b)) => a == b,
            (Literal::Bigint(a), Value::BigInt(b)) => a == b,
            (Literal::Symbol(a), Value::Symbol(b)) => a == b,
            (Literal::Regexp(a), Value::RegExp(b)) => a == b,
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Number(_) => "number",
            Literal::Boolean(_) => "boolean",
            Literal::Bigint(_) => "bigint",
            Literal::Symbol(_) => "symbol",
            Literal::Regexp(_) => "regexp",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Number(n) => f.write_str(&crate::codec::js_number_text(n.0)),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Bigint(b) => write!(f, "{b}n"),
            Literal::Symbol(d) => write!(f, "Symbol({d:?})"),
            Literal::Regexp(r) => write!(f, "/{}/{}", r.source, r.flags),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Number(OrderedFloat(n))
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// GRAPH
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeGraph {
    pub nodes: Vec<TypeNode>,
    #[serde(default)]
    pub roots: IndexMap<String, TypeId>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(TypeNode { kind, type_name: None });
        id
    }

    /// Allocate an id to be filled in later with [`TypeGraph::define`];
    /// this is how self-referential types are assembled.
    pub fn reserve(&mut self) -> TypeId {
        self.add(TypeKind::Never)
    }

    pub fn define(&mut self, id: TypeId, kind: TypeKind) {
        if let Some(node) = self.nodes.get_mut(id.0 as usize) {
            node.kind = kind;
        }
    }

    pub fn named(&mut self, id: TypeId, name: impl Into<String>) -> TypeId {
        if let Some(node) = self.nodes.get_mut(id.0 as usize) {
            node.type_name = Some(name.into());
        }
        id
    }

    pub fn set_root(&mut self, name: impl Into<String>, id: TypeId) {
        self.roots.insert(name.into(), id);
    }

    pub fn get(&self, id: TypeId) -> Result<&TypeNode, CompileError> {
        self.nodes.get(id.0 as usize).ok_or(CompileError::DanglingType(id))
    }

    pub fn root(&self, name: &str) -> Result<TypeId, CompileError> {
        self.roots.get(name).copied().ok_or_else(|| CompileError::UnknownRoot(name.to_string()))
    }

    /// Every referenced id must exist.
    pub fn validate(&self) -> Result<(), CompileError> {
        for node in &self.nodes {
            for child in node.kind.children() {
                self.get(child)?;
            }
        }
        for id in self.roots.values() {
            self.get(*id)?;
        }
        Ok(())
    }

    // ---- builder helpers ---------------------------------------------------

    pub fn string(&mut self) -> TypeId { self.add(TypeKind::String) }
    pub fn number(&mut self) -> TypeId { self.add(TypeKind::Number) }
    pub fn boolean(&mut self) -> TypeId { self.add(TypeKind::Boolean) }
    pub fn bigint(&mut self) -> TypeId { self.add(TypeKind::Bigint) }
    pub fn symbol(&mut self) -> TypeId { self.add(TypeKind::Symbol) }
    pub fn regexp(&mut self) -> TypeId { self.add(TypeKind::Regexp) }
    pub fn null(&mut self) -> TypeId { self.add(TypeKind::Null) }
    pub fn undefined(&mut self) -> TypeId { self.add(TypeKind::Undefined) }
    pub fn void(&mut self) -> TypeId { self.add(TypeKind::Void) }
    pub fn any(&mut self) -> TypeId { self.add(TypeKind::Any) }
    pub fn unknown(&mut self) -> TypeId { self.add(TypeKind::Unknown) }
    pub fn never(&mut self) -> TypeId { self.add(TypeKind::Never) }
    pub fn object_keyword(&mut self) -> TypeId { self.add(TypeKind::Object) }

    pub fn date(&mut self) -> TypeId {
        self.add(TypeKind::Class { name: "Date".to_string(), members: Vec::new() })
    }

    pub fn literal(&mut self, value: impl Into<Literal>) -> TypeId {
        self.add(TypeKind::Literal { value: value.into() })
    }

    pub fn array(&mut self, item: TypeId) -> TypeId {
        self.add(TypeKind::Array { item })
    }

    pub fn tuple_member(&mut self, ty: TypeId, optional: bool) -> TypeId {
        self.add(TypeKind::TupleMember { ty, optional, name: None })
    }

    pub fn rest(&mut self, element: TypeId) -> TypeId {
        self.add(TypeKind::Rest { ty: element })
    }

    /// Tuple of required positions.
    pub fn tuple(&mut self, elements: &[TypeId]) -> TypeId {
        let members = elements.iter().map(|ty| self.tuple_member(*ty, false)).collect();
        self.add(TypeKind::Tuple { members })
    }

    pub fn prop(&mut self, name: &str, ty: TypeId) -> TypeId {
        self.add(TypeKind::Property { name: name.to_string(), ty, optional: false, readonly: false })
    }

    pub fn optional_prop(&mut self, name: &str, ty: TypeId) -> TypeId {
        self.add(TypeKind::Property { name: name.to_string(), ty, optional: true, readonly: false })
    }

    pub fn index_signature(&mut self, key: TypeId, ty: TypeId) -> TypeId {
        self.add(TypeKind::IndexSignature { key, ty })
    }

    pub fn object(&mut self, members: &[TypeId]) -> TypeId {
        self.add(TypeKind::ObjectLiteral { members: members.to_vec() })
    }

    pub fn union(&mut self, members: &[TypeId]) -> TypeId {
        self.add(TypeKind::Union { members: members.to_vec() })
    }

    pub fn promise(&mut self, ty: TypeId) -> TypeId {
        self.add(TypeKind::Promise { ty })
    }

    pub fn param(&mut self, name: &str, ty: TypeId) -> TypeId {
        self.add(TypeKind::Parameter { name: name.to_string(), ty, optional: false })
    }

    pub fn optional_param(&mut self, name: &str, ty: TypeId) -> TypeId {
        self.add(TypeKind::Parameter { name: name.to_string(), ty, optional: true })
    }

    pub fn rest_param(&mut self, name: &str, element: TypeId) -> TypeId {
        let rest = self.rest(element);
        self.param(name, rest)
    }

    pub fn function(&mut self, params: &[TypeId], ret: TypeId) -> TypeId {
        self.add(TypeKind::Function { name: None, params: params.to_vec(), ret })
    }

    pub fn enumeration(&mut self, members: &[(&str, Literal)]) -> TypeId {
        let members = members
            .iter()
            .map(|(name, value)| self.add(TypeKind::EnumMember { name: name.to_string(), value: value.clone() }))
            .collect();
        self.add(TypeKind::Enum { members })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn graph_round_trips_through_json() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let id = g.prop("id", s);
        let user = g.object(&[id]);
        g.named(user, "User");
        g.set_root("User", user);

        let text = serde_json::to_value(&g).unwrap();
        assert_eq!(text["nodes"][1], json!({"kind": "property", "name": "id", "ty": 0, "optional": false, "readonly": false}));
        assert_eq!(text["nodes"][2]["typeName"], json!("User"));
        let back: TypeGraph = serde_json::from_value(text).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn literals_use_adjacent_tagging() {
        let lit: Literal = serde_json::from_value(json!({"type": "bigint", "value": "0012"})).unwrap();
        assert_eq!(lit, Literal::Bigint(BigInt::parse("12").unwrap()));
        assert!(lit.matches(&Value::bigint(12)));
        assert!(!lit.matches(&Value::from(12)));
    }

    #[test]
    fn dangling_ids_are_rejected() {
        let mut g = TypeGraph::new();
        g.array(TypeId(9));
        assert_eq!(g.validate(), Err(CompileError::DanglingType(TypeId(9))));
    }

    #[test]
    fn recursive_types_are_assembled_with_reserve() {
        let mut g = TypeGraph::new();
        let node = g.reserve();
        let next = g.optional_prop("next", node);
        g.define(node, TypeKind::ObjectLiteral { members: vec![next] });
        assert!(g.validate().is_ok());
        assert_eq!(g.get(node).unwrap().kind.children(), vec![next]);
    }
}
