//! RunType nodes: the compiled-side view of a type descriptor.
//!
//! One node per reachable descriptor, stored in an arena ([`RunTypes`]) and
//! addressed by [`NodeId`]. Recursive types are ordinary back references into
//! the arena. Nodes come in four families, each in its own module:
//!
//! - [`atomic`]: scalars, literals, enums, `Date`, `never`/`any`/...
//! - [`member`]: single-child wrappers (array, property, tuple member, rest,
//!   index signature, parameter, promise)
//! - [`collection`]: multi-child shapes (object/class, tuple, union)
//! - [`function`]: function-like signatures
//!
//! Every family implements [`CompileRunType`]: one method per compile target
//! plus `mock`.
pub mod atomic;
pub mod collection;
pub mod function;
pub mod member;

use std::collections::HashSet;
use std::fmt;

use crate::descriptor::TypeId;
use crate::error::CompileError;
use crate::ir::{Check, Emit, Report, Transform};
use crate::jit::op::CompileOp;
use crate::mock::MockCtx;
use crate::value::Value;

pub use atomic::Atomic;
pub use collection::Collection;
pub use function::{FnKind, FunctionLike};
pub use member::Member;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum RunType {
    Atomic(Atomic),
    Member(Member),
    Collection(Collection),
    Function(FunctionLike),
}

#[derive(Debug, Clone)]
pub struct RunTypeNode {
    /// Descriptor this node was lowered from.
    pub src: TypeId,
    pub kind: RunType,
    pub type_name: Option<String>,
    /// Structural identity; equal ids compile to equal functions.
    pub jit_id: String,
    /// Reached again from inside its own subtree.
    pub is_circular: bool,
    /// Named type referenced from more than one place.
    pub is_shared: bool,
    pub requires_json_encode: bool,
    pub requires_json_decode: bool,
    pub optional: bool,
    pub readonly: bool,
    /// Nesting height of the smallest finite instance; `None` when every
    /// instance is infinite. Drives mock termination.
    pub min_height: Option<u32>,
    /// Number of references from other nodes.
    pub parents: u32,
}

impl RunTypeNode {
    pub(crate) fn placeholder(src: TypeId) -> Self {
        Self {
            src,
            kind: RunType::Atomic(Atomic::Never),
            type_name: None,
            jit_id: String::new(),
            is_circular: false,
            is_shared: false,
            requires_json_encode: false,
            requires_json_decode: false,
            optional: false,
            readonly: false,
            min_height: None,
            parents: 0,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            RunType::Atomic(a) => a.name(),
            RunType::Member(m) => m.name(),
            RunType::Collection(c) => c.name(),
            RunType::Function(f) => f.kind.name(),
        }
    }

    /// Nodes whose body is worth wrapping in a cached function.
    pub fn has_body(&self) -> bool {
        matches!(self.kind, RunType::Collection(_) | RunType::Member(Member::Array { .. }))
    }

    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            RunType::Atomic(_) => Vec::new(),
            RunType::Member(m) => vec![m.child()],
            RunType::Collection(c) => c.children(),
            RunType::Function(f) => {
                let mut out = f.params.clone();
                out.push(f.ret);
                out
            }
        }
    }
}

/// Arena of lowered nodes for one root type.
#[derive(Debug, Clone)]
pub struct RunTypes {
    pub(crate) nodes: Vec<RunTypeNode>,
    pub(crate) root: NodeId,
}

impl RunTypes {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &RunTypeNode {
        self.node(self.root)
    }

    pub fn node(&self, id: NodeId) -> &RunTypeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &RunTypeNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Whether `null` is an instance of `id`.
    pub fn accepts_null(&self, id: NodeId) -> bool {
        self.accepts_null_from(id, &mut Vec::new())
    }

    fn accepts_null_from(&self, id: NodeId, seen: &mut Vec<NodeId>) -> bool {
        if seen.contains(&id) {
            return false;
        }
        seen.push(id);
        match &self.node(id).kind {
            RunType::Atomic(a) => matches!(a, Atomic::Null | Atomic::Any | Atomic::Unknown),
            RunType::Member(Member::TupleMember { child }) => self.accepts_null_from(*child, seen),
            RunType::Collection(Collection::Union { members }) => {
                members.iter().any(|m| self.accepts_null_from(*m, seen))
            }
            _ => false,
        }
    }

    /// Optional tuple slot whose JSON `null` can only mean "omitted".
    pub(crate) fn null_means_absent(&self, id: NodeId) -> bool {
        self.node(id).optional && !self.accepts_null(id)
    }

    /// Class names reachable from `id`, in the order first reached.
    pub fn class_names(&self, id: NodeId) -> Vec<&str> {
        let mut seen = HashSet::from([id]);
        let mut stack = vec![id];
        let mut out: Vec<&str> = Vec::new();
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if let RunType::Collection(Collection::Object { class: Some(name), .. }) = &node.kind {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            for child in node.children() {
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
        out
    }
}

// ————————————————————————————————————————————————————————————————————————————
// COMPILE CONTRACT
// ————————————————————————————————————————————————————————————————————————————

/// Per-node compile contract. The compile operation positions `cop` at the
/// value this node describes before calling in.
pub trait CompileRunType {
    fn is_type(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Check, CompileError>;
    fn type_errors(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Report>, CompileError>;
    fn json_encode(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError>;
    fn json_decode(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError>;
    fn json_stringify(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Emit, CompileError>;
    fn mock(&self, node: &RunTypeNode, ctx: &mut MockCtx<'_>) -> Result<Value, CompileError>;
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $($arg:expr),*) => {
        match $self {
            RunType::Atomic(x) => x.$method($($arg),*),
            RunType::Member(x) => x.$method($($arg),*),
            RunType::Collection(x) => x.$method($($arg),*),
            RunType::Function(x) => x.$method($($arg),*),
        }
    };
}

impl CompileRunType for RunType {
    fn is_type(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Check, CompileError> {
        dispatch!(self, is_type, node, cop)
    }

    fn type_errors(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Report>, CompileError> {
        dispatch!(self, type_errors, node, cop)
    }

    fn json_encode(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        dispatch!(self, json_encode, node, cop)
    }

    fn json_decode(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        dispatch!(self, json_decode, node, cop)
    }

    fn json_stringify(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Emit, CompileError> {
        dispatch!(self, json_stringify, node, cop)
    }

    fn mock(&self, node: &RunTypeNode, ctx: &mut MockCtx<'_>) -> Result<Value, CompileError> {
        dispatch!(self, mock, node, ctx)
    }
}

/// `All` without the trivially true parts; collapses to the single check or
/// `Always`.
pub(crate) fn all_of(checks: Vec<Check>) -> Check {
    let mut checks: Vec<Check> = checks.into_iter().filter(|c| *c != Check::Always).collect();
    match checks.len() {
        0 => Check::Always,
        1 => checks.remove(0),
        _ => Check::All(checks),
    }
}
