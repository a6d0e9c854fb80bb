//! The compile operation: walks RunType nodes for one target and stitches
//! their fragments together.
//!
//! A [`CompileOp`] carries everything a node needs while it compiles: the
//! arena, the value path relative to the function currently being built, the
//! loop nesting, the set of functions mid-definition and the functions
//! defined so far in this build. Circular and shared nodes are compiled into
//! their own function (defined once, keyed `jitId:op`) and referenced with a
//! call; everything else is inlined.
use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::CompileError;
use crate::exec::ClassRegistry;
use crate::ir::{Access, Check, Code, Emit, FnKey, JitFn, OpKind, PathSegment, Report, Transform};
use crate::jit::cache::JitRegistry;
use crate::render::path_text;
use crate::runtype::{CompileRunType, NodeId, RunTypeNode, RunTypes};

// -------------------- targets --------------------

/// One compile target. The generic walk in [`CompileOp`] is written once and
/// instantiated per target.
pub trait Target {
    const OP: OpKind;
    type Fragment;

    /// Fragment to use without visiting the node at all.
    fn passthrough(node: &RunTypeNode) -> Option<Self::Fragment>;
    fn compile(node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Self::Fragment, CompileError>;
    fn call(jit_id: &str, cop: &CompileOp<'_>) -> Self::Fragment;
    fn into_code(fragment: Self::Fragment) -> Code;
}

pub struct IsType;
pub struct TypeErrors;
pub struct JsonEncode;
pub struct JsonDecode;
pub struct JsonStringify;

impl Target for IsType {
    const OP: OpKind = OpKind::IsType;
    type Fragment = Check;

    fn passthrough(_: &RunTypeNode) -> Option<Check> {
        None
    }

    fn compile(node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Check, CompileError> {
        node.kind.is_type(node, cop)
    }

    fn call(jit_id: &str, _: &CompileOp<'_>) -> Check {
        Check::Call(jit_id.to_string())
    }

    fn into_code(fragment: Check) -> Code {
        Code::IsType(fragment)
    }
}

impl Target for TypeErrors {
    const OP: OpKind = OpKind::TypeErrors;
    type Fragment = Vec<Report>;

    fn passthrough(_: &RunTypeNode) -> Option<Vec<Report>> {
        None
    }

    fn compile(node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Report>, CompileError> {
        node.kind.type_errors(node, cop)
    }

    fn call(jit_id: &str, cop: &CompileOp<'_>) -> Vec<Report> {
        vec![Report::Call { jit_id: jit_id.to_string(), path: cop.path() }]
    }

    fn into_code(fragment: Vec<Report>) -> Code {
        Code::TypeErrors(fragment)
    }
}

impl Target for JsonEncode {
    const OP: OpKind = OpKind::JsonEncode;
    type Fragment = Vec<Transform>;

    fn passthrough(node: &RunTypeNode) -> Option<Vec<Transform>> {
        (!node.requires_json_encode).then(Vec::new)
    }

    fn compile(node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        node.kind.json_encode(node, cop)
    }

    fn call(jit_id: &str, _: &CompileOp<'_>) -> Vec<Transform> {
        vec![Transform::Call(jit_id.to_string())]
    }

    fn into_code(fragment: Vec<Transform>) -> Code {
        Code::JsonEncode(fragment)
    }
}

impl Target for JsonDecode {
    const OP: OpKind = OpKind::JsonDecode;
    type Fragment = Vec<Transform>;

    fn passthrough(node: &RunTypeNode) -> Option<Vec<Transform>> {
        (!node.requires_json_decode).then(Vec::new)
    }

    fn compile(node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        node.kind.json_decode(node, cop)
    }

    fn call(jit_id: &str, _: &CompileOp<'_>) -> Vec<Transform> {
        vec![Transform::Call(jit_id.to_string())]
    }

    fn into_code(fragment: Vec<Transform>) -> Code {
        Code::JsonDecode(fragment)
    }
}

impl Target for JsonStringify {
    const OP: OpKind = OpKind::JsonStringify;
    type Fragment = Emit;

    fn passthrough(node: &RunTypeNode) -> Option<Emit> {
        (!node.requires_json_encode).then_some(Emit::Json)
    }

    fn compile(node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Emit, CompileError> {
        node.kind.json_stringify(node, cop)
    }

    fn call(jit_id: &str, _: &CompileOp<'_>) -> Emit {
        Emit::Call(jit_id.to_string())
    }

    fn into_code(fragment: Emit) -> Code {
        Code::JsonStringify(fragment)
    }
}

// -------------------- compile op --------------------

#[derive(Debug, Clone)]
enum Step {
    Access(Access),
    Loop,
}

pub struct CompileOp<'a> {
    rts: &'a RunTypes,
    registry: &'a JitRegistry,
    classes: &'a ClassRegistry,
    max_depth: usize,
    share_named: bool,
    /// One frame per function under construction; paths restart per function.
    frames: Vec<Vec<Step>>,
    ops: Vec<OpKind>,
    depth: usize,
    defining: HashSet<FnKey>,
    defined: IndexMap<FnKey, JitFn>,
}

impl<'a> CompileOp<'a> {
    pub fn new(
        rts: &'a RunTypes,
        registry: &'a JitRegistry,
        classes: &'a ClassRegistry,
        max_depth: usize,
        share_named: bool,
    ) -> Self {
        Self {
            rts,
            registry,
            classes,
            max_depth,
            share_named,
            frames: vec![Vec::new()],
            ops: Vec::new(),
            depth: 0,
            defining: HashSet::new(),
            defined: IndexMap::new(),
        }
    }

    pub fn run_types(&self) -> &'a RunTypes {
        self.rts
    }

    pub fn node(&self, id: NodeId) -> &'a RunTypeNode {
        self.rts.node(id)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    /// Target currently being compiled.
    pub fn op(&self) -> OpKind {
        self.ops.last().copied().unwrap_or(OpKind::IsType)
    }

    // ---- child compilation -------------------------------------------------

    pub fn is_type(&mut self, id: NodeId) -> Result<Check, CompileError> {
        self.visit::<IsType>(id)
    }

    pub fn type_errors(&mut self, id: NodeId) -> Result<Vec<Report>, CompileError> {
        self.visit::<TypeErrors>(id)
    }

    pub fn json_encode(&mut self, id: NodeId) -> Result<Vec<Transform>, CompileError> {
        self.visit::<JsonEncode>(id)
    }

    pub fn json_decode(&mut self, id: NodeId) -> Result<Vec<Transform>, CompileError> {
        self.visit::<JsonDecode>(id)
    }

    pub fn json_stringify(&mut self, id: NodeId) -> Result<Emit, CompileError> {
        self.visit::<JsonStringify>(id)
    }

    /// Compile `f` one property or element deeper.
    pub fn at<R>(
        &mut self,
        access: Access,
        f: impl FnOnce(&mut Self) -> Result<R, CompileError>,
    ) -> Result<R, CompileError> {
        self.scoped(Step::Access(access), f)
    }

    /// Compile `f` inside a loop over elements or keys.
    pub fn each<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R, CompileError>) -> Result<R, CompileError> {
        self.scoped(Step::Loop, f)
    }

    fn scoped<R>(&mut self, step: Step, f: impl FnOnce(&mut Self) -> Result<R, CompileError>) -> Result<R, CompileError> {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(step);
        }
        let out = f(self);
        if let Some(frame) = self.frames.last_mut() {
            frame.pop();
        }
        out
    }

    fn visit<T: Target>(&mut self, id: NodeId) -> Result<T::Fragment, CompileError> {
        let rts = self.rts;
        let node = rts.node(id);
        if let Some(fragment) = T::passthrough(node) {
            return Ok(fragment);
        }
        if self.depth >= self.max_depth {
            return Err(CompileError::MaxDepth { max: self.max_depth, path: self.path_text() });
        }
        self.depth += 1;
        self.ops.push(T::OP);
        let out = if self.should_cache(node) {
            self.define::<T>(node).map(|_| T::call(&node.jit_id, self))
        } else {
            T::compile(node, self)
        };
        self.ops.pop();
        self.depth -= 1;
        out
    }

    fn should_cache(&self, node: &RunTypeNode) -> bool {
        node.has_body() && (node.is_circular || (self.share_named && node.is_shared))
    }

    /// Define `jitId:op` for `node` unless it exists or is being defined.
    fn define<T: Target>(&mut self, node: &RunTypeNode) -> Result<FnKey, CompileError> {
        let key = FnKey::new(node.jit_id.clone(), T::OP);
        if self.defining.contains(&key) || self.defined.contains_key(&key) || self.registry.contains(&key) {
            trace!(key = %key, "reusing compiled function");
            return Ok(key);
        }
        self.defining.insert(key.clone());
        self.frames.push(Vec::new());
        let body = match T::passthrough(node) {
            Some(fragment) => Ok(fragment),
            None => T::compile(node, self),
        };
        self.frames.pop();
        self.defining.remove(&key);

        let f = JitFn::new(node.jit_id.clone(), T::into_code(body?));
        trace!(key = %key, "defined function");
        self.defined.insert(key.clone(), f);
        Ok(key)
    }

    /// Build the entry function for `id` and return its key.
    pub fn define_root<T: Target>(&mut self, id: NodeId) -> Result<FnKey, CompileError> {
        let rts = self.rts;
        let node = rts.node(id);
        // Every reachable class needs a reviver, including ones inside reused functions.
        if T::OP == OpKind::JsonDecode {
            if let Some(name) = rts.class_names(id).into_iter().find(|name| !self.has_class(name)) {
                return Err(CompileError::UnregisteredClass(name.to_string()));
            }
        }
        self.ops.push(T::OP);
        self.depth += 1;
        let out = self.define::<T>(node);
        self.depth -= 1;
        self.ops.pop();
        out
    }

    /// Functions defined by this operation, callees before callers where
    /// there is no cycle.
    pub fn finish(self) -> Vec<JitFn> {
        self.defined.into_values().collect()
    }

    // ---- paths and errors --------------------------------------------------

    /// Path relative to the function under construction; loop variables are
    /// numbered from the outermost loop of that function.
    pub fn path(&self) -> Vec<PathSegment> {
        self.frames.last().map(|f| segments(f)).unwrap_or_default()
    }

    /// Full path from the entry value, for diagnostics.
    pub fn path_text(&self) -> String {
        let all: Vec<PathSegment> = self.frames.iter().flat_map(|f| segments(f)).collect();
        path_text(&all)
    }

    pub fn never(&self) -> CompileError {
        CompileError::Never { op: self.op().name(), path: self.path_text() }
    }

    pub fn function_not_data(&self) -> CompileError {
        CompileError::FunctionNotData { op: self.op().name(), path: self.path_text() }
    }

    pub fn promise_not_data(&self) -> CompileError {
        CompileError::PromiseNotData { op: self.op().name(), path: self.path_text() }
    }
}

fn segments(frame: &[Step]) -> Vec<PathSegment> {
    let mut loops = 0usize;
    frame
        .iter()
        .map(|step| match step {
            Step::Access(Access::Prop(name)) => PathSegment::Key(name.clone()),
            Step::Access(Access::Index(i)) => PathSegment::Index(*i),
            Step::Loop => {
                let d = u8::try_from(loops).unwrap_or(u8::MAX);
                loops += 1;
                PathSegment::Loop(d)
            }
        })
        .collect()
}
