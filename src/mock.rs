//! Random conforming values.
//!
//! Mocking walks the RunType arena directly (there is nothing to cache: every
//! draw is fresh). Past `max_depth` the walk switches to minimal mode, where
//! optional members are left out, arrays are empty and unions take the member
//! with the shortest finite value. Lowering records that height per node, so
//! a recursive type always bottoms out.
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::CompileError;
use crate::ir::{Access, PathSegment};
use crate::render::path_text;
use crate::runtype::{Collection, CompileRunType, FunctionLike, Member, NodeId, RunType, RunTypes};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MockOptions {
    /// Fixed seed for reproducible draws.
    pub seed: Option<u64>,
    pub optional_probability: f64,
    /// Depth after which the walk only produces minimal values.
    pub max_depth: usize,
    pub max_array_len: usize,
    pub max_string_len: usize,
    /// Extra keys added for an index signature.
    pub max_index_keys: usize,
    pub promise_delay_ms: u64,
    pub promise_reject_probability: f64,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            seed: None,
            optional_probability: 0.5,
            max_depth: 8,
            max_array_len: 4,
            max_string_len: 8,
            max_index_keys: 2,
            promise_delay_ms: 0,
            promise_reject_probability: 0.0,
        }
    }
}

// -------------------- walk context --------------------

pub struct MockCtx<'a> {
    rts: &'a RunTypes,
    opts: &'a MockOptions,
    rng: &'a mut fastrand::Rng,
    depth: usize,
    limit: usize,
    path: Vec<Access>,
}

impl<'a> MockCtx<'a> {
    pub fn new(rts: &'a RunTypes, opts: &'a MockOptions, rng: &'a mut fastrand::Rng) -> Self {
        // Minimal mode descends strictly in height, so this bound is only
        // reached through a bug in the height pass.
        let limit = opts.max_depth + 2 * rts.len() + 1;
        Self { rts, opts, rng, depth: 0, limit, path: Vec::new() }
    }

    pub fn run_types(&self) -> &'a RunTypes {
        self.rts
    }

    pub fn rng(&mut self) -> &mut fastrand::Rng {
        &mut *self.rng
    }

    pub fn minimal(&self) -> bool {
        self.depth >= self.opts.max_depth
    }

    pub fn mock(&mut self, id: NodeId) -> Result<Value, CompileError> {
        let rts = self.rts;
        let node = rts.node(id);
        if node.min_height.is_none() || self.depth >= self.limit {
            return Err(self.uninhabited());
        }
        self.depth += 1;
        let out = node.kind.mock(node, self);
        self.depth -= 1;
        out
    }

    /// Mock one property or element deeper.
    pub fn at<R>(
        &mut self,
        access: Access,
        f: impl FnOnce(&mut Self) -> Result<R, CompileError>,
    ) -> Result<R, CompileError> {
        self.path.push(access);
        let out = f(self);
        self.path.pop();
        out
    }

    // ---- draws -------------------------------------------------------------

    pub fn include_optional(&mut self) -> bool {
        !self.minimal() && self.rng.f64() < self.opts.optional_probability
    }

    pub fn array_len(&mut self) -> usize {
        if self.minimal() { 0 } else { self.rng.usize(0..=self.opts.max_array_len) }
    }

    pub fn index_keys(&mut self) -> usize {
        if self.minimal() { 0 } else { self.rng.usize(0..=self.opts.max_index_keys) }
    }

    pub fn string(&mut self) -> String {
        let len = self.rng.usize(0..=self.opts.max_string_len);
        (0..len).map(|_| self.rng.alphanumeric()).collect()
    }

    /// Finite numbers; half integers, half fractions.
    pub fn number(&mut self) -> f64 {
        if self.rng.bool() {
            f64::from(self.rng.i32(-1000..=1000))
        } else {
            (self.rng.f64() - 0.5) * 2000.0
        }
    }

    /// A union member that has finite values; the shortest one in minimal
    /// mode.
    pub fn pick_member(&mut self, members: &[NodeId]) -> Result<NodeId, CompileError> {
        let rts = self.rts;
        let candidates: Vec<(NodeId, u32)> =
            members.iter().filter_map(|id| rts.node(*id).min_height.map(|h| (*id, h))).collect();
        if candidates.is_empty() {
            return Err(self.uninhabited());
        }
        if self.minimal() {
            let shortest = candidates.iter().min_by_key(|(_, h)| *h).map(|(id, _)| *id);
            return shortest.ok_or_else(|| self.uninhabited());
        }
        Ok(candidates[self.rng.usize(..candidates.len())].0)
    }

    // ---- errors ------------------------------------------------------------

    fn path_text(&self) -> String {
        let segments: Vec<PathSegment> = self
            .path
            .iter()
            .map(|a| match a {
                Access::Prop(name) => PathSegment::Key(name.clone()),
                Access::Index(i) => PathSegment::Index(*i),
            })
            .collect();
        path_text(&segments)
    }

    pub fn uninhabited(&self) -> CompileError {
        CompileError::Uninhabited { path: self.path_text() }
    }

    pub fn function_not_data(&self) -> CompileError {
        CompileError::FunctionNotData { op: "mock", path: self.path_text() }
    }

    pub fn promise_not_data(&self) -> CompileError {
        CompileError::PromiseNotData { op: "mock", path: self.path_text() }
    }
}

// -------------------- built mocks --------------------

fn seeded(opts: &MockOptions) -> fastrand::Rng {
    match opts.seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    }
}

/// Draws values of one type. Draws from one `MockFn` share a generator, so a
/// seeded mock yields the same sequence every time it is rebuilt.
pub struct MockFn {
    rts: Arc<RunTypes>,
    root: NodeId,
    opts: MockOptions,
    rng: Mutex<fastrand::Rng>,
}

impl MockFn {
    pub(crate) fn build(rts: Arc<RunTypes>, root: NodeId, opts: MockOptions) -> Result<Self, CompileError> {
        check_data(&rts, root)?;
        // A minimal draw touches every required member, which surfaces
        // uninhabited or non-data members now rather than on first use.
        let mut probe = MockOptions { max_depth: 0, ..opts.clone() };
        probe.seed = Some(0);
        let mut rng = seeded(&probe);
        MockCtx::new(&rts, &probe, &mut rng).mock(root)?;
        debug!(root = %rts.node(root).jit_id, "built mock");
        let rng = Mutex::new(seeded(&opts));
        Ok(Self { rts, root, opts, rng })
    }

    pub fn call(&self) -> Result<Value, CompileError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        MockCtx::new(&self.rts, &self.opts, &mut rng).mock(self.root)
    }

    pub fn sample(&self, count: usize) -> Result<Vec<Value>, CompileError> {
        (0..count).map(|_| self.call()).collect()
    }

    pub fn jit_id(&self) -> &str {
        &self.rts.node(self.root).jit_id
    }
}

/// Every node reachable from `root` must be data, optional members included.
fn check_data(rts: &RunTypes, root: NodeId) -> Result<(), CompileError> {
    let mut seen = HashSet::from([root]);
    let mut stack = vec![(root, Vec::<PathSegment>::new())];
    while let Some((id, path)) = stack.pop() {
        let node = rts.node(id);
        match &node.kind {
            RunType::Function(_) => return Err(CompileError::FunctionNotData { op: "mock", path: path_text(&path) }),
            RunType::Member(Member::Promise { .. }) => {
                return Err(CompileError::PromiseNotData { op: "mock", path: path_text(&path) });
            }
            _ => {}
        }
        for (i, child) in node.children().into_iter().enumerate() {
            if !seen.insert(child) {
                continue;
            }
            let mut next = path.clone();
            match &node.kind {
                RunType::Member(Member::Property { name, .. }) => next.push(PathSegment::Key(name.clone())),
                RunType::Member(Member::Array { .. } | Member::IndexSignature { .. } | Member::Rest { .. }) => {
                    next.push(PathSegment::Loop(0));
                }
                RunType::Collection(Collection::Tuple { .. })
                    if !matches!(rts.node(child).kind, RunType::Member(Member::Rest { .. })) =>
                {
                    next.push(PathSegment::Index(i));
                }
                _ => {}
            }
            stack.push((child, next));
        }
    }
    Ok(())
}

// -------------------- promises --------------------

/// A pending mock result: settles after the configured delay with either a
/// value of the promised type or a rejection reason.
#[derive(Debug, Clone, PartialEq)]
pub struct MockPromise {
    outcome: Result<Value, Value>,
    delay: Duration,
}

impl MockPromise {
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Blocks for the delay, then resolves or rejects.
    pub fn settle(self) -> Result<Value, Value> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.outcome
    }
}

/// Builds [`MockPromise`]s for a `Promise<T>` type (or any `T`, treated as
/// the resolved type).
pub struct MockPromiseFn {
    inner: MockFn,
}

impl MockPromiseFn {
    pub(crate) fn build(rts: Arc<RunTypes>, root: NodeId, opts: MockOptions) -> Result<Self, CompileError> {
        let resolved = match &rts.node(root).kind {
            RunType::Member(Member::Promise { child }) => *child,
            _ => root,
        };
        Ok(Self { inner: MockFn::build(rts, resolved, opts)? })
    }

    /// A value of the resolved type, without the promise.
    pub fn resolved(&self) -> Result<Value, CompileError> {
        self.inner.call()
    }

    pub fn call(&self) -> Result<MockPromise, CompileError> {
        let opts = &self.inner.opts;
        let rejected = {
            let mut rng = self.inner.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.f64() < opts.promise_reject_probability
        };
        let delay = Duration::from_millis(opts.promise_delay_ms);
        if rejected {
            trace!(jit_id = self.inner.jit_id(), "mock promise rejects");
            let reason = Value::object([
                ("name", Value::from("Error")),
                ("message", Value::from("mock rejection")),
            ]);
            return Ok(MockPromise { outcome: Err(reason), delay });
        }
        Ok(MockPromise { outcome: Ok(self.inner.call()?), delay })
    }
}

/// Mocks for the parameters of a function type, as an argument list.
pub(crate) fn mock_params(
    rts: &RunTypes,
    f: &FunctionLike,
    skip: usize,
    opts: &MockOptions,
    rng: &mut fastrand::Rng,
) -> Result<Vec<Value>, CompileError> {
    let mut ctx = MockCtx::new(rts, opts, rng);
    let mut args = Vec::new();
    for (i, id) in f.params.iter().enumerate().skip(skip) {
        let node = rts.node(*id);
        match &node.kind {
            RunType::Member(Member::Parameter { rest: true, .. }) => {
                match ctx.at(Access::Index(i), |c| c.mock(*id))? {
                    Value::Array(items) => args.extend(items),
                    other => args.push(other),
                }
            }
            _ if node.optional && !ctx.include_optional() => break,
            _ => args.push(ctx.at(Access::Index(i), |c| c.mock(*id))?),
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{TypeGraph, TypeKind};
    use crate::lower::lower;

    fn seeded_opts(seed: u64) -> MockOptions {
        MockOptions { seed: Some(seed), ..MockOptions::default() }
    }

    #[test]
    fn seeded_mocks_repeat() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let n = g.number();
        let a = g.prop("a", s);
        let b = g.optional_prop("b", n);
        let obj = g.object(&[a, b]);
        let rts = Arc::new(lower(&g, obj, 64).unwrap());
        let root = rts.root();

        let first = MockFn::build(rts.clone(), root, seeded_opts(7)).unwrap().sample(5).unwrap();
        let second = MockFn::build(rts, root, seeded_opts(7)).unwrap().sample(5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn recursive_types_bottom_out() {
        let mut g = TypeGraph::new();
        let node = g.reserve();
        let s = g.string();
        let value = g.prop("value", s);
        let next = g.optional_prop("next", node);
        g.define(node, TypeKind::ObjectLiteral { members: vec![value, next] });
        let rts = Arc::new(lower(&g, node, 64).unwrap());
        let opts = MockOptions { optional_probability: 1.0, max_depth: 6, ..seeded_opts(1) };
        let mock = MockFn::build(rts.clone(), rts.root(), opts).unwrap();

        let mut depth = 0;
        let mut cur = mock.call().unwrap();
        while let Value::Object(map) = cur {
            depth += 1;
            match map.get("next") {
                Some(next) => cur = next.clone(),
                None => break,
            }
        }
        assert!(depth >= 1 && depth <= 6, "depth {depth}");
    }

    #[test]
    fn uninhabited_roots_fail_at_build() {
        let mut g = TypeGraph::new();
        let never = g.never();
        let p = g.prop("x", never);
        let obj = g.object(&[p]);
        let rts = Arc::new(lower(&g, obj, 64).unwrap());
        let err = MockFn::build(rts.clone(), rts.root(), MockOptions::default()).err().unwrap();
        assert!(matches!(err, CompileError::Uninhabited { .. }), "{err}");
    }

    #[test]
    fn optional_promises_fail_at_build() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let promised = g.promise(s);
        let p = g.optional_prop("p", promised);
        let obj = g.object(&[p]);
        let rts = Arc::new(lower(&g, obj, 64).unwrap());
        let err = MockFn::build(rts.clone(), rts.root(), MockOptions::default()).err().unwrap();
        assert_eq!(err, CompileError::PromiseNotData { op: "mock", path: "$.p".into() });
    }

    #[test]
    fn promises_settle_with_the_resolved_type() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let p = g.promise(s);
        let rts = Arc::new(lower(&g, p, 64).unwrap());
        let promise = MockPromiseFn::build(rts.clone(), rts.root(), seeded_opts(3)).unwrap();
        assert!(matches!(promise.call().unwrap().settle(), Ok(Value::String(_))));

        let always_reject = MockOptions { promise_reject_probability: 1.0, ..seeded_opts(3) };
        let promise = MockPromiseFn::build(rts.clone(), rts.root(), always_reject).unwrap();
        assert!(promise.call().unwrap().settle().is_err());
    }
}
