// src/lower.rs
//! Lowering: descriptor graph → RunType arena.
//!
//! One pass walks the descriptor graph from the root and allocates a node per
//! distinct descriptor. Ancestors travel down as an immutable linked list;
//! meeting one of them again marks that ancestor circular and links back to it
//! instead of descending. After the walk, whole-arena passes fill in the facts
//! that depend on the finished graph:
//!
//! 1. JSON encode/decode requirements (least fixed point over cycles)
//! 2. jitIds (structural, with relative `$n` back references inside cycles)
//! 3. index signature merging
//! 4. shared named types
//! 5. mock heights
use std::collections::HashMap;

use tracing::debug;

use crate::descriptor::{TypeGraph, TypeId, TypeKind};
use crate::error::CompileError;
use crate::ir::KeyFilter;
use crate::render::key_text;
use crate::runtype::{
    Atomic, Collection, FnKind, FunctionLike, Member, NodeId, RunType, RunTypeNode, RunTypes,
};

/// Lower the type at `root` into a fresh arena.
pub fn lower(graph: &TypeGraph, root: TypeId, max_depth: usize) -> Result<RunTypes, CompileError> {
    let mut cx = Lowering {
        graph,
        nodes: Vec::new(),
        by_type: HashMap::new(),
        max_depth,
        extra_index: Vec::new(),
    };
    let root = cx.lower(root, None, 0)?;
    let extra_index = std::mem::take(&mut cx.extra_index);
    let mut rts = RunTypes { nodes: cx.nodes, root };

    mark_json_requirements(&mut rts);
    assign_jit_ids(&mut rts);
    if merge_index_signatures(&mut rts, &extra_index)? {
        assign_jit_ids(&mut rts);
    }
    mark_shared(&mut rts);
    assign_min_heights(&mut rts);

    debug!(
        nodes = rts.len(),
        circular = rts.iter().filter(|(_, n)| n.is_circular).count(),
        root = %rts.root_node().jit_id,
        "lowered type graph"
    );
    Ok(rts)
}

pub fn lower_named(graph: &TypeGraph, name: &str, max_depth: usize) -> Result<RunTypes, CompileError> {
    lower(graph, graph.root(name)?, max_depth)
}

// -------------------- walk --------------------

struct Ancestors<'p> {
    ty: TypeId,
    node: NodeId,
    up: Option<&'p Ancestors<'p>>,
}

impl Ancestors<'_> {
    fn find(&self, ty: TypeId) -> Option<NodeId> {
        let mut cur = Some(self);
        while let Some(a) = cur {
            if a.ty == ty {
                return Some(a.node);
            }
            cur = a.up;
        }
        None
    }
}

struct Lowering<'g> {
    graph: &'g TypeGraph,
    nodes: Vec<RunTypeNode>,
    by_type: HashMap<TypeId, NodeId>,
    max_depth: usize,
    /// `(object, index signature)` pairs beyond the first per object.
    extra_index: Vec<(NodeId, NodeId)>,
}

#[derive(Default)]
struct Flags {
    optional: bool,
    readonly: bool,
}

impl Lowering<'_> {
    fn node_mut(&mut self, id: NodeId) -> &mut RunTypeNode {
        &mut self.nodes[id.0 as usize]
    }

    fn lower(&mut self, ty: TypeId, up: Option<&Ancestors<'_>>, depth: usize) -> Result<NodeId, CompileError> {
        if let Some(node) = up.and_then(|a| a.find(ty)) {
            self.node_mut(node).is_circular = true;
            return Ok(node);
        }
        if let Some(&node) = self.by_type.get(&ty) {
            return Ok(node);
        }
        if depth > self.max_depth {
            return Err(CompileError::MaxDepth { max: self.max_depth, path: format!("type {ty}") });
        }

        let graph = self.graph;
        let desc = graph.get(ty)?;
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(RunTypeNode::placeholder(ty));
        self.by_type.insert(ty, id);

        let here = Ancestors { ty, node: id, up };
        let mut flags = Flags::default();
        let kind = self.lower_kind(ty, &desc.kind, &here, depth + 1, &mut flags)?;

        let node = self.node_mut(id);
        node.kind = kind;
        node.type_name = desc.type_name.clone();
        node.optional = flags.optional;
        node.readonly = flags.readonly;
        Ok(id)
    }

    fn child(&mut self, ty: TypeId, here: &Ancestors<'_>, depth: usize) -> Result<NodeId, CompileError> {
        let id = self.lower(ty, Some(here), depth)?;
        self.node_mut(id).parents += 1;
        Ok(id)
    }

    fn lower_kind(
        &mut self,
        ty: TypeId,
        kind: &TypeKind,
        here: &Ancestors<'_>,
        depth: usize,
        flags: &mut Flags,
    ) -> Result<RunType, CompileError> {
        let graph = self.graph;
        let rt = match kind {
            TypeKind::Never => RunType::Atomic(Atomic::Never),
            TypeKind::Any => RunType::Atomic(Atomic::Any),
            TypeKind::Unknown => RunType::Atomic(Atomic::Unknown),
            TypeKind::Void => RunType::Atomic(Atomic::Void),
            TypeKind::Object => RunType::Atomic(Atomic::Object),
            TypeKind::String => RunType::Atomic(Atomic::String),
            TypeKind::Number => RunType::Atomic(Atomic::Number),
            TypeKind::Boolean => RunType::Atomic(Atomic::Boolean),
            TypeKind::Symbol => RunType::Atomic(Atomic::Symbol),
            TypeKind::Bigint => RunType::Atomic(Atomic::BigInt),
            TypeKind::Null => RunType::Atomic(Atomic::Null),
            TypeKind::Undefined => RunType::Atomic(Atomic::Undefined),
            TypeKind::Regexp => RunType::Atomic(Atomic::RegExp),
            TypeKind::Literal { value } => RunType::Atomic(Atomic::Literal(value.clone())),
            TypeKind::Class { name, .. } if name == "Date" => RunType::Atomic(Atomic::Date),
            TypeKind::EnumMember { value, .. } => RunType::Atomic(Atomic::Literal(value.clone())),
            TypeKind::Enum { members } => {
                let mut out = Vec::with_capacity(members.len());
                for m in members {
                    match &graph.get(*m)?.kind {
                        TypeKind::EnumMember { name, value } => out.push((name.clone(), value.clone())),
                        other => return Err(unexpected(*m, other, "enumMember")),
                    }
                }
                RunType::Atomic(Atomic::Enum(out))
            }

            TypeKind::Array { item } => RunType::Member(Member::Array { item: self.child(*item, here, depth)? }),
            TypeKind::TupleMember { ty: inner, optional, .. } => {
                // `[...T[]]` can arrive as a member wrapping the rest node.
                if let TypeKind::Rest { ty: element } = &graph.get(*inner)?.kind {
                    RunType::Member(Member::Rest { child: self.child(*element, here, depth)? })
                } else {
                    flags.optional = *optional;
                    RunType::Member(Member::TupleMember { child: self.child(*inner, here, depth)? })
                }
            }
            TypeKind::Rest { ty: element } => RunType::Member(Member::Rest { child: self.child(*element, here, depth)? }),
            TypeKind::Property { name, ty: inner, optional, readonly } => {
                flags.optional = *optional;
                flags.readonly = *readonly;
                RunType::Member(Member::Property { name: name.clone(), child: self.child(*inner, here, depth)? })
            }
            TypeKind::IndexSignature { key, ty: inner } => {
                let filter = match &graph.get(*key)?.kind {
                    TypeKind::String => KeyFilter::String,
                    TypeKind::Number => KeyFilter::Number,
                    other => return Err(unexpected(*key, other, "a string or number index key")),
                };
                RunType::Member(Member::IndexSignature { key: filter, child: self.child(*inner, here, depth)? })
            }
            TypeKind::Parameter { name, ty: inner, optional } => {
                let (child, rest) = match &graph.get(*inner)?.kind {
                    TypeKind::Rest { ty: element } => (self.child(*element, here, depth)?, true),
                    _ => (self.child(*inner, here, depth)?, false),
                };
                flags.optional = *optional || rest;
                RunType::Member(Member::Parameter { name: name.clone(), child, rest })
            }
            TypeKind::Promise { ty: inner } => RunType::Member(Member::Promise { child: self.child(*inner, here, depth)? }),

            TypeKind::Tuple { members } => {
                let mut out = Vec::with_capacity(members.len());
                for (i, m) in members.iter().enumerate() {
                    let member = &graph.get(*m)?.kind;
                    if !matches!(member, TypeKind::TupleMember { .. } | TypeKind::Rest { .. }) {
                        return Err(unexpected(*m, member, "tupleMember"));
                    }
                    let id = self.child(*m, here, depth)?;
                    let is_rest = matches!(self.nodes[id.0 as usize].kind, RunType::Member(Member::Rest { .. }));
                    if is_rest && i + 1 != members.len() {
                        return Err(unexpected(*m, member, "a rest element in last position"));
                    }
                    out.push(id);
                }
                RunType::Collection(Collection::Tuple { members: out })
            }
            TypeKind::ObjectLiteral { members } => self.lower_object(members, None, here, depth)?,
            TypeKind::Class { name, members } => self.lower_object(members, Some(name.clone()), here, depth)?,
            TypeKind::Union { members } => {
                let mut out = Vec::with_capacity(members.len());
                for m in members {
                    // `never` is the identity of union.
                    if matches!(graph.get(*m)?.kind, TypeKind::Never) {
                        continue;
                    }
                    out.push(self.child(*m, here, depth)?);
                }
                if out.is_empty() {
                    RunType::Atomic(Atomic::Never)
                } else {
                    RunType::Collection(Collection::Union { members: out })
                }
            }
            TypeKind::Intersection { .. } => return Err(CompileError::UnresolvedIntersection(ty)),

            TypeKind::Function { name, params, ret } => {
                self.lower_function(FnKind::Function, name.clone(), params, *ret, here, depth)?
            }
            TypeKind::Method { name, params, ret, optional } => {
                flags.optional = *optional;
                self.lower_function(FnKind::Method, Some(name.clone()), params, *ret, here, depth)?
            }
            TypeKind::MethodSignature { name, params, ret, optional } => {
                flags.optional = *optional;
                self.lower_function(FnKind::MethodSignature, Some(name.clone()), params, *ret, here, depth)?
            }
            TypeKind::CallSignature { params, ret } => {
                self.lower_function(FnKind::CallSignature, None, params, *ret, here, depth)?
            }
        };
        Ok(rt)
    }

    fn lower_object(
        &mut self,
        members: &[TypeId],
        class: Option<String>,
        here: &Ancestors<'_>,
        depth: usize,
    ) -> Result<RunType, CompileError> {
        let graph = self.graph;
        let mut props = Vec::new();
        let mut index = None;
        for m in members {
            match &graph.get(*m)?.kind {
                TypeKind::Property { ty, .. } => {
                    // Function-valued properties are behavior, not data.
                    if graph.get(*ty)?.kind.is_function_like() {
                        continue;
                    }
                    props.push(self.child(*m, here, depth)?);
                }
                TypeKind::IndexSignature { key, .. } => {
                    if matches!(graph.get(*key)?.kind, TypeKind::Symbol) {
                        continue;
                    }
                    let id = self.child(*m, here, depth)?;
                    match index {
                        None => index = Some(id),
                        Some(_) => self.extra_index.push((here.node, id)),
                    }
                }
                kind if kind.is_function_like() => continue,
                other => return Err(unexpected(*m, other, "an object member")),
            }
        }
        Ok(RunType::Collection(Collection::Object { props, index, class }))
    }

    fn lower_function(
        &mut self,
        kind: FnKind,
        name: Option<String>,
        params: &[TypeId],
        ret: TypeId,
        here: &Ancestors<'_>,
        depth: usize,
    ) -> Result<RunType, CompileError> {
        let graph = self.graph;
        let mut out = Vec::with_capacity(params.len());
        for p in params {
            let param = &graph.get(*p)?.kind;
            if !matches!(param, TypeKind::Parameter { .. }) {
                return Err(unexpected(*p, param, "parameter"));
            }
            out.push(self.child(*p, here, depth)?);
        }
        let ret = self.child(ret, here, depth)?;
        Ok(RunType::Function(FunctionLike { kind, name, params: out, ret }))
    }
}

fn unexpected(id: TypeId, found: &TypeKind, expected: &'static str) -> CompileError {
    CompileError::UnexpectedKind { id, found: found.name(), expected }
}

// -------------------- 1) json requirements --------------------

fn mark_json_requirements(rts: &mut RunTypes) {
    loop {
        let mut changed = false;
        for i in 0..rts.nodes.len() {
            let node = &rts.nodes[i];
            let (enc, dec) = match &node.kind {
                RunType::Atomic(a) => {
                    let needs = a.codec().is_some() || *a == Atomic::Never;
                    (needs, needs)
                }
                RunType::Member(Member::Promise { .. }) | RunType::Function(_) => (true, true),
                RunType::Member(_) => (any_child(rts, node, needs_encode), any_child(rts, node, needs_decode)),
                RunType::Collection(Collection::Tuple { members }) => {
                    let absent = members.iter().any(|m| rts.null_means_absent(*m));
                    (any_child(rts, node, needs_encode), any_child(rts, node, needs_decode) || absent)
                }
                RunType::Collection(Collection::Object { class, .. }) => {
                    (any_child(rts, node, needs_encode), any_child(rts, node, needs_decode) || class.is_some())
                }
                // Tagging is all or nothing, so both directions agree.
                RunType::Collection(Collection::Union { .. }) => {
                    let tagged = any_child(rts, node, needs_encode) || any_child(rts, node, needs_decode);
                    (tagged, tagged)
                }
            };
            let node = &mut rts.nodes[i];
            if node.requires_json_encode != enc || node.requires_json_decode != dec {
                node.requires_json_encode = enc;
                node.requires_json_decode = dec;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn needs_encode(node: &RunTypeNode) -> bool {
    node.requires_json_encode
}

fn needs_decode(node: &RunTypeNode) -> bool {
    node.requires_json_decode
}

fn any_child(rts: &RunTypes, node: &RunTypeNode, pick: fn(&RunTypeNode) -> bool) -> bool {
    node.children().into_iter().any(|c| pick(rts.node(c)))
}

// -------------------- 2) jit ids --------------------

/// Each node's id is computed with itself as the root, so a back reference
/// `$n` (n levels up) means the same thing wherever the subtree appears.
/// Only subtrees that do not point above themselves are memoized.
fn assign_jit_ids(rts: &mut RunTypes) {
    let ids: Vec<String> = {
        let mut builder = JitIds { rts, stack: Vec::new(), memo: HashMap::new() };
        (0..rts.nodes.len()).map(|i| builder.id_of(NodeId(i as u32)).0).collect()
    };
    for (node, id) in rts.nodes.iter_mut().zip(ids) {
        node.jit_id = id;
    }
}

struct JitIds<'r> {
    rts: &'r RunTypes,
    stack: Vec<NodeId>,
    memo: HashMap<NodeId, String>,
}

impl JitIds<'_> {
    /// Returns the id text and the lowest stack position it refers to.
    fn id_of(&mut self, id: NodeId) -> (String, usize) {
        if let Some(done) = self.memo.get(&id) {
            return (done.clone(), usize::MAX);
        }
        if let Some(pos) = self.stack.iter().position(|n| *n == id) {
            return (format!("${}", self.stack.len() - pos), pos);
        }

        let here = self.stack.len();
        self.stack.push(id);
        let node = self.rts.node(id);
        let mut low = usize::MAX;
        let mut kids = Vec::new();
        for child in node.children() {
            let (text, child_low) = self.id_of(child);
            low = low.min(child_low);
            kids.push(text);
        }
        self.stack.pop();

        let text = describe(node, kids);
        if low >= here {
            self.memo.insert(id, text.clone());
        }
        (text, low)
    }
}

fn describe(node: &RunTypeNode, kids: Vec<String>) -> String {
    let opt = if node.optional { "?" } else { "" };
    let one = || kids.first().cloned().unwrap_or_default();
    match &node.kind {
        RunType::Atomic(Atomic::Literal(lit)) => format!("lit:{lit}"),
        RunType::Atomic(Atomic::Enum(members)) => {
            let values: Vec<String> = members.iter().map(|(_, v)| v.to_string()).collect();
            format!("enum<{}>", values.join(","))
        }
        RunType::Atomic(a) => a.name().to_string(),
        RunType::Member(m) => match m {
            Member::Array { .. } => format!("array<{}>", one()),
            Member::Property { name, .. } => format!("{}{opt}:{}", key_text(name), one()),
            Member::TupleMember { .. } => format!("{}{opt}", one()),
            Member::IndexSignature { key: KeyFilter::String, .. } => format!("[string]:{}", one()),
            Member::IndexSignature { key: KeyFilter::Number, .. } => format!("[number]:{}", one()),
            Member::Rest { .. } => format!("...{}", one()),
            Member::Parameter { rest: true, .. } => format!("...{}", one()),
            Member::Parameter { .. } => format!("{}{opt}", one()),
            Member::Promise { .. } => format!("promise<{}>", one()),
        },
        RunType::Collection(Collection::Object { class: Some(name), .. }) => {
            format!("class {name}{{{}}}", kids.join(","))
        }
        RunType::Collection(Collection::Object { .. }) => format!("{{{}}}", kids.join(",")),
        RunType::Collection(Collection::Tuple { .. }) => format!("[{}]", kids.join(",")),
        RunType::Collection(Collection::Union { .. }) => format!("union<{}>", kids.join("|")),
        RunType::Function(f) => {
            let mut kids = kids;
            let ret = kids.pop().unwrap_or_default();
            format!("{}({})=>{ret}", f.kind.name(), kids.join(","))
        }
    }
}

// -------------------- 3) index signatures --------------------

/// At most one index signature survives per object. Signatures whose value
/// types agree are merged (a string key covers a number key); any other
/// combination is rejected. Returns whether an object changed.
fn merge_index_signatures(rts: &mut RunTypes, extra: &[(NodeId, NodeId)]) -> Result<bool, CompileError> {
    let mut changed = false;
    for (object, candidate) in extra {
        let RunType::Collection(Collection::Object { index: Some(kept), .. }) = rts.node(*object).kind else {
            continue;
        };
        let kept_node = rts.node(kept);
        let cand_node = rts.node(*candidate);
        let (RunType::Member(Member::IndexSignature { key: kept_key, child: kept_child }),
             RunType::Member(Member::IndexSignature { key: cand_key, child: cand_child })) = (&kept_node.kind, &cand_node.kind)
        else {
            continue;
        };
        if rts.node(*kept_child).jit_id != rts.node(*cand_child).jit_id {
            let obj = rts.node(*object);
            let path = obj.type_name.clone().unwrap_or_else(|| format!("type {}", obj.src));
            return Err(CompileError::ConflictingIndexSignatures { path });
        }
        if *kept_key == KeyFilter::Number && *cand_key == KeyFilter::String {
            let cand = *candidate;
            if let RunType::Collection(Collection::Object { index, .. }) = &mut rts.nodes[object.0 as usize].kind {
                *index = Some(cand);
                changed = true;
            }
        }
    }
    Ok(changed)
}

// -------------------- 4) shared --------------------

fn mark_shared(rts: &mut RunTypes) {
    for node in &mut rts.nodes {
        node.is_shared = node.type_name.is_some() && node.parents > 1 && node.has_body();
    }
}

// -------------------- 5) mock heights --------------------

fn assign_min_heights(rts: &mut RunTypes) {
    loop {
        let mut changed = false;
        for i in 0..rts.nodes.len() {
            let node = &rts.nodes[i];
            let h = |id: NodeId| rts.node(id).min_height;
            let height = match &node.kind {
                RunType::Atomic(Atomic::Never) => None,
                RunType::Atomic(Atomic::Enum(members)) if members.is_empty() => None,
                RunType::Atomic(_) | RunType::Function(_) => Some(0),
                RunType::Member(Member::Array { .. } | Member::Rest { .. } | Member::IndexSignature { .. }) => Some(0),
                RunType::Member(Member::Parameter { rest: true, .. }) => Some(0),
                RunType::Member(_) if node.optional => Some(0),
                RunType::Member(m) => h(m.child()),
                RunType::Collection(Collection::Union { members }) => {
                    members.iter().filter_map(|m| h(*m)).min().map(|x| x + 1)
                }
                RunType::Collection(c) => {
                    let mut max = Some(0);
                    for child in c.children() {
                        max = match (max, h(child)) {
                            (Some(a), Some(b)) => Some(a.max(b)),
                            _ => None,
                        };
                    }
                    max.map(|x| x + 1)
                }
            };
            let shorter = match (height, node.min_height) {
                (Some(new), Some(old)) => new < old,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if shorter {
                rts.nodes[i].min_height = height;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Literal;

    fn linked_list() -> (TypeGraph, TypeId) {
        let mut g = TypeGraph::new();
        let node = g.reserve();
        let next = g.optional_prop("next", node);
        let s = g.string();
        let value = g.prop("value", s);
        g.define(node, TypeKind::ObjectLiteral { members: vec![value, next] });
        g.named(node, "Node");
        (g, node)
    }

    #[test]
    fn self_reference_marks_the_target_circular() {
        let (g, root) = linked_list();
        let rts = lower(&g, root, 64).unwrap();
        let r = rts.root_node();
        assert!(r.is_circular);
        assert_eq!(r.jit_id, "{value:string,next?:$2}");
        let circular: Vec<_> = rts.iter().filter(|(_, n)| n.is_circular).collect();
        assert_eq!(circular.len(), 1);
    }

    #[test]
    fn recursive_array_refers_to_itself() {
        let mut g = TypeGraph::new();
        let a = g.reserve();
        g.define(a, TypeKind::Array { item: a });
        let rts = lower(&g, a, 64).unwrap();
        assert!(rts.root_node().is_circular);
        assert_eq!(rts.root_node().jit_id, "array<$1>");
        assert_eq!(rts.len(), 1);
    }

    #[test]
    fn names_do_not_change_identity_but_class_names_do() {
        let mut g = TypeGraph::new();
        let s1 = g.string();
        let p1 = g.prop("x", s1);
        let a = g.object(&[p1]);
        g.named(a, "A");
        let s2 = g.string();
        let p2 = g.prop("x", s2);
        let b = g.object(&[p2]);
        g.named(b, "B");
        let s3 = g.string();
        let p3 = g.prop("x", s3);
        let c = g.add(TypeKind::Class { name: "Point".into(), members: vec![p3] });

        let ida = lower(&g, a, 64).unwrap().root_node().jit_id.clone();
        let idb = lower(&g, b, 64).unwrap().root_node().jit_id.clone();
        let idc = lower(&g, c, 64).unwrap().root_node().jit_id.clone();
        assert_eq!(ida, idb);
        assert_eq!(idc, "class Point{x:string}");
    }

    #[test]
    fn optional_flag_is_part_of_identity() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let req = g.prop("x", s);
        let opt = g.optional_prop("x", s);
        let a = g.object(&[req]);
        let b = g.object(&[opt]);
        assert_ne!(lower(&g, a, 64).unwrap().root_node().jit_id, lower(&g, b, 64).unwrap().root_node().jit_id);
    }

    #[test]
    fn requirements_follow_codec_leaves() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let d = g.date();
        let ps = g.prop("name", s);
        let pd = g.prop("at", d);
        let obj = g.object(&[ps, pd]);
        let rts = lower(&g, obj, 64).unwrap();
        assert!(rts.root_node().requires_json_encode);
        let name = rts.iter().find(|(_, n)| n.jit_id == "name:string").unwrap().1;
        assert!(!name.requires_json_encode);
    }

    #[test]
    fn union_of_plain_members_passes_through() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let n = g.number();
        let u = g.union(&[s, n]);
        let rts = lower(&g, u, 64).unwrap();
        assert!(!rts.root_node().requires_json_encode);
        assert!(!rts.root_node().requires_json_decode);
    }

    #[test]
    fn intersections_are_rejected() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let i = g.add(TypeKind::Intersection { members: vec![s] });
        assert_eq!(lower(&g, i, 64).unwrap_err(), CompileError::UnresolvedIntersection(i));
    }

    #[test]
    fn index_signatures_merge_or_conflict() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let n = g.number();
        let by_string = g.index_signature(s, n);
        let by_number = g.index_signature(n, n);
        let same = g.object(&[by_number, by_string]);
        let rts = lower(&g, same, 64).unwrap();
        assert_eq!(rts.root_node().jit_id, "{[string]:number}");

        let b = g.boolean();
        let clash = g.index_signature(n, b);
        let bad = g.object(&[by_string, clash]);
        assert!(matches!(lower(&g, bad, 64), Err(CompileError::ConflictingIndexSignatures { .. })));
    }

    #[test]
    fn methods_and_function_properties_are_skipped() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let v = g.void();
        let f = g.function(&[], v);
        let callback = g.prop("onClick", f);
        let m = g.add(TypeKind::Method { name: "run".into(), params: vec![], ret: v, optional: false });
        let label = g.prop("label", s);
        let obj = g.object(&[callback, m, label]);
        let rts = lower(&g, obj, 64).unwrap();
        assert_eq!(rts.root_node().jit_id, "{label:string}");
    }

    #[test]
    fn shared_named_types_are_detected() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let px = g.prop("x", s);
        let point = g.object(&[px]);
        g.named(point, "Point");
        let from = g.prop("from", point);
        let to = g.prop("to", point);
        let line = g.object(&[from, to]);
        let rts = lower(&g, line, 64).unwrap();
        let shared: Vec<_> = rts.iter().filter(|(_, n)| n.is_shared).map(|(_, n)| n.jit_id.clone()).collect();
        assert_eq!(shared, ["{x:string}"]);
    }

    #[test]
    fn depth_guard_trips_on_deep_graphs() {
        let mut g = TypeGraph::new();
        let mut ty = g.string();
        for _ in 0..10 {
            ty = g.array(ty);
        }
        assert!(matches!(lower(&g, ty, 4), Err(CompileError::MaxDepth { max: 4, .. })));
        assert!(lower(&g, ty, 64).is_ok());
    }

    #[test]
    fn required_self_reference_has_no_finite_instance() {
        let mut g = TypeGraph::new();
        let node = g.reserve();
        let next = g.prop("next", node);
        g.define(node, TypeKind::ObjectLiteral { members: vec![next] });
        assert_eq!(lower(&g, node, 64).unwrap().root_node().min_height, None);

        let (g, root) = linked_list();
        assert_eq!(lower(&g, root, 64).unwrap().root_node().min_height, Some(1));
    }

    #[test]
    fn enums_collect_member_values() {
        let mut g = TypeGraph::new();
        let e = g.enumeration(&[("A", Literal::from("a")), ("B", Literal::from(2.0))]);
        let rts = lower(&g, e, 64).unwrap();
        assert_eq!(rts.root_node().jit_id, "enum<\"a\",2>");
    }
}
