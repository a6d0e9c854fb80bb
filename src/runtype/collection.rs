//! Multi-child shapes: object literals and class instances, tuples, unions.
use crate::error::CompileError;
use crate::ir::{Access, Check, Emit, EmitIndex, EmitProp, KeyFilter, Kind, Report, TagArm, Transform};
use crate::jit::op::CompileOp;
use crate::mock::MockCtx;
use crate::runtype::member::at_transform;
use crate::runtype::{all_of, CompileRunType, Member, NodeId, RunType, RunTypeNode, RunTypes};
use crate::value::{Object, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    /// `props` are property nodes (methods and function-valued properties
    /// are dropped during lowering). `class` is set for non-`Date` classes.
    Object { props: Vec<NodeId>, index: Option<NodeId>, class: Option<String> },
    /// Tuple member nodes; the last one may be a rest node.
    Tuple { members: Vec<NodeId> },
    Union { members: Vec<NodeId> },
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Object { class: Some(_), .. } => "class",
            Collection::Object { .. } => "objectLiteral",
            Collection::Tuple { .. } => "tuple",
            Collection::Union { .. } => "union",
        }
    }

    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Collection::Object { props, index, .. } => props.iter().copied().chain(*index).collect(),
            Collection::Tuple { members } | Collection::Union { members } => members.clone(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SHAPE HELPERS
// ————————————————————————————————————————————————————————————————————————————

struct Prop<'a> {
    id: NodeId,
    name: &'a str,
    optional: bool,
}

fn props<'a>(rts: &'a RunTypes, ids: &[NodeId]) -> Vec<Prop<'a>> {
    ids.iter()
        .filter_map(|id| {
            let node = rts.node(*id);
            match &node.kind {
                RunType::Member(Member::Property { name, .. }) => {
                    Some(Prop { id: *id, name: name.as_str(), optional: node.optional })
                }
                _ => None,
            }
        })
        .collect()
}

fn index_filter(rts: &RunTypes, index: Option<NodeId>) -> Option<(NodeId, KeyFilter)> {
    let id = index?;
    match rts.node(id).kind {
        RunType::Member(Member::IndexSignature { key, .. }) => Some((id, key)),
        _ => None,
    }
}

fn declared_names(props: &[Prop<'_>]) -> Vec<String> {
    props.iter().map(|p| p.name.to_string()).collect()
}

/// Fixed positions and the trailing rest element, if any.
fn split_tuple(rts: &RunTypes, members: &[NodeId]) -> (Vec<NodeId>, Option<NodeId>) {
    match members.split_last() {
        Some((last, fixed)) if matches!(rts.node(*last).kind, RunType::Member(Member::Rest { .. })) => {
            (fixed.to_vec(), Some(*last))
        }
        _ => (members.to_vec(), None),
    }
}

fn object_expected(class: &Option<String>) -> String {
    class.clone().unwrap_or_else(|| "object".to_string())
}

// ————————————————————————————————————————————————————————————————————————————
// COMPILE
// ————————————————————————————————————————————————————————————————————————————

impl CompileRunType for Collection {
    fn is_type(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Check, CompileError> {
        let rts = cop.run_types();
        match self {
            Collection::Object { props: ids, index, .. } => {
                let props = props(rts, ids);
                let mut checks = vec![Check::Is(Kind::Object)];
                for p in &props {
                    checks.push(cop.is_type(p.id)?);
                }
                if let Some((id, filter)) = index_filter(rts, *index) {
                    let check = cop.each(|c| c.is_type(id))?;
                    if check != Check::Always {
                        checks.push(Check::EachKey { filter, skip: declared_names(&props), check: Box::new(check) });
                    }
                }
                Ok(all_of(checks))
            }
            Collection::Tuple { members } => {
                let (fixed, rest) = split_tuple(rts, members);
                let mut checks = vec![Check::Is(Kind::Array)];
                if rest.is_none() {
                    checks.push(Check::MaxLen(fixed.len()));
                }
                for (i, id) in fixed.iter().enumerate() {
                    let check = cop.at(Access::Index(i), |c| c.is_type(*id))?;
                    if check != Check::Always {
                        let optional = rts.node(*id).optional;
                        checks.push(Check::At { access: Access::Index(i), optional, check: Box::new(check) });
                    }
                }
                if let Some(id) = rest {
                    let check = cop.each(|c| c.is_type(id))?;
                    if check != Check::Always {
                        checks.push(Check::Each { from: fixed.len(), check: Box::new(check) });
                    }
                }
                Ok(all_of(checks))
            }
            Collection::Union { members } => {
                let mut arms = Vec::with_capacity(members.len());
                for id in members {
                    let check = cop.is_type(*id)?;
                    if check == Check::Always {
                        return Ok(Check::Always);
                    }
                    arms.push(check);
                }
                Ok(Check::Any(arms))
            }
        }
    }

    fn type_errors(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Report>, CompileError> {
        let rts = cop.run_types();
        match self {
            Collection::Object { props: ids, index, class } => {
                let props = props(rts, ids);
                let mut then = Vec::new();
                for p in &props {
                    then.extend(cop.type_errors(p.id)?);
                }
                if let Some((id, filter)) = index_filter(rts, *index) {
                    let body = cop.each(|c| c.type_errors(id))?;
                    if !body.is_empty() {
                        then.push(Report::EachKey { filter, skip: declared_names(&props), body });
                    }
                }
                let path = cop.path();
                Ok(vec![Report::Expect { check: Check::Is(Kind::Object), path, expected: object_expected(class), then }])
            }
            Collection::Tuple { members } => {
                let (fixed, rest) = split_tuple(rts, members);
                let mut shape = vec![Check::Is(Kind::Array)];
                if rest.is_none() {
                    shape.push(Check::MaxLen(fixed.len()));
                }
                let mut then = Vec::new();
                for (i, id) in fixed.iter().enumerate() {
                    let body = cop.at(Access::Index(i), |c| c.type_errors(*id))?;
                    if !body.is_empty() {
                        let optional = rts.node(*id).optional;
                        then.push(Report::At { access: Access::Index(i), optional, body });
                    }
                }
                if let Some(id) = rest {
                    let body = cop.each(|c| c.type_errors(id))?;
                    if !body.is_empty() {
                        then.push(Report::Each { from: fixed.len(), body });
                    }
                }
                let path = cop.path();
                Ok(vec![Report::Expect { check: all_of(shape), path, expected: "tuple".into(), then }])
            }
            Collection::Union { .. } => {
                let check = self.is_type(node, cop)?;
                if check == Check::Always {
                    return Ok(Vec::new());
                }
                Ok(vec![Report::Expect { check, path: cop.path(), expected: "union".into(), then: Vec::new() }])
            }
        }
    }

    fn json_encode(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        let rts = cop.run_types();
        match self {
            Collection::Object { props: ids, index, .. } => {
                let props = props(rts, ids);
                let mut body = Vec::new();
                for p in &props {
                    body.extend(cop.json_encode(p.id)?);
                }
                if let Some((id, filter)) = index_filter(rts, *index) {
                    let each = cop.each(|c| c.json_encode(id))?;
                    if !each.is_empty() {
                        body.push(Transform::EachKey { filter, skip: declared_names(&props), body: each });
                    }
                }
                Ok(body)
            }
            Collection::Tuple { members } => {
                let (fixed, rest) = split_tuple(rts, members);
                let mut body = Vec::new();
                for (i, id) in fixed.iter().enumerate() {
                    let at = cop.at(Access::Index(i), |c| c.json_encode(*id))?;
                    body.extend(at_transform(Access::Index(i), rts.node(*id).optional, at));
                }
                if let Some(id) = rest {
                    let each = cop.each(|c| c.json_encode(id))?;
                    if !each.is_empty() {
                        body.push(Transform::Each { from: fixed.len(), body: each });
                    }
                }
                Ok(body)
            }
            Collection::Union { members } => {
                let mut arms = Vec::with_capacity(members.len());
                for id in members {
                    arms.push(TagArm { check: cop.is_type(*id)?, body: cop.json_encode(*id)? });
                }
                Ok(vec![Transform::Tag { union: node.jit_id.clone(), arms }])
            }
        }
    }

    fn json_decode(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        let rts = cop.run_types();
        match self {
            Collection::Object { props: ids, index, class } => {
                let props = props(rts, ids);
                let mut body = Vec::new();
                for p in &props {
                    body.extend(cop.json_decode(p.id)?);
                }
                if let Some((id, filter)) = index_filter(rts, *index) {
                    let each = cop.each(|c| c.json_decode(id))?;
                    if !each.is_empty() {
                        body.push(Transform::EachKey { filter, skip: declared_names(&props), body: each });
                    }
                }
                if let Some(name) = class {
                    if !cop.has_class(name) {
                        return Err(CompileError::UnregisteredClass(name.clone()));
                    }
                    body.push(Transform::Revive(name.clone()));
                }
                Ok(body)
            }
            Collection::Tuple { members } => {
                let (fixed, rest) = split_tuple(rts, members);
                let mut body = Vec::new();
                for (i, id) in fixed.iter().enumerate() {
                    if rts.null_means_absent(*id) {
                        body.push(Transform::Absent(Access::Index(i)));
                    }
                    let at = cop.at(Access::Index(i), |c| c.json_decode(*id))?;
                    body.extend(at_transform(Access::Index(i), rts.node(*id).optional, at));
                }
                if let Some(id) = rest {
                    let each = cop.each(|c| c.json_decode(id))?;
                    if !each.is_empty() {
                        body.push(Transform::Each { from: fixed.len(), body: each });
                    }
                }
                Ok(body)
            }
            Collection::Union { members } => {
                let mut arms = Vec::with_capacity(members.len());
                for id in members {
                    arms.push(cop.json_decode(*id)?);
                }
                Ok(vec![Transform::Untag { arms }])
            }
        }
    }

    fn json_stringify(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Emit, CompileError> {
        let rts = cop.run_types();
        match self {
            Collection::Object { props: ids, index, .. } => {
                let props = props(rts, ids);
                let mut emit_props = Vec::with_capacity(props.len());
                for p in &props {
                    let emit = cop.json_stringify(p.id)?;
                    emit_props.push(EmitProp { name: p.name.to_string(), optional: p.optional, emit });
                }
                let index = match index_filter(rts, *index) {
                    Some((id, filter)) => {
                        let emit = cop.each(|c| c.json_stringify(id))?;
                        Some(EmitIndex { filter, emit: Box::new(emit) })
                    }
                    None => None,
                };
                Ok(Emit::Object { props: emit_props, index })
            }
            Collection::Tuple { members } => {
                let (fixed, rest) = split_tuple(rts, members);
                let mut elems = Vec::with_capacity(fixed.len());
                for (i, id) in fixed.iter().enumerate() {
                    elems.push(cop.at(Access::Index(i), |c| c.json_stringify(*id))?);
                }
                let rest = match rest {
                    Some(id) => Some(Box::new(cop.each(|c| c.json_stringify(id))?)),
                    None => None,
                };
                Ok(Emit::Tuple { elems, rest })
            }
            Collection::Union { members } => {
                let mut arms = Vec::with_capacity(members.len());
                for id in members {
                    arms.push((cop.is_type(*id)?, cop.json_stringify(*id)?));
                }
                Ok(Emit::Union { union: node.jit_id.clone(), arms })
            }
        }
    }

    fn mock(&self, _node: &RunTypeNode, ctx: &mut MockCtx<'_>) -> Result<Value, CompileError> {
        let rts = ctx.run_types();
        match self {
            Collection::Object { props: ids, index, .. } => {
                let props = props(rts, ids);
                let mut out = Object::new();
                for p in &props {
                    if p.optional && !ctx.include_optional() {
                        continue;
                    }
                    let value = ctx.at(Access::Prop(p.name.to_string()), |c| c.mock(p.id))?;
                    out.insert(p.name.to_string(), value);
                }
                if let Some((id, filter)) = index_filter(rts, *index) {
                    let extra = ctx.index_keys();
                    for _ in 0..extra {
                        let key = match filter {
                            KeyFilter::String => format!("k{}", ctx.string()),
                            KeyFilter::Number => ctx.rng().u32(0..1000).to_string(),
                        };
                        if out.contains_key(&key) || props.iter().any(|p| p.name == key) {
                            continue;
                        }
                        let value = ctx.at(Access::Prop(key.clone()), |c| c.mock(id))?;
                        out.insert(key, value);
                    }
                }
                Ok(Value::Object(out))
            }
            Collection::Tuple { members } => {
                let (fixed, rest) = split_tuple(rts, members);
                let mut items = Vec::with_capacity(fixed.len());
                let mut complete = true;
                for (i, id) in fixed.iter().enumerate() {
                    if rts.node(*id).optional && !ctx.include_optional() {
                        complete = false;
                        break;
                    }
                    items.push(ctx.at(Access::Index(i), |c| c.mock(*id))?);
                }
                if let (true, Some(id)) = (complete, rest) {
                    let len = ctx.array_len();
                    for i in 0..len {
                        items.push(ctx.at(Access::Index(fixed.len() + i), |c| c.mock(id))?);
                    }
                }
                Ok(Value::Array(items))
            }
            Collection::Union { members } => {
                let id = ctx.pick_member(members)?;
                ctx.mock(id)
            }
        }
    }
}
