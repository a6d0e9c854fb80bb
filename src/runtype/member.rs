//! Single-child wrappers.
//!
//! `Array` and `Property` position the value themselves (elements, `v.name`).
//! Tuple members, rest elements, index signatures and parameters are reached
//! through their parent, which already set up the access, so they compile to
//! exactly what their child compiles to.
use crate::error::CompileError;
use crate::ir::{Access, Check, Emit, KeyFilter, Kind, Report, Transform};
use crate::jit::op::CompileOp;
use crate::mock::MockCtx;
use crate::runtype::{CompileRunType, NodeId, RunTypeNode};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Array { item: NodeId },
    /// `optional` / `readonly` live on the node.
    Property { name: String, child: NodeId },
    TupleMember { child: NodeId },
    IndexSignature { key: KeyFilter, child: NodeId },
    /// Element type of `...T[]`.
    Rest { child: NodeId },
    /// `rest` marks `...args: T[]`; `child` is then the element type.
    Parameter { name: String, child: NodeId, rest: bool },
    Promise { child: NodeId },
}

impl Member {
    pub fn name(&self) -> &'static str {
        match self {
            Member::Array { .. } => "array",
            Member::Property { .. } => "property",
            Member::TupleMember { .. } => "tupleMember",
            Member::IndexSignature { .. } => "indexSignature",
            Member::Rest { .. } => "rest",
            Member::Parameter { .. } => "parameter",
            Member::Promise { .. } => "promise",
        }
    }

    pub fn child(&self) -> NodeId {
        match self {
            Member::Array { item: child }
            | Member::Property { child, .. }
            | Member::TupleMember { child }
            | Member::IndexSignature { child, .. }
            | Member::Rest { child }
            | Member::Parameter { child, .. }
            | Member::Promise { child } => *child,
        }
    }
}

impl CompileRunType for Member {
    fn is_type(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Check, CompileError> {
        match self {
            Member::Array { item } => {
                let check = cop.each(|c| c.is_type(*item))?;
                if check == Check::Always {
                    return Ok(Check::Is(Kind::Array));
                }
                Ok(Check::All(vec![Check::Is(Kind::Array), Check::Each { from: 0, check: Box::new(check) }]))
            }
            Member::Property { name, child } => {
                let access = Access::Prop(name.clone());
                let check = cop.at(access.clone(), |c| c.is_type(*child))?;
                if check == Check::Always {
                    return Ok(Check::Always);
                }
                Ok(Check::At { access, optional: node.optional, check: Box::new(check) })
            }
            Member::Promise { .. } => Err(cop.promise_not_data()),
            _ => cop.is_type(self.child()),
        }
    }

    fn type_errors(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Report>, CompileError> {
        match self {
            Member::Array { item } => {
                let body = cop.each(|c| c.type_errors(*item))?;
                let then = if body.is_empty() { Vec::new() } else { vec![Report::Each { from: 0, body }] };
                Ok(vec![Report::Expect { check: Check::Is(Kind::Array), path: cop.path(), expected: "array".into(), then }])
            }
            Member::Property { name, child } => {
                let access = Access::Prop(name.clone());
                let body = cop.at(access.clone(), |c| c.type_errors(*child))?;
                if body.is_empty() {
                    return Ok(body);
                }
                Ok(vec![Report::At { access, optional: node.optional, body }])
            }
            Member::Promise { .. } => Err(cop.promise_not_data()),
            _ => cop.type_errors(self.child()),
        }
    }

    fn json_encode(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        match self {
            Member::Array { item } => {
                let body = cop.each(|c| c.json_encode(*item))?;
                Ok(each_transform(body))
            }
            Member::Property { name, child } => {
                let access = Access::Prop(name.clone());
                let body = cop.at(access.clone(), |c| c.json_encode(*child))?;
                Ok(at_transform(access, node.optional, body))
            }
            Member::Promise { .. } => Err(cop.promise_not_data()),
            _ => cop.json_encode(self.child()),
        }
    }

    fn json_decode(&self, node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        match self {
            Member::Array { item } => {
                let body = cop.each(|c| c.json_decode(*item))?;
                Ok(each_transform(body))
            }
            Member::Property { name, child } => {
                let access = Access::Prop(name.clone());
                let body = cop.at(access.clone(), |c| c.json_decode(*child))?;
                Ok(at_transform(access, node.optional, body))
            }
            Member::Promise { .. } => Err(cop.promise_not_data()),
            _ => cop.json_decode(self.child()),
        }
    }

    fn json_stringify(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Emit, CompileError> {
        match self {
            Member::Array { item } => {
                let item = cop.each(|c| c.json_stringify(*item))?;
                Ok(Emit::Array { item: Box::new(item) })
            }
            // The enclosing object writes the key; this is the value emitter.
            Member::Property { name, child } => {
                let access = Access::Prop(name.clone());
                cop.at(access, |c| c.json_stringify(*child))
            }
            Member::Promise { .. } => Err(cop.promise_not_data()),
            _ => cop.json_stringify(self.child()),
        }
    }

    fn mock(&self, _node: &RunTypeNode, ctx: &mut MockCtx<'_>) -> Result<Value, CompileError> {
        match self {
            Member::Array { item } => {
                let len = ctx.array_len();
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    items.push(ctx.at(Access::Index(i), |c| c.mock(*item))?);
                }
                Ok(Value::Array(items))
            }
            Member::Parameter { child, rest: true, .. } => {
                let len = ctx.array_len();
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    items.push(ctx.at(Access::Index(i), |c| c.mock(*child))?);
                }
                Ok(Value::Array(items))
            }
            Member::Promise { .. } => Err(ctx.promise_not_data()),
            _ => ctx.mock(self.child()),
        }
    }
}

pub(crate) fn each_transform(body: Vec<Transform>) -> Vec<Transform> {
    if body.is_empty() {
        return body;
    }
    vec![Transform::Each { from: 0, body }]
}

pub(crate) fn at_transform(access: Access, optional: bool, body: Vec<Transform>) -> Vec<Transform> {
    if body.is_empty() {
        return body;
    }
    vec![Transform::At { access, optional, body }]
}
