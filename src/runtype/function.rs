//! Function-like signatures. They are never data: every data target refuses
//! them at build time. Their parameter and return nodes are compiled on their
//! own through [`crate::signature::FnSignature`].
use crate::error::CompileError;
use crate::ir::{Check, Emit, Report, Transform};
use crate::jit::op::CompileOp;
use crate::mock::MockCtx;
use crate::runtype::{CompileRunType, NodeId, RunTypeNode};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    Function,
    Method,
    MethodSignature,
    CallSignature,
}

impl FnKind {
    pub fn name(self) -> &'static str {
        match self {
            FnKind::Function => "function",
            FnKind::Method => "method",
            FnKind::MethodSignature => "methodSignature",
            FnKind::CallSignature => "callSignature",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLike {
    pub kind: FnKind,
    pub name: Option<String>,
    /// Parameter nodes in declaration order.
    pub params: Vec<NodeId>,
    pub ret: NodeId,
}

impl CompileRunType for FunctionLike {
    fn is_type(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Check, CompileError> {
        Err(cop.function_not_data())
    }

    fn type_errors(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Report>, CompileError> {
        Err(cop.function_not_data())
    }

    fn json_encode(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        Err(cop.function_not_data())
    }

    fn json_decode(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Vec<Transform>, CompileError> {
        Err(cop.function_not_data())
    }

    fn json_stringify(&self, _node: &RunTypeNode, cop: &mut CompileOp<'_>) -> Result<Emit, CompileError> {
        Err(cop.function_not_data())
    }

    fn mock(&self, _node: &RunTypeNode, ctx: &mut MockCtx<'_>) -> Result<Value, CompileError> {
        Err(ctx.function_not_data())
    }
}
