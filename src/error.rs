//! Error taxonomy.
//!
//! - [`CompileError`]: the type graph or a builder hit a shape it cannot
//!   compile. Raised while building, never deferred to call time.
//! - [`RunError`]: a compiled encode/decode/stringify function was handed
//!   input it cannot transform.
//! - [`AdapterError`]: a function signature was called with the wrong number
//!   of arguments, or one of the above bubbled up through the adapter.
//!
//! Validation failures are data ([`crate::ValidationError`]) and never show up
//! here.
use thiserror::Error;

use crate::descriptor::TypeId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("`never` cannot be compiled into {op} (at {path})")]
    Never { op: &'static str, path: String },

    #[error("function type at {path} is not data and cannot be compiled into {op}")]
    FunctionNotData { op: &'static str, path: String },

    #[error("promise type at {path} must be awaited before it can be compiled into {op}")]
    PromiseNotData { op: &'static str, path: String },

    #[error("object shape at {path} declares index signatures with different value types")]
    ConflictingIndexSignatures { path: String },

    #[error("intersection type {0} must be resolved before it reaches the engine")]
    UnresolvedIntersection(TypeId),

    #[error("class `{0}` is not registered for JSON decoding")]
    UnregisteredClass(String),

    #[error("type id {0} does not exist in the type graph")]
    DanglingType(TypeId),

    #[error("type {id} has kind `{found}` where {expected} was expected")]
    UnexpectedKind { id: TypeId, found: &'static str, expected: &'static str },

    #[error("maximum nesting depth {max} exceeded at {path}")]
    MaxDepth { max: usize, path: String },

    #[error("type `{0}` is not a function type")]
    NotAFunction(String),

    #[error("cannot skip {skip} parameters of a function with {params}")]
    SkipTooLarge { skip: usize, params: usize },

    #[error("no root named `{0}` in the type graph")]
    UnknownRoot(String),

    #[error("recursive type at {path} has no finite instance to mock")]
    Uninhabited { path: String },

    #[error("no compiled function `{0}` is registered")]
    MissingFunction(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RunError {
    #[error("bigint {0} has no JSON representation outside a bigint-typed position")]
    BigIntNotSerializable(String),

    #[error("cannot decode {expected} from {found}")]
    Decode { expected: &'static str, found: String },

    #[error("union tag {index} is out of range for {arms} members")]
    BadUnionTag { index: usize, arms: usize },

    #[error("value matches no member of union `{0}`")]
    NoUnionMember(String),

    #[error("compiled function `{0}` is not registered")]
    MissingFunction(String),

    #[error("class `{0}` has no registered reviver")]
    MissingReviver(String),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("expected {} arguments, got {found}", describe_arity(.min, .max))]
    ArgCount { min: usize, max: Option<usize>, found: usize },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Run(#[from] RunError),
}

fn describe_arity(min: &usize, max: &Option<usize>) -> String {
    match *max {
        Some(max) if max == *min => format!("{min}"),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_messages_read_naturally() {
        let exact = AdapterError::ArgCount { min: 2, max: Some(2), found: 3 };
        assert_eq!(exact.to_string(), "expected 2 arguments, got 3");
        let open = AdapterError::ArgCount { min: 1, max: None, found: 0 };
        assert_eq!(open.to_string(), "expected at least 1 arguments, got 0");
    }
}
