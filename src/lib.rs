//! Runtime type engine.
//!
//! A reflected type graph ([`TypeGraph`]) is lowered once into RunType nodes
//! and compiled into cached, reusable functions: `isType`, `typeErrors`,
//! `jsonEncode`, `jsonDecode`, `jsonStringify`, plus mocks and adapters for
//! function signatures.
//!
//! ```no_run
//! use runtype_jit::{Engine, TypeGraph, Value};
//!
//! let mut g = TypeGraph::new();
//! let s = g.string();
//! let name = g.prop("name", s);
//! let user = g.object(&[name]);
//!
//! let engine = Engine::default();
//! let rts = engine.load(&g, user)?;
//! let is_user = engine.build_is_type(&rts)?;
//! assert!(is_user.call(&Value::object([("name", Value::from("ada"))])));
//! # Ok::<(), runtype_jit::CompileError>(())
//! ```
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod exec;
pub mod ir;
pub mod jit;
pub mod lower;
pub mod mock;
pub mod path_de;
pub mod render;
pub mod runtype;
pub mod signature;
pub mod value;

pub use config::EngineConfig;
pub use descriptor::{Literal, TypeGraph, TypeId, TypeKind};
pub use engine::Engine;
pub use error::{AdapterError, CompileError, RunError};
pub use exec::{ClassRegistry, PathItem, ValidationError};
pub use jit::builders::{IsTypeFn, JitFunctions, JsonDecodeFn, JsonEncodeFn, JsonStringifyFn, TypeErrorsFn};
pub use jit::cache::{JitRegistry, JitSnapshot};
pub use mock::{MockFn, MockOptions, MockPromise, MockPromiseFn};
pub use runtype::{NodeId, RunTypes};
pub use signature::{FnSignature, ParamFns};
pub use value::{BigInt, Value};

#[cfg(test)]
mod scenarios;
