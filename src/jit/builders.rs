//! Function builders: one walk per target, registered in the shared cache,
//! returned as callable handles.
use std::sync::Arc;

use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::error::{CompileError, RunError};
use crate::exec::{ClassRegistry, Exec, PathItem, ValidationError};
use crate::ir::{FnKey, OpKind};
use crate::jit::cache::JitRegistry;
use crate::jit::op::{CompileOp, IsType, JsonDecode, JsonEncode, JsonStringify, Target, TypeErrors};
use crate::runtype::{NodeId, RunTypes};
use crate::value::Value;

/// Key of a registered function plus what it needs to run.
#[derive(Debug, Clone)]
pub struct JitHandle {
    key: FnKey,
    registry: Arc<JitRegistry>,
    classes: Arc<ClassRegistry>,
}

impl JitHandle {
    pub(crate) fn new(key: FnKey, registry: Arc<JitRegistry>, classes: Arc<ClassRegistry>) -> Self {
        Self { key, registry, classes }
    }

    pub fn key(&self) -> &FnKey {
        &self.key
    }

    pub fn jit_id(&self) -> &str {
        &self.key.jit_id
    }

    fn exec<R>(&self, f: impl FnOnce(&Exec<'_>) -> R) -> R {
        let table = self.registry.read();
        f(&Exec::new(&table, &self.classes))
    }
}

#[derive(Debug, Clone)]
pub struct IsTypeFn(JitHandle);

impl IsTypeFn {
    pub fn call(&self, v: &Value) -> bool {
        self.0.exec(|x| x.run_is_type(&self.0.key, v)).unwrap_or_else(|err| {
            error!(key = %self.0.key, %err, "isType failed to run");
            false
        })
    }

    pub fn handle(&self) -> &JitHandle {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct TypeErrorsFn(JitHandle);

impl TypeErrorsFn {
    pub fn call(&self, v: &Value) -> Vec<ValidationError> {
        self.0.exec(|x| x.run_type_errors(&self.0.key, v)).unwrap_or_else(|err| {
            error!(key = %self.0.key, %err, "typeErrors failed to run");
            vec![ValidationError { path: Vec::new(), expected: self.0.key.jit_id.clone() }]
        })
    }

    /// Like [`TypeErrorsFn::call`], with every path starting at `prefix`.
    pub fn call_at(&self, v: &Value, prefix: &[PathItem]) -> Vec<ValidationError> {
        let mut errors = self.call(v);
        for e in &mut errors {
            e.path.splice(0..0, prefix.iter().cloned());
        }
        errors
    }

    pub fn handle(&self) -> &JitHandle {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct JsonEncodeFn(JitHandle);

impl JsonEncodeFn {
    /// Encode a copy of `v` and convert it to JSON.
    pub fn call(&self, v: &Value) -> Result<serde_json::Value, RunError> {
        let mut v = v.clone();
        self.encode_in_place(&mut v)?;
        v.to_json()
    }

    pub fn encode_in_place(&self, v: &mut Value) -> Result<(), RunError> {
        self.0.exec(|x| x.run_transform(&self.0.key, v))
    }

    pub fn handle(&self) -> &JitHandle {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct JsonDecodeFn(JitHandle);

impl JsonDecodeFn {
    pub fn call(&self, json: serde_json::Value) -> Result<Value, RunError> {
        let mut v = Value::from_json(json);
        self.decode_in_place(&mut v)?;
        Ok(v)
    }

    pub fn decode_in_place(&self, v: &mut Value) -> Result<(), RunError> {
        self.0.exec(|x| x.run_transform(&self.0.key, v))
    }

    /// Parse JSON text and decode it.
    pub fn parse(&self, text: &str) -> Result<Value, RunError> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| RunError::Decode { expected: "JSON text", found: err.to_string() })?;
        self.call(json)
    }

    pub fn handle(&self) -> &JitHandle {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct JsonStringifyFn(JitHandle);

impl JsonStringifyFn {
    pub fn call(&self, v: &Value) -> Result<String, RunError> {
        self.0.exec(|x| x.run_stringify(&self.0.key, v))
    }

    pub fn handle(&self) -> &JitHandle {
        &self.0
    }
}

/// All five functions of one type.
#[derive(Debug, Clone)]
pub struct JitFunctions {
    pub is_type: IsTypeFn,
    pub type_errors: TypeErrorsFn,
    pub json_encode: JsonEncodeFn,
    pub json_decode: JsonDecodeFn,
    pub json_stringify: JsonStringifyFn,
}

impl JitFunctions {
    pub fn jit_id(&self) -> &str {
        self.is_type.0.jit_id()
    }

    /// Handles for functions already in `registry`, without compiling.
    pub(crate) fn restored(
        jit_id: &str,
        registry: &Arc<JitRegistry>,
        classes: &Arc<ClassRegistry>,
    ) -> Result<Self, CompileError> {
        let handle = |op: OpKind| {
            let key = FnKey::new(jit_id, op);
            if !registry.contains(&key) {
                return Err(CompileError::MissingFunction(key.to_string()));
            }
            Ok(JitHandle::new(key, registry.clone(), classes.clone()))
        };
        Ok(Self {
            is_type: IsTypeFn(handle(OpKind::IsType)?),
            type_errors: TypeErrorsFn(handle(OpKind::TypeErrors)?),
            json_encode: JsonEncodeFn(handle(OpKind::JsonEncode)?),
            json_decode: JsonDecodeFn(handle(OpKind::JsonDecode)?),
            json_stringify: JsonStringifyFn(handle(OpKind::JsonStringify)?),
        })
    }
}

// -------------------- builder --------------------

/// Compiles nodes of one arena into the shared registry.
pub struct JitBuilder<'a> {
    rts: &'a RunTypes,
    registry: &'a Arc<JitRegistry>,
    classes: &'a Arc<ClassRegistry>,
    config: &'a EngineConfig,
}

impl<'a> JitBuilder<'a> {
    pub fn new(
        rts: &'a RunTypes,
        registry: &'a Arc<JitRegistry>,
        classes: &'a Arc<ClassRegistry>,
        config: &'a EngineConfig,
    ) -> Self {
        Self { rts, registry, classes, config }
    }

    fn build<T: Target>(&self, id: NodeId) -> Result<JitHandle, CompileError> {
        let mut cop = CompileOp::new(
            self.rts,
            self.registry,
            self.classes,
            self.config.max_depth,
            self.config.share_named_types,
        );
        let key = cop.define_root::<T>(id)?;
        let fns = cop.finish();
        let built = fns.len();
        let added = self.registry.define_all(fns);
        debug!(key = %key, built, added, "built function");
        Ok(JitHandle::new(key, self.registry.clone(), self.classes.clone()))
    }

    pub fn is_type(&self, id: NodeId) -> Result<IsTypeFn, CompileError> {
        self.build::<IsType>(id).map(IsTypeFn)
    }

    pub fn type_errors(&self, id: NodeId) -> Result<TypeErrorsFn, CompileError> {
        self.build::<TypeErrors>(id).map(TypeErrorsFn)
    }

    pub fn json_encode(&self, id: NodeId) -> Result<JsonEncodeFn, CompileError> {
        self.build::<JsonEncode>(id).map(JsonEncodeFn)
    }

    pub fn json_decode(&self, id: NodeId) -> Result<JsonDecodeFn, CompileError> {
        self.build::<JsonDecode>(id).map(JsonDecodeFn)
    }

    pub fn json_stringify(&self, id: NodeId) -> Result<JsonStringifyFn, CompileError> {
        self.build::<JsonStringify>(id).map(JsonStringifyFn)
    }

    pub fn all(&self, id: NodeId) -> Result<JitFunctions, CompileError> {
        Ok(JitFunctions {
            is_type: self.is_type(id)?,
            type_errors: self.type_errors(id)?,
            json_encode: self.json_encode(id)?,
            json_decode: self.json_decode(id)?,
            json_stringify: self.json_stringify(id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{TypeGraph, TypeKind};
    use crate::lower::lower;
    use serde_json::json;

    fn tree() -> RunTypes {
        // type Tree = { label: string; children: Tree[] }
        let mut g = TypeGraph::new();
        let tree = g.reserve();
        let s = g.string();
        let label = g.prop("label", s);
        let arr = g.array(tree);
        let children = g.prop("children", arr);
        g.define(tree, TypeKind::ObjectLiteral { members: vec![label, children] });
        g.named(tree, "Tree");
        lower(&g, tree, 64).unwrap()
    }

    #[test]
    fn circular_types_build_one_function_per_target() {
        let rts = tree();
        let registry = JitRegistry::shared();
        let classes = Arc::new(ClassRegistry::new());
        let config = EngineConfig::default();
        let fns = JitBuilder::new(&rts, &registry, &classes, &config).all(rts.root()).unwrap();
        assert_eq!(registry.len(), 5);

        let ok = Value::from_json(json!({"label": "a", "children": [{"label": "b", "children": []}]}));
        assert!(fns.is_type.call(&ok));

        let bad = Value::from_json(json!({"label": "a", "children": [{"label": 1, "children": []}]}));
        assert!(!fns.is_type.call(&bad));
        let errors = fns.type_errors.call(&bad);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, vec![PathItem::from("children"), PathItem::from(0), PathItem::from("label")]);
        assert_eq!(errors[0].expected, "string");
    }

    #[test]
    fn rebuilding_reuses_registered_functions() {
        let rts = tree();
        let registry = JitRegistry::shared();
        let classes = Arc::new(ClassRegistry::new());
        let config = EngineConfig::default();
        let builder = JitBuilder::new(&rts, &registry, &classes, &config);
        let first = builder.is_type(rts.root()).unwrap();
        let second = builder.is_type(rts.root()).unwrap();
        assert_eq!(first.handle().key(), second.handle().key());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn restored_handles_need_every_target() {
        let rts = tree();
        let registry = JitRegistry::shared();
        let classes = Arc::new(ClassRegistry::new());
        let config = EngineConfig::default();
        let builder = JitBuilder::new(&rts, &registry, &classes, &config);
        builder.is_type(rts.root()).unwrap();
        let jit_id = rts.root_node().jit_id.clone();
        let err = JitFunctions::restored(&jit_id, &registry, &classes).unwrap_err();
        assert!(matches!(err, CompileError::MissingFunction(_)));
    }

    #[test]
    fn prefixed_paths_start_at_the_prefix() {
        let mut g = TypeGraph::new();
        let s = g.string();
        let rts = lower(&g, s, 64).unwrap();
        let registry = JitRegistry::shared();
        let classes = Arc::new(ClassRegistry::new());
        let config = EngineConfig::default();
        let f = JitBuilder::new(&rts, &registry, &classes, &config).type_errors(rts.root()).unwrap();
        let errors = f.call_at(&Value::Null, &[PathItem::from(2)]);
        assert_eq!(errors, vec![ValidationError { path: vec![PathItem::Index(2)], expected: "string".into() }]);
    }
}
