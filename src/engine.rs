//! The engine: configuration, the shared function cache and class revivers
//! in one place, with a builder method per compile target.
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::descriptor::{TypeGraph, TypeId};
use crate::error::CompileError;
use crate::exec::ClassRegistry;
use crate::jit::builders::{
    IsTypeFn, JitBuilder, JitFunctions, JsonDecodeFn, JsonEncodeFn, JsonStringifyFn, TypeErrorsFn,
};
use crate::jit::cache::{JitRegistry, JitSnapshot};
use crate::lower::lower;
use crate::mock::{MockFn, MockPromiseFn};
use crate::runtype::{NodeId, RunTypes};
use crate::signature::FnSignature;
use crate::value::Value;

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    registry: Arc<JitRegistry>,
    classes: Arc<ClassRegistry>,
    /// Entry points by name, recorded by `compile_all` and snapshots.
    roots: Mutex<IndexMap<String, String>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, JitRegistry::shared())
    }

    /// An engine compiling into a registry shared with other engines.
    pub fn with_registry(config: EngineConfig, registry: Arc<JitRegistry>) -> Self {
        Self { config, registry, classes: Arc::new(ClassRegistry::new()), roots: Mutex::new(IndexMap::new()) }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JitRegistry> {
        &self.registry
    }

    /// Register the reviver used when decoding instances of class `name`.
    /// Handles built earlier keep the revivers they were built with.
    pub fn register_class(&mut self, name: impl Into<String>, reviver: impl Fn(Value) -> Value + Send + Sync + 'static) {
        Arc::make_mut(&mut self.classes).register(name, reviver);
    }

    // ---- loading -----------------------------------------------------------

    pub fn load(&self, graph: &TypeGraph, root: TypeId) -> Result<Arc<RunTypes>, CompileError> {
        graph.validate()?;
        Ok(Arc::new(lower(graph, root, self.config.max_depth)?))
    }

    pub fn load_named(&self, graph: &TypeGraph, name: &str) -> Result<Arc<RunTypes>, CompileError> {
        self.load(graph, graph.root(name)?)
    }

    fn builder<'a>(&'a self, rts: &'a RunTypes) -> JitBuilder<'a> {
        JitBuilder::new(rts, &self.registry, &self.classes, &self.config)
    }

    // ---- builders ----------------------------------------------------------

    pub fn build_is_type(&self, rts: &RunTypes) -> Result<IsTypeFn, CompileError> {
        self.build_is_type_at(rts, rts.root())
    }

    pub fn build_is_type_at(&self, rts: &RunTypes, id: NodeId) -> Result<IsTypeFn, CompileError> {
        self.builder(rts).is_type(id)
    }

    pub fn build_type_errors(&self, rts: &RunTypes) -> Result<TypeErrorsFn, CompileError> {
        self.build_type_errors_at(rts, rts.root())
    }

    pub fn build_type_errors_at(&self, rts: &RunTypes, id: NodeId) -> Result<TypeErrorsFn, CompileError> {
        self.builder(rts).type_errors(id)
    }

    pub fn build_json_encode(&self, rts: &RunTypes) -> Result<JsonEncodeFn, CompileError> {
        self.build_json_encode_at(rts, rts.root())
    }

    pub fn build_json_encode_at(&self, rts: &RunTypes, id: NodeId) -> Result<JsonEncodeFn, CompileError> {
        self.builder(rts).json_encode(id)
    }

    pub fn build_json_decode(&self, rts: &RunTypes) -> Result<JsonDecodeFn, CompileError> {
        self.build_json_decode_at(rts, rts.root())
    }

    pub fn build_json_decode_at(&self, rts: &RunTypes, id: NodeId) -> Result<JsonDecodeFn, CompileError> {
        self.builder(rts).json_decode(id)
    }

    pub fn build_json_stringify(&self, rts: &RunTypes) -> Result<JsonStringifyFn, CompileError> {
        self.build_json_stringify_at(rts, rts.root())
    }

    pub fn build_json_stringify_at(&self, rts: &RunTypes, id: NodeId) -> Result<JsonStringifyFn, CompileError> {
        self.builder(rts).json_stringify(id)
    }

    pub fn build_mock(&self, rts: &Arc<RunTypes>) -> Result<MockFn, CompileError> {
        MockFn::build(rts.clone(), rts.root(), self.config.mock.clone())
    }

    pub fn build_mock_promise(&self, rts: &Arc<RunTypes>) -> Result<MockPromiseFn, CompileError> {
        MockPromiseFn::build(rts.clone(), rts.root(), self.config.mock.clone())
    }

    /// Build all five functions and record them as entry point `name`.
    pub fn compile_all(&self, name: &str, rts: &RunTypes) -> Result<JitFunctions, CompileError> {
        let fns = self.builder(rts).all(rts.root())?;
        self.roots_mut().insert(name.to_string(), fns.jit_id().to_string());
        debug!(name, jit_id = fns.jit_id(), "compiled entry point");
        Ok(fns)
    }

    /// Adapter for a function type; the first `skip` parameters are left out.
    pub fn signature(&self, rts: &Arc<RunTypes>, skip: usize) -> Result<FnSignature, CompileError> {
        FnSignature::build(rts.clone(), rts.root(), skip, &self.registry, &self.classes, &self.config)
    }

    // ---- persistence -------------------------------------------------------

    pub fn snapshot(&self) -> JitSnapshot {
        self.registry.snapshot(self.roots_mut().clone())
    }

    /// Register a snapshot's functions and entry points. Returns how many
    /// functions were new.
    pub fn restore(&self, snapshot: JitSnapshot) -> usize {
        let JitSnapshot { functions, roots } = snapshot;
        self.roots_mut().extend(roots);
        self.registry.restore(JitSnapshot { functions, roots: IndexMap::new() })
    }

    /// Handles for entry point `name` without lowering or compiling.
    pub fn restored(&self, name: &str) -> Result<JitFunctions, CompileError> {
        let jit_id = self.roots_mut().get(name).cloned().ok_or_else(|| CompileError::UnknownRoot(name.to_string()))?;
        self.restored_by_id(&jit_id)
    }

    pub fn restored_by_id(&self, jit_id: &str) -> Result<JitFunctions, CompileError> {
        JitFunctions::restored(jit_id, &self.registry, &self.classes)
    }

    fn roots_mut(&self) -> std::sync::MutexGuard<'_, IndexMap<String, String>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeKind;
    use crate::exec::PathItem;
    use serde_json::json;

    fn user_graph() -> TypeGraph {
        let mut g = TypeGraph::new();
        let s = g.string();
        let n = g.number();
        let name = g.prop("name", s);
        let age = g.optional_prop("age", n);
        let user = g.object(&[name, age]);
        g.named(user, "User");
        g.set_root("User", user);
        g
    }

    #[test]
    fn unknown_roots_are_reported() {
        let engine = Engine::default();
        let err = engine.load_named(&user_graph(), "Nope").unwrap_err();
        assert_eq!(err, CompileError::UnknownRoot("Nope".into()));
    }

    #[test]
    fn snapshots_restore_into_a_fresh_engine() {
        let engine = Engine::default();
        let rts = engine.load_named(&user_graph(), "User").unwrap();
        let built = engine.compile_all("User", &rts).unwrap();
        let text = serde_json::to_string(&engine.snapshot()).unwrap();

        let fresh = Engine::default();
        let snapshot: JitSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(fresh.restore(snapshot), 5);
        let restored = fresh.restored("User").unwrap();

        let good = Value::from_json(json!({"name": "ada", "age": 36}));
        let bad = Value::from_json(json!({"name": 1}));
        for v in [&good, &bad] {
            assert_eq!(built.is_type.call(v), restored.is_type.call(v));
            assert_eq!(built.type_errors.call(v), restored.type_errors.call(v));
        }
        assert_eq!(restored.type_errors.call(&bad)[0].path, vec![PathItem::from("name")]);
        assert_eq!(
            built.json_stringify.call(&good).unwrap(),
            restored.json_stringify.call(&good).unwrap()
        );
    }

    #[test]
    fn classes_decode_only_once_registered() {
        let mut g = TypeGraph::new();
        let n = g.number();
        let x = g.prop("x", n);
        let point = g.add(TypeKind::Class { name: "Point".into(), members: vec![x] });

        let mut engine = Engine::default();
        let rts = engine.load(&g, point).unwrap();
        let err = engine.build_json_decode(&rts).unwrap_err();
        assert_eq!(err, CompileError::UnregisteredClass("Point".into()));

        engine.register_class("Point", |v| match v {
            Value::Object(mut map) => {
                map.insert("revived".into(), Value::Bool(true));
                Value::Object(map)
            }
            other => other,
        });
        let decode = engine.build_json_decode(&rts).unwrap();
        let v = decode.call(json!({"x": 1})).unwrap();
        assert_eq!(v.get("revived"), &Value::Bool(true));
    }
}
