//! End-to-end behaviour through the public engine surface.
use serde_json::json;

use crate::descriptor::{TypeGraph, TypeId, TypeKind};
use crate::error::{AdapterError, CompileError};
use crate::exec::PathItem;
use crate::{Engine, EngineConfig, MockOptions, Value};

fn seeded() -> Engine {
    Engine::new(EngineConfig {
        mock: MockOptions { seed: Some(7), ..MockOptions::default() },
        ..EngineConfig::default()
    })
}

fn graph(build: impl FnOnce(&mut TypeGraph) -> TypeId) -> (TypeGraph, TypeId) {
    let mut g = TypeGraph::new();
    let root = build(&mut g);
    (g, root)
}

fn path(items: &[PathItem]) -> Vec<PathItem> {
    items.to_vec()
}

#[test]
fn index_signatures_cover_the_remaining_keys() {
    // { a: string; b: number; [k: string]: string | number }
    let (g, root) = graph(|g| {
        let s = g.string();
        let n = g.number();
        let a = g.prop("a", s);
        let b = g.prop("b", n);
        let either = g.union(&[s, n]);
        let index = g.index_signature(s, either);
        g.object(&[a, b, index])
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let fns = engine.compile_all("Dict", &rts).unwrap();

    let ok = Value::from_json(json!({"a": "x", "b": 1, "extra": "y"}));
    assert!(fns.is_type.call(&ok));
    assert!(fns.type_errors.call(&ok).is_empty());

    let missing = Value::from_json(json!({"a": "x"}));
    assert!(!fns.is_type.call(&missing));
    let errors = fns.type_errors.call(&missing);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, path(&[PathItem::from("b")]));

    let wrong_extra = Value::from_json(json!({"a": "x", "b": 1, "extra": true}));
    let errors = fns.type_errors.call(&wrong_extra);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, path(&[PathItem::from("extra")]));
}

#[test]
fn short_tuples_report_the_missing_position() {
    // [Date, number, string]
    let (g, root) = graph(|g| {
        let d = g.date();
        let n = g.number();
        let s = g.string();
        g.tuple(&[d, n, s])
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let type_errors = engine.build_type_errors(&rts).unwrap();

    let when = Value::date_millis(1_700_000_000_000).unwrap();
    let short = Value::array([when.clone(), Value::Number(1.0)]);
    let errors = type_errors.call(&short);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, path(&[PathItem::from(2)]));
    assert_eq!(errors[0].expected, "string");

    let full = Value::array([when, Value::Number(1.0), Value::String("x".into())]);
    assert!(type_errors.call(&full).is_empty());
}

#[test]
fn string_or_bigint_keeps_the_arm_through_json() {
    let (g, root) = graph(|g| {
        let s = g.string();
        let b = g.bigint();
        g.union(&[s, b])
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let fns = engine.compile_all("StrOrBig", &rts).unwrap();

    let text = Value::String("5".into());
    let big = Value::bigint(5);
    let text_json = fns.json_encode.call(&text).unwrap();
    let big_json = fns.json_encode.call(&big).unwrap();
    assert_ne!(text_json, big_json);
    assert_eq!(fns.json_decode.call(text_json).unwrap(), text);
    assert_eq!(fns.json_decode.call(big_json).unwrap(), big);

    let stringified = fns.json_stringify.call(&big).unwrap();
    assert_eq!(fns.json_decode.parse(&stringified).unwrap(), big);
}

#[test]
fn bad_union_tags_fail_to_decode() {
    let (g, root) = graph(|g| {
        let s = g.string();
        let b = g.bigint();
        g.union(&[s, b])
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let decode = engine.build_json_decode(&rts).unwrap();
    assert!(decode.call(json!([9, "5"])).is_err());
    assert!(decode.call(json!("5")).is_err());
}

#[test]
fn mocks_satisfy_every_compiled_function() {
    // type List = { value: number; next?: List }, plus a few exotic fields
    let (g, root) = graph(|g| {
        let list = g.reserve();
        let n = g.number();
        let value = g.prop("value", n);
        let next = g.optional_prop("next", list);
        let sym = g.symbol();
        let tag = g.prop("tag", sym);
        let d = g.date();
        let at = g.optional_prop("at", d);
        g.define(list, TypeKind::ObjectLiteral { members: vec![value, next, tag, at] });
        g.named(list, "List")
    });
    let engine = seeded();
    let rts = engine.load(&g, root).unwrap();
    let fns = engine.compile_all("List", &rts).unwrap();
    let mock = engine.build_mock(&rts).unwrap();

    for v in mock.sample(50).unwrap() {
        assert!(fns.is_type.call(&v), "{v:?}");
        assert!(fns.type_errors.call(&v).is_empty(), "{v:?}");
        let back = fns.json_decode.call(fns.json_encode.call(&v).unwrap()).unwrap();
        assert_eq!(back, v);
        let text = fns.json_stringify.call(&v).unwrap();
        assert_eq!(fns.json_decode.parse(&text).unwrap(), v);
    }
}

#[test]
fn stringify_matches_encode_then_serialize() {
    let (g, root) = graph(|g| {
        let n = g.number();
        let b = g.bigint();
        let u = g.undefined();
        let count = g.prop("count", n);
        let total = g.prop("total", b);
        let gone = g.optional_prop("gone", u);
        g.object(&[count, total, gone])
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let fns = engine.compile_all("Totals", &rts).unwrap();

    let v = Value::object([("count", Value::Number(2.0)), ("total", Value::bigint(12))]);
    let text = fns.json_stringify.call(&v).unwrap();
    let encoded = fns.json_encode.call(&v).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, encoded);
    assert_eq!(parsed, json!({"count": 2, "total": "12"}));
}

#[test]
fn function_signatures_skip_leading_params() {
    // (ctx: () => void, id: string, limit?: number, ...tags: string[]) => Promise<Date>
    let (g, root) = graph(|g| {
        let v = g.void();
        let callback = g.function(&[], v);
        let s = g.string();
        let n = g.number();
        let d = g.date();
        let ret = g.promise(d);
        let ctx = g.param("ctx", callback);
        let id = g.param("id", s);
        let limit = g.optional_param("limit", n);
        let tags = g.rest_param("tags", s);
        g.function(&[ctx, id, limit, tags], ret)
    });
    let engine = seeded();
    let rts = engine.load(&g, root).unwrap();
    let sig = engine.signature(&rts, 1).unwrap();

    assert_eq!(sig.arity(), (1, None));
    assert!(sig.returns_promise());
    assert!(matches!(
        sig.params_is_type(&[]),
        Err(AdapterError::ArgCount { min: 1, max: None, found: 0 })
    ));

    let args = [Value::String("a".into()), Value::Undefined, Value::String("t".into())];
    assert!(sig.params_is_type(&args).unwrap());
    let encoded = sig.params_encode(&args).unwrap();
    assert_eq!(encoded, vec![json!("a"), json!(null), json!("t")]);
    assert_eq!(sig.params_decode(encoded).unwrap(), args.to_vec());

    let bad = [Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)];
    let errors = sig.params_type_errors(&bad).unwrap();
    let paths: Vec<_> = errors.iter().map(|e| e.path.clone()).collect();
    assert_eq!(paths, vec![path(&[PathItem::from(0)]), path(&[PathItem::from(2)])]);

    for args in (0..20).map(|_| sig.params_mock().unwrap()) {
        assert!(sig.params_is_type(&args).unwrap(), "{args:?}");
    }

    let when = sig.return_mock().unwrap();
    assert!(sig.return_is_type(&when));
    let json = sig.return_encode(&when).unwrap();
    assert_eq!(sig.return_decode(json).unwrap(), when);
}

#[test]
fn non_functions_have_no_signature() {
    let (g, root) = graph(|g| g.string());
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    assert!(matches!(engine.signature(&rts, 0), Err(CompileError::NotAFunction(_))));
}

#[test]
fn data_functions_reject_non_data_roots() {
    let engine = Engine::default();

    let (g, never) = graph(|g| g.never());
    let rts = engine.load(&g, never).unwrap();
    assert!(matches!(engine.build_is_type(&rts), Err(CompileError::Never { .. })));
    assert!(matches!(engine.build_mock(&rts), Err(CompileError::Uninhabited { .. })));

    let (g, function) = graph(|g| {
        let v = g.void();
        g.function(&[], v)
    });
    let rts = engine.load(&g, function).unwrap();
    assert!(matches!(engine.build_json_encode(&rts), Err(CompileError::FunctionNotData { .. })));
}

#[test]
fn never_members_drop_out_of_unions() {
    let (g, root) = graph(|g| {
        let s = g.string();
        let never = g.never();
        g.union(&[s, never])
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let is_type = engine.build_is_type(&rts).unwrap();
    assert!(is_type.call(&Value::String("ok".into())));
    assert!(!is_type.call(&Value::Null));
}

#[test]
fn shared_registries_reuse_functions_across_engines() {
    let (g, root) = graph(|g| {
        let s = g.string();
        let name = g.prop("name", s);
        g.object(&[name])
    });
    let first = Engine::default();
    let second = Engine::with_registry(EngineConfig::default(), first.registry().clone());
    let rts = first.load(&g, root).unwrap();
    first.compile_all("Named", &rts).unwrap();
    let before = first.registry().len();
    second.compile_all("Named", &second.load(&g, root).unwrap()).unwrap();
    assert_eq!(second.registry().len(), before);
}

#[test]
fn shared_registries_still_need_local_revivers() {
    let (g, root) = graph(|g| {
        let n = g.number();
        let x = g.prop("x", n);
        g.add(TypeKind::Class { name: "Point".into(), members: vec![x] })
    });
    let mut first = Engine::default();
    first.register_class("Point", |v| v);
    let rts = first.load(&g, root).unwrap();
    first.build_json_decode(&rts).unwrap();

    let second = Engine::with_registry(EngineConfig::default(), first.registry().clone());
    let rts = second.load(&g, root).unwrap();
    assert_eq!(second.build_json_decode(&rts).unwrap_err(), CompileError::UnregisteredClass("Point".into()));
    assert!(second.compile_all("Point", &rts).is_err());
    assert!(second.build_is_type(&rts).is_ok());
}

#[test]
fn omitted_optional_tuple_slots_survive_json() {
    // [string, Date?]
    let (g, root) = graph(|g| {
        let s = g.string();
        let d = g.date();
        let first = g.tuple_member(s, false);
        let second = g.tuple_member(d, true);
        g.add(TypeKind::Tuple { members: vec![first, second] })
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let fns = engine.compile_all("Pair", &rts).unwrap();

    let when = Value::date_millis(1_700_000_000_123).unwrap();
    for v in [
        Value::array([Value::from("a"), Value::Undefined]),
        Value::array([Value::from("a")]),
        Value::array([Value::from("a"), when]),
    ] {
        assert!(fns.is_type.call(&v), "{v:?}");
        let back = fns.json_decode.call(fns.json_encode.call(&v).unwrap()).unwrap();
        assert_eq!(back, v);
        let text = fns.json_stringify.call(&v).unwrap();
        assert_eq!(fns.json_decode.parse(&text).unwrap(), v);
    }
}

#[test]
fn nullable_optional_tuple_slots_keep_null() {
    // [string, (number | null)?]
    let (g, root) = graph(|g| {
        let s = g.string();
        let n = g.number();
        let null = g.null();
        let maybe = g.union(&[n, null]);
        let first = g.tuple_member(s, false);
        let second = g.tuple_member(maybe, true);
        g.add(TypeKind::Tuple { members: vec![first, second] })
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let decode = engine.build_json_decode(&rts).unwrap();
    assert_eq!(decode.call(json!(["a", null])).unwrap(), Value::array([Value::from("a"), Value::Null]));
}

#[test]
fn dates_are_whole_milliseconds_in_any_year() {
    let (g, root) = graph(|g| g.date());
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let fns = engine.compile_all("When", &rts).unwrap();

    let fine = chrono::DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
    assert!(!fns.is_type.call(&Value::Date(fine)));
    assert!(fns.is_type.call(&Value::date(fine)));

    let far = Value::date_millis(316_536_681_600_000).unwrap();
    let encoded = fns.json_encode.call(&far).unwrap();
    assert!(encoded.as_str().is_some_and(|s| s.starts_with("+01")), "{encoded}");
    assert_eq!(fns.json_decode.call(encoded).unwrap(), far);
    let text = fns.json_stringify.call(&far).unwrap();
    assert_eq!(fns.json_decode.parse(&text).unwrap(), far);
}

#[test]
fn unions_tag_when_any_member_needs_encoding() {
    // string | symbol: the plain string "Symbol:x" must not come back as a symbol.
    let (g, root) = graph(|g| {
        let s = g.string();
        let sym = g.symbol();
        g.union(&[s, sym])
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    let fns = engine.compile_all("StrOrSym", &rts).unwrap();

    let text = Value::from("Symbol:x");
    let symbol = Value::symbol("x");
    assert_eq!(fns.json_encode.call(&text).unwrap(), json!([0, "Symbol:x"]));
    assert_eq!(fns.json_encode.call(&symbol).unwrap(), json!([1, "Symbol:x"]));
    for v in [text, symbol] {
        let back = fns.json_decode.call(fns.json_encode.call(&v).unwrap()).unwrap();
        assert_eq!(back, v);
        let parsed = fns.json_decode.parse(&fns.json_stringify.call(&v).unwrap()).unwrap();
        assert_eq!(parsed, v);
    }
}

#[test]
fn deep_types_hit_the_compile_depth_limit() {
    // { a: { a: { a: { a: { a: string } } } } }
    let (g, root) = graph(|g| {
        let mut ty = g.string();
        for _ in 0..5 {
            let a = g.prop("a", ty);
            ty = g.object(&[a]);
        }
        ty
    });
    let rts = Engine::default().load(&g, root).unwrap();
    let shallow = Engine::new(EngineConfig { max_depth: 3, ..EngineConfig::default() });
    assert!(matches!(shallow.build_is_type(&rts), Err(CompileError::MaxDepth { max: 3, .. })));
    assert!(matches!(shallow.build_type_errors(&rts), Err(CompileError::MaxDepth { max: 3, .. })));
}

#[test]
fn skipping_past_the_last_param_is_an_error() {
    let (g, root) = graph(|g| {
        let s = g.string();
        let v = g.void();
        let id = g.param("id", s);
        g.function(&[id], v)
    });
    let engine = Engine::default();
    let rts = engine.load(&g, root).unwrap();
    assert!(engine.signature(&rts, 1).is_ok());
    assert_eq!(engine.signature(&rts, 2).err(), Some(CompileError::SkipTooLarge { skip: 2, params: 1 }));
}
