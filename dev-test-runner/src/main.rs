//! Property sweep: for every fixture type, draw mocks and check that the
//! compiled functions agree with each other.
//!
//! Usage: dev-test-runner [--only REGEX] [--draws N] [FIXTURE.json ...]
//!
//! Fixture files hold `{ "graph": <type graph>, "roots": ["Name", ...] }`.
use std::process::ExitCode;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use runtype_jit::descriptor::{Literal, TypeGraph, TypeKind};
use runtype_jit::value::BigInt;
use runtype_jit::{Engine, EngineConfig, JitFunctions, MockOptions, RunTypes, Value};

#[derive(Deserialize)]
struct FixtureFile {
    graph: TypeGraph,
    roots: Vec<String>,
}

struct Fixture {
    name: String,
    graph: TypeGraph,
    root: String,
}

static CATALOGUE: Lazy<Vec<Fixture>> = Lazy::new(builtin_fixtures);

fn fixture(name: &str, build: impl FnOnce(&mut TypeGraph) -> runtype_jit::TypeId) -> Fixture {
    let mut graph = TypeGraph::new();
    let root = build(&mut graph);
    graph.set_root(name, root);
    Fixture { name: name.to_string(), graph, root: name.to_string() }
}

fn builtin_fixtures() -> Vec<Fixture> {
    vec![
        fixture("LinkedList", |g| {
            let node = g.reserve();
            let n = g.number();
            let value = g.prop("value", n);
            let next = g.optional_prop("next", node);
            g.define(node, TypeKind::ObjectLiteral { members: vec![value, next] });
            g.named(node, "LinkedList")
        }),
        fixture("Tree", |g| {
            let tree = g.reserve();
            let s = g.string();
            let label = g.prop("label", s);
            let kids = g.array(tree);
            let children = g.prop("children", kids);
            g.define(tree, TypeKind::ObjectLiteral { members: vec![label, children] });
            g.named(tree, "Tree")
        }),
        fixture("StringOrBigint", |g| {
            let s = g.string();
            let b = g.bigint();
            g.union(&[s, b])
        }),
        fixture("Dictionary", |g| {
            let s = g.string();
            let n = g.number();
            let a = g.prop("a", s);
            let b = g.prop("b", n);
            let either = g.union(&[s, n]);
            let index = g.index_signature(s, either);
            g.object(&[a, b, index])
        }),
        fixture("Event", |g| {
            let d = g.date();
            let n = g.number();
            let s = g.string();
            let at = g.tuple_member(d, false);
            let count = g.tuple_member(n, false);
            let tags = g.rest(s);
            g.add(TypeKind::Tuple { members: vec![at, count, tags] })
        }),
        fixture("Pair", |g| {
            let s = g.string();
            let d = g.date();
            let first = g.tuple_member(s, false);
            let second = g.tuple_member(d, true);
            g.add(TypeKind::Tuple { members: vec![first, second] })
        }),
        fixture("Exotic", |g| {
            let sym = g.symbol();
            let re = g.regexp();
            let big = g.bigint();
            let d = g.date();
            let props = [
                g.prop("sym", sym),
                g.prop("re", re),
                g.optional_prop("big", big),
                g.prop("when", d),
            ];
            g.object(&props)
        }),
        fixture("Status", |g| {
            g.enumeration(&[
                ("Active", Literal::from("active")),
                ("Retired", Literal::from("retired")),
                ("Code", Literal::from(7.0)),
            ])
        }),
        fixture("Shape", |g| {
            let circle = g.literal("circle");
            let square = g.literal("square");
            let n = g.number();
            let big = g.literal(Literal::Bigint(BigInt::from(10i64)));
            let kind_c = g.prop("kind", circle);
            let r = g.prop("r", n);
            let kind_s = g.prop("kind", square);
            let side = g.prop("side", big);
            let c = g.object(&[kind_c, r]);
            let sq = g.object(&[kind_s, side]);
            let shape = g.union(&[c, sq]);
            g.array(shape)
        }),
        fixture("Json", |g| {
            // type Json = null | boolean | number | string | Json[] | { [k: string]: Json }
            let json = g.reserve();
            let null = g.null();
            let b = g.boolean();
            let n = g.number();
            let s = g.string();
            let arr = g.array(json);
            let key = g.string();
            let index = g.index_signature(key, json);
            let obj = g.object(&[index]);
            g.define(json, TypeKind::Union { members: vec![null, b, n, s, arr, obj] });
            g.named(json, "Json")
        }),
    ]
}

// -------------------- properties --------------------

#[derive(Default)]
struct Tally {
    checked: usize,
    failures: Vec<String>,
}

impl Tally {
    fn expect(&mut self, ok: bool, what: impl FnOnce() -> String) {
        self.checked += 1;
        if !ok {
            self.failures.push(what());
        }
    }
}

fn sweep(fixture: &Fixture, draws: usize, tally: &mut Tally) -> Result<(), String> {
    let config = EngineConfig {
        mock: MockOptions { seed: Some(draws as u64), ..MockOptions::default() },
        ..EngineConfig::default()
    };
    let engine = Engine::new(config);
    let rts: Arc<RunTypes> = engine.load_named(&fixture.graph, &fixture.root).map_err(|e| e.to_string())?;
    let fns = engine.compile_all(&fixture.root, &rts).map_err(|e| e.to_string())?;
    let mock = engine.build_mock(&rts).map_err(|e| e.to_string())?;

    // Restored handles must behave exactly like the ones that built them.
    let text = serde_json::to_string(&engine.snapshot()).map_err(|e| e.to_string())?;
    let restored_engine = Engine::default();
    restored_engine.restore(serde_json::from_str(&text).map_err(|e| e.to_string())?);
    let restored = restored_engine.restored(&fixture.root).map_err(|e| e.to_string())?;

    for i in 0..draws {
        let v = mock.call().map_err(|e| e.to_string())?;
        check_value(&fixture.name, i, &fns, &restored, &v, tally);
    }
    Ok(())
}

fn check_value(name: &str, i: usize, fns: &JitFunctions, restored: &JitFunctions, v: &Value, tally: &mut Tally) {
    let label = |what: &str| format!("{name} draw {i}: {what} for {v:?}");

    tally.expect(fns.is_type.call(v), || label("mock is not its own type"));
    let errors = fns.type_errors.call(v);
    tally.expect(errors.is_empty(), || label(&format!("typeErrors reported {errors:?}")));

    match fns.json_encode.call(v).and_then(|json| fns.json_decode.call(json)) {
        Ok(back) => tally.expect(&back == v, || label(&format!("encode/decode gave {back:?}"))),
        Err(err) => tally.expect(false, || label(&format!("encode/decode failed: {err}"))),
    }

    match fns.json_stringify.call(v).and_then(|text| fns.json_decode.parse(&text)) {
        Ok(back) => tally.expect(&back == v, || label(&format!("stringify/decode gave {back:?}"))),
        Err(err) => tally.expect(false, || label(&format!("stringify/decode failed: {err}"))),
    }

    tally.expect(restored.is_type.call(v), || label("restored isType disagrees"));
    let a = fns.json_stringify.call(v).ok();
    let b = restored.json_stringify.call(v).ok();
    tally.expect(a == b, || label("restored jsonStringify disagrees"));
}

// -------------------- entry --------------------

fn load_fixture_file(path: &str) -> Result<Vec<Fixture>, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("{path}: {e}"))?;
    let de = &mut serde_json::Deserializer::from_slice(&bytes);
    let file: FixtureFile = serde_path_to_error::deserialize(de)
        .map_err(|err| format!("{path}: at JSON path {} → {}", err.path(), err.inner()))?;
    Ok(file
        .roots
        .into_iter()
        .map(|root| Fixture { name: format!("{path}#{root}"), graph: file.graph.clone(), root })
        .collect())
}

fn main() -> ExitCode {
    let mut only: Option<Regex> = None;
    let mut draws = 200usize;
    let mut files = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--only" => match args.next().map(|p| Regex::new(&p)) {
                Some(Ok(re)) => only = Some(re),
                _ => {
                    eprintln!("--only needs a valid regex");
                    return ExitCode::FAILURE;
                }
            },
            "--draws" => match args.next().and_then(|n| n.parse().ok()) {
                Some(n) => draws = n,
                None => {
                    eprintln!("--draws needs a number");
                    return ExitCode::FAILURE;
                }
            },
            _ => files.push(arg),
        }
    }

    let mut extra = Vec::new();
    for file in &files {
        match load_fixture_file(file) {
            Ok(fixtures) => extra.extend(fixtures),
            Err(err) => {
                eprintln!("❌ {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut tally = Tally::default();
    let selected = CATALOGUE
        .iter()
        .chain(extra.iter())
        .filter(|f| only.as_ref().is_none_or(|re| re.is_match(&f.name)));
    for fixture in selected {
        match sweep(fixture, draws, &mut tally) {
            Ok(()) => eprintln!("—— {} ——", fixture.name),
            Err(err) => tally.failures.push(format!("{}: build failed: {err}", fixture.name)),
        }
    }

    for failure in &tally.failures {
        eprintln!("❌ {failure}");
    }
    if tally.failures.is_empty() {
        eprintln!("✅ {} checks passed", tally.checked);
        ExitCode::SUCCESS
    } else {
        eprintln!("{} of {} checks failed", tally.failures.len(), tally.checked);
        ExitCode::FAILURE
    }
}
