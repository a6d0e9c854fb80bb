//! Text forms: property access and path notation, and a readable listing of
//! compiled functions for `inspect`.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::codec::write_string;
use crate::exec::PathItem;
use crate::ir::{Access, Check, Code, Emit, JitFn, KeyFilter, Kind, PathSegment, Report, Transform};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("static identifier pattern"));

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Bare name when it is an identifier, quoted otherwise.
pub fn key_text(name: &str) -> String {
    if is_identifier(name) {
        return name.to_string();
    }
    let mut out = String::new();
    write_string(name, &mut out);
    out
}

/// `.name` for identifiers, `["some key"]` for anything else, `[3]` for
/// elements.
pub fn access_text(access: &Access) -> String {
    match access {
        Access::Prop(name) if is_identifier(name) => format!(".{name}"),
        Access::Prop(name) => format!("[{}]", key_text(name)),
        Access::Index(i) => format!("[{i}]"),
    }
}

/// `$` followed by each step; loop variables show as `[*]`.
pub fn path_text(segments: &[PathSegment]) -> String {
    let mut out = String::from("$");
    for seg in segments {
        match seg {
            PathSegment::Key(name) => out.push_str(&access_text(&Access::Prop(name.clone()))),
            PathSegment::Index(i) => out.push_str(&format!("[{i}]")),
            PathSegment::Loop(_) => out.push_str("[*]"),
        }
    }
    out
}

/// Path of a reported validation error, in the same notation.
pub fn error_path_text(path: &[PathItem]) -> String {
    let segments: Vec<PathSegment> = path
        .iter()
        .map(|item| match item {
            PathItem::Key(k) => PathSegment::Key(k.clone()),
            PathItem::Index(i) => PathSegment::Index(*i),
        })
        .collect();
    path_text(&segments)
}

// -------------------- listing --------------------

pub fn render_fn(f: &JitFn) -> String {
    let mut p = Printer::default();
    p.line(format!("{} {}({})", f.key.op, f.key.jit_id, f.params.join(", ")));
    p.nest(|p| match &f.code {
        Code::IsType(check) => p.check(check),
        Code::TypeErrors(body) => body.iter().for_each(|r| p.report(r)),
        Code::JsonEncode(body) | Code::JsonDecode(body) => {
            if body.is_empty() {
                p.line("pass");
            }
            body.iter().for_each(|t| p.transform(t));
        }
        Code::JsonStringify(emit) => p.emit(emit),
    });
    p.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn nest(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    fn check(&mut self, check: &Check) {
        match check {
            Check::Always => self.line("always"),
            Check::Is(kind) => self.line(format!("is {}", kind_name(*kind))),
            Check::FiniteNumber => self.line("is finite number"),
            Check::Equals(lit) => self.line(format!("equals {lit}")),
            Check::OneOf(lits) => {
                let lits: Vec<String> = lits.iter().map(|l| l.to_string()).collect();
                self.line(format!("one of {}", lits.join(", ")));
            }
            Check::MaxLen(n) => self.line(format!("length <= {n}")),
            Check::All(checks) => {
                self.line("all");
                self.nest(|p| checks.iter().for_each(|c| p.check(c)));
            }
            Check::Any(checks) => {
                self.line("any");
                self.nest(|p| checks.iter().for_each(|c| p.check(c)));
            }
            Check::At { access, optional, check } => {
                self.line(format!("at {}{}", access_text(access), optional_mark(*optional)));
                self.nest(|p| p.check(check));
            }
            Check::Each { from, check } => {
                self.line(format!("each element from {from}"));
                self.nest(|p| p.check(check));
            }
            Check::EachKey { filter, skip, check } => {
                self.line(each_key_text(*filter, skip));
                self.nest(|p| p.check(check));
            }
            Check::Call(jit_id) => self.line(format!("call {jit_id}")),
        }
    }

    fn report(&mut self, report: &Report) {
        match report {
            Report::Expect { check, path, expected, then } => {
                self.line(format!("expect {expected} at {}", path_text(path)));
                self.nest(|p| {
                    p.check(check);
                    if !then.is_empty() {
                        p.line("then");
                        p.nest(|p| then.iter().for_each(|r| p.report(r)));
                    }
                });
            }
            Report::At { access, optional, body } => {
                self.line(format!("at {}{}", access_text(access), optional_mark(*optional)));
                self.nest(|p| body.iter().for_each(|r| p.report(r)));
            }
            Report::Each { from, body } => {
                self.line(format!("each element from {from}"));
                self.nest(|p| body.iter().for_each(|r| p.report(r)));
            }
            Report::EachKey { filter, skip, body } => {
                self.line(each_key_text(*filter, skip));
                self.nest(|p| body.iter().for_each(|r| p.report(r)));
            }
            Report::Call { jit_id, path } => self.line(format!("call {jit_id} at {}", path_text(path))),
        }
    }

    fn transform(&mut self, t: &Transform) {
        match t {
            Transform::Encode(codec) => self.line(format!("encode {}", codec.name())),
            Transform::Decode(codec) => self.line(format!("decode {}", codec.name())),
            Transform::At { access, optional, body } => {
                self.line(format!("at {}{}", access_text(access), optional_mark(*optional)));
                self.nest(|p| body.iter().for_each(|t| p.transform(t)));
            }
            Transform::Absent(access) => self.line(format!("null at {} is absent", access_text(access))),
            Transform::Each { from, body } => {
                self.line(format!("each element from {from}"));
                self.nest(|p| body.iter().for_each(|t| p.transform(t)));
            }
            Transform::EachKey { filter, skip, body } => {
                self.line(each_key_text(*filter, skip));
                self.nest(|p| body.iter().for_each(|t| p.transform(t)));
            }
            Transform::Tag { union, arms } => {
                self.line(format!("tag {union}"));
                self.nest(|p| {
                    for (i, arm) in arms.iter().enumerate() {
                        p.line(format!("arm {i}"));
                        p.nest(|p| {
                            p.check(&arm.check);
                            arm.body.iter().for_each(|t| p.transform(t));
                        });
                    }
                });
            }
            Transform::Untag { arms } => {
                self.line("untag");
                self.nest(|p| {
                    for (i, arm) in arms.iter().enumerate() {
                        p.line(format!("arm {i}"));
                        p.nest(|p| arm.iter().for_each(|t| p.transform(t)));
                    }
                });
            }
            Transform::Revive(name) => self.line(format!("revive {name}")),
            Transform::Call(jit_id) => self.line(format!("call {jit_id}")),
        }
    }

    fn emit(&mut self, emit: &Emit) {
        match emit {
            Emit::Json => self.line("json"),
            Emit::Encoded(codec) => self.line(format!("encoded {}", codec.name())),
            Emit::Object { props, index } => {
                self.line("object");
                self.nest(|p| {
                    for prop in props {
                        p.line(format!("{}{}", key_text(&prop.name), optional_mark(prop.optional)));
                        p.nest(|p| p.emit(&prop.emit));
                    }
                    if let Some(ix) = index {
                        p.line(format!("[{}]", filter_name(ix.filter)));
                        p.nest(|p| p.emit(&ix.emit));
                    }
                });
            }
            Emit::Array { item } => {
                self.line("array");
                self.nest(|p| p.emit(item));
            }
            Emit::Tuple { elems, rest } => {
                self.line("tuple");
                self.nest(|p| {
                    for (i, e) in elems.iter().enumerate() {
                        p.line(format!("[{i}]"));
                        p.nest(|p| p.emit(e));
                    }
                    if let Some(rest) = rest {
                        p.line("...");
                        p.nest(|p| p.emit(rest));
                    }
                });
            }
            Emit::Union { union, arms } => {
                self.line(format!("union {union}"));
                self.nest(|p| {
                    for (i, (check, e)) in arms.iter().enumerate() {
                        p.line(format!("arm {i}"));
                        p.nest(|p| {
                            p.check(check);
                            p.emit(e);
                        });
                    }
                });
            }
            Emit::Call(jit_id) => self.line(format!("call {jit_id}")),
        }
    }
}

fn optional_mark(optional: bool) -> &'static str {
    if optional { " (optional)" } else { "" }
}

fn filter_name(filter: KeyFilter) -> &'static str {
    match filter {
        KeyFilter::String => "string",
        KeyFilter::Number => "number",
    }
}

fn each_key_text(filter: KeyFilter, skip: &[String]) -> String {
    if skip.is_empty() {
        return format!("each {} key", filter_name(filter));
    }
    let skip: Vec<String> = skip.iter().map(|k| key_text(k)).collect();
    format!("each {} key except {}", filter_name(filter), skip.join(", "))
}

fn kind_name(kind: Kind) -> &'static str {
    match kind {
        Kind::String => "string",
        Kind::Boolean => "boolean",
        Kind::BigInt => "bigint",
        Kind::Symbol => "symbol",
        Kind::RegExp => "regexp",
        Kind::Date => "Date",
        Kind::Array => "array",
        Kind::Object => "object",
        Kind::NonPrimitive => "non-primitive",
        Kind::Null => "null",
        Kind::Undefined => "undefined",
        Kind::Function => "function",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_uses_dots_only_for_identifiers() {
        assert_eq!(access_text(&Access::Prop("name".into())), ".name");
        assert_eq!(access_text(&Access::Prop("$id".into())), ".$id");
        assert_eq!(access_text(&Access::Prop("first-name".into())), r#"["first-name"]"#);
        assert_eq!(access_text(&Access::Prop("2x".into())), r#"["2x"]"#);
        assert_eq!(access_text(&Access::Index(4)), "[4]");
    }

    #[test]
    fn paths_render_loop_variables_as_wildcards() {
        let path = [PathSegment::Key("items".into()), PathSegment::Loop(0), PathSegment::Key("a b".into())];
        assert_eq!(path_text(&path), r#"$.items[*]["a b"]"#);
        let reported = [PathItem::from("items"), PathItem::from(3)];
        assert_eq!(error_path_text(&reported), "$.items[3]");
    }

    #[test]
    fn listings_nest_by_structure() {
        let f = JitFn::new(
            "{a:string}",
            Code::IsType(Check::All(vec![
                Check::Is(Kind::Object),
                Check::At { access: Access::Prop("a".into()), optional: false, check: Box::new(Check::Is(Kind::String)) },
            ])),
        );
        let text = render_fn(&f);
        assert_eq!(text, "isType {a:string}(v)\n  all\n    is object\n    at .a\n      is string\n");
    }
}
