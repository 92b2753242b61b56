//! The parser front-end: preprocessing, lowering, diagnostics and the
//! emit→parse round-trip.

use pretty_assertions::assert_eq;
use spy::ast::{Constant, Decl, Expr, Stmt, VarKindHint};
use spy::parse::parse_source;
use spy::render::emit_module_ast;
use spy::ErrorKind;

#[test]
fn var_and_const_hints_are_attached() {
    let module = parse_source(
        "\
var x: i32 = 0
const y: i32 = 1
z: i32 = 2
",
        "test.spy",
        "test",
    )
    .unwrap();
    let kinds: Vec<Option<VarKindHint>> = module
        .decls
        .iter()
        .map(|d| match d {
            Decl::GlobalVarDef(g) => g.vardef.kind,
            _ => panic!("expected global var defs"),
        })
        .collect();
    assert_eq!(
        kinds,
        [Some(VarKindHint::Var), Some(VarKindHint::Const), None]
    );
}

#[test]
fn locations_point_at_the_original_source() {
    let module = parse_source("var x: i32 = 0\n", "test.spy", "test").unwrap();
    let Decl::GlobalVarDef(g) = &module.decls[0] else {
        panic!("expected a global var def");
    };
    // the rewritten name starts where `var` was
    assert_eq!(g.vardef.name.loc.line_start, 1);
    assert_eq!(g.vardef.name.loc.col_start, 0);
}

#[test]
fn annotated_assignment_splits_into_decl_plus_assign() {
    let module = parse_source(
        "\
def foo() -> None:
    x: i32 = 1
",
        "test.spy",
        "test",
    )
    .unwrap();
    let Decl::FuncDef(fd) = &module.decls[0] else {
        panic!("expected a funcdef");
    };
    assert!(matches!(&fd.body[0], Stmt::VarDef(v) if v.name.name == "x"));
    assert!(matches!(&fd.body[1], Stmt::Assign { target, .. } if target.name == "x"));
}

#[test]
fn blue_decorators_set_color_and_kind() {
    let module = parse_source(
        "\
@blue
def a():
    pass

@blue.generic
def b(T):
    pass

def c() -> None:
    pass
",
        "test.spy",
        "test",
    )
    .unwrap();
    let colors: Vec<(spy::Color, spy::FuncKind)> = module
        .decls
        .iter()
        .map(|d| match d {
            Decl::FuncDef(fd) => (fd.color, fd.kind),
            _ => panic!("expected funcdefs"),
        })
        .collect();
    assert_eq!(
        colors,
        [
            (spy::Color::Blue, spy::FuncKind::Plain),
            (spy::Color::Blue, spy::FuncKind::Generic),
            (spy::Color::Red, spy::FuncKind::Plain),
        ]
    );
}

#[test]
fn red_functions_require_annotations() {
    let err = parse_source("def foo(x) -> None:\n    pass\n", "test.spy", "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert!(err.message.contains("missing type annotation"), "{err}");

    let err = parse_source("def foo(x: i32):\n    pass\n", "test.spy", "test").unwrap_err();
    assert!(err.message.contains("missing return type annotation"), "{err}");
}

#[test]
fn class_definitions_are_rejected() {
    let err = parse_source("class Foo:\n    pass\n", "test.spy", "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert!(err.message.contains("class definitions are not supported"), "{err}");
}

#[test]
fn syntax_errors_carry_a_location() {
    let err = parse_source("def foo(:\n", "test.spy", "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert!(!err.annotations.is_empty());
}

#[test]
fn negative_literals_lower_to_unary_neg() {
    let module = parse_source("x: i32 = -5\n", "test.spy", "test").unwrap();
    let Decl::GlobalVarDef(g) = &module.decls[0] else {
        panic!("expected a global var def");
    };
    match &g.value {
        Expr::UnaryOp { value, .. } => {
            assert!(matches!(**value, Expr::Constant { value: Constant::I32(5), .. }));
        }
        other => panic!("expected a unary op, got {other:?}"),
    }
}

#[test]
fn emit_then_parse_roundtrips_structurally() {
    let src = "\
import helper

var counter: i32 = 0
greeting = 'hi'

@blue
def make():
    def inner(x: i32) -> i32:
        return x * 2
    return inner

def compute(a: i32, b: f64) -> f64:
    total: f64 = 0.0
    for i in range(a):
        if i == 3:
            continue
        total = total + b
    while a > 0:
        a = a - 1
        if a == 1:
            break
    assert a <= 1, 'oops'
    return total

def main() -> None:
    print(compute(4, 1.5))
";
    let module = parse_source(src, "test.spy", "test").unwrap();
    let emitted = emit_module_ast(&module);
    let reparsed = parse_source(&emitted, "test.spy", "test").unwrap();
    assert!(
        module.structurally_eq(&reparsed),
        "round-trip changed the module:\n{emitted}"
    );
}

#[test]
fn spyc_serialization_roundtrips() {
    let src = "\
def foo(x: i32) -> i32:
    return x + 1
";
    let module = parse_source(src, "test.spy", "test").unwrap();
    let bytes = postcard_roundtrip(&module);
    assert!(module.structurally_eq(&bytes));
}

fn postcard_roundtrip(module: &spy::ast::Module) -> spy::ast::Module {
    let bytes = postcard::to_allocvec(module).unwrap();
    postcard::from_bytes(&bytes).unwrap()
}
