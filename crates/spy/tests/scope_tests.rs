//! Scope analysis: declarations, const promotion, shadowing diagnostics.

use std::fs;
use std::path::Path;

use spy::{ErrorKind, Severity, SharedStringPrint, Vm};

fn import_src(dir: &Path, src: &str) -> Result<Vm, spy::SpyError> {
    fs::write(dir.join("test.spy"), src).unwrap();
    let mut vm = Vm::with_writer(Box::new(SharedStringPrint::new()));
    vm.path.push(dir.to_path_buf());
    vm.import_("test")?;
    Ok(vm)
}

#[test]
fn redeclaring_a_variable_is_an_error_with_both_spans() {
    let tmp = tempfile::tempdir().unwrap();
    let err = import_src(
        tmp.path(),
        "\
def foo() -> None:
    x: i32 = 1
    x: i32 = 2
",
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScopeError);
    assert!(err.message.contains("variable `x` already declared"), "{err}");
    // two annotated spans: the new declaration and the previous one
    assert_eq!(err.annotations.len(), 2);
    assert_eq!(err.annotations[0].severity, Severity::Error);
    assert_eq!(err.annotations[0].loc.line_start, 3);
    assert_eq!(err.annotations[1].severity, Severity::Note);
    assert_eq!(err.annotations[1].loc.line_start, 2);
}

#[test]
fn shadowing_an_outer_name_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = import_src(
        tmp.path(),
        "\
x: i32 = 1

def foo() -> None:
    x: i32 = 2
",
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScopeError);
    assert!(err.message.contains("shadows a name declared in an outer scope"), "{err}");
}

#[test]
fn shadowing_a_builtin_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = import_src(
        tmp.path(),
        "\
def foo() -> None:
    print: i32 = 1
",
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScopeError);
}

#[test]
fn second_assignment_promotes_an_auto_const() {
    let tmp = tempfile::tempdir().unwrap();
    // `a = 1; a = 2` must not be a redeclaration error
    import_src(
        tmp.path(),
        "\
def foo() -> i32:
    a = 1
    a = 2
    return a
",
    )
    .unwrap();
}

#[test]
fn assigning_to_an_explicit_const_fails_at_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    let mut vm = import_src(
        tmp.path(),
        "\
def foo() -> None:
    const c: i32 = 1
    c = 2
",
    )
    .unwrap();
    let module = vm.module("test").unwrap();
    let fqn = module.getattr_fqn("foo").unwrap();
    let spy::Object::Func(foo) = vm.lookup_global(fqn).unwrap() else {
        panic!("not a function");
    };
    let err = vm.call(&foo, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("cannot assign to const `c`"), "{err}");
}

#[test]
fn loop_variables_are_vars() {
    let tmp = tempfile::tempdir().unwrap();
    // assigning the loop variable inside the loop body is fine
    import_src(
        tmp.path(),
        "\
def foo(n: i32) -> i32:
    total = 0
    for i in range(n):
        total = total + i
    return total
",
    )
    .unwrap();
}

#[test]
fn names_declared_in_a_loop_body_are_vars() {
    let tmp = tempfile::tempdir().unwrap();
    let mut vm = import_src(
        tmp.path(),
        "\
def foo(n: i32) -> i32:
    out = 0
    for i in range(n):
        doubled = i * 2
        out = out + doubled
    return out
",
    )
    .unwrap();
    let module = vm.module("test").unwrap();
    let fqn = module.getattr_fqn("foo").unwrap();
    let spy::Object::Func(foo) = vm.lookup_global(fqn).unwrap() else {
        panic!("not a function");
    };
    let result = vm.call(&foo, &[spy::Object::I32(3)]).unwrap();
    assert_eq!(vm.unwrap_i32(&result).unwrap(), 6);
}

#[test]
fn unknown_names_raise_at_use() {
    let tmp = tempfile::tempdir().unwrap();
    let mut vm = import_src(
        tmp.path(),
        "\
def foo() -> None:
    print(mystery)
",
    )
    .unwrap();
    let module = vm.module("test").unwrap();
    let fqn = module.getattr_fqn("foo").unwrap();
    let spy::Object::Func(foo) = vm.lookup_global(fqn).unwrap() else {
        panic!("not a function");
    };
    let err = vm.call(&foo, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScopeError);
    assert!(err.message.contains("`mystery` is not defined"), "{err}");
}
