//! Redshift behavior, checked against the emitted residual source.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use spy::render::{dump_module, FqnFormat};
use spy::{ErrorMode, SharedStringPrint, Vm};

fn redshift_src(dir: &Path, src: &str) -> Vm {
    fs::write(dir.join("test.spy"), src).unwrap();
    let mut vm = Vm::with_writer(Box::new(SharedStringPrint::new()));
    vm.path.push(dir.to_path_buf());
    vm.import_("test").unwrap();
    vm.redshift(ErrorMode::Eager).unwrap();
    vm
}

fn assert_dump(vm: &Vm, expected: &str) {
    let got = dump_module(vm, "test", FqnFormat::Short);
    assert_eq!(got.trim(), expected.trim());
}

#[test]
fn blue_subtrees_fold_to_constants() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
def foo() -> i32:
    return 1 + 2
",
    );
    assert_dump(
        &vm,
        "\
def foo() -> i32:
    return 3
",
    );
}

#[test]
fn red_locals_get_declared_types() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
def foo() -> i32:
    x: i32 = 1
    return x
",
    );
    assert_dump(
        &vm,
        "\
def foo() -> i32:
    x: i32
    x = 1
    return x
",
    );
}

#[test]
fn red_operators_resugar() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
def foo(x: i32, y: i32) -> i32:
    return x + y
",
    );
    assert_dump(
        &vm,
        "\
def foo(x: i32, y: i32) -> i32:
    return x + y
",
    );
}

#[test]
fn full_fqn_format() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
def foo(x: i32) -> None:
    y: str = 'hello'
",
    );
    let got = dump_module(&vm, "test", FqnFormat::Full);
    assert_eq!(
        got.trim(),
        "\
def `test::foo`(x: `builtins::i32`) -> `builtins::NoneType`:
    y: `builtins::str`
    y = 'hello'
",
    );
}

#[test]
fn blue_calls_are_inlined() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
@blue
def ANSWER() -> i32:
    return 42

def foo() -> i32:
    return ANSWER()
",
    );
    // the caller's body contains the literal and no call to ANSWER
    assert_dump(
        &vm,
        "\
def foo() -> i32:
    return 42
",
    );
}

#[test]
fn red_function_calls_become_direct_fqn_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
def inc(x: i32) -> i32:
    return x + 1

def foo() -> i32:
    return inc(5)
",
    );
    assert_dump(
        &vm,
        "\
def inc(x: i32) -> i32:
    return x + 1

def foo() -> i32:
    return `test::inc`(5)
",
    );
}

#[test]
fn blue_closures_escape_and_get_redshifted() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
@blue
def make_fn():
    def fn(x: i32) -> i32:
        return x * 2
    return fn

def foo() -> i32:
    return make_fn()(21)
",
    );
    assert_dump(
        &vm,
        "\
def foo() -> i32:
    return `test::make_fn::fn`(21)

def `test::make_fn::fn`(x: i32) -> i32:
    return x * 2
",
    );
}

#[test]
fn implicit_conversions_become_explicit_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
def foo(x: f64) -> None:
    pass

def convert_in_call() -> None:
    foo(42)

def convert_in_locals(x: i32) -> bool:
    flag: bool = x
    return x

def convert_in_conditions(x: i32) -> None:
    if x:
        pass
",
    );
    assert_dump(
        &vm,
        "\
def foo(x: f64) -> None:
    pass

def convert_in_call() -> None:
    `test::foo`(`operator::i32_to_f64`(42))

def convert_in_locals(x: i32) -> bool:
    flag: bool
    flag = `operator::i32_to_bool`(x)
    return `operator::i32_to_bool`(x)

def convert_in_conditions(x: i32) -> None:
    if `operator::i32_to_bool`(x):
        pass
",
    );
}

#[test]
fn generic_specialization_creates_qualified_impls() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
@blue.generic
def add(T):
    def impl(x: T, y: T) -> T:
        return x + y
    return impl

def foo() -> None:
    x = add[i32](1, 2)
    y = add[str]('a', 'b')
",
    );
    assert_dump(
        &vm,
        "\
def foo() -> None:
    x: i32
    x = `test::add[i32]::impl`(1, 2)
    y: str
    y = `test::add[str]::impl`('a', 'b')

def `test::add[i32]::impl`(x: i32, y: i32) -> i32:
    return x + y

def `test::add[str]::impl`(x: str, y: str) -> str:
    return `operator::str_add`(x, y)
",
    );
}

#[test]
fn specializing_twice_reuses_the_same_impl() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
@blue.generic
def add(T):
    def impl(x: T, y: T) -> T:
        return x + y
    return impl

def foo() -> i32:
    return add[i32](1, 2) + add[i32](3, 4)
",
    );
    // exactly one i32 impl exists
    let impls: Vec<String> = vm
        .globals_snapshot()
        .iter()
        .map(|(fqn, _)| vm.fqns.render(*fqn))
        .filter(|name| name.contains("add[i32]"))
        .collect();
    assert_eq!(impls, vec!["test::add[i32]::impl".to_owned()]);
}

#[test]
fn stores_to_module_vars_use_cells() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
var x: i32 = 0

def foo() -> None:
    x = 1
",
    );
    assert_dump(
        &vm,
        "\
def foo() -> None:
    `test::x` = 1
",
    );
}

#[test]
fn raise_lowers_to_operator_raise() {
    let tmp = tempfile::tempdir().unwrap();
    let vm = redshift_src(
        tmp.path(),
        "\
def foo() -> None:
    raise TypeError('foo')
",
    );
    let file = tmp.path().join("test.spy");
    let expected = format!(
        "\
def foo() -> None:
    raise TypeError('foo') # {}:2
",
        file.display()
    );
    assert_dump(&vm, &expected);

    let full = dump_module(&vm, "test", FqnFormat::Full);
    assert!(full.contains("`operator::raise`('TypeError', 'foo'"), "{full}");
}

#[test]
fn redshift_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let mut vm = redshift_src(
        tmp.path(),
        "\
def foo(x: i32) -> i32:
    return x + 1
",
    );
    let first = dump_module(&vm, "test", FqnFormat::Short);
    vm.redshift(ErrorMode::Eager).unwrap();
    let second = dump_module(&vm, "test", FqnFormat::Short);
    assert_eq!(first, second);

    // redshifting an already-redshifted function is the identity
    let (_, obj) = vm
        .globals_snapshot()
        .into_iter()
        .find(|(fqn, _)| vm.fqns.render(*fqn) == "test::foo")
        .unwrap();
    let spy::Object::Func(func) = obj else { panic!("not a function") };
    let again = spy::redshift::redshift_func(&mut vm, &func).unwrap();
    assert!(again == func);
}

#[test]
fn lazy_mode_defers_static_errors_to_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("test.spy"),
        "\
def bad(x: i32) -> i32:
    return x + 'nope'

def main() -> None:
    pass
",
    )
    .unwrap();
    let mut vm = Vm::with_writer(Box::new(SharedStringPrint::new()));
    vm.path.push(tmp.path().to_path_buf());
    vm.import_("test").unwrap();
    vm.redshift(ErrorMode::Lazy).unwrap();
    assert_eq!(vm.warnings.len(), 1);
    assert_eq!(vm.warnings[0].kind, spy::ErrorKind::TypeError);

    // calling the failed function raises the deferred static error
    let module = vm.module("test").unwrap();
    let fqn = module.getattr_fqn("bad").unwrap();
    let spy::Object::Func(bad) = vm.lookup_global(fqn).unwrap() else {
        panic!("not a function");
    };
    let err = vm.call(&bad, &[spy::Object::I32(1)]).unwrap_err();
    assert_eq!(err.kind, spy::ErrorKind::TypeError);
}

#[test]
fn eager_mode_fails_fast() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("test.spy"),
        "\
def bad(x: i32) -> i32:
    return x + 'nope'
",
    )
    .unwrap();
    let mut vm = Vm::with_writer(Box::new(SharedStringPrint::new()));
    vm.path.push(tmp.path().to_path_buf());
    vm.import_("test").unwrap();
    let err = vm.redshift(ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, spy::ErrorKind::TypeError);
    assert!(err.message.contains("cannot do `i32` + `str`"), "{err}");
}
