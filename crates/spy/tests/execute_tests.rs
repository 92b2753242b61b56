//! End-to-end interpretation: import a module, call its functions, check
//! printed output and error kinds.

use std::fs;
use std::path::Path;

use spy::{ErrorKind, ErrorMode, Object, SharedStringPrint, Vm};

fn write_module(dir: &Path, name: &str, src: &str) {
    fs::write(dir.join(format!("{name}.spy")), src).unwrap();
}

fn vm_for(dir: &Path) -> (Vm, SharedStringPrint) {
    let out = SharedStringPrint::new();
    let mut vm = Vm::with_writer(Box::new(out.clone()));
    vm.path.push(dir.to_path_buf());
    (vm, out)
}

fn call_main(vm: &mut Vm, modname: &str) -> spy::SpyResult<Object> {
    let module = vm.module(modname).expect("module imported");
    let fqn = module.getattr_fqn("main").expect("module defines main");
    let Some(Object::Func(main)) = vm.lookup_global(fqn) else {
        panic!("main is not a function");
    };
    vm.call(&main, &[])
}

#[test]
fn factorial_prints_120() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def factorial(n: i32) -> i32:
    res = 1
    for i in range(n):
        res *= (i + 1)
    return res

def main() -> None:
    print(factorial(5))
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "120\n");
}

#[test]
fn factorial_prints_120_after_redshift() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def factorial(n: i32) -> i32:
    res = 1
    for i in range(n):
        res *= (i + 1)
    return res

def main() -> None:
    print(factorial(5))
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    vm.redshift(ErrorMode::Eager).unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "120\n");
}

#[test]
fn integer_division_by_zero() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def div(a: i32, b: i32) -> i32:
    return a / b

def main() -> None:
    print(div(1, 0))
",
    );
    let (mut vm, _out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    let err = call_main(&mut vm, "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
}

#[test]
fn getitem_past_the_end_raises_index_error() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def get(s: str, i: i32) -> str:
    return s[i]

def main() -> None:
    print(get('ab', 2))
",
    );
    let (mut vm, _out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    let err = call_main(&mut vm, "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexError);
}

#[test]
fn implicit_i32_to_f64_conversion_in_calls() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def half(x: f64) -> f64:
    return x / 2.0

def main() -> None:
    print(half(5))
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "2.5\n");
}

#[test]
fn f64_to_i32_is_not_implicit() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def ident(x: i32) -> i32:
    return x

def main() -> None:
    print(ident(1.5))
",
    );
    let (mut vm, _out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    let err = call_main(&mut vm, "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn while_loop_and_comparisons() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def countdown(n: i32) -> i32:
    total = 0
    while n > 0:
        total = total + n
        n = n - 1
    return total

def main() -> None:
    print(countdown(4))
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "10\n");
}

#[test]
fn break_and_continue() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def pick(n: i32) -> i32:
    found = 0 - 1
    for i in range(n):
        if i == 2:
            continue
        if i == 4:
            found = i
            break
    return found

def main() -> None:
    print(pick(10))
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "4\n");
}

#[test]
fn module_level_var_is_mutable_across_functions() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
var counter: i32 = 0

def bump() -> None:
    counter = counter + 1

def main() -> None:
    bump()
    bump()
    print(counter)
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "2\n");
}

#[test]
fn raising_a_blue_exception_value() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def main() -> None:
    raise ValueError('boom')
",
    );
    let (mut vm, _out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    let err = call_main(&mut vm, "test").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValueError);
    assert_eq!(err.message, "boom");
}

#[test]
fn generic_specialization_executes() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
@blue.generic
def add(T):
    def impl(x: T, y: T) -> T:
        return x + y
    return impl

def main() -> None:
    print(add[i32](1, 2))
    print(add[str]('a', 'b'))
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "3\nab\n");
}

#[test]
fn lists_and_len() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def main() -> None:
    xs = [10, 20, 30]
    print(len(xs))
    print(xs[1])
    xs[1] = 21
    print(xs[1])
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "3\n20\n21\n");
}

#[test]
fn unpack_assignment() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(
        tmp.path(),
        "test",
        "\
def main() -> None:
    a, b = (1, 2)
    print(a + b)
",
    );
    let (mut vm, out) = vm_for(tmp.path());
    vm.import_("test").unwrap();
    call_main(&mut vm, "test").unwrap();
    assert_eq!(out.output(), "3\n");
}
