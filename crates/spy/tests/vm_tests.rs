//! VM kernel: globals, FQNs, the blue cache, the type lattice.

use std::fs;

use spy::object::Object;
use spy::{ErrorKind, SharedStringPrint, Vm};

fn new_vm() -> Vm {
    Vm::with_writer(Box::new(SharedStringPrint::new()))
}

#[test]
fn fqn_render_parse_is_the_identity() {
    let mut vm = new_vm();
    let m = vm.fqns.module("test");
    let i32t = vm.b.i32.fqn();
    let strt = vm.b.str_.fqn();
    let add = vm.fqns.join_q(m, "add", &[i32t, strt]);
    let f = vm.fqns.join(add, "impl");
    let rendered = vm.fqns.render(f);
    assert_eq!(rendered, "test::add[i32, str]::impl");
    assert_eq!(vm.fqns.parse(&rendered).unwrap(), f);
}

#[test]
fn globals_are_unique_per_fqn() {
    let mut vm = new_vm();
    let m = vm.fqns.module("operator");
    let fqn = vm.fqns.join(m, "some_global");
    vm.add_global(fqn, None, Object::I32(1)).unwrap();
    let err = vm.add_global(fqn, None, Object::I32(2)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValueError);
    assert!(err.message.contains("already defined"), "{err}");
}

#[test]
fn module_fqns_resolve_to_the_module_itself() {
    let mut vm = new_vm();
    let fqn = vm.fqns.module("builtins");
    let Some(Object::Module(module)) = vm.lookup_global(fqn) else {
        panic!("expected the builtins module");
    };
    assert_eq!(module.name(), "builtins");
}

#[test]
fn make_fqn_const_reuses_existing_globals() {
    let mut vm = new_vm();
    let i32_type = Object::Type(vm.b.i32.clone());
    let fqn = vm.make_fqn_const(&i32_type).unwrap();
    assert_eq!(vm.fqns.render(fqn), "builtins::i32");
    // a second request yields the same FQN
    assert_eq!(vm.make_fqn_const(&i32_type).unwrap(), fqn);
}

#[test]
fn store_global_typechecks() {
    let mut vm = new_vm();
    let m = vm.fqns.module("operator");
    let fqn = vm.fqns.join(m, "a_counter");
    let i32t = vm.b.i32.clone();
    vm.add_global(fqn, Some(i32t), Object::I32(0)).unwrap();
    vm.store_global(fqn, Object::I32(7)).unwrap();
    assert_eq!(vm.lookup_global(fqn).unwrap().as_i32(), Some(7));
    let err = vm.store_global(fqn, Object::from_str("nope")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn universal_eq_never_type_errors() {
    let vm = new_vm();
    assert!(vm.universal_eq(&Object::I32(1), &Object::I32(1)));
    assert!(!vm.universal_eq(&Object::I32(1), &Object::I32(2)));
    // unrelated types compare unequal instead of raising
    assert!(!vm.universal_eq(&Object::I32(42), &Object::from_str("hello")));
    assert!(vm.universal_eq(&Object::from_str("a"), &Object::from_str("a")));
}

#[test]
fn subtyping_and_unions() {
    let vm = new_vm();
    assert!(vm.issubclass(&vm.b.i32, &vm.b.object));
    assert!(vm.issubclass(&vm.b.i32, &vm.b.dynamic));
    assert!(!vm.issubclass(&vm.b.i32, &vm.b.f64));
    assert_eq!(vm.union_type(&vm.b.i32, &vm.b.i32), vm.b.i32);
    assert_eq!(vm.union_type(&vm.b.i32, &vm.b.f64), vm.b.object);
}

#[test]
fn list_type_instantiation_is_cached() {
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let a = vm.make_list_type(&i32t).unwrap();
    let b = vm.make_list_type(&i32t).unwrap();
    assert!(a == b);
    assert_eq!(vm.fqns.render(a.fqn()), "builtins::list[i32]");
}

#[test]
fn blue_calls_are_memoized() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("test.spy"),
        "\
@blue
def make():
    def impl(x: i32) -> i32:
        return x
    return impl
",
    )
    .unwrap();
    let mut vm = new_vm();
    vm.path.push(tmp.path().to_path_buf());
    vm.import_("test").unwrap();

    let module = vm.module("test").unwrap();
    let fqn = module.getattr_fqn("make").unwrap();
    let Some(Object::Func(make)) = vm.lookup_global(fqn) else {
        panic!("make is not a function");
    };
    let first = vm.call(&make, &[]).unwrap();
    let second = vm.call(&make, &[]).unwrap();
    // same inputs ⇒ the very same result object
    assert!(first.ptr_eq(&second));
}

#[test]
fn generic_specialization_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("test.spy"),
        "\
@blue.generic
def box(T):
    def get(x: T) -> T:
        return x
    return get
",
    )
    .unwrap();
    let mut vm = new_vm();
    vm.path.push(tmp.path().to_path_buf());
    vm.import_("test").unwrap();

    let module = vm.module("test").unwrap();
    let fqn = module.getattr_fqn("box").unwrap();
    let Some(Object::Func(generic)) = vm.lookup_global(fqn) else {
        panic!("box is not a function");
    };
    let t = Object::Type(vm.b.i32.clone());
    let a = vm.call(&generic, std::slice::from_ref(&t)).unwrap();
    let b = vm.call(&generic, std::slice::from_ref(&t)).unwrap();
    assert!(a.ptr_eq(&b));

    let Object::Func(spec) = a else { panic!("not a function") };
    assert_eq!(vm.fqns.render(spec.fqn()), "test::box[i32]::get");
}

#[test]
fn call_generic_is_specialize_then_call() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("test.spy"),
        "\
@blue.generic
def twice(T):
    def impl(x: T) -> T:
        return x + x
    return impl
",
    )
    .unwrap();
    let mut vm = new_vm();
    vm.path.push(tmp.path().to_path_buf());
    vm.import_("test").unwrap();

    let module = vm.module("test").unwrap();
    let fqn = module.getattr_fqn("twice").unwrap();
    let Some(Object::Func(generic)) = vm.lookup_global(fqn) else {
        panic!("twice is not a function");
    };
    let result = vm
        .call_generic(&generic, &[Object::Type(vm.b.i32.clone())], &[Object::I32(21)])
        .unwrap();
    assert_eq!(vm.unwrap_i32(&result).unwrap(), 42);
}

#[test]
fn exceptions_carry_kind_and_message() {
    let mut vm = new_vm();
    let a = Object::I32(1);
    let b = Object::from_str("x");
    let err = vm.eq(&a, &b).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn eq_dispatches_through_the_operator_table() {
    let mut vm = new_vm();
    let result = vm.eq(&Object::I32(3), &Object::I32(3)).unwrap();
    assert!(vm.is_true(&result));
    let result = vm.ne(&Object::I32(3), &Object::I32(4)).unwrap();
    assert!(vm.is_true(&result));
}

#[test]
fn getitem_helper_dispatches() {
    let mut vm = new_vm();
    let s = Object::from_str("abc");
    let item = vm.getitem(&s, &Object::I32(1)).unwrap();
    assert_eq!(item.as_str(), Some("b"));
}
