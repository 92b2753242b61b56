//! The operator dispatch and the typechecker: OpSpec → OpImpl, implicit
//! conversions, arity diagnostics, pure folding.

use spy::ast::Color;
use spy::function::{BuiltinBody, BuiltinEnv, FuncParam, FuncType};
use spy::object::Object;
use spy::operators::convop;
use spy::{ErrorKind, Loc, SharedStringPrint, Vm};

fn new_vm() -> Vm {
    Vm::with_writer(Box::new(SharedStringPrint::new()))
}

#[test]
fn mixed_int_float_addition_inserts_a_conversion() {
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let f64t = vm.b.f64.clone();
    let a = vm.red_arg(i32t, None, Loc::fake());
    let b = vm.red_arg(f64t.clone(), None, Loc::fake());
    let op = vm.ops.add.clone();
    let opimpl = vm.call_op(&op, &[a, b]).unwrap();
    assert_eq!(opimpl.functype.restype, f64t);
    let rendered = opimpl.render(&vm.fqns);
    assert!(rendered.contains("operator::i32_to_f64"), "{rendered}");
    assert!(rendered.contains("operator::f64_add"), "{rendered}");
}

#[test]
fn executing_an_opimpl_yields_the_declared_result_type() {
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let f64t = vm.b.f64.clone();
    let a = vm.red_arg(i32t, Some(Object::I32(1)), Loc::fake());
    let b = vm.red_arg(f64t, Some(Object::F64(0.5)), Loc::fake());
    let op = vm.ops.add.clone();
    let opimpl = vm.call_op(&op, &[a, b]).unwrap();
    let result = opimpl.execute(&mut vm, &[Object::I32(1), Object::F64(0.5)]).unwrap();
    assert!(vm.isinstance(&result, &opimpl.functype.restype));
    assert_eq!(vm.unwrap_f64(&result).unwrap(), 1.5);
}

#[test]
fn incompatible_operands_cite_both_types() {
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let strt = vm.b.str_.clone();
    let a = vm.red_arg(i32t, None, Loc::fake());
    let b = vm.red_arg(strt, None, Loc::fake());
    let op = vm.ops.add.clone();
    let err = vm.call_op(&op, &[a, b]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "cannot do `i32` + `str`");
    assert_eq!(err.annotations.len(), 2);
}

#[test]
fn pure_operators_fold_when_all_inputs_are_blue() {
    let mut vm = new_vm();
    let a = vm.blue_arg(Object::I32(20), Loc::fake());
    let b = vm.blue_arg(Object::I32(22), Loc::fake());
    let op = vm.ops.add.clone();
    let opimpl = vm.call_op(&op, &[a, b]).unwrap();
    assert!(opimpl.is_const());
    assert_eq!(opimpl.const_value().unwrap().as_i32(), Some(42));
}

#[test]
fn arity_mismatches_report_expected_and_got() {
    let mut vm = new_vm();
    let module = vm.module("builtins").unwrap();
    let fqn = module.getattr_fqn("len").unwrap();
    let Some(Object::Func(len)) = vm.lookup_global(fqn) else {
        panic!("len is not registered");
    };
    let err = vm.call(&len, &[Object::I32(1), Object::I32(2)]).unwrap_err();
    assert!(
        err.message.contains("takes 1 arguments but 2 were supplied"),
        "{err}"
    );
}

#[test]
fn widening_conversions_are_implicit() {
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let u8t = vm.b.u8.clone();
    let f64t = vm.b.f64.clone();

    // u8 → i32 resolves
    let x = vm.red_arg(u8t, Some(Object::U8(7)), Loc::fake());
    let conv = convop::convert_maybe(&mut vm, &i32t.clone(), &x).unwrap().expect("a conversion");
    let converted = conv.execute(&mut vm, &[Object::U8(7)]).unwrap();
    assert_eq!(converted.as_i32(), Some(7));

    // i32 → f64 resolves
    let x = vm.red_arg(i32t.clone(), Some(Object::I32(3)), Loc::fake());
    let conv = convop::convert_maybe(&mut vm, &f64t, &x).unwrap().expect("a conversion");
    let converted = conv.execute(&mut vm, &[Object::I32(3)]).unwrap();
    assert_eq!(converted.as_f64(), Some(3.0));

    // i32 → i32 needs nothing
    let x = vm.red_arg(i32t.clone(), None, Loc::fake());
    assert!(convop::convert_maybe(&mut vm, &i32t, &x).unwrap().is_none());
}

#[test]
fn narrowing_float_conversion_is_rejected() {
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let f64t = vm.b.f64.clone();
    let x = vm.red_arg(f64t, None, Loc::fake());
    let err = convop::convert_maybe(&mut vm, &i32t, &x).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
}

#[test]
fn dynamic_conversions_check_the_type_at_runtime() {
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let dynamic = vm.b.dynamic.clone();
    let x = vm.red_arg(dynamic, None, Loc::fake());
    let conv = convop::convert_maybe(&mut vm, &i32t, &x).unwrap().expect("a runtime check");

    let ok = conv.execute(&mut vm, &[Object::I32(5)]).unwrap();
    assert_eq!(ok.as_i32(), Some(5));

    let err = conv.execute(&mut vm, &[Object::from_str("nope")]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(err.message.contains("Invalid cast"), "{err}");
}

#[test]
fn registering_equivalent_builtins_is_idempotent() {
    fn the_answer(_vm: &mut Vm, _env: &BuiltinEnv, _args: &[Object]) -> spy::SpyResult<Object> {
        Ok(Object::I32(42))
    }
    fn something_else(_vm: &mut Vm, _env: &BuiltinEnv, _args: &[Object]) -> spy::SpyResult<Object> {
        Ok(Object::I32(0))
    }

    let mut vm = new_vm();
    let ns = vm.fqns.module("operator");
    let functype = FuncType::new(vec![], vm.b.i32.clone(), Color::Red);

    let first = vm
        .register_builtin_func(ns, "the_answer", &[], functype.clone(), BuiltinBody::Plain(the_answer), BuiltinEnv::empty(), true)
        .unwrap();
    let second = vm
        .register_builtin_func(ns, "the_answer", &[], functype.clone(), BuiltinBody::Plain(the_answer), BuiltinEnv::empty(), true)
        .unwrap();
    assert!(first == second);

    // a conflicting body under the same FQN must fail
    let err = vm
        .register_builtin_func(ns, "the_answer", &[], functype.clone(), BuiltinBody::Plain(something_else), BuiltinEnv::empty(), true)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValueError);

    // same code but different closed-over values: also a conflict
    fn with_env(_vm: &mut Vm, env: &BuiltinEnv, _args: &[Object]) -> spy::SpyResult<Object> {
        Ok(env.get(0).clone())
    }
    let a = vm
        .register_builtin_func(
            ns,
            "with_env",
            &[],
            functype.clone(),
            BuiltinBody::Plain(with_env),
            BuiltinEnv(vec![Object::I32(1)]),
            true,
        )
        .unwrap();
    let b = vm.register_builtin_func(
        ns,
        "with_env",
        &[],
        functype.clone(),
        BuiltinBody::Plain(with_env),
        BuiltinEnv(vec![Object::I32(2)]),
        true,
    );
    assert!(b.is_err());
    let c = vm
        .register_builtin_func(
            ns,
            "with_env",
            &[],
            functype,
            BuiltinBody::Plain(with_env),
            BuiltinEnv(vec![Object::I32(1)]),
            true,
        )
        .unwrap();
    assert!(a == c);
}

#[test]
fn callable_params_see_blue_type_arguments() {
    // type values are usable as blue arguments to CONVERT
    let mut vm = new_vm();
    let i32t = vm.b.i32.clone();
    let u8t = vm.b.u8.clone();
    let exp = vm.blue_arg(Object::Type(i32t.clone()), Loc::fake());
    let got = vm.blue_arg(Object::Type(u8t.clone()), Loc::fake());
    let x = vm.red_arg(u8t, Some(Object::U8(9)), Loc::fake());
    let op = vm.ops.convert.clone();
    let opimpl = vm.call_op(&op, &[exp, got, x]).unwrap();
    let result = opimpl
        .execute(
            &mut vm,
            &[Object::Type(i32t), Object::Type(vm.b.u8.clone()), Object::U8(9)],
        )
        .unwrap();
    assert_eq!(result.as_i32(), Some(9));
}

#[test]
fn registering_a_conflicting_functype_also_fails() {
    fn body(_vm: &mut Vm, _env: &BuiltinEnv, _args: &[Object]) -> spy::SpyResult<Object> {
        Ok(Object::None)
    }
    let mut vm = new_vm();
    let ns = vm.fqns.module("operator");
    let none = vm.b.nonetype.clone();
    let ft1 = FuncType::new(vec![], none.clone(), Color::Red);
    let ft2 = FuncType::new(
        vec![FuncParam { name: "x".into(), ty: vm.b.i32.clone() }],
        none,
        Color::Red,
    );
    vm.register_builtin_func(ns, "noop", &[], ft1, BuiltinBody::Plain(body), BuiltinEnv::empty(), false)
        .unwrap();
    // same code and env: treated as equivalent even across signatures,
    // the original registration wins
    let again = vm
        .register_builtin_func(ns, "noop", &[], ft2, BuiltinBody::Plain(body), BuiltinEnv::empty(), false)
        .unwrap();
    assert_eq!(again.functype().arity(), 0);
}
