//! Implicit conversion resolution.
//!
//! `convert_maybe` is the single entry point: given an expected type and the
//! meta-argument of an expression, it returns `None` when the value is
//! already acceptable (subtype), a conversion [`OpImpl`] when one is legal,
//! and a type mismatch error otherwise.
//!
//! Resolution order: subtyping (with a runtime check when the source is
//! `dynamic`), then the registered `(got, exp)` multimethod table, then the
//! `__convert_to__` metafunction on the source type, then `__convert_from__`
//! on the expected type.

use crate::ast::Color;
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::function::{BuiltinBody, BuiltinEnv, FuncParam, FuncRef, FuncType};
use crate::metaarg::MetaArg;
use crate::object::Object;
use crate::opimpl::{ArgSpec, OpImpl};
use crate::operators::lookup_metafunc;
use crate::typecheck;
use crate::types::{PyClass, Type};
use crate::vm::Vm;

/// Resolves the implicit conversion of `x` to `exp`.
pub fn convert_maybe(vm: &mut Vm, exp: &Type, x: &MetaArg) -> SpyResult<Option<OpImpl>> {
    let got = x.static_type().clone();
    if got == *exp {
        return Ok(None);
    }
    if got.pyclass() == PyClass::Dynamic && exp.pyclass() != PyClass::Dynamic {
        // dynamic → T needs a runtime type check
        return Ok(Some(dynamic_check(vm, exp)?));
    }
    if vm.issubclass(&got, exp) {
        return Ok(None);
    }
    if let Some(func) = vm.ops.convtable.get(&(got.fqn(), exp.fqn())).cloned() {
        let functype = FuncType::new(vec![FuncParam { name: "x".into(), ty: got }], exp.clone(), Color::Red);
        return Ok(Some(OpImpl::call(functype, func, vec![ArgSpec::Arg(0)])));
    }
    if let Some(mf) = lookup_metafunc(&got, "__convert_to__") {
        let exp_ma = vm.blue_arg(Object::Type(exp.clone()), x.loc.clone());
        let spec = vm.fast_metacall(&mf, &[exp_ma, x.clone()])?;
        if !spec.is_null() {
            let in_args = [x.clone()];
            return Ok(Some(typecheck::typecheck_opspec(vm, spec, &in_args, &x.loc)?));
        }
    }
    if let Some(mf) = lookup_metafunc(exp, "__convert_from__") {
        let exp_ma = vm.blue_arg(Object::Type(exp.clone()), x.loc.clone());
        let spec = vm.fast_metacall(&mf, &[exp_ma, x.clone()])?;
        if !spec.is_null() {
            let in_args = [x.clone()];
            return Ok(Some(typecheck::typecheck_opspec(vm, spec, &in_args, &x.loc)?));
        }
    }

    let gname = vm.fqns.human(got.fqn());
    let ename = vm.fqns.human(exp.fqn());
    Err(SpyError::new(ErrorKind::TypeError, "mismatched types").with(
        Severity::Error,
        format!("expected `{ename}`, got `{gname}`"),
        x.loc.clone(),
    ))
}

/// The `dynamic → T` converter: identity plus a runtime type check.
fn dynamic_check(vm: &mut Vm, exp: &Type) -> SpyResult<OpImpl> {
    let ns = vm.ops.module_fqn;
    let fqn_exp = exp.fqn();
    let functype = FuncType::new(
        vec![FuncParam { name: "x".into(), ty: vm.b.dynamic.clone() }],
        exp.clone(),
        Color::Red,
    );
    let func = vm.register_builtin_func(
        ns,
        "from_dynamic",
        &[fqn_exp],
        functype.clone(),
        BuiltinBody::Plain(from_dynamic_impl),
        BuiltinEnv(vec![Object::Type(exp.clone())]),
        false,
    )?;
    Ok(OpImpl::call(functype, func, vec![ArgSpec::Arg(0)]))
}

fn from_dynamic_impl(vm: &mut Vm, env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let exp = env.get(0).as_type().expect("type in env").clone();
    vm.typecheck(&args[0], &exp)?;
    Ok(args[0].clone())
}

macro_rules! conv_impl {
    ($name:ident, $from:ident, $to:ident, $e:expr) => {
        pub(crate) fn $name(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
            match &args[0] {
                Object::$from(v) => Ok(Object::$to($e(*v))),
                other => unreachable!("conversion input already typechecked, got {other:?}"),
            }
        }
    };
}

conv_impl!(i32_to_f64_impl, I32, F64, |v: i32| f64::from(v));
conv_impl!(i32_to_bool_impl, I32, Bool, |v: i32| v != 0);
conv_impl!(i8_to_i32_impl, I8, I32, |v: i8| i32::from(v));
conv_impl!(u8_to_i32_impl, U8, I32, |v: u8| i32::from(v));
conv_impl!(u8_to_u32_impl, U8, U32, |v: u8| u32::from(v));
conv_impl!(u32_to_f64_impl, U32, F64, |v: u32| f64::from(v));
conv_impl!(f32_to_f64_impl, F32, F64, |v: f32| f64::from(v));

/// Registers the numeric widening conversions.
///
/// `f64 → i32` is deliberately absent: narrowing float conversions are never
/// implicit.
pub fn install_conversions(vm: &mut Vm) -> SpyResult<()> {
    let ns = vm.ops.module_fqn;
    let entries: [(&str, Type, Type, crate::function::PlainFn); 7] = [
        ("i32_to_f64", vm.b.i32.clone(), vm.b.f64.clone(), i32_to_f64_impl),
        ("i32_to_bool", vm.b.i32.clone(), vm.b.bool_.clone(), i32_to_bool_impl),
        ("i8_to_i32", vm.b.i8.clone(), vm.b.i32.clone(), i8_to_i32_impl),
        ("u8_to_i32", vm.b.u8.clone(), vm.b.i32.clone(), u8_to_i32_impl),
        ("u8_to_u32", vm.b.u8.clone(), vm.b.u32.clone(), u8_to_u32_impl),
        ("u32_to_f64", vm.b.u32.clone(), vm.b.f64.clone(), u32_to_f64_impl),
        ("f32_to_f64", vm.b.f32.clone(), vm.b.f64.clone(), f32_to_f64_impl),
    ];
    for (name, from, to, body) in entries {
        let functype = FuncType::new(vec![FuncParam { name: "x".into(), ty: from.clone() }], to.clone(), Color::Red);
        let func = vm.register_builtin_func(
            ns,
            name,
            &[],
            functype,
            BuiltinBody::Plain(body),
            BuiltinEnv::empty(),
            true,
        )?;
        vm.ops.convtable.insert((from.fqn(), to.fqn()), func);
    }
    Ok(())
}
