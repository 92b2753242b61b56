//! Primitive operator implementations and the metafunctions that select
//! them.
//!
//! Implementations are plain builtins (`i32_add`, `f64_mul`, `str_getitem`,
//! ...) registered as globals of the `operator` module so that residual code
//! can reference them by FQN. The metafunctions installed on the builtin
//! types inspect the right operand's static type and return the matching
//! `OpSpec`; mixed-width operands are reconciled by the typechecker through
//! the implicit conversion table.

use std::rc::Rc;
use std::str::FromStr as _;

use crate::ast::Color;
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::function::{BuiltinBody, BuiltinEnv, FuncParam, FuncRef, FuncType, PlainFn};
use crate::location::Loc;
use crate::metaarg::MetaArg;
use crate::object::Object;
use crate::opspec::OpSpec;
use crate::operators::make_metafunc;
use crate::types::{PyClass, StorageCategory, Type};
use crate::vm::Vm;

fn is_int(pyclass: PyClass) -> bool {
    matches!(pyclass, PyClass::I8 | PyClass::U8 | PyClass::I32 | PyClass::U32)
}

fn is_numeric(pyclass: PyClass) -> bool {
    is_int(pyclass) || matches!(pyclass, PyClass::F32 | PyClass::F64)
}

// =======================================================================
// metafunction bodies (select an impl based on the operands' static types)

/// Always applicable: `Simple(env[0])`. Used for single-operand operators
/// and for instance operations whose operand types are fixed.
fn always_simple_spec(_vm: &mut Vm, env: &BuiltinEnv, _args: &[MetaArg]) -> SpyResult<OpSpec> {
    let func = env.get(0).as_func().expect("impl in env").clone();
    Ok(OpSpec::simple(func))
}

/// Integer binary operator: applicable when the right operand is an integer
/// as well; widths are reconciled by implicit widening to `i32`.
fn int_binop_spec(_vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let func = env.get(0).as_func().expect("impl in env").clone();
    if is_int(args[1].static_type().pyclass()) {
        Ok(OpSpec::simple(func))
    } else {
        Ok(OpSpec::Null)
    }
}

/// Float binary operator: applicable when the right operand is numeric.
fn float_binop_spec(_vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let func = env.get(0).as_func().expect("impl in env").clone();
    if is_numeric(args[1].static_type().pyclass()) {
        Ok(OpSpec::simple(func))
    } else {
        Ok(OpSpec::Null)
    }
}

/// Reflected float operator: applicable when the *left* operand is numeric
/// (the right one is the float that owns the metafunction).
fn float_rbinop_spec(_vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let func = env.get(0).as_func().expect("impl in env").clone();
    if is_numeric(args[0].static_type().pyclass()) {
        Ok(OpSpec::simple(func))
    } else {
        Ok(OpSpec::Null)
    }
}

/// Applicable when both operands have the same pyclass.
fn same_class_spec(_vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let func = env.get(0).as_func().expect("impl in env").clone();
    if args[0].static_type().pyclass() == args[1].static_type().pyclass() {
        Ok(OpSpec::simple(func))
    } else {
        Ok(OpSpec::Null)
    }
}

/// `str * i32`.
fn str_mul_spec(_vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let func = env.get(0).as_func().expect("impl in env").clone();
    if is_int(args[1].static_type().pyclass()) {
        Ok(OpSpec::simple(func))
    } else {
        Ok(OpSpec::Null)
    }
}

/// `type[...]`: instantiation of the generic container families
/// `list[T]` / `dict[K, V]`.
fn type_getitem_spec(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let target = args[0].blue_type()?;
    let idx = &args[1];
    if target == vm.b.list {
        let item_ty = idx.blue_type()?;
        let ty = vm.make_list_type(&item_ty)?;
        return Ok(OpSpec::constant(Object::Type(ty)));
    }
    if target == vm.b.dict {
        let Some(Object::Tuple(items)) = idx.blue_value() else {
            return Err(SpyError::simple(
                ErrorKind::TypeError,
                "dict[...] takes two type arguments",
                "expected `dict[K, V]`",
                idx.loc.clone(),
            ));
        };
        let items = items.clone();
        if items.len() != 2 {
            return Err(SpyError::simple(
                ErrorKind::TypeError,
                "dict[...] takes two type arguments",
                "expected `dict[K, V]`",
                idx.loc.clone(),
            ));
        }
        let (Some(k), Some(v)) = (items[0].as_type(), items[1].as_type()) else {
            return Err(SpyError::simple(
                ErrorKind::TypeError,
                "dict[...] arguments must be types",
                "not a type",
                idx.loc.clone(),
            ));
        };
        let ty = vm.make_dict_type(&k.clone(), &v.clone())?;
        return Ok(OpSpec::constant(Object::Type(ty)));
    }
    Ok(OpSpec::Null)
}

/// `type.attr`: static dict lookup on the type object itself.
fn type_getattribute_spec(_vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let target = args[0].blue_type()?;
    let name = args[1].blue_str()?;
    match target.lookup(&name) {
        Some(value) => Ok(OpSpec::constant(value)),
        None => Ok(OpSpec::Null),
    }
}

/// `generic[T, ...]`: specialization of a blue generic function. This is
/// plain blue evaluation: the generic is called with the type arguments, its
/// result is cached, and the residual call targets the returned function.
fn func_getitem_spec(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let Some(Object::Func(func)) = args[0].blue_value().cloned() else {
        return Ok(OpSpec::Null);
    };
    if func.kind() != crate::ast::FuncKind::Generic {
        return Ok(OpSpec::Null);
    }
    let idx = &args[1];
    let type_args: Vec<Object> = match idx.blue_value() {
        Some(Object::Type(t)) => vec![Object::Type(t.clone())],
        Some(Object::Tuple(items)) => {
            for item in items.iter() {
                if item.as_type().is_none() {
                    return Err(SpyError::simple(
                        ErrorKind::TypeError,
                        "generic arguments must be types",
                        "not a type",
                        idx.loc.clone(),
                    ));
                }
            }
            items.iter().cloned().collect()
        }
        _ => {
            return Err(SpyError::simple(
                ErrorKind::TypeError,
                "generic arguments must be blue types",
                "this is not a blue type",
                idx.loc.clone(),
            ));
        }
    };
    let specialized = vm.call(&func, &type_args)?;
    if specialized.as_func().is_none() {
        let name = vm.fqns.render(func.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("generic `{name}` did not produce a function"),
            "while specializing here",
            idx.loc.clone(),
        ));
    }
    Ok(OpSpec::constant(specialized))
}

/// `module.attr`: const attributes fold to their value; `var` globals read
/// through a per-attribute accessor so the load stays red.
fn module_getattribute_spec(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let Some(Object::Module(module)) = args[0].blue_value().cloned() else {
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            "module is not known at compile time",
            "this is red",
            args[0].loc.clone(),
        ));
    };
    let name = args[1].blue_str()?;
    let Some((fqn, varkind)) = module.getattr_varkind(&name) else {
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("module `{}` has no attribute '{name}'", module.name()),
            "attribute not found",
            args[1].loc.clone(),
        ));
    };
    match varkind {
        crate::symtable::VarKind::Const => {
            let value = vm
                .lookup_global(fqn)
                .expect("module attribute points at a missing global");
            Ok(OpSpec::constant(value))
        }
        crate::symtable::VarKind::Var => {
            let func = vm.module_getattr_accessor(fqn)?;
            Ok(OpSpec::complex(func, vec![]))
        }
    }
}

/// `module.attr = value` for `var` globals.
fn module_setattr_spec(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let Some(Object::Module(module)) = args[0].blue_value().cloned() else {
        return Ok(OpSpec::Null);
    };
    let name = args[1].blue_str()?;
    let Some((fqn, varkind)) = module.getattr_varkind(&name) else {
        return Ok(OpSpec::Null);
    };
    if varkind != crate::symtable::VarKind::Var {
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("cannot assign to const `{}.{name}`", module.name()),
            "this is a const",
            args[1].loc.clone(),
        ));
    }
    let func = vm.module_setattr_accessor(fqn)?;
    Ok(OpSpec::complex(func, vec![args[2].clone()]))
}

/// `dynamic == dynamic` uses universal equality, which never fails with a
/// type error and compares unrelated types as unequal.
fn dynamic_eq_spec(vm: &mut Vm, env: &BuiltinEnv, _args: &[MetaArg]) -> SpyResult<OpSpec> {
    let _ = vm;
    let func = env.get(0).as_func().expect("impl in env").clone();
    Ok(OpSpec::simple(func))
}

// =======================================================================
// impl bodies

macro_rules! i32_arith {
    ($name:ident, $op:expr) => {
        fn $name(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
            let (Some(a), Some(b)) = (args[0].as_i32(), args[1].as_i32()) else {
                unreachable!("i32 operands already typechecked");
            };
            $op(a, b)
        }
    };
}

i32_arith!(i32_add_impl, |a: i32, b: i32| Ok(Object::I32(a.wrapping_add(b))));
i32_arith!(i32_sub_impl, |a: i32, b: i32| Ok(Object::I32(a.wrapping_sub(b))));
i32_arith!(i32_mul_impl, |a: i32, b: i32| Ok(Object::I32(a.wrapping_mul(b))));
i32_arith!(i32_div_impl, |a: i32, b: i32| {
    if b == 0 {
        Err(SpyError::new(ErrorKind::ZeroDivisionError, "division by zero"))
    } else {
        Ok(Object::I32(a.wrapping_div(b)))
    }
});
i32_arith!(i32_floordiv_impl, |a: i32, b: i32| {
    if b == 0 {
        Err(SpyError::new(ErrorKind::ZeroDivisionError, "division by zero"))
    } else {
        Ok(Object::I32(a.div_euclid(b)))
    }
});
i32_arith!(i32_mod_impl, |a: i32, b: i32| {
    if b == 0 {
        Err(SpyError::new(ErrorKind::ZeroDivisionError, "modulo by zero"))
    } else {
        Ok(Object::I32(a.rem_euclid(b)))
    }
});
i32_arith!(i32_eq_impl, |a, b| Ok(Object::Bool(a == b)));
i32_arith!(i32_ne_impl, |a, b| Ok(Object::Bool(a != b)));
i32_arith!(i32_lt_impl, |a, b| Ok(Object::Bool(a < b)));
i32_arith!(i32_le_impl, |a, b| Ok(Object::Bool(a <= b)));
i32_arith!(i32_gt_impl, |a, b| Ok(Object::Bool(a > b)));
i32_arith!(i32_ge_impl, |a, b| Ok(Object::Bool(a >= b)));

fn i32_neg_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let v = args[0].as_i32().expect("i32 operand already typechecked");
    Ok(Object::I32(v.wrapping_neg()))
}

macro_rules! f64_arith {
    ($name:ident, $op:expr) => {
        fn $name(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
            let (Some(a), Some(b)) = (args[0].as_f64(), args[1].as_f64()) else {
                unreachable!("f64 operands already typechecked");
            };
            Ok($op(a, b))
        }
    };
}

f64_arith!(f64_add_impl, |a: f64, b: f64| Object::F64(a + b));
f64_arith!(f64_sub_impl, |a: f64, b: f64| Object::F64(a - b));
f64_arith!(f64_mul_impl, |a: f64, b: f64| Object::F64(a * b));
f64_arith!(f64_div_impl, |a: f64, b: f64| Object::F64(a / b));
f64_arith!(f64_eq_impl, |a, b| Object::Bool(a == b));
f64_arith!(f64_ne_impl, |a, b| Object::Bool(a != b));
f64_arith!(f64_lt_impl, |a, b| Object::Bool(a < b));
f64_arith!(f64_le_impl, |a, b| Object::Bool(a <= b));
f64_arith!(f64_gt_impl, |a, b| Object::Bool(a > b));
f64_arith!(f64_ge_impl, |a, b| Object::Bool(a >= b));

fn f64_neg_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let v = args[0].as_f64().expect("f64 operand already typechecked");
    Ok(Object::F64(-v))
}

fn str_add_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (Some(a), Some(b)) = (args[0].as_str(), args[1].as_str()) else {
        unreachable!("str operands already typechecked");
    };
    Ok(Object::from_str(&format!("{a}{b}")))
}

fn str_mul_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (Some(s), Some(n)) = (args[0].as_str(), args[1].as_i32()) else {
        unreachable!("str_mul operands already typechecked");
    };
    let n = usize::try_from(n).unwrap_or(0);
    Ok(Object::from_str(&s.repeat(n)))
}

fn str_getitem_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (Some(s), Some(i)) = (args[0].as_str(), args[1].as_i32()) else {
        unreachable!("str_getitem operands already typechecked");
    };
    let chars: Vec<char> = s.chars().collect();
    let idx = usize::try_from(i).ok().filter(|&i| i < chars.len());
    match idx {
        Some(i) => Ok(Object::from_str(&chars[i].to_string())),
        None => Err(SpyError::new(
            ErrorKind::IndexError,
            format!("string index out of range: {i}"),
        )),
    }
}

fn str_eq_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(Object::Bool(args[0].as_str() == args[1].as_str()))
}

fn str_ne_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(Object::Bool(args[0].as_str() != args[1].as_str()))
}

fn bool_eq_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(Object::Bool(args[0].as_bool() == args[1].as_bool()))
}

fn bool_ne_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(Object::Bool(args[0].as_bool() != args[1].as_bool()))
}

pub(crate) fn bool_not_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let v = args[0].as_bool().expect("bool operand already typechecked");
    Ok(Object::Bool(!v))
}

pub(crate) fn identity_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(args[0].clone())
}

pub(crate) fn universal_eq_impl(vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(Object::Bool(vm.universal_eq(&args[0], &args[1])))
}

pub(crate) fn universal_ne_impl(vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(Object::Bool(!vm.universal_eq(&args[0], &args[1])))
}

/// The runtime side of a lowered `raise` statement.
pub(crate) fn raise_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let etype = args[0].as_str().unwrap_or("PanicError");
    let message = args[1].as_str().unwrap_or("").to_owned();
    let filename = args[2].as_str().unwrap_or("<unknown>");
    let lineno = args[3].as_i32().unwrap_or(0);
    let kind = ErrorKind::from_str(&format!("W_{etype}")).unwrap_or(ErrorKind::PanicError);
    let loc = Loc::whole_line(Rc::from(filename), u32::try_from(lineno).unwrap_or(0));
    Err(SpyError::simple(kind, message, "raised here", loc))
}

fn list_getitem_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (Object::List(l), Some(i)) = (&args[0], args[1].as_i32()) else {
        unreachable!("list_getitem operands already typechecked");
    };
    let items = l.0.items.borrow();
    let idx = usize::try_from(i).ok().filter(|&i| i < items.len());
    match idx {
        Some(i) => Ok(items[i].clone()),
        None => Err(SpyError::new(
            ErrorKind::IndexError,
            format!("list index out of range: {i}"),
        )),
    }
}

fn list_setitem_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (Object::List(l), Some(i)) = (&args[0], args[1].as_i32()) else {
        unreachable!("list_setitem operands already typechecked");
    };
    let mut items = l.0.items.borrow_mut();
    let len = items.len();
    let idx = usize::try_from(i).ok().filter(|&i| i < len);
    match idx {
        Some(i) => {
            items[i] = args[2].clone();
            Ok(Object::None)
        }
        None => Err(SpyError::new(
            ErrorKind::IndexError,
            format!("list index out of range: {i}"),
        )),
    }
}

fn list_eq_impl(vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    Ok(Object::Bool(vm.universal_eq(&args[0], &args[1])))
}

fn tuple_getitem_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (Object::Tuple(items), Some(i)) = (&args[0], args[1].as_i32()) else {
        unreachable!("tuple_getitem operands already typechecked");
    };
    let idx = usize::try_from(i).ok().filter(|&i| i < items.len());
    match idx {
        Some(i) => Ok(items[i].clone()),
        None => Err(SpyError::new(
            ErrorKind::IndexError,
            format!("tuple index out of range: {i}"),
        )),
    }
}

fn dict_getitem_impl(vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let Object::Dict(d) = &args[0] else {
        unreachable!("dict_getitem operands already typechecked");
    };
    let key = args[1].spy_key();
    let entries = d.0.entries.borrow();
    match entries.get(&key) {
        Some((_, v)) => Ok(v.clone()),
        None => Err(SpyError::new(
            ErrorKind::KeyError,
            args[1].repr(&vm.fqns),
        )),
    }
}

fn dict_setitem_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let Object::Dict(d) = &args[0] else {
        unreachable!("dict_setitem operands already typechecked");
    };
    let key = args[1].spy_key();
    d.0.entries.borrow_mut().insert(key, (args[1].clone(), args[2].clone()));
    Ok(Object::None)
}

// =======================================================================
// installation

struct OpBuilder<'a> {
    vm: &'a mut Vm,
}

impl OpBuilder<'_> {
    /// Registers a pure impl under `operator::<name>` with the given
    /// signature.
    fn impl_func(&mut self, name: &str, params: &[(&str, Type)], restype: Type, body: PlainFn) -> SpyResult<FuncRef> {
        let ns = self.vm.ops.module_fqn;
        let functype = FuncType::new(
            params
                .iter()
                .map(|(n, ty)| FuncParam {
                    name: (*n).to_owned(),
                    ty: ty.clone(),
                })
                .collect(),
            restype,
            Color::Red,
        );
        self.vm
            .register_builtin_func(ns, name, &[], functype, BuiltinBody::Plain(body), BuiltinEnv::empty(), true)
    }

    fn attach(&mut self, ty: &Type, dunder: &str, body: crate::function::MetaFn, env: Vec<Object>) {
        let mf = make_metafunc(self.vm, ty, dunder, body, env);
        ty.define(dunder, Object::Func(mf));
    }
}

/// Registers the primitive impls and installs the metafunctions on the
/// builtin types.
pub fn install(vm: &mut Vm) -> SpyResult<()> {
    let i32t = vm.b.i32.clone();
    let f64t = vm.b.f64.clone();
    let strt = vm.b.str_.clone();
    let boolt = vm.b.bool_.clone();

    let mut ob = OpBuilder { vm };

    // i32 family: all integer widths share these impls, reconciled by
    // implicit widening
    let two_i32 = [("a", i32t.clone()), ("b", i32t.clone())];
    let i32_ops: Vec<(&str, FuncRef, crate::function::MetaFn)> = vec![
        ("__add__", ob.impl_func("i32_add", &two_i32, i32t.clone(), i32_add_impl)?, int_binop_spec),
        ("__sub__", ob.impl_func("i32_sub", &two_i32, i32t.clone(), i32_sub_impl)?, int_binop_spec),
        ("__mul__", ob.impl_func("i32_mul", &two_i32, i32t.clone(), i32_mul_impl)?, int_binop_spec),
        ("__div__", ob.impl_func("i32_div", &two_i32, i32t.clone(), i32_div_impl)?, int_binop_spec),
        (
            "__floordiv__",
            ob.impl_func("i32_floordiv", &two_i32, i32t.clone(), i32_floordiv_impl)?,
            int_binop_spec,
        ),
        ("__mod__", ob.impl_func("i32_mod", &two_i32, i32t.clone(), i32_mod_impl)?, int_binop_spec),
        ("__eq__", ob.impl_func("i32_eq", &two_i32, boolt.clone(), i32_eq_impl)?, int_binop_spec),
        ("__ne__", ob.impl_func("i32_ne", &two_i32, boolt.clone(), i32_ne_impl)?, int_binop_spec),
        ("__lt__", ob.impl_func("i32_lt", &two_i32, boolt.clone(), i32_lt_impl)?, int_binop_spec),
        ("__le__", ob.impl_func("i32_le", &two_i32, boolt.clone(), i32_le_impl)?, int_binop_spec),
        ("__gt__", ob.impl_func("i32_gt", &two_i32, boolt.clone(), i32_gt_impl)?, int_binop_spec),
        ("__ge__", ob.impl_func("i32_ge", &two_i32, boolt.clone(), i32_ge_impl)?, int_binop_spec),
    ];
    let i32_neg = ob.impl_func("i32_neg", &[("x", i32t.clone())], i32t.clone(), i32_neg_impl)?;
    let int_types = [ob.vm.b.i8.clone(), ob.vm.b.u8.clone(), ob.vm.b.i32.clone(), ob.vm.b.u32.clone()];
    for ty in &int_types {
        for (dunder, func, spec) in &i32_ops {
            ob.attach(ty, dunder, *spec, vec![Object::Func(func.clone())]);
        }
        ob.attach(ty, "__neg__", always_simple_spec, vec![Object::Func(i32_neg.clone())]);
    }

    // f64 family (f32 promotes through the conversion table)
    let two_f64 = [("a", f64t.clone()), ("b", f64t.clone())];
    let f64_ops: Vec<(&str, &str, FuncRef)> = vec![
        ("__add__", "__radd__", ob.impl_func("f64_add", &two_f64, f64t.clone(), f64_add_impl)?),
        ("__sub__", "__rsub__", ob.impl_func("f64_sub", &two_f64, f64t.clone(), f64_sub_impl)?),
        ("__mul__", "__rmul__", ob.impl_func("f64_mul", &two_f64, f64t.clone(), f64_mul_impl)?),
        ("__div__", "__rdiv__", ob.impl_func("f64_div", &two_f64, f64t.clone(), f64_div_impl)?),
        ("__eq__", "", ob.impl_func("f64_eq", &two_f64, boolt.clone(), f64_eq_impl)?),
        ("__ne__", "", ob.impl_func("f64_ne", &two_f64, boolt.clone(), f64_ne_impl)?),
        ("__lt__", "", ob.impl_func("f64_lt", &two_f64, boolt.clone(), f64_lt_impl)?),
        ("__le__", "", ob.impl_func("f64_le", &two_f64, boolt.clone(), f64_le_impl)?),
        ("__gt__", "", ob.impl_func("f64_gt", &two_f64, boolt.clone(), f64_gt_impl)?),
        ("__ge__", "", ob.impl_func("f64_ge", &two_f64, boolt.clone(), f64_ge_impl)?),
    ];
    let f64_neg = ob.impl_func("f64_neg", &[("x", f64t.clone())], f64t.clone(), f64_neg_impl)?;
    let float_types = [ob.vm.b.f32.clone(), ob.vm.b.f64.clone()];
    for ty in &float_types {
        for (dunder, rdunder, func) in &f64_ops {
            ob.attach(ty, dunder, float_binop_spec, vec![Object::Func(func.clone())]);
            if !rdunder.is_empty() {
                ob.attach(ty, rdunder, float_rbinop_spec, vec![Object::Func(func.clone())]);
            }
        }
        ob.attach(ty, "__neg__", always_simple_spec, vec![Object::Func(f64_neg.clone())]);
    }

    // str
    let str_add = ob.impl_func(
        "str_add",
        &[("a", strt.clone()), ("b", strt.clone())],
        strt.clone(),
        str_add_impl,
    )?;
    let str_mul = ob.impl_func(
        "str_mul",
        &[("s", strt.clone()), ("n", i32t.clone())],
        strt.clone(),
        str_mul_impl,
    )?;
    let str_getitem = ob.impl_func(
        "str_getitem",
        &[("s", strt.clone()), ("i", i32t.clone())],
        strt.clone(),
        str_getitem_impl,
    )?;
    let str_eq = ob.impl_func(
        "str_eq",
        &[("a", strt.clone()), ("b", strt.clone())],
        boolt.clone(),
        str_eq_impl,
    )?;
    let str_ne = ob.impl_func(
        "str_ne",
        &[("a", strt.clone()), ("b", strt.clone())],
        boolt.clone(),
        str_ne_impl,
    )?;
    let strt_ref = ob.vm.b.str_.clone();
    ob.attach(&strt_ref, "__add__", same_class_spec, vec![Object::Func(str_add)]);
    ob.attach(&strt_ref, "__mul__", str_mul_spec, vec![Object::Func(str_mul)]);
    ob.attach(&strt_ref, "__getitem__", always_simple_spec, vec![Object::Func(str_getitem)]);
    ob.attach(&strt_ref, "__eq__", same_class_spec, vec![Object::Func(str_eq)]);
    ob.attach(&strt_ref, "__ne__", same_class_spec, vec![Object::Func(str_ne)]);

    // bool
    let bool_eq = ob.impl_func(
        "bool_eq",
        &[("a", boolt.clone()), ("b", boolt.clone())],
        boolt.clone(),
        bool_eq_impl,
    )?;
    let bool_ne = ob.impl_func(
        "bool_ne",
        &[("a", boolt.clone()), ("b", boolt.clone())],
        boolt.clone(),
        bool_ne_impl,
    )?;
    let boolt_ref = ob.vm.b.bool_.clone();
    ob.attach(&boolt_ref, "__eq__", same_class_spec, vec![Object::Func(bool_eq)]);
    ob.attach(&boolt_ref, "__ne__", same_class_spec, vec![Object::Func(bool_ne)]);

    // dynamic: equality never type-errors
    let ueq = ob.vm.ops.universal_eq.clone();
    let une = ob.vm.ops.universal_ne.clone();
    let dynt = ob.vm.b.dynamic.clone();
    ob.attach(&dynt, "__eq__", dynamic_eq_spec, vec![Object::Func(ueq)]);
    ob.attach(&dynt, "__ne__", dynamic_eq_spec, vec![Object::Func(une)]);

    // tuple
    let dyn_ty = ob.vm.b.dynamic.clone();
    let tuple_ty = ob.vm.b.tuple.clone();
    let tuple_getitem = ob.impl_func(
        "tuple_getitem",
        &[("t", tuple_ty.clone()), ("i", i32t.clone())],
        dyn_ty,
        tuple_getitem_impl,
    )?;
    ob.attach(&tuple_ty, "__getitem__", always_simple_spec, vec![Object::Func(tuple_getitem)]);

    // metaclass and module protocols
    let type_ty = ob.vm.b.type_.clone();
    ob.attach(&type_ty, "__getitem__", type_getitem_spec, vec![]);
    ob.attach(&type_ty, "__getattribute__", type_getattribute_spec, vec![]);
    let func_ty = ob.vm.b.func.clone();
    ob.attach(&func_ty, "__getitem__", func_getitem_spec, vec![]);
    let module_ty = ob.vm.b.module.clone();
    ob.attach(&module_ty, "__getattribute__", module_getattribute_spec, vec![]);
    ob.attach(&module_ty, "__setattr__", module_setattr_spec, vec![]);

    Ok(())
}

/// Creates (or reuses) the `list[T]` instance type with its item accessors.
pub fn instantiate_list_type(vm: &mut Vm, item: &Type) -> SpyResult<Type> {
    let list_fqn = vm.b.list.fqn();
    let fqn = vm.fqns.with_qualifiers(list_fqn, &[item.fqn()]);
    if let Some(Object::Type(ty)) = vm.lookup_global(fqn) {
        return Ok(ty);
    }
    let ty = Type::new(fqn, Some(vm.b.object.clone()), PyClass::List, StorageCategory::Reference);

    let getitem_fqn = vm.fqns.join(fqn, "getitem");
    let getitem = FuncRef::new_builtin(
        getitem_fqn,
        FuncType::new(
            vec![
                FuncParam { name: "l".into(), ty: ty.clone() },
                FuncParam { name: "i".into(), ty: vm.b.i32.clone() },
            ],
            item.clone(),
            Color::Red,
        ),
        BuiltinBody::Plain(list_getitem_impl),
        BuiltinEnv::empty(),
        false,
    );
    let setitem_fqn = vm.fqns.join(fqn, "setitem");
    let setitem = FuncRef::new_builtin(
        setitem_fqn,
        FuncType::new(
            vec![
                FuncParam { name: "l".into(), ty: ty.clone() },
                FuncParam { name: "i".into(), ty: vm.b.i32.clone() },
                FuncParam { name: "v".into(), ty: item.clone() },
            ],
            vm.b.nonetype.clone(),
            Color::Red,
        ),
        BuiltinBody::Plain(list_setitem_impl),
        BuiltinEnv::empty(),
        false,
    );
    let eq_fqn = vm.fqns.join(fqn, "eq");
    let eq = FuncRef::new_builtin(
        eq_fqn,
        FuncType::new(
            vec![
                FuncParam { name: "a".into(), ty: ty.clone() },
                FuncParam { name: "b".into(), ty: ty.clone() },
            ],
            vm.b.bool_.clone(),
            Color::Red,
        ),
        BuiltinBody::Plain(list_eq_impl),
        BuiltinEnv::empty(),
        false,
    );

    let mf = make_metafunc(vm, &ty, "__getitem__", always_simple_spec, vec![Object::Func(getitem)]);
    ty.define("__getitem__", Object::Func(mf));
    let mf = make_metafunc(vm, &ty, "__setitem__", always_simple_spec, vec![Object::Func(setitem)]);
    ty.define("__setitem__", Object::Func(mf));
    let mf = make_metafunc(vm, &ty, "__eq__", same_class_spec, vec![Object::Func(eq)]);
    ty.define("__eq__", Object::Func(mf));
    ty.freeze();

    let type_ty = vm.b.type_.clone();
    vm.add_global(fqn, Some(type_ty), Object::Type(ty.clone()))?;
    Ok(ty)
}

/// Creates (or reuses) the `dict[K, V]` instance type.
pub fn instantiate_dict_type(vm: &mut Vm, key: &Type, value: &Type) -> SpyResult<Type> {
    let dict_fqn = vm.b.dict.fqn();
    let fqn = vm.fqns.with_qualifiers(dict_fqn, &[key.fqn(), value.fqn()]);
    if let Some(Object::Type(ty)) = vm.lookup_global(fqn) {
        return Ok(ty);
    }
    let ty = Type::new(fqn, Some(vm.b.object.clone()), PyClass::Dict, StorageCategory::Reference);

    let getitem_fqn = vm.fqns.join(fqn, "getitem");
    let getitem = FuncRef::new_builtin(
        getitem_fqn,
        FuncType::new(
            vec![
                FuncParam { name: "d".into(), ty: ty.clone() },
                FuncParam { name: "k".into(), ty: key.clone() },
            ],
            value.clone(),
            Color::Red,
        ),
        BuiltinBody::Plain(dict_getitem_impl),
        BuiltinEnv::empty(),
        false,
    );
    let setitem_fqn = vm.fqns.join(fqn, "setitem");
    let setitem = FuncRef::new_builtin(
        setitem_fqn,
        FuncType::new(
            vec![
                FuncParam { name: "d".into(), ty: ty.clone() },
                FuncParam { name: "k".into(), ty: key.clone() },
                FuncParam { name: "v".into(), ty: value.clone() },
            ],
            vm.b.nonetype.clone(),
            Color::Red,
        ),
        BuiltinBody::Plain(dict_setitem_impl),
        BuiltinEnv::empty(),
        false,
    );

    let mf = make_metafunc(vm, &ty, "__getitem__", always_simple_spec, vec![Object::Func(getitem)]);
    ty.define("__getitem__", Object::Func(mf));
    let mf = make_metafunc(vm, &ty, "__setitem__", always_simple_spec, vec![Object::Func(setitem)]);
    ty.define("__setitem__", Object::Func(mf));
    ty.freeze();

    let type_ty = vm.b.type_.clone();
    vm.add_global(fqn, Some(type_ty), Object::Type(ty.clone()))?;
    Ok(ty)
}
