//! The `builtins` module: primitive types, singletons, exception types and a
//! small set of module-level functions (`print`, `len`, `range`, `abs`,
//! `max`, `min`).

use ahash::AHashMap;

use crate::ast::{Color, FuncKind};
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::fqn::{Fqn, FqnTable};
use crate::function::{BuiltinBody, BuiltinEnv, FuncParam, FuncRef, FuncType};
use crate::metaarg::MetaArg;
use crate::object::{ExcValue, Object, RangeValue};
use crate::opspec::OpSpec;
use crate::registry::ModuleRegistry;
use crate::types::{PyClass, StorageCategory, Type};
use crate::vm::Vm;

/// Handles to the well-known builtin types and singletons, the equivalent of
/// the `B` namespace in SPy code.
#[derive(Debug)]
pub struct Builtins {
    pub module_fqn: Fqn,
    pub object: Type,
    pub type_: Type,
    pub nonetype: Type,
    pub bool_: Type,
    pub i8: Type,
    pub u8: Type,
    pub i32: Type,
    pub u32: Type,
    pub f32: Type,
    pub f64: Type,
    pub str_: Type,
    pub dynamic: Type,
    pub tuple: Type,
    pub list: Type,
    pub dict: Type,
    pub func: Type,
    pub module: Type,
    pub metaarg: Type,
    pub opspec: Type,
    pub opimpl: Type,
    pub range: Type,
    pub exception: Type,
    exc_types: AHashMap<ErrorKind, Type>,
}

impl Builtins {
    /// Creates all builtin types with their base wiring. Member dicts stay
    /// open until `freeze_all` is called at the end of VM bootstrap.
    pub fn create(fqns: &mut FqnTable) -> Self {
        let module_fqn = fqns.module("builtins");
        let mut mk = |fqns: &mut FqnTable, name: &str, base: Option<&Type>, pyclass, storage| {
            let fqn = fqns.join(module_fqn, name);
            Type::new(fqn, base.cloned(), pyclass, storage)
        };

        let object = mk(fqns, "object", None, PyClass::Object, StorageCategory::Reference);
        let type_ = mk(fqns, "type", Some(&object), PyClass::Type, StorageCategory::Reference);
        let nonetype = mk(fqns, "NoneType", Some(&object), PyClass::NoneType, StorageCategory::Value);
        let bool_ = mk(fqns, "bool", Some(&object), PyClass::Bool, StorageCategory::Value);
        let i8 = mk(fqns, "i8", Some(&object), PyClass::I8, StorageCategory::Value);
        let u8 = mk(fqns, "u8", Some(&object), PyClass::U8, StorageCategory::Value);
        let i32 = mk(fqns, "i32", Some(&object), PyClass::I32, StorageCategory::Value);
        let u32 = mk(fqns, "u32", Some(&object), PyClass::U32, StorageCategory::Value);
        let f32 = mk(fqns, "f32", Some(&object), PyClass::F32, StorageCategory::Value);
        let f64 = mk(fqns, "f64", Some(&object), PyClass::F64, StorageCategory::Value);
        let str_ = mk(fqns, "str", Some(&object), PyClass::Str, StorageCategory::Reference);
        let dynamic = mk(fqns, "dynamic", Some(&object), PyClass::Dynamic, StorageCategory::Reference);
        let tuple = mk(fqns, "tuple", Some(&object), PyClass::Tuple, StorageCategory::Reference);
        let list = mk(fqns, "list", Some(&object), PyClass::List, StorageCategory::Reference);
        let dict = mk(fqns, "dict", Some(&object), PyClass::Dict, StorageCategory::Reference);
        let func = mk(fqns, "func", Some(&object), PyClass::Func, StorageCategory::Reference);
        let module = mk(fqns, "module", Some(&object), PyClass::Module, StorageCategory::Reference);
        let range = mk(fqns, "range", Some(&object), PyClass::Range, StorageCategory::Value);
        let exception = mk(fqns, "Exception", Some(&object), PyClass::Exc, StorageCategory::Reference);

        // the operator protocol types live in the `operator` module
        let op_fqn = fqns.module("operator");
        let metaarg_fqn = fqns.join(op_fqn, "MetaArg");
        let metaarg = Type::new(metaarg_fqn, Some(object.clone()), PyClass::MetaArg, StorageCategory::Reference);
        let opspec_fqn = fqns.join(op_fqn, "OpSpec");
        let opspec = Type::new(opspec_fqn, Some(object.clone()), PyClass::OpSpec, StorageCategory::Reference);
        let opimpl_fqn = fqns.join(op_fqn, "OpImpl");
        let opimpl = Type::new(opimpl_fqn, Some(object.clone()), PyClass::OpImpl, StorageCategory::Reference);

        let mut exc_types = AHashMap::new();
        for kind in [
            ErrorKind::TypeError,
            ErrorKind::ValueError,
            ErrorKind::IndexError,
            ErrorKind::KeyError,
            ErrorKind::ZeroDivisionError,
            ErrorKind::ImportError,
            ErrorKind::PanicError,
            ErrorKind::StaticError,
        ] {
            let name = app_exc_name(kind);
            let fqn = fqns.join(module_fqn, name);
            let ty = Type::new(fqn, Some(exception.clone()), PyClass::Exc, StorageCategory::Reference);
            exc_types.insert(kind, ty);
        }

        Self {
            module_fqn,
            object,
            type_,
            nonetype,
            bool_,
            i8,
            u8,
            i32,
            u32,
            f32,
            f64,
            str_,
            dynamic,
            tuple,
            list,
            dict,
            func,
            module,
            metaarg,
            opspec,
            opimpl,
            range,
            exception,
            exc_types,
        }
    }

    pub fn exc_type(&self, kind: ErrorKind) -> Option<&Type> {
        self.exc_types.get(&kind)
    }

    /// Reverse lookup: the error kind of an app-level exception type.
    pub fn kind_of_exc_type(&self, ty: &Type) -> Option<ErrorKind> {
        self.exc_types.iter().find(|(_, t)| *t == ty).map(|(&kind, _)| kind)
    }

    /// All types (used for installing metafunctions and freezing).
    pub fn all_types(&self) -> Vec<Type> {
        let mut types = vec![
            self.object.clone(),
            self.type_.clone(),
            self.nonetype.clone(),
            self.bool_.clone(),
            self.i8.clone(),
            self.u8.clone(),
            self.i32.clone(),
            self.u32.clone(),
            self.f32.clone(),
            self.f64.clone(),
            self.str_.clone(),
            self.dynamic.clone(),
            self.tuple.clone(),
            self.list.clone(),
            self.dict.clone(),
            self.func.clone(),
            self.module.clone(),
            self.metaarg.clone(),
            self.opspec.clone(),
            self.opimpl.clone(),
            self.range.clone(),
            self.exception.clone(),
        ];
        types.extend(self.exc_types.values().cloned());
        types
    }
}

/// App-level name of an exception type, e.g. `W_TypeError` → `TypeError`.
pub fn app_exc_name(kind: ErrorKind) -> &'static str {
    let wire: &'static str = kind.into();
    wire.trim_start_matches("W_")
}

/// Registers the `builtins` module: types, singletons and functions.
pub fn install(vm: &mut Vm) -> SpyResult<()> {
    let fqn = vm.b.module_fqn;
    let mut reg = ModuleRegistry::new("builtins", fqn);

    for ty in [
        &vm.b.object,
        &vm.b.type_,
        &vm.b.nonetype,
        &vm.b.bool_,
        &vm.b.i8,
        &vm.b.u8,
        &vm.b.i32,
        &vm.b.u32,
        &vm.b.f32,
        &vm.b.f64,
        &vm.b.str_,
        &vm.b.dynamic,
        &vm.b.tuple,
        &vm.b.list,
        &vm.b.dict,
        &vm.b.func,
        &vm.b.module,
        &vm.b.range,
        &vm.b.exception,
    ] {
        let name = vm.fqns.symbol_name(ty.fqn()).to_owned();
        reg.add(&name, ty.fqn(), Object::Type(ty.clone()));
    }
    let exc_types: Vec<Type> = vm.b.all_types().into_iter().filter(|t| t.base() == Some(vm.b.exception.clone())).collect();
    for ty in &exc_types {
        let name = vm.fqns.symbol_name(ty.fqn()).to_owned();
        reg.add(&name, ty.fqn(), Object::Type(ty.clone()));
    }

    let true_fqn = vm.fqns.join(fqn, "True");
    reg.add("True", true_fqn, Object::Bool(true));
    let false_fqn = vm.fqns.join(fqn, "False");
    reg.add("False", false_fqn, Object::Bool(false));
    let none_fqn = vm.fqns.join(fqn, "None");
    reg.add("None", none_fqn, Object::None);

    vm.make_module(reg)?;

    // module functions
    let dynamic = vm.b.dynamic.clone();
    let nonetype = vm.b.nonetype.clone();
    let i32t = vm.b.i32.clone();

    vm.register_builtin_func(
        fqn,
        "print",
        &[],
        FuncType::new(vec![FuncParam { name: "obj".into(), ty: dynamic.clone() }], nonetype, Color::Red),
        BuiltinBody::Plain(print_impl),
        BuiltinEnv::empty(),
        false,
    )?;
    vm.register_builtin_func(
        fqn,
        "len",
        &[],
        FuncType::new(vec![FuncParam { name: "obj".into(), ty: dynamic.clone() }], i32t.clone(), Color::Red),
        BuiltinBody::Plain(len_impl),
        BuiltinEnv::empty(),
        false,
    )?;
    vm.register_builtin_func(
        fqn,
        "range",
        &[],
        FuncType::new(vec![FuncParam { name: "stop".into(), ty: i32t.clone() }], vm.b.range.clone(), Color::Red),
        BuiltinBody::Plain(range_impl),
        BuiltinEnv::empty(),
        false,
    )?;
    vm.register_builtin_func(
        fqn,
        "abs",
        &[],
        FuncType::new(vec![FuncParam { name: "x".into(), ty: i32t.clone() }], i32t.clone(), Color::Red),
        BuiltinBody::Plain(abs_impl),
        BuiltinEnv::empty(),
        true,
    )?;
    vm.register_builtin_func(
        fqn,
        "max",
        &[],
        FuncType::new(
            vec![
                FuncParam { name: "a".into(), ty: i32t.clone() },
                FuncParam { name: "b".into(), ty: i32t.clone() },
            ],
            i32t.clone(),
            Color::Red,
        ),
        BuiltinBody::Plain(max_impl),
        BuiltinEnv::empty(),
        true,
    )?;
    vm.register_builtin_func(
        fqn,
        "min",
        &[],
        FuncType::new(
            vec![
                FuncParam { name: "a".into(), ty: i32t.clone() },
                FuncParam { name: "b".into(), ty: i32t.clone() },
            ],
            i32t,
            Color::Red,
        ),
        BuiltinBody::Plain(min_impl),
        BuiltinEnv::empty(),
        true,
    )?;

    // `TypeError('...')` style constructors: a `__new__` metafunction on each
    // exception type, closing over the kind and its impl function.
    for ty in exc_types {
        let kind = exc_kind_of(vm, &ty).expect("exception type without kind");
        let wire: &'static str = kind.into();
        let impl_fqn = {
            let ns = vm.ops.module_fqn;
            vm.fqns.join_q(ns, "exc_new", &[ty.fqn()])
        };
        let impl_func = FuncRef::new_builtin(
            impl_fqn,
            FuncType::new(
                vec![FuncParam { name: "message".into(), ty: vm.b.str_.clone() }],
                ty.clone(),
                Color::Red,
            ),
            BuiltinBody::Plain(exc_new_impl),
            BuiltinEnv(vec![Object::from_str(wire)]),
            true,
        );
        let mut functype = FuncType::new(vec![], vm.b.opspec.clone(), Color::Blue);
        functype.kind = FuncKind::Metafunc;
        let new_fqn = vm.fqns.join(ty.fqn(), "__new__");
        let spec_func = FuncRef::new_builtin(
            new_fqn,
            functype,
            BuiltinBody::Metafunc(exc_new_spec),
            BuiltinEnv(vec![Object::Func(impl_func)]),
            false,
        );
        ty.define("__new__", Object::Func(spec_func));
    }

    Ok(())
}

fn exc_kind_of(vm: &Vm, ty: &Type) -> Option<ErrorKind> {
    vm.b.kind_of_exc_type(ty)
}

fn print_impl(vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let text = args[0].str_w(&vm.fqns);
    vm.out.stdout_write(&text);
    vm.out.stdout_push('\n');
    Ok(Object::None)
}

fn len_impl(vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let n = match &args[0] {
        Object::Str(s) => s.chars().count(),
        Object::Tuple(items) => items.len(),
        Object::List(l) => l.0.items.borrow().len(),
        Object::Dict(d) => d.0.entries.borrow().len(),
        Object::Range(r) => usize::try_from(i64::from(r.stop) - i64::from(r.start)).unwrap_or(0),
        other => {
            let ty = vm.dynamic_type(other);
            return Err(SpyError::new(
                ErrorKind::TypeError,
                format!("cannot call len() on type `{}`", vm.fqns.human(ty.fqn())),
            ));
        }
    };
    Ok(Object::I32(i32::try_from(n).unwrap_or(i32::MAX)))
}

fn range_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let stop = args[0].as_i32().expect("range() argument already typechecked");
    Ok(Object::Range(RangeValue { start: 0, stop }))
}

fn abs_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let v = args[0].as_i32().expect("abs() argument already typechecked");
    Ok(Object::I32(v.wrapping_abs()))
}

fn max_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (a, b) = (args[0].as_i32().unwrap_or(0), args[1].as_i32().unwrap_or(0));
    Ok(Object::I32(a.max(b)))
}

fn min_impl(_vm: &mut Vm, _env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let (a, b) = (args[0].as_i32().unwrap_or(0), args[1].as_i32().unwrap_or(0));
    Ok(Object::I32(a.min(b)))
}

fn exc_new_impl(_vm: &mut Vm, env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    use std::str::FromStr as _;
    let wire = env.get(0).as_str().expect("exc kind in env");
    let kind = ErrorKind::from_str(wire).expect("valid exc kind in env");
    let message = args[0].as_str().unwrap_or("").to_owned();
    Ok(Object::Exc(std::rc::Rc::new(ExcValue { kind, message })))
}

/// `__new__` metafunction of exception types: builds a call to the impl with
/// the message argument (or an empty-string constant for `ValueError`-style
/// no-arg raises).
fn exc_new_spec(vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpSpec> {
    let impl_func = env.get(0).as_func().expect("exc impl in env").clone();
    // args[0] is the type itself
    let plan = match args.len() {
        1 => {
            let empty = vm.blue_arg(Object::from_str(""), args[0].loc.clone());
            vec![empty]
        }
        2 => vec![args[1].clone()],
        _ => {
            return Err(SpyError::new(
                ErrorKind::TypeError,
                "exception constructors take at most one argument",
            )
            .with(Severity::Error, "too many arguments", args[0].loc.clone()));
        }
    };
    Ok(OpSpec::complex(impl_func, plan))
}
