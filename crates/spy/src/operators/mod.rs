//! The `operator` module: dispatch operators, implicit conversions and the
//! primitive operator implementations.
//!
//! Operators (`ADD`, `GETITEM`, `CALL`, ...) are blue functions from
//! meta-arguments to a typechecked [`OpImpl`]. They look up the relevant
//! metafunction on the primary operand's *static* type, obtain an
//! [`crate::opspec::OpSpec`] and hand it to the typechecker. Their results
//! are memoized through the blue cache, which is what lets the redshifter
//! drop the whole dispatch at compile time.

pub mod convop;
pub mod impls;

use ahash::AHashMap;

use crate::ast::{BinOp, CmpOp, Color, FuncKind};
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::fqn::{Fqn, FqnTable};
use crate::function::{BuiltinBody, BuiltinEnv, FuncRef, FuncType, MetaFn, OperatorFn};
use crate::metaarg::MetaArg;
use crate::object::Object;
use crate::opimpl::OpImpl;
use crate::opspec::OpSpec;
use crate::registry::ModuleRegistry;
use crate::typecheck;
use crate::types::{PyClass, Type};
use crate::vm::Vm;

/// Well-known function handles of the `operator` module.
#[derive(Debug)]
pub struct Operators {
    pub module_fqn: Fqn,
    pub add: FuncRef,
    pub sub: FuncRef,
    pub mul: FuncRef,
    pub div: FuncRef,
    pub floordiv: FuncRef,
    pub mod_: FuncRef,
    pub neg: FuncRef,
    pub eq: FuncRef,
    pub ne: FuncRef,
    pub lt: FuncRef,
    pub le: FuncRef,
    pub gt: FuncRef,
    pub ge: FuncRef,
    pub getitem: FuncRef,
    pub setitem: FuncRef,
    pub getattr: FuncRef,
    pub setattr: FuncRef,
    pub call: FuncRef,
    pub convert: FuncRef,
    pub raise_: FuncRef,
    pub universal_eq: FuncRef,
    pub universal_ne: FuncRef,
    pub identity: FuncRef,
    pub bool_not: FuncRef,
    /// Implicit conversion multimethods: `(got, exp) → converter`.
    pub convtable: AHashMap<(Fqn, Fqn), FuncRef>,
}

impl Operators {
    pub fn binop(&self, op: BinOp) -> &FuncRef {
        match op {
            BinOp::Add => &self.add,
            BinOp::Sub => &self.sub,
            BinOp::Mul => &self.mul,
            BinOp::Div => &self.div,
            BinOp::FloorDiv => &self.floordiv,
            BinOp::Mod => &self.mod_,
        }
    }

    pub fn cmpop(&self, op: CmpOp) -> &FuncRef {
        match op {
            CmpOp::Eq => &self.eq,
            CmpOp::Ne => &self.ne,
            CmpOp::Lt => &self.lt,
            CmpOp::Le => &self.le,
            CmpOp::Gt => &self.gt,
            CmpOp::Ge => &self.ge,
        }
    }
}

/// The functype shared by all dispatch operators; arguments are not
/// typechecked on this path (operators are invoked via `Vm::call_op`).
fn operator_functype(b: &crate::builtins::Builtins) -> FuncType {
    FuncType::new(vec![], b.opimpl.clone(), Color::Blue)
}

fn make_operator(
    fqns: &mut FqnTable,
    b: &crate::builtins::Builtins,
    module_fqn: Fqn,
    name: &str,
    body: OperatorFn,
    env: Vec<Object>,
) -> FuncRef {
    let fqn = fqns.join(module_fqn, name);
    FuncRef::new_builtin(fqn, operator_functype(b), BuiltinBody::Operator(body), BuiltinEnv(env), false)
}

/// Creates the operator function handles; `install` later registers them as
/// globals of the `operator` module.
pub fn create(fqns: &mut FqnTable, b: &crate::builtins::Builtins) -> Operators {
    let module_fqn = fqns.module("operator");

    let binop = |fqns: &mut FqnTable, name: &str, dunder: &str, rdunder: &str, token: &str| {
        make_operator(
            fqns,
            b,
            module_fqn,
            name,
            op_binary,
            vec![Object::from_str(dunder), Object::from_str(rdunder), Object::from_str(token)],
        )
    };

    let add = binop(fqns, "ADD", "__add__", "__radd__", "+");
    let sub = binop(fqns, "SUB", "__sub__", "__rsub__", "-");
    let mul = binop(fqns, "MUL", "__mul__", "__rmul__", "*");
    let div = binop(fqns, "DIV", "__div__", "__rdiv__", "/");
    let floordiv = binop(fqns, "FLOORDIV", "__floordiv__", "__rfloordiv__", "//");
    let mod_ = binop(fqns, "MOD", "__mod__", "__rmod__", "%");
    // comparisons try the same metafunction on the right operand
    let eq = binop(fqns, "EQ", "__eq__", "__eq__", "==");
    let ne = binop(fqns, "NE", "__ne__", "__ne__", "!=");
    let lt = binop(fqns, "LT", "__lt__", "__lt__", "<");
    let le = binop(fqns, "LE", "__le__", "__le__", "<=");
    let gt = binop(fqns, "GT", "__gt__", "__gt__", ">");
    let ge = binop(fqns, "GE", "__ge__", "__ge__", ">=");

    let neg = make_operator(
        fqns,
        b,
        module_fqn,
        "NEG",
        op_unary,
        vec![Object::from_str("__neg__"), Object::from_str("-")],
    );
    let getitem = make_operator(fqns, b, module_fqn, "GETITEM", op_getitem, vec![]);
    let setitem = make_operator(fqns, b, module_fqn, "SETITEM", op_setitem, vec![]);
    let getattr = make_operator(fqns, b, module_fqn, "GETATTR", op_getattr, vec![]);
    let setattr = make_operator(fqns, b, module_fqn, "SETATTR", op_setattr, vec![]);
    let call = make_operator(fqns, b, module_fqn, "CALL", op_call, vec![]);
    let convert = make_operator(fqns, b, module_fqn, "CONVERT", op_convert, vec![]);

    let raise_ = {
        let fqn = fqns.join(module_fqn, "raise");
        let params = vec![
            ("etype", b.str_.clone()),
            ("message", b.str_.clone()),
            ("filename", b.str_.clone()),
            ("lineno", b.i32.clone()),
        ];
        let functype = FuncType::new(
            params
                .into_iter()
                .map(|(name, ty)| crate::function::FuncParam { name: name.into(), ty })
                .collect(),
            b.nonetype.clone(),
            Color::Red,
        );
        FuncRef::new_builtin(fqn, functype, BuiltinBody::Plain(impls::raise_impl), BuiltinEnv::empty(), false)
    };

    let dyn2bool = |fqns: &mut FqnTable, name: &str, body: crate::function::PlainFn| {
        let fqn = fqns.join(module_fqn, name);
        let functype = FuncType::new(
            vec![
                crate::function::FuncParam { name: "a".into(), ty: b.dynamic.clone() },
                crate::function::FuncParam { name: "b".into(), ty: b.dynamic.clone() },
            ],
            b.bool_.clone(),
            Color::Red,
        );
        FuncRef::new_builtin(fqn, functype, BuiltinBody::Plain(body), BuiltinEnv::empty(), false)
    };
    let universal_eq = dyn2bool(fqns, "universal_eq", impls::universal_eq_impl);
    let universal_ne = dyn2bool(fqns, "universal_ne", impls::universal_ne_impl);

    let identity = {
        let fqn = fqns.join(module_fqn, "identity");
        let functype = FuncType::new(
            vec![crate::function::FuncParam { name: "x".into(), ty: b.dynamic.clone() }],
            b.dynamic.clone(),
            Color::Red,
        );
        FuncRef::new_builtin(fqn, functype, BuiltinBody::Plain(impls::identity_impl), BuiltinEnv::empty(), true)
    };
    let bool_not = {
        let fqn = fqns.join(module_fqn, "bool_not");
        let functype = FuncType::new(
            vec![crate::function::FuncParam { name: "x".into(), ty: b.bool_.clone() }],
            b.bool_.clone(),
            Color::Red,
        );
        FuncRef::new_builtin(fqn, functype, BuiltinBody::Plain(impls::bool_not_impl), BuiltinEnv::empty(), true)
    };

    Operators {
        module_fqn,
        add,
        sub,
        mul,
        div,
        floordiv,
        mod_,
        neg,
        eq,
        ne,
        lt,
        le,
        gt,
        ge,
        getitem,
        setitem,
        getattr,
        setattr,
        call,
        convert,
        raise_,
        universal_eq,
        universal_ne,
        identity,
        bool_not,
        convtable: AHashMap::new(),
    }
}

/// Registers the `operator` module globals, the primitive implementations,
/// the conversion table and the metafunctions on the builtin types.
pub fn install(vm: &mut Vm) -> SpyResult<()> {
    let module_fqn = vm.ops.module_fqn;
    let mut reg = ModuleRegistry::new("operator", module_fqn);
    for ty in [&vm.b.metaarg, &vm.b.opspec, &vm.b.opimpl] {
        let name = vm.fqns.symbol_name(ty.fqn()).to_owned();
        reg.add(&name, ty.fqn(), Object::Type(ty.clone()));
    }
    let singletons = [
        vm.ops.add.clone(),
        vm.ops.sub.clone(),
        vm.ops.mul.clone(),
        vm.ops.div.clone(),
        vm.ops.floordiv.clone(),
        vm.ops.mod_.clone(),
        vm.ops.neg.clone(),
        vm.ops.eq.clone(),
        vm.ops.ne.clone(),
        vm.ops.lt.clone(),
        vm.ops.le.clone(),
        vm.ops.gt.clone(),
        vm.ops.ge.clone(),
        vm.ops.getitem.clone(),
        vm.ops.setitem.clone(),
        vm.ops.getattr.clone(),
        vm.ops.setattr.clone(),
        vm.ops.call.clone(),
        vm.ops.convert.clone(),
        vm.ops.raise_.clone(),
        vm.ops.universal_eq.clone(),
        vm.ops.universal_ne.clone(),
        vm.ops.identity.clone(),
        vm.ops.bool_not.clone(),
    ];
    for func in singletons {
        let name = vm.fqns.symbol_name(func.fqn()).to_owned();
        reg.add(&name, func.fqn(), Object::Func(func));
    }
    vm.make_module(reg)?;

    impls::install(vm)?;
    convop::install_conversions(vm)?;
    Ok(())
}

/// Creates a metafunction handle to be stored in a type dict.
pub fn make_metafunc(vm: &mut Vm, owner: &Type, name: &str, body: MetaFn, env: Vec<Object>) -> FuncRef {
    let fqn = vm.fqns.join(owner.fqn(), name);
    let mut functype = FuncType::new(vec![], vm.b.opspec.clone(), Color::Blue);
    functype.kind = FuncKind::Metafunc;
    FuncRef::new_builtin(fqn, functype, BuiltinBody::Metafunc(body), BuiltinEnv(env), false)
}

/// Looks up a metafunction in a type's dict, following the base chain.
pub fn lookup_metafunc(ty: &Type, name: &str) -> Option<FuncRef> {
    let obj = ty.lookup(name)?;
    let func = obj.as_func()?;
    if func.kind() == FuncKind::Metafunc {
        Some(func.clone())
    } else {
        None
    }
}

/// Calls the metafunction `name` of `ty` if present, else returns `Null`.
fn metacall_if(vm: &mut Vm, ty: &Type, name: &str, args: &[MetaArg]) -> SpyResult<OpSpec> {
    match lookup_metafunc(ty, name) {
        Some(func) => vm.fast_metacall(&func, args),
        None => Ok(OpSpec::Null),
    }
}

// =======================================================================
// dispatch operator bodies

fn op_binary(vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let dunder = env.get(0).as_str().expect("dunder in env").to_owned();
    let rdunder = env.get(1).as_str().expect("rdunder in env").to_owned();
    let token = env.get(2).as_str().expect("token in env").to_owned();
    let (l, r) = (&args[0], &args[1]);

    let lty = l.static_type().clone();
    let mut spec = metacall_if(vm, &lty, &dunder, args)?;
    if spec.is_null() {
        let rty = r.static_type().clone();
        spec = metacall_if(vm, &rty, &rdunder, args)?;
    }
    if spec.is_null() {
        let lname = vm.fqns.human(l.static_type().fqn());
        let rname = vm.fqns.human(r.static_type().fqn());
        let mut err = SpyError::new(ErrorKind::TypeError, format!("cannot do `{lname}` {token} `{rname}`"));
        err.add(Severity::Error, format!("this is `{lname}`"), l.loc.clone());
        err.add(Severity::Error, format!("this is `{rname}`"), r.loc.clone());
        return Err(err);
    }
    typecheck::typecheck_opspec(vm, spec, args, &l.loc.clone())
}

fn op_unary(vm: &mut Vm, env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let dunder = env.get(0).as_str().expect("dunder in env").to_owned();
    let token = env.get(1).as_str().expect("token in env").to_owned();
    let v = &args[0];
    let ty = v.static_type().clone();
    let spec = metacall_if(vm, &ty, &dunder, args)?;
    if spec.is_null() {
        let tname = vm.fqns.human(ty.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("cannot do {token}`{tname}`"),
            format!("this is `{tname}`"),
            v.loc.clone(),
        ));
    }
    typecheck::typecheck_opspec(vm, spec, args, &v.loc.clone())
}

fn op_getitem(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let obj = &args[0];
    let ty = obj.static_type().clone();
    let spec = metacall_if(vm, &ty, "__getitem__", args)?;
    if spec.is_null() {
        let tname = vm.fqns.human(ty.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("cannot do `{tname}`[...]"),
            format!("this is `{tname}`"),
            obj.loc.clone(),
        ));
    }
    typecheck::typecheck_opspec(vm, spec, args, &obj.loc.clone())
}

fn op_setitem(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let obj = &args[0];
    let ty = obj.static_type().clone();
    let spec = metacall_if(vm, &ty, "__setitem__", args)?;
    if spec.is_null() {
        let tname = vm.fqns.human(ty.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("cannot do `{tname}`[...] = ..."),
            format!("this is `{tname}`"),
            obj.loc.clone(),
        ));
    }
    typecheck::typecheck_opspec(vm, spec, args, &obj.loc.clone())
}

fn op_getattr(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let obj = &args[0];
    let name = args[1].blue_str()?;
    let ty = obj.static_type().clone();

    let mut spec = metacall_if(vm, &ty, "__getattribute__", args)?;
    if spec.is_null() {
        // static dict lookup (class attrs)
        if let Some(value) = ty.lookup(&name) {
            spec = OpSpec::constant(value);
        }
    }
    if spec.is_null() {
        spec = metacall_if(vm, &ty, "__getattr__", args)?;
    }
    if spec.is_null() {
        let tname = vm.fqns.human(ty.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("type `{tname}` has no attribute '{name}'"),
            "attribute not found",
            args[1].loc.clone(),
        ));
    }
    typecheck::typecheck_opspec(vm, spec, args, &obj.loc.clone())
}

fn op_setattr(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let obj = &args[0];
    let name = args[1].blue_str()?;
    let ty = obj.static_type().clone();
    let spec = metacall_if(vm, &ty, "__setattr__", args)?;
    if spec.is_null() {
        let tname = vm.fqns.human(ty.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("cannot set attribute '{name}' on type `{tname}`"),
            "attribute not writable",
            args[1].loc.clone(),
        ));
    }
    typecheck::typecheck_opspec(vm, spec, args, &obj.loc.clone())
}

/// CALL applies to the callee's static type. Function values call directly;
/// for `Type` objects the metaclass runs `__new__` (instance creation).
fn op_call(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let callee = &args[0];
    let rest = &args[1..];
    let ty = callee.static_type().clone();

    match ty.pyclass() {
        PyClass::Func => {
            let Some(Object::Func(func)) = callee.blue_value().cloned() else {
                return Err(SpyError::simple(
                    ErrorKind::TypeError,
                    "cannot call a red function value",
                    "the callee is not known at compile time",
                    callee.loc.clone(),
                ));
            };
            match func.kind() {
                FuncKind::Generic => {
                    // a generic must be specialized first, unless it is
                    // called directly with blue type arguments
                    if rest.iter().all(|a| matches!(a.blue_value(), Some(Object::Type(_)))) && !rest.is_empty() {
                        let spec = OpSpec::complex(func, rest.to_vec());
                        return typecheck::typecheck_opspec(vm, spec, rest, &callee.loc.clone());
                    }
                    let name = vm.fqns.render(func.fqn());
                    Err(SpyError::simple(
                        ErrorKind::TypeError,
                        format!("generic function `{name}` must be specialized"),
                        "use `[...]` to provide type arguments",
                        callee.loc.clone(),
                    ))
                }
                FuncKind::Metafunc => Err(SpyError::simple(
                    ErrorKind::TypeError,
                    "metafunctions cannot be called directly",
                    "this is a metafunction",
                    callee.loc.clone(),
                )),
                FuncKind::Plain => {
                    let spec = OpSpec::complex(func, rest.to_vec());
                    typecheck::typecheck_opspec(vm, spec, rest, &callee.loc.clone())
                }
            }
        }
        PyClass::Type => {
            let target = callee.blue_type()?;
            let spec = metacall_if(vm, &target, "__new__", args)?;
            if spec.is_null() {
                let tname = vm.fqns.human(target.fqn());
                return Err(SpyError::simple(
                    ErrorKind::TypeError,
                    format!("cannot instantiate type `{tname}`"),
                    "no `__new__` defined",
                    callee.loc.clone(),
                ));
            }
            typecheck::typecheck_opspec(vm, spec, rest, &callee.loc.clone())
        }
        _ => {
            let spec = metacall_if(vm, &ty, "__call__", args)?;
            if spec.is_null() {
                let tname = vm.fqns.human(ty.fqn());
                return Err(SpyError::simple(
                    ErrorKind::TypeError,
                    format!("cannot call objects of type `{tname}`"),
                    "this is not callable",
                    callee.loc.clone(),
                ));
            }
            typecheck::typecheck_opspec(vm, spec, rest, &callee.loc.clone())
        }
    }
}

/// CONVERT(expT, gotT, x): resolves an implicit conversion. The resulting
/// impl's argument space is `[expT, gotT, x]` with the value at position 2.
fn op_convert(vm: &mut Vm, _env: &BuiltinEnv, args: &[MetaArg]) -> SpyResult<OpImpl> {
    let exp = args[0].blue_type()?;
    let x = &args[2];
    let got = x.static_type().clone();
    match convop::convert_maybe(vm, &exp, x)? {
        Some(conv) => Ok(remap_single_arg(conv, 2)),
        None => {
            // already a subtype: the identity, which still carries the
            // expected result type
            let functype = FuncType::new(
                vec![crate::function::FuncParam { name: "x".into(), ty: got }],
                exp,
                Color::Red,
            );
            Ok(OpImpl::call(
                functype,
                vm.ops.identity.clone(),
                vec![crate::opimpl::ArgSpec::Arg(2)],
            ))
        }
    }
}

/// Rewrites `Arg(0)` leaves to `Arg(i)`, used when an opimpl built for a
/// single-value argument space is exposed under a wider one.
fn remap_single_arg(mut conv: OpImpl, i: usize) -> OpImpl {
    fn remap(spec: &mut crate::opimpl::ArgSpec, i: usize) {
        match spec {
            crate::opimpl::ArgSpec::Arg(n) => {
                if *n == 0 {
                    *n = i;
                }
            }
            crate::opimpl::ArgSpec::Const { .. } => {}
            crate::opimpl::ArgSpec::Convert { arg, .. } => remap(arg, i),
        }
    }
    if let crate::opimpl::OpImplKind::Call { args, .. } = &mut conv.kind {
        for spec in args {
            remap(spec, i);
        }
    }
    conv
}

/// Builds the impl for `not x`: convert to bool, then negate.
pub fn build_not(vm: &mut Vm, x: &MetaArg) -> SpyResult<OpImpl> {
    let bool_ty = vm.b.bool_.clone();
    let conv = convop::convert_maybe(vm, &bool_ty, x)?;
    let functype = FuncType::new(
        vec![crate::function::FuncParam { name: "x".into(), ty: x.static_type().clone() }],
        bool_ty.clone(),
        Color::Red,
    );
    let arg = match conv {
        Some(conv) => crate::opimpl::ArgSpec::Convert {
            ty_exp: bool_ty,
            ty_got: x.static_type().clone(),
            conv: Box::new(conv),
            arg: Box::new(crate::opimpl::ArgSpec::Arg(0)),
        },
        None => crate::opimpl::ArgSpec::Arg(0),
    };
    Ok(OpImpl::call(functype, vm.ops.bool_not.clone(), vec![arg]))
}
