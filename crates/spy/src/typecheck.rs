//! Turns an [`OpSpec`] into an executable [`OpImpl`].
//!
//! This is where typechecking happens: arity first, then per-parameter type
//! matching, inserting implicit conversions where legal. Pure targets and
//! blue functions fold to a constant when every input is blue.

use crate::ast::Color;
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::function::{FuncParam, FuncRef, FuncType};
use crate::location::Loc;
use crate::metaarg::MetaArg;
use crate::opimpl::{ArgSpec, OpImpl, OpImplKind};
use crate::operators::convop;
use crate::opspec::OpSpec;
use crate::vm::Vm;

pub fn typecheck_opspec(vm: &mut Vm, spec: OpSpec, in_args: &[MetaArg], loc: &Loc) -> SpyResult<OpImpl> {
    match spec {
        OpSpec::Null => Err(SpyError::simple(
            ErrorKind::TypeError,
            "operation not supported",
            "while typechecking this operation",
            loc.clone(),
        )),
        OpSpec::Const(value) => {
            let ty = vm.dynamic_type(&value);
            Ok(OpImpl::constant(FuncType::new(vec![], ty, Color::Blue), value))
        }
        OpSpec::Simple(func) => {
            let plan: Vec<MetaArg> = in_args.to_vec();
            build(vm, func, plan, in_args, loc)
        }
        OpSpec::Complex { func, args } => build(vm, func, args, in_args, loc),
    }
}

fn build(vm: &mut Vm, func: FuncRef, plan: Vec<MetaArg>, in_args: &[MetaArg], loc: &Loc) -> SpyResult<OpImpl> {
    let functype = func.functype().clone();
    if plan.len() != functype.arity() {
        let name = vm.fqns.human(func.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!(
                "this function takes {} arguments but {} were supplied",
                functype.arity(),
                plan.len()
            ),
            format!("while calling `{name}`"),
            loc.clone(),
        ));
    }

    let mut argspecs = Vec::with_capacity(plan.len());
    let mut all_blue = true;
    for (i, (param, ma)) in functype.params.iter().zip(&plan).enumerate() {
        let base = match in_args.iter().position(|a| a.serial == ma.serial) {
            Some(idx) => ArgSpec::Arg(idx),
            None => match ma.blue_value() {
                Some(v) => ArgSpec::Const {
                    value: v.clone(),
                    loc: ma.loc.clone(),
                },
                None => {
                    return Err(SpyError::simple(
                        ErrorKind::PanicError,
                        "malformed OpSpec: red argument is not a caller argument",
                        "while typechecking this operation",
                        loc.clone(),
                    ));
                }
            },
        };
        if !ma.is_blue() {
            all_blue = false;
        }
        let got = ma.static_type().clone();
        let spec = match convop::convert_maybe(vm, &param.ty, ma) {
            Ok(None) => base,
            Ok(Some(conv)) => ArgSpec::Convert {
                ty_exp: param.ty.clone(),
                ty_got: got,
                conv: Box::new(conv),
                arg: Box::new(base),
            },
            Err(mut err) => {
                if let Some(ast) = func.as_ast() {
                    if let Some(arg) = ast.funcdef.args.get(i) {
                        err.add(
                            Severity::Note,
                            format!("expected `{}` because of this parameter", vm.fqns.human(param.ty.fqn())),
                            arg.ty.loc().clone(),
                        );
                    }
                }
                return Err(err);
            }
        };
        argspecs.push(spec);
    }

    if functype.color == Color::Blue && !all_blue {
        let name = vm.fqns.human(func.fqn());
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("cannot call blue function `{name}` with red arguments"),
            "this call has red arguments",
            loc.clone(),
        ));
    }

    let vis_params: Vec<FuncParam> = in_args
        .iter()
        .enumerate()
        .map(|(i, ma)| FuncParam {
            name: format!("v{i}"),
            ty: ma.static_type().clone(),
        })
        .collect();
    let impl_functype = FuncType::new(vis_params, functype.restype.clone(), functype.color);
    let opimpl = OpImpl::call(impl_functype, func.clone(), argspecs);

    // fold pure and blue calls whose inputs are all known
    let foldable = all_blue
        && (func.is_pure() || functype.color == Color::Blue)
        && in_args.iter().all(|ma| ma.value().is_some());
    if foldable {
        let values: Vec<_> = in_args.iter().map(|ma| ma.value().expect("blue value").clone()).collect();
        let OpImplKind::Call { args: plan_specs, .. } = &opimpl.kind else {
            unreachable!("just built a call impl");
        };
        let real_args = OpImpl::materialize_args(vm, plan_specs, &values)?;
        let result = vm.call(&func, &real_args)?;
        let res_ty = vm.dynamic_type(&result);
        return Ok(OpImpl::constant(FuncType::new(vec![], res_ty, Color::Blue), result));
    }

    Ok(opimpl)
}
