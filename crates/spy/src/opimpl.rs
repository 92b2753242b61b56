use crate::errors::SpyResult;
use crate::fqn::FqnTable;
use crate::function::{FuncRef, FuncType};
use crate::location::Loc;
use crate::object::Object;
use crate::types::Type;
use crate::vm::Vm;

/// One entry of an [`OpImpl`]'s argument-building plan.
///
/// The leaves reference caller arguments by position or inject constants;
/// `Convert` wraps another entry in a conversion `OpImpl`, so a single plan
/// encodes a whole dispatch tree.
#[derive(Debug, Clone)]
pub enum ArgSpec {
    /// The caller's i-th argument, unchanged.
    Arg(usize),
    Const {
        value: Object,
        loc: Loc,
    },
    Convert {
        ty_exp: Type,
        ty_got: Type,
        conv: Box<OpImpl>,
        arg: Box<ArgSpec>,
    },
}

#[derive(Debug, Clone)]
pub enum OpImplKind {
    /// A constant result; no call happens.
    Const(Object),
    Call { func: FuncRef, args: Vec<ArgSpec> },
}

/// The typechecked counterpart of an [`crate::opspec::OpSpec`], ready to be
/// executed.
///
/// An `OpImpl` is not a function but behaves like one: `functype` describes
/// the positional arguments it expects (the caller's visible argument
/// types), its result type and its color.
#[derive(Debug, Clone)]
pub struct OpImpl {
    pub functype: FuncType,
    pub kind: OpImplKind,
}

impl OpImpl {
    pub fn constant(functype: FuncType, value: Object) -> Self {
        Self {
            functype,
            kind: OpImplKind::Const(value),
        }
    }

    pub fn call(functype: FuncType, func: FuncRef, args: Vec<ArgSpec>) -> Self {
        Self {
            functype,
            kind: OpImplKind::Call { func, args },
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, OpImplKind::Const(_))
    }

    pub fn const_value(&self) -> Option<&Object> {
        match &self.kind {
            OpImplKind::Const(v) => Some(v),
            OpImplKind::Call { .. } => None,
        }
    }

    pub fn func(&self) -> Option<&FuncRef> {
        match &self.kind {
            OpImplKind::Call { func, .. } => Some(func),
            OpImplKind::Const(_) => None,
        }
    }

    pub fn is_pure(&self) -> bool {
        match &self.kind {
            OpImplKind::Const(_) => true,
            OpImplKind::Call { func, .. } => func.is_pure(),
        }
    }

    /// Invokes the impl with the caller's concrete argument values,
    /// materializing the argument plan (conversions included).
    pub fn execute(&self, vm: &mut Vm, args: &[Object]) -> SpyResult<Object> {
        match &self.kind {
            OpImplKind::Const(v) => Ok(v.clone()),
            OpImplKind::Call { func, args: plan } => {
                let mut real_args = Vec::with_capacity(plan.len());
                for spec in plan {
                    real_args.push(Self::build_arg(vm, spec, args)?);
                }
                vm.fast_call(func, &real_args)
            }
        }
    }

    /// Materializes an argument plan against concrete caller values.
    pub(crate) fn materialize_args(vm: &mut Vm, plan: &[ArgSpec], args: &[Object]) -> SpyResult<Vec<Object>> {
        let mut real_args = Vec::with_capacity(plan.len());
        for spec in plan {
            real_args.push(Self::build_arg(vm, spec, args)?);
        }
        Ok(real_args)
    }

    fn build_arg(vm: &mut Vm, spec: &ArgSpec, args: &[Object]) -> SpyResult<Object> {
        match spec {
            ArgSpec::Arg(i) => Ok(args[*i].clone()),
            ArgSpec::Const { value, .. } => Ok(value.clone()),
            ArgSpec::Convert { conv, arg, .. } => {
                let inner = Self::build_arg(vm, arg, args)?;
                conv.execute(vm, &[inner])
            }
        }
    }

    /// Human-readable rendering, e.g.
    /// `def(v0: i32, v1: f64) -> f64: return `operator::f64_add`(`operator::i32_to_f64`(v0), v1)`.
    pub fn render(&self, fqns: &FqnTable) -> String {
        let argnames: Vec<String> = (0..self.functype.arity()).map(|i| format!("v{i}")).collect();
        let body = match &self.kind {
            OpImplKind::Const(v) => v.repr(fqns),
            OpImplKind::Call { .. } => self.render_call(fqns, &argnames),
        };
        format!("{}: return {}", self.functype.signature(fqns), body)
    }

    fn render_call(&self, fqns: &FqnTable, argnames: &[String]) -> String {
        let OpImplKind::Call { func, args } = &self.kind else {
            return self.const_value().map(|v| v.repr(fqns)).unwrap_or_default();
        };
        let rendered: Vec<String> = args.iter().map(|a| Self::render_spec(fqns, a, argnames)).collect();
        format!("`{}`({})", fqns.render(func.fqn()), rendered.join(", "))
    }

    fn render_spec(fqns: &FqnTable, spec: &ArgSpec, argnames: &[String]) -> String {
        match spec {
            ArgSpec::Arg(i) => argnames[*i].clone(),
            ArgSpec::Const { value, .. } => value.repr(fqns),
            ArgSpec::Convert { conv, arg, .. } => {
                let inner = Self::render_spec(fqns, arg, argnames);
                conv.render_call(fqns, &[inner])
            }
        }
    }
}
