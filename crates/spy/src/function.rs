use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{Color, FuncDef, FuncKind};
use crate::errors::SpyResult;
use crate::fqn::{Fqn, FqnTable};
use crate::metaarg::MetaArg;
use crate::object::{Env, Key, Object};
use crate::opimpl::OpImpl;
use crate::opspec::OpSpec;
use crate::types::Type;
use crate::vm::Vm;

#[derive(Debug, Clone, PartialEq)]
pub struct FuncParam {
    pub name: String,
    pub ty: Type,
}

/// The signature of a function: parameters, result type, color and kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub color: Color,
    pub kind: FuncKind,
    pub params: Vec<FuncParam>,
    pub restype: Type,
}

impl FuncType {
    pub fn new(params: Vec<FuncParam>, restype: Type, color: Color) -> Self {
        Self {
            color,
            kind: FuncKind::Plain,
            params,
            restype,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Human-readable signature: `def(x: i32, y: i32) -> i32`.
    pub fn signature(&self, fqns: &FqnTable) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, fqns.human(p.ty.fqn())))
            .collect();
        format!("def({}) -> {}", params.join(", "), fqns.human(self.restype.fqn()))
    }
}

/// Closed-over values of a native builtin function.
///
/// Two registrations of a builtin are "equivalent" iff they share the same
/// code pointer and their environments hold equal values; the VM then treats
/// the second registration as a silent no-op.
#[derive(Debug, Default)]
pub struct BuiltinEnv(pub Vec<Object>);

impl BuiltinEnv {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, i: usize) -> &Object {
        &self.0[i]
    }

    fn key(&self) -> Vec<Key> {
        self.0.iter().map(Object::spy_key).collect()
    }
}

/// A plain builtin: from values to a value.
pub type PlainFn = fn(&mut Vm, &BuiltinEnv, &[Object]) -> SpyResult<Object>;
/// A metafunction: from meta-arguments to an [`OpSpec`].
pub type MetaFn = fn(&mut Vm, &BuiltinEnv, &[MetaArg]) -> SpyResult<OpSpec>;
/// An operator: from meta-arguments to a typechecked [`OpImpl`].
pub type OperatorFn = fn(&mut Vm, &BuiltinEnv, &[MetaArg]) -> SpyResult<OpImpl>;

#[derive(Clone, Copy)]
pub enum BuiltinBody {
    Plain(PlainFn),
    Metafunc(MetaFn),
    Operator(OperatorFn),
}

impl BuiltinBody {
    /// The code identity used by the re-registration equivalence check.
    pub fn code_id(self) -> usize {
        match self {
            Self::Plain(f) => f as usize,
            Self::Metafunc(f) => f as usize,
            Self::Operator(f) => f as usize,
        }
    }
}

impl std::fmt::Debug for BuiltinBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Plain(_) => "Plain",
            Self::Metafunc(_) => "Metafunc",
            Self::Operator(_) => "Operator",
        };
        write!(f, "BuiltinBody::{tag}(0x{:x})", self.code_id())
    }
}

#[derive(Debug)]
pub struct BuiltinFunc {
    pub body: BuiltinBody,
    pub env: BuiltinEnv,
    /// Pure functions fold to constants when all their inputs are blue.
    pub pure: bool,
}

/// A compiled SPy function.
#[derive(Debug)]
pub struct AstFunc {
    pub funcdef: Rc<FuncDef>,
    /// FQN of the module the function was defined in; module-level names
    /// resolve through it.
    pub module: Fqn,
    /// Captured environments of the enclosing function frames, innermost
    /// last. Names are unique across them because shadowing is an error.
    pub closure: Vec<Env>,
    /// Declared types of the locals, recorded by the redshifter.
    pub locals_types: RefCell<Option<IndexMap<String, Type>>>,
    /// True for the residual twin produced by the redshifter.
    pub redshifted: bool,
    /// Set on the source function once its residual twin exists; the source
    /// is then invalid and kept only for error reporting.
    pub redshifted_into: RefCell<Option<FuncRef>>,
    pub invalid: Cell<bool>,
}

#[derive(Debug)]
pub enum FuncBody {
    Builtin(BuiltinFunc),
    Ast(AstFunc),
}

#[derive(Debug)]
pub struct FuncData {
    pub fqn: Fqn,
    pub functype: FuncType,
    pub body: FuncBody,
}

/// A shared handle to a function object. Equality is identity.
#[derive(Debug, Clone)]
pub struct FuncRef(Rc<FuncData>);

impl PartialEq for FuncRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl FuncRef {
    pub fn new_builtin(fqn: Fqn, functype: FuncType, body: BuiltinBody, env: BuiltinEnv, pure: bool) -> Self {
        Self(Rc::new(FuncData {
            fqn,
            functype,
            body: FuncBody::Builtin(BuiltinFunc { body, env, pure }),
        }))
    }

    pub fn new_ast(fqn: Fqn, functype: FuncType, funcdef: Rc<FuncDef>, module: Fqn, closure: Vec<Env>) -> Self {
        Self::new_ast_full(fqn, functype, funcdef, module, closure, false)
    }

    pub fn new_ast_full(
        fqn: Fqn,
        functype: FuncType,
        funcdef: Rc<FuncDef>,
        module: Fqn,
        closure: Vec<Env>,
        redshifted: bool,
    ) -> Self {
        Self(Rc::new(FuncData {
            fqn,
            functype,
            body: FuncBody::Ast(AstFunc {
                funcdef,
                module,
                closure,
                locals_types: RefCell::new(None),
                redshifted,
                redshifted_into: RefCell::new(None),
                invalid: Cell::new(false),
            }),
        }))
    }

    pub fn fqn(&self) -> Fqn {
        self.0.fqn
    }

    pub fn functype(&self) -> &FuncType {
        &self.0.functype
    }

    pub fn color(&self) -> Color {
        self.0.functype.color
    }

    pub fn kind(&self) -> FuncKind {
        self.0.functype.kind
    }

    /// Stable identity for the blue cache.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn as_ast(&self) -> Option<&AstFunc> {
        match &self.0.body {
            FuncBody::Ast(f) => Some(f),
            FuncBody::Builtin(_) => None,
        }
    }

    pub fn as_builtin(&self) -> Option<&BuiltinFunc> {
        match &self.0.body {
            FuncBody::Builtin(f) => Some(f),
            FuncBody::Ast(_) => None,
        }
    }

    pub fn body(&self) -> &FuncBody {
        &self.0.body
    }

    pub fn is_pure(&self) -> bool {
        match &self.0.body {
            FuncBody::Builtin(f) => f.pure,
            FuncBody::Ast(_) => false,
        }
    }

    /// Re-registration equivalence: identical compiled code plus equal
    /// closed-over values.
    pub fn equivalent_builtin(&self, other: &Self) -> bool {
        match (&self.0.body, &other.0.body) {
            (FuncBody::Builtin(a), FuncBody::Builtin(b)) => {
                a.body.code_id() == b.body.code_id() && a.env.key() == b.env.key()
            }
            _ => false,
        }
    }
}
