//! The redshifter: the partial evaluator that turns a two-color function
//! into a fully red, monomorphized one.
//!
//! For every red `ASTFunc` that is not yet redshifted, a fresh twin is
//! built whose body is the original body rewritten expression by
//! expression: blue-reducible subtrees become constants (literals for
//! primitives, FQN references otherwise), operator applications become
//! direct calls to the resolved impl function (with explicit conversion
//! calls), and locals acquire declared types. A fixed-point loop repeats
//! the pass as long as new `ASTFunc`s appear in the globals (e.g. because a
//! blue closure escaped into residual code).

use std::rc::Rc;
use std::str::FromStr;

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::ast::{self, Color, Expr, FuncDef, FuncKind, Ident, Stmt, VarDef};
use crate::builtins::app_exc_name;
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::fqn::Fqn;
use crate::frame::constant_to_object;
use crate::function::FuncRef;
use crate::location::Loc;
use crate::metaarg::MetaArg;
use crate::object::{Env, Object};
use crate::opimpl::{ArgSpec, OpImpl, OpImplKind};
use crate::operators;
use crate::operators::convop;
use crate::symtable::{ScopeKind, SymTable, VarKind, VarStorage};
use crate::types::{PyClass, Type};
use crate::vm::Vm;

/// How static errors discovered during redshift are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    /// Fail on the first static error.
    Eager,
    /// Accumulate warnings; the failing function is replaced by a runtime
    /// raise.
    Lazy,
    /// Alias of lazy with eagerly formatted warnings (the CLI prints them).
    Warn,
}

impl FromStr for ErrorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            "warn" => Ok(Self::Warn),
            other => Err(format!("unknown error mode `{other}`")),
        }
    }
}

/// Redshifts every red `ASTFunc` in the globals until a fixed point.
pub fn redshift_all(vm: &mut Vm, error_mode: ErrorMode) -> SpyResult<()> {
    loop {
        let pending: Vec<(Fqn, FuncRef)> = vm
            .globals_snapshot()
            .into_iter()
            .filter_map(|(fqn, obj)| match obj {
                Object::Func(func) => Some((fqn, func)),
                _ => None,
            })
            .filter(|(_, func)| {
                func.as_ast()
                    .is_some_and(|ast| func.color() != Color::Blue && !ast.redshifted && !ast.invalid.get())
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        for (fqn, func) in pending {
            let span = tracing::debug_span!("redshift", func = %vm.fqns.render(fqn));
            let _guard = span.enter();
            match redshift_func(vm, &func) {
                Ok(twin) => {
                    let ast = func.as_ast().expect("pending functions are AST functions");
                    ast.invalid.set(true);
                    *ast.redshifted_into.borrow_mut() = Some(twin.clone());
                    vm.replace_global(fqn, Object::Func(twin));
                }
                Err(err) => {
                    if error_mode == ErrorMode::Eager {
                        return Err(err);
                    }
                    let stub = raise_stub(vm, &func, &err)?;
                    vm.warnings.push(err);
                    let ast = func.as_ast().expect("pending functions are AST functions");
                    ast.invalid.set(true);
                    *ast.redshifted_into.borrow_mut() = Some(stub.clone());
                    vm.replace_global(fqn, Object::Func(stub));
                }
            }
        }
    }
}

/// Redshifting an already-redshifted function is the identity.
pub fn redshift_func(vm: &mut Vm, func: &FuncRef) -> SpyResult<FuncRef> {
    let ast = func
        .as_ast()
        .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "cannot redshift a builtin function"))?;
    if ast.redshifted {
        return Ok(func.clone());
    }
    let funcdef = Rc::clone(&ast.funcdef);
    let symtable = funcdef
        .symtable
        .clone()
        .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "function body was not scope-analyzed"))?;

    let mut doppler = Doppler {
        symtable,
        module: ast.module,
        restype: func.functype().restype.clone(),
        locals_types: IndexMap::new(),
        declared: AHashSet::new(),
        closure: ast.closure.clone(),
        filename: funcdef.loc.filename.to_string(),
    };
    for param in &func.functype().params {
        doppler.locals_types.insert(param.name.clone(), param.ty.clone());
        doppler.declared.insert(param.name.clone());
    }

    let mut body = Vec::new();
    for stmt in &funcdef.body {
        body.extend(doppler.shift_stmt(vm, stmt)?);
    }

    let twin_def = FuncDef {
        loc: funcdef.loc.clone(),
        prototype_loc: funcdef.prototype_loc.clone(),
        color: Color::Red,
        kind: FuncKind::Plain,
        name: funcdef.name.clone(),
        args: funcdef.args.clone(),
        return_type: funcdef.return_type.clone(),
        body,
        symtable: funcdef.symtable.clone(),
    };
    let twin = FuncRef::new_ast_full(
        func.fqn(),
        func.functype().clone(),
        Rc::new(twin_def),
        ast.module,
        ast.closure.clone(),
        true,
    );
    let twin_ast = twin.as_ast().expect("just built an AST function");
    *twin_ast.locals_types.borrow_mut() = Some(doppler.locals_types);
    Ok(twin)
}

/// Replacement body used in lazy mode when a function failed to redshift:
/// raising the static error is deferred to run time.
fn raise_stub(vm: &mut Vm, func: &FuncRef, err: &SpyError) -> SpyResult<FuncRef> {
    let ast = func.as_ast().expect("stub for an AST function");
    let funcdef = Rc::clone(&ast.funcdef);
    let loc = funcdef.loc.clone();
    let raise_fqn = vm.make_fqn_const(&Object::Func(vm.ops.raise_.clone()))?;
    let call = Expr::Call {
        loc: loc.clone(),
        func: Box::new(Expr::FqnConst {
            loc: loc.clone(),
            fqn: raise_fqn,
        }),
        args: vec![
            Expr::Constant {
                loc: loc.clone(),
                value: ast::Constant::Str(app_exc_name(err.kind).to_owned()),
            },
            Expr::Constant {
                loc: loc.clone(),
                value: ast::Constant::Str(err.message.clone()),
            },
            Expr::Constant {
                loc: loc.clone(),
                value: ast::Constant::Str(loc.filename.to_string()),
            },
            Expr::Constant {
                loc: loc.clone(),
                value: ast::Constant::I32(i32::try_from(loc.line_start).unwrap_or(0)),
            },
        ],
    };
    let twin_def = FuncDef {
        loc: funcdef.loc.clone(),
        prototype_loc: funcdef.prototype_loc.clone(),
        color: Color::Red,
        kind: FuncKind::Plain,
        name: funcdef.name.clone(),
        args: funcdef.args.clone(),
        return_type: funcdef.return_type.clone(),
        body: vec![Stmt::Expr {
            loc: loc.clone(),
            value: call,
        }],
        symtable: funcdef.symtable.clone(),
    };
    Ok(FuncRef::new_ast_full(
        func.fqn(),
        func.functype().clone(),
        Rc::new(twin_def),
        ast.module,
        ast.closure.clone(),
        true,
    ))
}

struct Doppler {
    symtable: Rc<SymTable>,
    module: Fqn,
    restype: Type,
    /// Declared (or inferred) types of the residual locals; recorded on the
    /// twin as `locals_types`.
    locals_types: IndexMap<String, Type>,
    /// Locals that already got their residual `VarDef`.
    declared: AHashSet<String>,
    closure: Vec<Env>,
    filename: String,
}

impl Doppler {
    // ===================================================================
    // statements

    fn shift_stmt(&mut self, vm: &mut Vm, stmt: &Stmt) -> SpyResult<Vec<Stmt>> {
        match stmt {
            Stmt::Pass { loc } => Ok(vec![Stmt::Pass { loc: loc.clone() }]),
            Stmt::Break { loc } => Ok(vec![Stmt::Break { loc: loc.clone() }]),
            Stmt::Continue { loc } => Ok(vec![Stmt::Continue { loc: loc.clone() }]),
            Stmt::Expr { value, loc } => {
                let (ma, rex) = self.shift_expr(vm, value)?;
                if ma.is_blue() {
                    // blue expression statements are side-effect free
                    Ok(vec![])
                } else {
                    Ok(vec![Stmt::Expr {
                        loc: loc.clone(),
                        value: rex,
                    }])
                }
            }
            Stmt::Return { value, loc } => {
                let (ma, rex) = self.shift_expr(vm, value)?;
                let restype = self.restype.clone();
                let rex = self.wrap_conversion(vm, &restype, &ma, rex)?;
                Ok(vec![Stmt::Return {
                    loc: loc.clone(),
                    value: rex,
                }])
            }
            Stmt::VarDef(vardef) => {
                let (ty_ma, _) = self.shift_expr(vm, &vardef.ty)?;
                let ty = ty_ma.blue_type()?;
                self.locals_types.insert(vardef.name.name.clone(), ty.clone());
                self.declared.insert(vardef.name.name.clone());
                Ok(vec![self.residual_vardef(vm, &vardef.name, &ty)?])
            }
            Stmt::Assign { target, value, loc } => {
                let (ma, rex) = self.shift_expr(vm, value)?;
                self.shift_assign(vm, target, loc, &ma, rex)
            }
            Stmt::AssignCell { fqn, value, loc } => {
                let (_, rex) = self.shift_expr(vm, value)?;
                Ok(vec![Stmt::AssignCell {
                    loc: loc.clone(),
                    fqn: *fqn,
                    value: rex,
                }])
            }
            Stmt::UnpackAssign { targets, value, loc } => {
                let (_, rex) = self.shift_expr(vm, value)?;
                let mut out = Vec::new();
                for target in targets {
                    if !self.declared.contains(&target.name) {
                        let ty = vm.b.dynamic.clone();
                        self.locals_types.insert(target.name.clone(), ty.clone());
                        self.declared.insert(target.name.clone());
                        out.push(self.residual_vardef(vm, target, &ty)?);
                    }
                }
                out.push(Stmt::UnpackAssign {
                    loc: loc.clone(),
                    targets: targets.clone(),
                    value: rex,
                });
                Ok(out)
            }
            Stmt::AugAssign { op, target, value, loc } => {
                // desugar to op + assign
                let desugared = Stmt::Assign {
                    loc: loc.clone(),
                    target: target.clone(),
                    value: Expr::BinOp {
                        loc: loc.clone(),
                        op: *op,
                        left: Box::new(Expr::Name {
                            loc: target.loc.clone(),
                            id: target.name.clone(),
                        }),
                        right: Box::new(value.clone()),
                    },
                };
                self.shift_stmt(vm, &desugared)
            }
            Stmt::SetItem {
                target, index, value, loc,
            } => {
                let (t, trex) = self.shift_expr(vm, target)?;
                let (i, irex) = self.shift_expr(vm, index)?;
                let (v, vrex) = self.shift_expr(vm, value)?;
                let opf = vm.ops.setitem.clone();
                let opimpl = vm.call_op(&opf, &[t, i, v])?;
                let (_, rex) = self.apply_shift(vm, &opimpl, &[trex, irex, vrex], loc)?;
                Ok(vec![Stmt::Expr {
                    loc: loc.clone(),
                    value: rex,
                }])
            }
            Stmt::SetAttr {
                target, attr, value, loc,
            } => {
                let (t, trex) = self.shift_expr(vm, target)?;
                let name_ma = vm.blue_arg(Object::from_str(&attr.name), attr.loc.clone());
                let name_rex = Expr::Constant {
                    loc: attr.loc.clone(),
                    value: ast::Constant::Str(attr.name.clone()),
                };
                let (v, vrex) = self.shift_expr(vm, value)?;
                let opf = vm.ops.setattr.clone();
                let opimpl = vm.call_op(&opf, &[t, name_ma, v])?;
                let (_, rex) = self.apply_shift(vm, &opimpl, &[trex, name_rex, vrex], loc)?;
                Ok(vec![Stmt::Expr {
                    loc: loc.clone(),
                    value: rex,
                }])
            }
            Stmt::If {
                test,
                then_body,
                else_body,
                loc,
            } => {
                let test_rex = self.shift_condition(vm, test)?;
                let mut then_res = Vec::new();
                for s in then_body {
                    then_res.extend(self.shift_stmt(vm, s)?);
                }
                let mut else_res = Vec::new();
                for s in else_body {
                    else_res.extend(self.shift_stmt(vm, s)?);
                }
                Ok(vec![Stmt::If {
                    loc: loc.clone(),
                    test: test_rex,
                    then_body: then_res,
                    else_body: else_res,
                }])
            }
            Stmt::While { test, body, loc } => {
                let test_rex = self.shift_condition(vm, test)?;
                let mut body_res = Vec::new();
                for s in body {
                    body_res.extend(self.shift_stmt(vm, s)?);
                }
                Ok(vec![Stmt::While {
                    loc: loc.clone(),
                    test: test_rex,
                    body: body_res,
                }])
            }
            Stmt::For {
                seq,
                target,
                iter,
                body,
                loc,
            } => {
                let (ima, irex) = self.shift_expr(vm, iter)?;
                let elem_ty = self.element_type(vm, ima.static_type());
                let mut out = Vec::new();
                if !self.declared.contains(&target.name) {
                    self.locals_types.insert(target.name.clone(), elem_ty.clone());
                    self.declared.insert(target.name.clone());
                    out.push(self.residual_vardef(vm, target, &elem_ty)?);
                }
                let mut body_res = Vec::new();
                for s in body {
                    body_res.extend(self.shift_stmt(vm, s)?);
                }
                out.push(Stmt::For {
                    loc: loc.clone(),
                    seq: *seq,
                    target: target.clone(),
                    iter: irex,
                    body: body_res,
                });
                Ok(out)
            }
            Stmt::Raise { exc, loc } => {
                let (ma, _) = self.shift_expr(vm, exc)?;
                let (kind, message) = match ma.blue_value() {
                    Some(Object::Exc(exc)) => (exc.kind, exc.message.clone()),
                    Some(Object::Type(ty)) => match vm.b.kind_of_exc_type(ty) {
                        Some(kind) => (kind, String::new()),
                        None => {
                            return Err(SpyError::simple(
                                ErrorKind::TypeError,
                                "can only raise exception values",
                                "this is not an exception",
                                loc.clone(),
                            ));
                        }
                    },
                    _ => {
                        return Err(SpyError::simple(
                            ErrorKind::TypeError,
                            "can only raise blue exception values",
                            "this is not a blue exception",
                            loc.clone(),
                        ));
                    }
                };
                let raise_fqn = vm.make_fqn_const(&Object::Func(vm.ops.raise_.clone()))?;
                let call = Expr::Call {
                    loc: loc.clone(),
                    func: Box::new(Expr::FqnConst {
                        loc: loc.clone(),
                        fqn: raise_fqn,
                    }),
                    args: vec![
                        Expr::Constant {
                            loc: loc.clone(),
                            value: ast::Constant::Str(app_exc_name(kind).to_owned()),
                        },
                        Expr::Constant {
                            loc: loc.clone(),
                            value: ast::Constant::Str(message),
                        },
                        Expr::Constant {
                            loc: loc.clone(),
                            value: ast::Constant::Str(self.filename.clone()),
                        },
                        Expr::Constant {
                            loc: loc.clone(),
                            value: ast::Constant::I32(i32::try_from(loc.line_start).unwrap_or(0)),
                        },
                    ],
                };
                Ok(vec![Stmt::Expr {
                    loc: loc.clone(),
                    value: call,
                }])
            }
            Stmt::Assert { test, msg, loc } => {
                let test_rex = self.shift_condition(vm, test)?;
                let msg_rex = match msg {
                    Some(m) => Some(self.shift_expr(vm, m)?.1),
                    None => None,
                };
                Ok(vec![Stmt::Assert {
                    loc: loc.clone(),
                    test: test_rex,
                    msg: msg_rex,
                }])
            }
            Stmt::FuncDef(fd) => Err(SpyError::simple(
                ErrorKind::StaticError,
                "nested function definitions require a blue context",
                "defined inside a red function",
                fd.prototype_loc.clone(),
            )),
        }
    }

    fn shift_assign(
        &mut self,
        vm: &mut Vm,
        target: &Ident,
        loc: &Loc,
        ma: &MetaArg,
        rex: Expr,
    ) -> SpyResult<Vec<Stmt>> {
        let sym = self.symtable.lookup(&target.name).cloned().ok_or_else(|| {
            SpyError::simple(
                ErrorKind::ScopeError,
                format!("name `{}` is not defined", target.name),
                "assigned here",
                target.loc.clone(),
            )
        })?;

        if sym.defined_in == ScopeKind::Module {
            if sym.varkind != VarKind::Var {
                return Err(SpyError::new(
                    ErrorKind::TypeError,
                    format!("cannot assign to const `{}`", target.name),
                )
                .with(Severity::Error, "this is a const", target.loc.clone())
                .with(Severity::Note, "declared here", sym.loc.clone()));
            }
            let fqn = vm.fqns.join(self.module, &target.name);
            let ty = vm
                .lookup_global_type(fqn)
                .unwrap_or_else(|| vm.b.dynamic.clone());
            let rex = self.wrap_conversion(vm, &ty, ma, rex)?;
            return Ok(vec![Stmt::AssignCell {
                loc: loc.clone(),
                fqn,
                value: rex,
            }]);
        }

        let mut out = Vec::new();
        let ty = match self.locals_types.get(&target.name).cloned() {
            Some(ty) => ty,
            None => {
                let ty = ma.static_type().clone();
                self.locals_types.insert(target.name.clone(), ty.clone());
                ty
            }
        };
        if !self.declared.contains(&target.name) {
            self.declared.insert(target.name.clone());
            out.push(self.residual_vardef(vm, target, &ty)?);
        }
        let rex = self.wrap_conversion(vm, &ty, ma, rex)?;
        out.push(Stmt::Assign {
            loc: loc.clone(),
            target: target.clone(),
            value: rex,
        });
        Ok(out)
    }

    fn residual_vardef(&self, vm: &mut Vm, name: &Ident, ty: &Type) -> SpyResult<Stmt> {
        let ty_fqn = vm.make_fqn_const(&Object::Type(ty.clone()))?;
        Ok(Stmt::VarDef(VarDef {
            loc: name.loc.clone(),
            kind: None,
            name: name.clone(),
            ty: Box::new(Expr::FqnConst {
                loc: name.loc.clone(),
                fqn: ty_fqn,
            }),
        }))
    }

    /// The element type produced by iterating a value of type `ty`.
    fn element_type(&self, vm: &mut Vm, ty: &Type) -> Type {
        match ty.pyclass() {
            PyClass::Range => vm.b.i32.clone(),
            PyClass::Str => vm.b.str_.clone(),
            PyClass::List => {
                let quals = vm.fqns.last_qualifiers(ty.fqn());
                match quals.first().and_then(|&q| vm.lookup_global(q)) {
                    Some(Object::Type(item)) => item,
                    _ => vm.b.dynamic.clone(),
                }
            }
            _ => vm.b.dynamic.clone(),
        }
    }

    fn shift_condition(&mut self, vm: &mut Vm, test: &Expr) -> SpyResult<Expr> {
        let (ma, rex) = self.shift_expr(vm, test)?;
        let bool_ty = vm.b.bool_.clone();
        self.wrap_conversion(vm, &bool_ty, &ma, rex).map_err(|_| {
            let tname = vm.fqns.human(ma.static_type().fqn());
            SpyError::simple(
                ErrorKind::TypeError,
                format!("implicit conversion to `bool` is not implemented for type `{tname}`"),
                format!("this is `{tname}`"),
                test.loc().clone(),
            )
        })
    }

    /// Wraps a residual expression in the conversion call needed to reach
    /// `exp`, if any. Pure conversions of blue values fold immediately.
    fn wrap_conversion(&mut self, vm: &mut Vm, exp: &Type, ma: &MetaArg, rex: Expr) -> SpyResult<Expr> {
        match convop::convert_maybe(vm, exp, ma)? {
            None => Ok(rex),
            Some(conv) => {
                if conv.is_pure() {
                    if let Some(value) = ma.blue_value() {
                        let folded = conv.execute(vm, &[value.clone()])?;
                        return residual_of_blue(vm, &folded, &ma.loc);
                    }
                }
                self.opimpl_to_expr(vm, &conv, &[rex], ma.loc.clone())
            }
        }
    }

    // ===================================================================
    // expressions

    fn shift_expr(&mut self, vm: &mut Vm, expr: &Expr) -> SpyResult<(MetaArg, Expr)> {
        match expr {
            Expr::Auto { loc } => Err(SpyError::simple(
                ErrorKind::PanicError,
                "inferred type placeholder reached the redshifter",
                "here",
                loc.clone(),
            )),
            Expr::Constant { value, loc } => {
                let obj = constant_to_object(value);
                let ma = vm.blue_arg(obj, loc.clone());
                Ok((ma, expr.clone()))
            }
            Expr::FqnConst { fqn, loc } => {
                let value = vm.lookup_global(*fqn).ok_or_else(|| {
                    let name = vm.fqns.render(*fqn);
                    SpyError::simple(
                        ErrorKind::ScopeError,
                        format!("unknown global `{name}`"),
                        "referenced here",
                        loc.clone(),
                    )
                })?;
                Ok((vm.blue_arg(value, loc.clone()), expr.clone()))
            }
            Expr::NameCell { fqn, loc } => {
                let ty = vm
                    .lookup_global_type(*fqn)
                    .unwrap_or_else(|| vm.b.dynamic.clone());
                Ok((vm.red_arg(ty, None, loc.clone()), expr.clone()))
            }
            Expr::Name { id, loc } | Expr::NameLocal { id, loc } => self.shift_name(vm, id, loc),
            Expr::BinOp { op, left, right, loc } => {
                let (l, lrex) = self.shift_expr(vm, left)?;
                let (r, rrex) = self.shift_expr(vm, right)?;
                let opf = vm.ops.binop(*op).clone();
                let opimpl = vm.call_op(&opf, &[l, r])?;
                self.apply_shift(vm, &opimpl, &[lrex, rrex], loc)
            }
            Expr::CmpOp { op, left, right, loc } => {
                let (l, lrex) = self.shift_expr(vm, left)?;
                let (r, rrex) = self.shift_expr(vm, right)?;
                let opf = vm.ops.cmpop(*op).clone();
                let opimpl = vm.call_op(&opf, &[l, r])?;
                self.apply_shift(vm, &opimpl, &[lrex, rrex], loc)
            }
            Expr::UnaryOp { op, value, loc } => {
                let (v, vrex) = self.shift_expr(vm, value)?;
                let opimpl = match op {
                    ast::UnaryOp::Neg => {
                        let opf = vm.ops.neg.clone();
                        vm.call_op(&opf, &[v])?
                    }
                    ast::UnaryOp::Not => Rc::new(operators::build_not(vm, &v)?),
                };
                self.apply_shift(vm, &opimpl, &[vrex], loc)
            }
            Expr::Call { func, args, loc } => {
                let (callee, _callee_rex) = self.shift_expr(vm, func)?;
                let mut arg_mas = Vec::with_capacity(args.len());
                let mut arg_rexs = Vec::with_capacity(args.len());
                for arg in args {
                    let (ma, rex) = self.shift_expr(vm, arg)?;
                    arg_mas.push(ma);
                    arg_rexs.push(rex);
                }
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(callee);
                all.extend(arg_mas);
                let opf = vm.ops.call.clone();
                let opimpl = vm.call_op(&opf, &all)?;
                self.apply_shift(vm, &opimpl, &arg_rexs, loc)
            }
            Expr::GetItem { value, index, loc } => {
                let (v, vrex) = self.shift_expr(vm, value)?;
                let (i, irex) = self.shift_expr(vm, index)?;
                let opf = vm.ops.getitem.clone();
                let opimpl = vm.call_op(&opf, &[v, i])?;
                self.apply_shift(vm, &opimpl, &[vrex, irex], loc)
            }
            Expr::GetAttr { value, attr, loc } => {
                let (v, vrex) = self.shift_expr(vm, value)?;
                let name_ma = vm.blue_arg(Object::from_str(&attr.name), attr.loc.clone());
                let name_rex = Expr::Constant {
                    loc: attr.loc.clone(),
                    value: ast::Constant::Str(attr.name.clone()),
                };
                let opf = vm.ops.getattr.clone();
                let opimpl = vm.call_op(&opf, &[v, name_ma])?;
                self.apply_shift(vm, &opimpl, &[vrex, name_rex], loc)
            }
            Expr::Tuple { items, loc } => {
                let mut mas = Vec::with_capacity(items.len());
                let mut rexs = Vec::with_capacity(items.len());
                for item in items {
                    let (ma, rex) = self.shift_expr(vm, item)?;
                    mas.push(ma);
                    rexs.push(rex);
                }
                let rex = Expr::Tuple {
                    loc: loc.clone(),
                    items: rexs,
                };
                if mas.iter().all(MetaArg::is_blue) {
                    let values: Vec<Object> = mas
                        .iter()
                        .map(|ma| ma.blue_value().expect("all blue").clone())
                        .collect();
                    let obj = Object::Tuple(Rc::new(values));
                    Ok((vm.blue_arg(obj, loc.clone()), rex))
                } else {
                    let ty = vm.b.tuple.clone();
                    Ok((vm.red_arg(ty, None, loc.clone()), rex))
                }
            }
            Expr::List { items, loc } => {
                let mut mas = Vec::with_capacity(items.len());
                let mut rexs = Vec::with_capacity(items.len());
                for item in items {
                    let (ma, rex) = self.shift_expr(vm, item)?;
                    mas.push(ma);
                    rexs.push(rex);
                }
                let item_ty = match mas.split_first() {
                    None => vm.b.dynamic.clone(),
                    Some((first, rest)) => {
                        let mut ty = first.static_type().clone();
                        for ma in rest {
                            ty = vm.union_type(&ty, ma.static_type());
                        }
                        ty
                    }
                };
                let list_ty = vm.make_list_type(&item_ty)?;
                let rex = Expr::List {
                    loc: loc.clone(),
                    items: rexs,
                };
                Ok((vm.red_arg(list_ty, None, loc.clone()), rex))
            }
        }
    }

    fn shift_name(&mut self, vm: &mut Vm, id: &str, loc: &Loc) -> SpyResult<(MetaArg, Expr)> {
        let sym = self.symtable.lookup(id).cloned().ok_or_else(|| {
            SpyError::simple(
                ErrorKind::ScopeError,
                format!("name `{id}` is not defined"),
                "not found",
                loc.clone(),
            )
        })?;
        if sym.storage == VarStorage::Unresolved {
            return Err(SpyError::simple(
                ErrorKind::ScopeError,
                format!("name `{id}` is not defined"),
                "not found in any enclosing scope",
                loc.clone(),
            ));
        }

        if let Some(impref) = &sym.impref {
            let value = vm
                .lookup_import_ref(&impref.modname, impref.attr.as_deref())
                .ok_or_else(|| {
                    SpyError::simple(
                        ErrorKind::ImportError,
                        format!("cannot import `{}`", impref.spy_name()),
                        "imported here",
                        sym.loc.clone(),
                    )
                })?;
            return self.blue_result(vm, value, loc);
        }

        match sym.defined_in {
            ScopeKind::Builtins => {
                let value = vm.lookup_import_ref("builtins", Some(id)).ok_or_else(|| {
                    SpyError::simple(
                        ErrorKind::ScopeError,
                        format!("unknown builtin `{id}`"),
                        "referenced here",
                        loc.clone(),
                    )
                })?;
                self.blue_result(vm, value, loc)
            }
            ScopeKind::Module => {
                let fqn = vm.fqns.join(self.module, id);
                let ty = vm
                    .lookup_global_type(fqn)
                    .ok_or_else(|| {
                        SpyError::simple(
                            ErrorKind::ScopeError,
                            format!("name `{id}` is not yet defined"),
                            "referenced here",
                            loc.clone(),
                        )
                    })?;
                match sym.varkind {
                    VarKind::Const => {
                        let value = vm.lookup_global(fqn).expect("typed global must exist");
                        self.blue_result(vm, value, loc)
                    }
                    VarKind::Var => Ok((
                        vm.red_arg(ty, None, loc.clone()).with_sym(id),
                        Expr::NameCell {
                            loc: loc.clone(),
                            fqn,
                        },
                    )),
                }
            }
            ScopeKind::Function => {
                if sym.level == 0 {
                    let ty = self.locals_types.get(id).cloned().ok_or_else(|| {
                        SpyError::simple(
                            ErrorKind::StaticError,
                            format!("local variable `{id}` referenced before assignment"),
                            "referenced here",
                            loc.clone(),
                        )
                    })?;
                    Ok((
                        vm.red_arg(ty, None, loc.clone()).with_sym(id),
                        Expr::NameLocal {
                            loc: loc.clone(),
                            id: id.to_owned(),
                        },
                    ))
                } else {
                    for env in self.closure.iter().rev() {
                        let found = env.borrow().get(id).cloned();
                        if let Some(value) = found {
                            return self.blue_result(vm, value, loc);
                        }
                    }
                    Err(SpyError::simple(
                        ErrorKind::ScopeError,
                        format!("captured variable `{id}` is not bound"),
                        "referenced here",
                        loc.clone(),
                    ))
                }
            }
        }
    }

    fn blue_result(&mut self, vm: &mut Vm, value: Object, loc: &Loc) -> SpyResult<(MetaArg, Expr)> {
        let rex = residual_of_blue(vm, &value, loc)?;
        Ok((vm.blue_arg(value, loc.clone()), rex))
    }

    /// Residualizes the application of a typechecked opimpl: constants fold,
    /// calls become direct FQN calls with explicit conversions.
    fn apply_shift(
        &mut self,
        vm: &mut Vm,
        opimpl: &OpImpl,
        residuals: &[Expr],
        loc: &Loc,
    ) -> SpyResult<(MetaArg, Expr)> {
        if let Some(value) = opimpl.const_value() {
            let rex = residual_of_blue(vm, value, loc)?;
            let ma = vm.blue_arg_typed(opimpl.functype.restype.clone(), value.clone(), loc.clone());
            return Ok((ma, rex));
        }
        let rex = self.opimpl_to_expr(vm, opimpl, residuals, loc.clone())?;
        let restype = opimpl.functype.restype.clone();
        Ok((vm.red_arg(restype, None, loc.clone()), rex))
    }

    fn opimpl_to_expr(&mut self, vm: &mut Vm, opimpl: &OpImpl, residuals: &[Expr], loc: Loc) -> SpyResult<Expr> {
        match &opimpl.kind {
            OpImplKind::Const(value) => residual_of_blue(vm, value, &loc),
            OpImplKind::Call { func, args } => {
                let fqn = vm.make_fqn_const(&Object::Func(func.clone()))?;
                let mut call_args = Vec::with_capacity(args.len());
                for spec in args {
                    call_args.push(self.argspec_to_expr(vm, spec, residuals, &loc)?);
                }
                Ok(Expr::Call {
                    loc: loc.clone(),
                    func: Box::new(Expr::FqnConst { loc, fqn }),
                    args: call_args,
                })
            }
        }
    }

    fn argspec_to_expr(&mut self, vm: &mut Vm, spec: &ArgSpec, residuals: &[Expr], loc: &Loc) -> SpyResult<Expr> {
        match spec {
            ArgSpec::Arg(i) => Ok(residuals[*i].clone()),
            ArgSpec::Const { value, loc } => residual_of_blue(vm, value, loc),
            ArgSpec::Convert { conv, arg, .. } => {
                let inner = self.argspec_to_expr(vm, arg, residuals, loc)?;
                self.opimpl_to_expr(vm, conv, &[inner], loc.clone())
            }
        }
    }
}

/// Residual form of a blue value: a literal for primitives, an FQN
/// reference for values with identity.
fn residual_of_blue(vm: &mut Vm, value: &Object, loc: &Loc) -> SpyResult<Expr> {
    let constant = match value {
        Object::None => Some(ast::Constant::None),
        Object::Bool(b) => Some(ast::Constant::Bool(*b)),
        Object::I32(v) => Some(ast::Constant::I32(*v)),
        Object::F64(v) => Some(ast::Constant::F64(*v)),
        Object::Str(s) => Some(ast::Constant::Str(s.to_string())),
        _ => None,
    };
    if let Some(value) = constant {
        return Ok(Expr::Constant {
            loc: loc.clone(),
            value,
        });
    }
    match value {
        Object::Func(_) | Object::Type(_) | Object::Module(_) => {
            let fqn = vm.make_fqn_const(value)?;
            Ok(Expr::FqnConst {
                loc: loc.clone(),
                fqn,
            })
        }
        Object::Tuple(items) => {
            let mut rexs = Vec::with_capacity(items.len());
            for item in items.iter() {
                rexs.push(residual_of_blue(vm, item, loc)?);
            }
            Ok(Expr::Tuple {
                loc: loc.clone(),
                items: rexs,
            })
        }
        other => {
            let repr = other.repr(&vm.fqns);
            Err(SpyError::new(
                ErrorKind::PanicError,
                format!("cannot residualize blue value {repr}"),
            ))
        }
    }
}
