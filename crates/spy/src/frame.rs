//! The AST frame evaluator.
//!
//! A frame evaluates one function or module body. Statements execute in
//! program order; control flow uses structured recursion plus explicit
//! [`Flow`] signals. Every expression evaluates to a [`MetaArg`] carrying
//! its color, static type and (during interpretation) its concrete value;
//! operator applications go through the dispatch protocol in
//! [`crate::operators`].

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{self, Color, Constant, Expr, FuncDef, Stmt};
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::fqn::Fqn;
use crate::function::{FuncParam, FuncRef, FuncType};
use crate::location::Loc;
use crate::metaarg::MetaArg;
use crate::module::ModuleRef;
use crate::object::{Env, Object};
use crate::opimpl::OpImpl;
use crate::operators;
use crate::operators::convop;
use crate::symtable::{ScopeKind, SymTable, VarKind, VarStorage};
use crate::types::{PyClass, Type};
use crate::vm::Vm;

/// Control-flow signal produced by statement execution.
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Object),
}

pub(crate) struct Frame {
    symtable: Rc<SymTable>,
    /// FQN of the module this frame's code belongs to.
    module: Fqn,
    /// Namespace under which nested function definitions get their FQNs.
    namespace: Fqn,
    /// Declared result type; `Return` converts into it.
    restype: Type,
    locals: Env,
    locals_types: IndexMap<String, Type>,
    closure: Vec<Env>,
}

/// Runs a compiled SPy function with already-typechecked arguments.
pub(crate) fn call_ast(vm: &mut Vm, func: &FuncRef, args: &[Object]) -> SpyResult<Object> {
    let ast = func.as_ast().expect("call_ast on a builtin");
    let funcdef = Rc::clone(&ast.funcdef);
    let symtable = funcdef
        .symtable
        .clone()
        .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "function body was not scope-analyzed"))?;

    // blue calls with type arguments establish a qualified namespace, so
    // nested definitions get FQNs like `test::add[i32]::impl`
    let mut namespace = func.fqn();
    if func.color() == Color::Blue && !args.is_empty() {
        let type_quals: Vec<Fqn> = args.iter().filter_map(|a| a.as_type().map(Type::fqn)).collect();
        if type_quals.len() == args.len() {
            namespace = vm.fqns.with_qualifiers(namespace, &type_quals);
        }
    }

    let mut frame = Frame {
        symtable,
        module: ast.module,
        namespace,
        restype: func.functype().restype.clone(),
        locals: Rc::new(RefCell::new(IndexMap::new())),
        locals_types: IndexMap::new(),
        closure: ast.closure.clone(),
    };
    for (param, value) in func.functype().params.iter().zip(args) {
        frame.locals_types.insert(param.name.clone(), param.ty.clone());
        frame.locals.borrow_mut().insert(param.name.clone(), value.clone());
    }

    match frame.exec_body(vm, &funcdef.body)? {
        Flow::Return(value) => Ok(value),
        Flow::Normal => {
            let restype = &frame.restype;
            if restype.pyclass() == PyClass::NoneType || restype.pyclass() == PyClass::Dynamic {
                Ok(Object::None)
            } else {
                let name = vm.fqns.human(func.fqn());
                Err(SpyError::simple(
                    ErrorKind::TypeError,
                    format!("reached the end of `{name}` without a `return`"),
                    "the function ends here",
                    funcdef.loc.clone(),
                ))
            }
        }
        Flow::Break | Flow::Continue => Err(SpyError::new(
            ErrorKind::PanicError,
            "break/continue escaped the enclosing loop",
        )),
    }
}

/// Runs a module body: executes the declarations in source order, creating
/// the module's globals.
pub(crate) fn exec_module_body(vm: &mut Vm, module_ast: &ast::Module, module: &ModuleRef) -> SpyResult<()> {
    let symtable = module_ast
        .symtable
        .clone()
        .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "module was not scope-analyzed"))?;
    let module_fqn = module.fqn();
    let mut frame = Frame {
        symtable: Rc::clone(&symtable),
        module: module_fqn,
        namespace: module_fqn,
        restype: vm.b.nonetype.clone(),
        locals: Rc::new(RefCell::new(IndexMap::new())),
        locals_types: IndexMap::new(),
        closure: Vec::new(),
    };

    for decl in &module_ast.decls {
        match decl {
            ast::Decl::Import(_) => {}
            ast::Decl::FuncDef(fd) => {
                let func = frame.make_ast_func(vm, fd)?;
                let fqn = func.fqn();
                let func_ty = vm.b.func.clone();
                vm.add_global(fqn, Some(func_ty), Object::Func(func))?;
                module.add(&fd.name, fqn, VarKind::Const);
            }
            ast::Decl::GlobalVarDef(gvd) => {
                let name = &gvd.vardef.name.name;
                let value_ma = frame.eval(vm, &gvd.value)?;
                let ty = match &*gvd.vardef.ty {
                    Expr::Auto { .. } => value_ma.static_type().clone(),
                    ty_expr => frame.eval_type(vm, ty_expr)?,
                };
                let value = convert_value(vm, &ty, &value_ma)?;
                let varkind = symtable.lookup(name).map_or(VarKind::Const, |s| s.varkind);
                let fqn = vm.fqns.join(module_fqn, name);
                vm.add_global(fqn, Some(ty), value)?;
                module.add(name, fqn, varkind);
            }
        }
    }
    Ok(())
}

/// Converts a value to the expected type, executing the implicit conversion
/// if one is needed.
pub(crate) fn convert_value(vm: &mut Vm, exp: &Type, ma: &MetaArg) -> SpyResult<Object> {
    let value = ma
        .value()
        .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "evaluating an abstract MetaArg"))?
        .clone();
    match convop::convert_maybe(vm, exp, ma)? {
        None => Ok(value),
        Some(conv) => conv.execute(vm, &[value]),
    }
}

impl Frame {
    fn exec_body(&mut self, vm: &mut Vm, body: &[Stmt]) -> SpyResult<Flow> {
        for stmt in body {
            match self.exec_stmt(vm, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, vm: &mut Vm, stmt: &Stmt) -> SpyResult<Flow> {
        match stmt {
            Stmt::Pass { .. } => Ok(Flow::Normal),
            Stmt::Expr { value, .. } => {
                self.eval(vm, value)?;
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let ma = self.eval(vm, value)?;
                let restype = self.restype.clone();
                let converted = convert_value(vm, &restype, &ma)?;
                Ok(Flow::Return(converted))
            }
            Stmt::FuncDef(fd) => {
                let func = self.make_ast_func(vm, fd)?;
                self.locals_types.insert(fd.name.clone(), vm.b.func.clone());
                self.locals.borrow_mut().insert(fd.name.clone(), Object::Func(func));
                Ok(Flow::Normal)
            }
            Stmt::VarDef(vardef) => {
                let ty = self.eval_type(vm, &vardef.ty)?;
                self.locals_types.insert(vardef.name.name.clone(), ty);
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value, .. } => {
                let ma = self.eval(vm, value)?;
                self.assign(vm, &target.name, &target.loc, &ma)?;
                Ok(Flow::Normal)
            }
            Stmt::AssignCell { fqn, value, .. } => {
                let ma = self.eval(vm, value)?;
                let ty = vm
                    .lookup_global_type(*fqn)
                    .unwrap_or_else(|| vm.b.dynamic.clone());
                let converted = convert_value(vm, &ty, &ma)?;
                vm.store_global(*fqn, converted)?;
                Ok(Flow::Normal)
            }
            Stmt::UnpackAssign { targets, value, loc } => {
                let ma = self.eval(vm, value)?;
                let Some(Object::Tuple(items)) = ma.value() else {
                    return Err(SpyError::simple(
                        ErrorKind::TypeError,
                        "cannot unpack a non-tuple value",
                        "expected a tuple",
                        loc.clone(),
                    ));
                };
                let items = Rc::clone(items);
                if items.len() != targets.len() {
                    return Err(SpyError::simple(
                        ErrorKind::ValueError,
                        format!("expected {} values to unpack, got {}", targets.len(), items.len()),
                        "while unpacking here",
                        loc.clone(),
                    ));
                }
                for (target, item) in targets.iter().zip(items.iter()) {
                    let item_ma = vm.blue_arg(item.clone(), target.loc.clone());
                    self.assign(vm, &target.name, &target.loc, &item_ma.as_red())?;
                }
                Ok(Flow::Normal)
            }
            Stmt::AugAssign { op, target, value, loc } => {
                let sym = self.symtable.lookup(&target.name).cloned();
                if let Some(sym) = &sym {
                    if sym.varkind != VarKind::Var {
                        return Err(SpyError::new(
                            ErrorKind::TypeError,
                            format!("cannot modify const `{}`", target.name),
                        )
                        .with(Severity::Error, "this is a const", target.loc.clone())
                        .with(Severity::Note, "declared here", sym.loc.clone()));
                    }
                }
                let lhs = self.eval(
                    vm,
                    &Expr::Name {
                        loc: target.loc.clone(),
                        id: target.name.clone(),
                    },
                )?;
                let rhs = self.eval(vm, value)?;
                let opf = vm.ops.binop(*op).clone();
                let opimpl = vm.call_op(&opf, &[lhs.clone(), rhs.clone()])?;
                let result = self.apply(vm, &opimpl, &[&lhs, &rhs], loc)?;
                self.assign(vm, &target.name, &target.loc, &result)?;
                Ok(Flow::Normal)
            }
            Stmt::SetItem {
                target, index, value, loc, ..
            } => {
                let t = self.eval(vm, target)?;
                let i = self.eval(vm, index)?;
                let v = self.eval(vm, value)?;
                let opf = vm.ops.setitem.clone();
                let opimpl = vm.call_op(&opf, &[t.clone(), i.clone(), v.clone()])?;
                self.apply(vm, &opimpl, &[&t, &i, &v], loc)?;
                Ok(Flow::Normal)
            }
            Stmt::SetAttr {
                target, attr, value, loc, ..
            } => {
                let t = self.eval(vm, target)?;
                let name_ma = vm.blue_arg(Object::from_str(&attr.name), attr.loc.clone());
                let v = self.eval(vm, value)?;
                let opf = vm.ops.setattr.clone();
                let opimpl = vm.call_op(&opf, &[t.clone(), name_ma.clone(), v.clone()])?;
                self.apply(vm, &opimpl, &[&t, &name_ma, &v], loc)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                then_body,
                else_body,
                ..
            } => {
                if self.eval_bool(vm, test)? {
                    self.exec_body(vm, then_body)
                } else {
                    self.exec_body(vm, else_body)
                }
            }
            Stmt::While { test, body, .. } => {
                while self.eval_bool(vm, test)? {
                    match self.exec_body(vm, body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                target, iter, body, loc, ..
            } => {
                let iter_ma = self.eval(vm, iter)?;
                let items = self.iterate(vm, &iter_ma, loc)?;
                for item in items {
                    let ty = vm.dynamic_type(&item);
                    let serial = vm.next_serial();
                    let item_ma = MetaArg::red(serial, ty, Some(item), target.loc.clone());
                    self.assign(vm, &target.name, &target.loc, &item_ma)?;
                    match self.exec_body(vm, body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Raise { exc, loc } => {
                let ma = self.eval(vm, exc)?;
                Err(raise_from_value(vm, &ma, loc))
            }
            Stmt::Assert { test, msg, .. } => {
                let ok = self.eval_bool(vm, test)?;
                if vm.runtime_assert && !ok {
                    let message = match msg {
                        Some(m) => {
                            let ma = self.eval(vm, m)?;
                            ma.value().map_or_else(|| "assertion failed".to_owned(), |v| vm.str_w(v))
                        }
                        None => "assertion failed".to_owned(),
                    };
                    return Err(SpyError::simple(
                        ErrorKind::PanicError,
                        message,
                        "assertion failed here",
                        test.loc().clone(),
                    ));
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn iterate(&mut self, vm: &mut Vm, iter_ma: &MetaArg, loc: &Loc) -> SpyResult<Vec<Object>> {
        let value = iter_ma
            .value()
            .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "iterating an abstract MetaArg"))?;
        match value {
            Object::Range(r) => Ok((r.start..r.stop).map(Object::I32).collect()),
            Object::List(l) => Ok(l.0.items.borrow().clone()),
            Object::Tuple(items) => Ok(items.to_vec()),
            Object::Str(s) => Ok(s.chars().map(|c| Object::from_str(&c.to_string())).collect()),
            other => {
                let ty = vm.dynamic_type(other);
                let tname = vm.fqns.human(ty.fqn());
                Err(SpyError::simple(
                    ErrorKind::TypeError,
                    format!("`{tname}` is not iterable"),
                    format!("this is `{tname}`"),
                    loc.clone(),
                ))
            }
        }
    }

    /// Creates an `ASTFunc` for a (possibly nested) function definition,
    /// evaluating parameter and result annotations in the current frame.
    fn make_ast_func(&mut self, vm: &mut Vm, fd: &FuncDef) -> SpyResult<FuncRef> {
        let mut params = Vec::with_capacity(fd.args.len());
        for arg in &fd.args {
            let ty = self.eval_type(vm, &arg.ty)?;
            params.push(FuncParam {
                name: arg.name.clone(),
                ty,
            });
        }
        let restype = self.eval_type(vm, &fd.return_type)?;
        let mut functype = FuncType::new(params, restype, fd.color);
        functype.kind = fd.kind;

        let fqn = vm.fresh_global_fqn(self.namespace, &fd.name);
        let mut closure = self.closure.clone();
        closure.push(Rc::clone(&self.locals));
        Ok(FuncRef::new_ast(fqn, functype, Rc::new(fd.clone()), self.module, closure))
    }

    fn assign(&mut self, vm: &mut Vm, name: &str, loc: &Loc, ma: &MetaArg) -> SpyResult<()> {
        let sym = self
            .symtable
            .lookup(name)
            .cloned()
            .ok_or_else(|| SpyError::simple(ErrorKind::ScopeError, format!("name `{name}` is not defined"), "assigned here", loc.clone()))?;

        if sym.defined_in == ScopeKind::Module && self.symtable.kind != ScopeKind::Module {
            // store into a module-level global
            if sym.varkind != VarKind::Var {
                return Err(SpyError::new(ErrorKind::TypeError, format!("cannot assign to const `{name}`"))
                    .with(Severity::Error, "this is a const", loc.clone())
                    .with(Severity::Note, "declared here", sym.loc.clone()));
            }
            let fqn = vm.fqns.join(self.module, name);
            let ty = vm
                .lookup_global_type(fqn)
                .unwrap_or_else(|| vm.b.dynamic.clone());
            let converted = convert_value(vm, &ty, ma)?;
            vm.store_global(fqn, converted)?;
            return Ok(());
        }

        let already_bound = self.locals.borrow().contains_key(name);
        if already_bound && sym.varkind == VarKind::Const && self.symtable.color == Color::Red {
            return Err(SpyError::new(ErrorKind::TypeError, format!("cannot assign to const `{name}`"))
                .with(Severity::Error, "this is a const", loc.clone())
                .with(Severity::Note, "declared here", sym.loc.clone()));
        }

        let value = match self.locals_types.get(name).cloned() {
            Some(ty) => convert_value(vm, &ty, ma)?,
            None => {
                self.locals_types.insert(name.to_owned(), ma.static_type().clone());
                ma.value()
                    .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "assigning an abstract MetaArg"))?
                    .clone()
            }
        };
        self.locals.borrow_mut().insert(name.to_owned(), value);
        Ok(())
    }

    fn eval_bool(&mut self, vm: &mut Vm, test: &Expr) -> SpyResult<bool> {
        let ma = self.eval(vm, test)?;
        let bool_ty = vm.b.bool_.clone();
        let value = convert_value(vm, &bool_ty, &ma).map_err(|_| {
            let tname = vm.fqns.human(ma.static_type().fqn());
            SpyError::simple(
                ErrorKind::TypeError,
                format!("implicit conversion to `bool` is not implemented for type `{tname}`"),
                format!("this is `{tname}`"),
                test.loc().clone(),
            )
        })?;
        vm.unwrap_bool(&value)
    }

    pub(crate) fn eval_type(&mut self, vm: &mut Vm, expr: &Expr) -> SpyResult<Type> {
        if let Expr::Constant {
            value: Constant::None, ..
        } = expr
        {
            return Ok(vm.b.nonetype.clone());
        }
        let ma = self.eval(vm, expr)?;
        match ma.blue_value() {
            Some(Object::Type(ty)) => Ok(ty.clone()),
            Some(Object::None) => Ok(vm.b.nonetype.clone()),
            _ => Err(SpyError::simple(
                ErrorKind::TypeError,
                "expected a type",
                "this is not a type",
                expr.loc().clone(),
            )),
        }
    }

    /// Executes a typechecked opimpl against the operand values and wraps
    /// the result into a fresh `MetaArg`.
    fn apply(&mut self, vm: &mut Vm, opimpl: &OpImpl, args: &[&MetaArg], loc: &Loc) -> SpyResult<MetaArg> {
        if let Some(value) = opimpl.const_value() {
            return Ok(vm.blue_arg_typed(opimpl.functype.restype.clone(), value.clone(), loc.clone()));
        }
        let mut values = Vec::with_capacity(args.len());
        for ma in args {
            values.push(
                ma.value()
                    .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "executing an abstract MetaArg"))?
                    .clone(),
            );
        }
        let result = opimpl.execute(vm, &values)?;
        let restype = opimpl.functype.restype.clone();
        Ok(vm.red_arg(restype, Some(result), loc.clone()))
    }

    pub(crate) fn eval(&mut self, vm: &mut Vm, expr: &Expr) -> SpyResult<MetaArg> {
        match expr {
            Expr::Auto { loc } => Err(SpyError::simple(
                ErrorKind::PanicError,
                "inferred type placeholder reached the evaluator",
                "here",
                loc.clone(),
            )),
            Expr::Constant { value, loc } => {
                let obj = constant_to_object(value);
                Ok(vm.blue_arg(obj, loc.clone()))
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
                Ok(vm.blue_arg(value, loc.clone()))
            }
            Expr::Name { id, loc } | Expr::NameLocal { id, loc } => self.eval_name(vm, id, loc),
            Expr::NameCell { fqn, loc } => {
                let value = vm.lookup_global(*fqn).ok_or_else(|| {
                    let name = vm.fqns.render(*fqn);
                    SpyError::simple(
                        ErrorKind::ScopeError,
                        format!("unknown global `{name}`"),
                        "referenced here",
                        loc.clone(),
                    )
                })?;
                let ty = vm
                    .lookup_global_type(*fqn)
                    .unwrap_or_else(|| vm.b.dynamic.clone());
                Ok(vm.red_arg(ty, Some(value), loc.clone()))
            }
            Expr::BinOp { op, left, right, loc } => {
                let l = self.eval(vm, left)?;
                let r = self.eval(vm, right)?;
                let opf = vm.ops.binop(*op).clone();
                let opimpl = vm.call_op(&opf, &[l.clone(), r.clone()])?;
                self.apply(vm, &opimpl, &[&l, &r], loc)
            }
            Expr::CmpOp { op, left, right, loc } => {
                let l = self.eval(vm, left)?;
                let r = self.eval(vm, right)?;
                let opf = vm.ops.cmpop(*op).clone();
                let opimpl = vm.call_op(&opf, &[l.clone(), r.clone()])?;
                self.apply(vm, &opimpl, &[&l, &r], loc)
            }
            Expr::UnaryOp { op, value, loc } => {
                let v = self.eval(vm, value)?;
                match op {
                    ast::UnaryOp::Neg => {
                        let opf = vm.ops.neg.clone();
                        let opimpl = vm.call_op(&opf, &[v.clone()])?;
                        self.apply(vm, &opimpl, &[&v], loc)
                    }
                    ast::UnaryOp::Not => {
                        let opimpl = operators::build_not(vm, &v)?;
                        self.apply(vm, &opimpl, &[&v], loc)
                    }
                }
            }
            Expr::Call { func, args, loc } => {
                let callee = self.eval(vm, func)?;
                let mut arg_mas = Vec::with_capacity(args.len());
                for arg in args {
                    arg_mas.push(self.eval(vm, arg)?);
                }
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(callee);
                all.extend(arg_mas.iter().cloned());
                let opf = vm.ops.call.clone();
                let opimpl = vm.call_op(&opf, &all)?;
                let arg_refs: Vec<&MetaArg> = arg_mas.iter().collect();
                self.apply(vm, &opimpl, &arg_refs, loc)
            }
            Expr::GetItem { value, index, loc } => {
                let v = self.eval(vm, value)?;
                let i = self.eval(vm, index)?;
                let opf = vm.ops.getitem.clone();
                let opimpl = vm.call_op(&opf, &[v.clone(), i.clone()])?;
                self.apply(vm, &opimpl, &[&v, &i], loc)
            }
            Expr::GetAttr { value, attr, loc } => {
                let v = self.eval(vm, value)?;
                let name_ma = vm.blue_arg(Object::from_str(&attr.name), attr.loc.clone());
                let opf = vm.ops.getattr.clone();
                let opimpl = vm.call_op(&opf, &[v.clone(), name_ma.clone()])?;
                self.apply(vm, &opimpl, &[&v, &name_ma], loc)
            }
            Expr::Tuple { items, loc } => {
                let mut mas = Vec::with_capacity(items.len());
                for item in items {
                    mas.push(self.eval(vm, item)?);
                }
                let mut values = Vec::with_capacity(mas.len());
                for ma in &mas {
                    values.push(
                        ma.value()
                            .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "tuple of abstract MetaArgs"))?
                            .clone(),
                    );
                }
                let obj = Object::Tuple(Rc::new(values));
                if mas.iter().all(MetaArg::is_blue) {
                    Ok(vm.blue_arg(obj, loc.clone()))
                } else {
                    let ty = vm.b.tuple.clone();
                    Ok(vm.red_arg(ty, Some(obj), loc.clone()))
                }
            }
            Expr::List { items, loc } => {
                let mut mas = Vec::with_capacity(items.len());
                for item in items {
                    mas.push(self.eval(vm, item)?);
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
                let mut values = Vec::with_capacity(mas.len());
                for ma in &mas {
                    values.push(
                        ma.value()
                            .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "list of abstract MetaArgs"))?
                            .clone(),
                    );
                }
                let obj = Object::List(crate::object::ListRef::new(list_ty.clone(), values));
                Ok(vm.red_arg(list_ty, Some(obj), loc.clone()))
            }
        }
    }

    fn eval_name(&mut self, vm: &mut Vm, id: &str, loc: &Loc) -> SpyResult<MetaArg> {
        let sym = self
            .symtable
            .lookup(id)
            .cloned()
            .ok_or_else(|| SpyError::simple(ErrorKind::ScopeError, format!("name `{id}` is not defined"), "not found", loc.clone()))?;
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
            return Ok(vm.blue_arg(value, loc.clone()).with_sym(id));
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
                Ok(vm.blue_arg(value, loc.clone()).with_sym(id))
            }
            ScopeKind::Module => self.eval_module_name(vm, id, &sym.varkind, loc),
            ScopeKind::Function => {
                if sym.level == 0 {
                    let value = self.locals.borrow().get(id).cloned();
                    let value = value.ok_or_else(|| {
                        SpyError::simple(
                            ErrorKind::ScopeError,
                            format!("local variable `{id}` referenced before assignment"),
                            "referenced here",
                            loc.clone(),
                        )
                    })?;
                    let ty = self
                        .locals_types
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| vm.dynamic_type(&value));
                    let ma = if sym.varkind == VarKind::Const {
                        vm.blue_arg_typed(ty, value, loc.clone())
                    } else {
                        vm.red_arg(ty, Some(value), loc.clone())
                    };
                    Ok(ma.with_sym(id))
                } else {
                    // captured from an enclosing function frame; shadowing
                    // is an error, so a name lookup is unambiguous
                    for env in self.closure.iter().rev() {
                        if let Some(value) = env.borrow().get(id).cloned() {
                            return Ok(vm.blue_arg(value, loc.clone()).with_sym(id));
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

    fn eval_module_name(&mut self, vm: &mut Vm, id: &str, varkind: &VarKind, loc: &Loc) -> SpyResult<MetaArg> {
        let fqn = vm.fqns.join(self.module, id);
        let value = vm.lookup_global(fqn).ok_or_else(|| {
            SpyError::simple(
                ErrorKind::ScopeError,
                format!("name `{id}` is not yet defined"),
                "referenced here",
                loc.clone(),
            )
        })?;
        let ty = vm
            .lookup_global_type(fqn)
            .unwrap_or_else(|| vm.dynamic_type(&value));
        let ma = match varkind {
            VarKind::Const => vm.blue_arg_typed(ty, value, loc.clone()),
            VarKind::Var => vm.red_arg(ty, Some(value), loc.clone()),
        };
        Ok(ma.with_sym(id))
    }
}

pub(crate) fn constant_to_object(value: &Constant) -> Object {
    match value {
        Constant::None => Object::None,
        Constant::Bool(b) => Object::Bool(*b),
        Constant::I32(v) => Object::I32(*v),
        Constant::F64(v) => Object::F64(*v),
        Constant::Str(s) => Object::from_str(s),
    }
}

/// Turns a blue exception value (or bare exception type) into the error it
/// raises.
pub(crate) fn raise_from_value(vm: &Vm, ma: &MetaArg, loc: &Loc) -> SpyError {
    match ma.blue_value() {
        Some(Object::Exc(exc)) => {
            SpyError::simple(exc.kind, exc.message.clone(), "raised here", loc.clone())
        }
        Some(Object::Type(ty)) => match vm.b.kind_of_exc_type(ty) {
            Some(kind) => SpyError::simple(kind, "", "raised here", loc.clone()),
            None => SpyError::simple(
                ErrorKind::TypeError,
                "can only raise exception values",
                "this is not an exception",
                loc.clone(),
            ),
        },
        _ => SpyError::simple(
            ErrorKind::TypeError,
            "can only raise blue exception values",
            "this is not a blue exception",
            loc.clone(),
        ),
    }
}
