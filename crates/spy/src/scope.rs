//! The scope analyzer.
//!
//! Two passes over a module:
//!
//! 1. **declare** — find every statement which introduces a new symbol
//!    (VarDef, Assign, FuncDef, Import, ...) and add it to the symtable of
//!    the scope it appears in. At the end each symtable contains the names
//!    directly defined in that scope (level 0).
//! 2. **flatten** — resolve each name use to the nearest enclosing scope and
//!    capture outer references into the using scope with an explicit level.
//!
//! The scoping rules: module-level names are visible to all inner scopes;
//! shadowing an outer name is an error; a plain first assignment declares an
//! implicit const (a var when it happens inside a loop body); a second
//! assignment to an auto-const promotes it to var.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Color, Decl, Expr, FuncDef, Module, Stmt, VarDef, VarKindHint};
use crate::errors::{ErrorKind, Severity, SpyError, SpyResult};
use crate::location::Loc;
use crate::symtable::{ImportRef, ScopeKind, SymTable, Symbol, VarKind, VarKindOrigin, VarStorage};
use crate::vm::Vm;

type ScopeRef = Rc<RefCell<SymTable>>;

pub struct ScopeAnalyzer<'vm> {
    vm: &'vm Vm,
    stack: Vec<ScopeRef>,
    mod_scope: ScopeRef,
    /// Inner scopes in traversal order; the flatten and attach passes visit
    /// function definitions in the same order.
    inner_scopes: Vec<ScopeRef>,
    visit_index: usize,
    loop_depth: u32,
}

/// Analyzes a module in place: attaches a symtable to the module and to
/// every (possibly nested) function definition.
pub fn analyze_module(vm: &Vm, module: &mut Module) -> SpyResult<()> {
    let builtins_scope = builtins_symtable(vm);
    let mod_scope = Rc::new(RefCell::new(SymTable::new(
        module.modname.clone(),
        Color::Blue,
        ScopeKind::Module,
    )));
    let mut analyzer = ScopeAnalyzer {
        vm,
        stack: vec![Rc::new(RefCell::new(builtins_scope)), Rc::clone(&mod_scope)],
        mod_scope: Rc::clone(&mod_scope),
        inner_scopes: Vec::new(),
        visit_index: 0,
        loop_depth: 0,
    };

    for decl in &module.decls {
        analyzer.declare_decl(decl)?;
    }
    analyzer.visit_index = 0;
    for decl in &module.decls {
        analyzer.flatten_decl(decl)?;
    }

    // attach the computed tables to the AST
    let tables: Vec<Rc<SymTable>> = analyzer
        .inner_scopes
        .iter()
        .map(|scope| Rc::new(scope.borrow().clone()))
        .collect();
    let mut index = 0;
    for decl in &mut module.decls {
        if let Decl::FuncDef(fd) = decl {
            attach_symtables(fd, &tables, &mut index);
        }
    }
    module.symtable = Some(Rc::new(mod_scope.borrow().clone()));
    Ok(())
}

fn attach_symtables(fd: &mut FuncDef, tables: &[Rc<SymTable>], index: &mut usize) {
    fd.symtable = Some(Rc::clone(&tables[*index]));
    *index += 1;
    for stmt in &mut fd.body {
        attach_in_stmt(stmt, tables, index);
    }
}

fn attach_in_stmt(stmt: &mut Stmt, tables: &[Rc<SymTable>], index: &mut usize) {
    match stmt {
        Stmt::FuncDef(fd) => attach_symtables(fd, tables, index),
        Stmt::If {
            then_body, else_body, ..
        } => {
            for s in then_body.iter_mut().chain(else_body) {
                attach_in_stmt(s, tables, index);
            }
        }
        Stmt::While { body, .. } | Stmt::For { body, .. } => {
            for s in body {
                attach_in_stmt(s, tables, index);
            }
        }
        _ => {}
    }
}

fn builtins_symtable(vm: &Vm) -> SymTable {
    let mut table = SymTable::new("builtins", Color::Blue, ScopeKind::Builtins);
    if let Some(module) = vm.module("builtins") {
        for (name, _) in module.attrs() {
            table.add(Symbol {
                name,
                varkind: VarKind::Const,
                origin: VarKindOrigin::GlobalConst,
                storage: VarStorage::Direct,
                level: 0,
                defined_in: ScopeKind::Builtins,
                loc: Loc::fake(),
                type_loc: Loc::fake(),
                impref: None,
            });
        }
    }
    table
}

impl ScopeAnalyzer<'_> {
    fn scope(&self) -> ScopeRef {
        Rc::clone(self.stack.last().expect("scope stack is never empty"))
    }

    /// Looks up a name starting from the innermost scope; returns the
    /// distance and the symbol.
    fn lookup_ref(&self, name: &str) -> Option<(i32, ScopeRef, Symbol)> {
        for (level, scope) in self.stack.iter().rev().enumerate() {
            if let Some(sym) = scope.borrow().lookup(name).cloned() {
                return Some((i32::try_from(level).unwrap_or(i32::MAX), Rc::clone(scope), sym));
            }
        }
        None
    }

    /// Looks up the scope which *defines* a name (level-0 symbol).
    fn lookup_definition(&self, name: &str) -> Option<(i32, Symbol)> {
        for (level, scope) in self.stack.iter().rev().enumerate() {
            if let Some(sym) = scope.borrow().lookup_definition(name).cloned() {
                return Some((i32::try_from(level).unwrap_or(i32::MAX), sym));
            }
        }
        None
    }

    fn define_name(
        &mut self,
        name: &str,
        varkind: VarKind,
        origin: VarKindOrigin,
        loc: &Loc,
        type_loc: &Loc,
        impref: Option<ImportRef>,
    ) -> SpyResult<()> {
        if let Some((level, scope, sym)) = self.lookup_ref(name) {
            if name != "@return" {
                if level == 0 && scope.borrow().color == Color::Blue {
                    // the same name defined in two branches of a blue `if`;
                    // a runtime redeclaration is still caught by the frame
                    return Ok(());
                }
                let msg = if level == 0 {
                    format!("variable `{name}` already declared")
                } else {
                    format!("variable `{name}` shadows a name declared in an outer scope")
                };
                let mut err = SpyError::new(ErrorKind::ScopeError, msg);
                err.add(Severity::Error, "this is the new declaration", loc.clone());
                err.add(Severity::Note, "this is the previous declaration", sym.loc.clone());
                return Err(err);
            }
        }

        let scope = self.scope();
        let is_module_scope = Rc::ptr_eq(&scope, &self.mod_scope);
        let storage = if is_module_scope && varkind == VarKind::Var {
            VarStorage::Cell
        } else {
            VarStorage::Direct
        };
        let defined_in = scope.borrow().kind;
        scope.borrow_mut().add(Symbol {
            name: name.to_owned(),
            varkind,
            origin,
            storage,
            level: 0,
            defined_in,
            loc: loc.clone(),
            type_loc: type_loc.clone(),
            impref,
        });
        Ok(())
    }

    // ===================================================================
    // declare pass

    fn declare_decl(&mut self, decl: &Decl) -> SpyResult<()> {
        match decl {
            Decl::Import(imp) => {
                if self.vm.lookup_import_ref(&imp.modname, imp.attr.as_deref()).is_some() {
                    return self.define_name(
                        &imp.asname,
                        VarKind::Const,
                        VarKindOrigin::Auto,
                        &imp.loc,
                        &imp.loc,
                        Some(ImportRef {
                            modname: imp.modname.clone(),
                            attr: imp.attr.clone(),
                        }),
                    );
                }
                let ref_name = match &imp.attr {
                    Some(attr) => format!("{}.{}", imp.modname, attr),
                    None => imp.modname.clone(),
                };
                let mut err = SpyError::new(ErrorKind::ImportError, format!("cannot import `{ref_name}`"));
                if self.vm.module(&imp.modname).is_none() {
                    if self.vm.find_file_on_path(&imp.modname, true).is_some() {
                        err.add(
                            Severity::Error,
                            format!("file `{}.py` exists, but py files cannot be imported", imp.modname),
                            imp.loc.clone(),
                        );
                    } else {
                        err.add(
                            Severity::Error,
                            format!("module `{}` does not exist", imp.modname),
                            imp.loc.clone(),
                        );
                    }
                } else {
                    err.add(
                        Severity::Error,
                        format!(
                            "attribute `{}` does not exist in module `{}`",
                            imp.attr.as_deref().unwrap_or(""),
                            imp.modname
                        ),
                        imp.loc_asname.clone(),
                    );
                }
                Err(err)
            }
            Decl::GlobalVarDef(gvd) => {
                let (varkind, origin) = match gvd.vardef.kind {
                    Some(VarKindHint::Var) => (VarKind::Var, VarKindOrigin::Explicit),
                    Some(VarKindHint::Const) => (VarKind::Const, VarKindOrigin::Explicit),
                    None => (VarKind::Const, VarKindOrigin::GlobalConst),
                };
                self.define_name(
                    &gvd.vardef.name.name,
                    varkind,
                    origin,
                    &gvd.loc,
                    gvd.vardef.ty.loc(),
                    None,
                )
            }
            Decl::FuncDef(fd) => self.declare_funcdef(fd),
        }
    }

    fn declare_funcdef(&mut self, fd: &FuncDef) -> SpyResult<()> {
        self.define_name(
            &fd.name,
            VarKind::Const,
            VarKindOrigin::FuncDef,
            &fd.prototype_loc,
            &fd.prototype_loc,
            None,
        )?;

        let (argkind, arg_origin) = match fd.color {
            Color::Red => (VarKind::Var, VarKindOrigin::RedParam),
            Color::Blue => (VarKind::Const, VarKindOrigin::BlueParam),
        };
        let parent_name = self.scope().borrow().name.clone();
        let inner = Rc::new(RefCell::new(SymTable::new(
            format!("{parent_name}::{}", fd.name),
            fd.color,
            ScopeKind::Function,
        )));
        self.inner_scopes.push(Rc::clone(&inner));
        self.stack.push(inner);
        let saved_loop_depth = std::mem::take(&mut self.loop_depth);
        for arg in &fd.args {
            self.define_name(&arg.name, argkind, arg_origin, &arg.loc, arg.ty.loc(), None)?;
        }
        self.define_name(
            "@return",
            VarKind::Var,
            VarKindOrigin::Auto,
            fd.return_type.loc(),
            fd.return_type.loc(),
            None,
        )?;
        for stmt in &fd.body {
            self.declare_stmt(stmt)?;
        }
        self.loop_depth = saved_loop_depth;
        self.stack.pop();
        Ok(())
    }

    fn declare_stmt(&mut self, stmt: &Stmt) -> SpyResult<()> {
        match stmt {
            Stmt::VarDef(vardef) => self.declare_vardef(vardef),
            Stmt::FuncDef(fd) => self.declare_funcdef(fd),
            Stmt::Assign { target, value, .. } => self.declare_target_maybe(&target.name, &target.loc, value),
            Stmt::UnpackAssign { targets, value, .. } => {
                for target in targets {
                    self.declare_target_maybe(&target.name, &target.loc, value)?;
                }
                Ok(())
            }
            Stmt::AugAssign { target, .. } => {
                self.promote_const_to_var_maybe(&target.name);
                Ok(())
            }
            Stmt::If {
                then_body, else_body, ..
            } => {
                for s in then_body.iter().chain(else_body) {
                    self.declare_stmt(s)?;
                }
                Ok(())
            }
            Stmt::While { body, .. } => {
                self.loop_depth += 1;
                for s in body {
                    self.declare_stmt(s)?;
                }
                self.loop_depth -= 1;
                Ok(())
            }
            Stmt::For {
                seq, target, iter, body, ..
            } => {
                // the hidden iterator variable
                let iter_name = format!("_$iter{seq}");
                self.define_name(
                    &iter_name,
                    VarKind::Var,
                    VarKindOrigin::Auto,
                    iter.loc(),
                    iter.loc(),
                    None,
                )?;
                // the loop variable; its type comes from the iterator
                // expression, so that is its type_loc
                self.define_name(
                    &target.name,
                    VarKind::Var,
                    VarKindOrigin::Auto,
                    &target.loc,
                    iter.loc(),
                    None,
                )?;
                self.loop_depth += 1;
                for s in body {
                    self.declare_stmt(s)?;
                }
                self.loop_depth -= 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn declare_vardef(&mut self, vardef: &VarDef) -> SpyResult<()> {
        let (varkind, origin) = match vardef.kind {
            Some(VarKindHint::Var) => (VarKind::Var, VarKindOrigin::Explicit),
            Some(VarKindHint::Const) => (VarKind::Const, VarKindOrigin::Explicit),
            None => {
                let kind = if self.loop_depth > 0 { VarKind::Var } else { VarKind::Const };
                (kind, VarKindOrigin::Auto)
            }
        };
        self.define_name(&vardef.name.name, varkind, origin, &vardef.loc, vardef.ty.loc(), None)
    }

    fn declare_target_maybe(&mut self, name: &str, loc: &Loc, value: &Expr) -> SpyResult<()> {
        if self.lookup_ref(name).is_none() {
            // first assignment: implicit const, var inside a loop
            let varkind = if self.loop_depth > 0 { VarKind::Var } else { VarKind::Const };
            self.define_name(name, varkind, VarKindOrigin::Auto, loc, value.loc(), None)
        } else {
            self.promote_const_to_var_maybe(name);
            Ok(())
        }
    }

    /// A second assignment to a local auto-const makes it a var.
    fn promote_const_to_var_maybe(&mut self, name: &str) {
        let Some((_, _, sym)) = self.lookup_ref(name) else {
            return;
        };
        if sym.is_local() && sym.varkind == VarKind::Const && sym.origin == VarKindOrigin::Auto {
            let scope = self.scope();
            let has_local = scope.borrow().lookup_definition(name).is_some();
            if has_local {
                let promoted = sym.with_varkind(VarKind::Var);
                scope.borrow_mut().replace(promoted);
            }
        }
    }

    // ===================================================================
    // flatten pass

    fn flatten_decl(&mut self, decl: &Decl) -> SpyResult<()> {
        match decl {
            Decl::Import(_) => Ok(()),
            Decl::GlobalVarDef(gvd) => {
                self.flatten_expr(&gvd.vardef.ty);
                self.flatten_expr(&gvd.value);
                Ok(())
            }
            Decl::FuncDef(fd) => self.flatten_funcdef(fd),
        }
    }

    fn flatten_funcdef(&mut self, fd: &FuncDef) -> SpyResult<()> {
        // argument types and the return type are evaluated in the outer
        // scope
        self.flatten_expr(&fd.return_type);
        for arg in &fd.args {
            self.flatten_expr(&arg.ty);
        }
        let inner = Rc::clone(&self.inner_scopes[self.visit_index]);
        self.visit_index += 1;
        self.stack.push(inner);
        for stmt in &fd.body {
            self.flatten_stmt(stmt)?;
        }
        self.stack.pop();
        Ok(())
    }

    fn flatten_stmt(&mut self, stmt: &Stmt) -> SpyResult<()> {
        match stmt {
            Stmt::Pass { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => Ok(()),
            Stmt::Expr { value, .. } | Stmt::Return { value, .. } => {
                self.flatten_expr(value);
                Ok(())
            }
            Stmt::FuncDef(fd) => self.flatten_funcdef(fd),
            Stmt::VarDef(vardef) => {
                self.flatten_expr(&vardef.ty);
                Ok(())
            }
            Stmt::Assign { target, value, .. } => {
                self.capture_maybe(&target.name);
                self.flatten_expr(value);
                Ok(())
            }
            Stmt::AssignCell { value, .. } => {
                self.flatten_expr(value);
                Ok(())
            }
            Stmt::UnpackAssign { targets, value, .. } => {
                for target in targets {
                    self.capture_maybe(&target.name);
                }
                self.flatten_expr(value);
                Ok(())
            }
            Stmt::AugAssign { target, value, .. } => {
                self.capture_maybe(&target.name);
                self.flatten_expr(value);
                Ok(())
            }
            Stmt::SetItem {
                target, index, value, ..
            } => {
                self.flatten_expr(target);
                self.flatten_expr(index);
                self.flatten_expr(value);
                Ok(())
            }
            Stmt::SetAttr { target, value, .. } => {
                self.flatten_expr(target);
                self.flatten_expr(value);
                Ok(())
            }
            Stmt::If {
                test,
                then_body,
                else_body,
                ..
            } => {
                self.flatten_expr(test);
                for s in then_body.iter().chain(else_body) {
                    self.flatten_stmt(s)?;
                }
                Ok(())
            }
            Stmt::While { test, body, .. } => {
                self.flatten_expr(test);
                for s in body {
                    self.flatten_stmt(s)?;
                }
                Ok(())
            }
            Stmt::For { target, iter, body, .. } => {
                self.capture_maybe(&target.name);
                self.flatten_expr(iter);
                for s in body {
                    self.flatten_stmt(s)?;
                }
                Ok(())
            }
            Stmt::Raise { exc, .. } => {
                self.flatten_expr(exc);
                Ok(())
            }
            Stmt::Assert { test, msg, .. } => {
                self.flatten_expr(test);
                if let Some(m) = msg {
                    self.flatten_expr(m);
                }
                Ok(())
            }
        }
    }

    fn flatten_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Auto { .. }
            | Expr::Constant { .. }
            | Expr::FqnConst { .. }
            | Expr::NameCell { .. } => {}
            Expr::Name { id, .. } | Expr::NameLocal { id, .. } => self.capture_maybe(id),
            Expr::BinOp { left, right, .. } | Expr::CmpOp { left, right, .. } => {
                self.flatten_expr(left);
                self.flatten_expr(right);
            }
            Expr::UnaryOp { value, .. } => self.flatten_expr(value),
            Expr::Call { func, args, .. } => {
                self.flatten_expr(func);
                for arg in args {
                    self.flatten_expr(arg);
                }
            }
            Expr::GetItem { value, index, .. } => {
                self.flatten_expr(value);
                self.flatten_expr(index);
            }
            Expr::GetAttr { value, .. } => self.flatten_expr(value),
            Expr::Tuple { items, .. } | Expr::List { items, .. } => {
                for item in items {
                    self.flatten_expr(item);
                }
            }
        }
    }

    fn capture_maybe(&mut self, name: &str) {
        match self.lookup_ref(name) {
            None => {
                // unresolved: reading it raises at evaluation time
                let scope = self.scope();
                let kind = scope.borrow().kind;
                scope.borrow_mut().add(Symbol {
                    name: name.to_owned(),
                    varkind: VarKind::Var,
                    origin: VarKindOrigin::Auto,
                    storage: VarStorage::Unresolved,
                    level: -1,
                    defined_in: kind,
                    loc: Loc::fake(),
                    type_loc: Loc::fake(),
                    impref: None,
                });
            }
            Some((0, _, _)) => {}
            Some((_, _, _)) => {
                let (level, sym) = self
                    .lookup_definition(name)
                    .expect("a referenced name has a defining scope");
                let scope = self.scope();
                scope.borrow_mut().add(sym.with_level(level));
            }
        }
    }
}
