//! SPy source emission.
//!
//! Two consumers: the `parse`/`redshift` CLI subcommands, which want a
//! readable dump of a module (including its redshifted functions), and the
//! tests, which assert on the emitted text. `emit_module_ast` also
//! round-trips: parsing its output recovers the module structurally.
//!
//! Residual code renders FQN references in backticks; in the `Short` format
//! `builtins` globals render bare and the well-known primitive operator
//! impls re-sugar to infix operators (`` `operator::i32_add`(a, b) `` is
//! shown as `a + b`).

use std::fmt::Write as _;

use crate::ast::{BinOp, CmpOp, Constant, Decl, Expr, FuncDef, Module, Stmt, UnaryOp, VarKindHint};
use crate::fqn::Fqn;
use crate::function::FuncRef;
use crate::object::{format_float, Object};
use crate::types::Type;
use crate::vm::Vm;

/// How fully-qualified names are rendered in dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FqnFormat {
    /// Bare names where unambiguous, infix re-sugaring of primitive ops.
    Short,
    /// Every name in explicit backticked FQN form.
    Full,
}

/// Emits a module AST back to SPy source (pre-redshift form).
pub fn emit_module_ast(module: &Module) -> String {
    let mut out = String::new();
    let mut first = true;
    for decl in &module.decls {
        if !first {
            out.push('\n');
        }
        first = false;
        match decl {
            Decl::Import(imp) => {
                let target = match &imp.attr {
                    Some(attr) => format!("{}.{}", imp.modname, attr),
                    None => imp.modname.clone(),
                };
                let default_asname = imp.attr.as_deref().unwrap_or(&imp.modname);
                if imp.asname == default_asname {
                    let _ = writeln!(out, "import {target}");
                } else {
                    let _ = writeln!(out, "import {target} as {}", imp.asname);
                }
            }
            Decl::GlobalVarDef(gvd) => {
                let prefix = match gvd.vardef.kind {
                    Some(VarKindHint::Var) => "var ",
                    Some(VarKindHint::Const) => "const ",
                    None => "",
                };
                let annotation = match &*gvd.vardef.ty {
                    Expr::Auto { .. } => String::new(),
                    ty => format!(": {}", emit_expr_plain(ty)),
                };
                let _ = writeln!(
                    out,
                    "{prefix}{}{annotation} = {}",
                    gvd.vardef.name.name,
                    emit_expr_plain(&gvd.value)
                );
            }
            Decl::FuncDef(fd) => {
                emit_funcdef_source(&mut out, fd, 0);
            }
        }
    }
    out
}

fn emit_funcdef_source(out: &mut String, fd: &FuncDef, indent: usize) {
    let pad = "    ".repeat(indent);
    match (fd.color, fd.kind) {
        (crate::ast::Color::Blue, crate::ast::FuncKind::Plain) => {
            let _ = writeln!(out, "{pad}@blue");
        }
        (crate::ast::Color::Blue, crate::ast::FuncKind::Generic) => {
            let _ = writeln!(out, "{pad}@blue.generic");
        }
        (crate::ast::Color::Blue, crate::ast::FuncKind::Metafunc) => {
            let _ = writeln!(out, "{pad}@blue.metafunc");
        }
        (crate::ast::Color::Red, _) => {}
    }
    let args: Vec<String> = fd
        .args
        .iter()
        .map(|a| format!("{}: {}", a.name, emit_expr_plain(&a.ty)))
        .collect();
    let _ = writeln!(
        out,
        "{pad}def {}({}) -> {}:",
        fd.name,
        args.join(", "),
        emit_expr_plain(&fd.return_type)
    );
    if fd.body.is_empty() {
        let _ = writeln!(out, "{pad}    pass");
    }
    for stmt in &fd.body {
        emit_stmt_source(out, stmt, indent + 1);
    }
}

fn emit_stmt_source(out: &mut String, stmt: &Stmt, indent: usize) {
    let pad = "    ".repeat(indent);
    match stmt {
        Stmt::Pass { .. } => {
            let _ = writeln!(out, "{pad}pass");
        }
        Stmt::Break { .. } => {
            let _ = writeln!(out, "{pad}break");
        }
        Stmt::Continue { .. } => {
            let _ = writeln!(out, "{pad}continue");
        }
        Stmt::Expr { value, .. } => {
            let _ = writeln!(out, "{pad}{}", emit_expr_plain(value));
        }
        Stmt::Return { value, .. } => {
            let _ = writeln!(out, "{pad}return {}", emit_expr_plain(value));
        }
        Stmt::FuncDef(fd) => emit_funcdef_source(out, fd, indent),
        Stmt::VarDef(v) => {
            let prefix = match v.kind {
                Some(VarKindHint::Var) => "var ",
                Some(VarKindHint::Const) => "const ",
                None => "",
            };
            let _ = writeln!(out, "{pad}{prefix}{}: {}", v.name.name, emit_expr_plain(&v.ty));
        }
        Stmt::Assign { target, value, .. } => {
            let _ = writeln!(out, "{pad}{} = {}", target.name, emit_expr_plain(value));
        }
        Stmt::AssignCell { value, .. } => {
            let _ = writeln!(out, "{pad}<cell> = {}", emit_expr_plain(value));
        }
        Stmt::UnpackAssign { targets, value, .. } => {
            let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
            let _ = writeln!(out, "{pad}{} = {}", names.join(", "), emit_expr_plain(value));
        }
        Stmt::AugAssign { op, target, value, .. } => {
            let _ = writeln!(out, "{pad}{} {}= {}", target.name, op.token(), emit_expr_plain(value));
        }
        Stmt::SetItem {
            target, index, value, ..
        } => {
            let _ = writeln!(
                out,
                "{pad}{}[{}] = {}",
                emit_expr_plain(target),
                emit_expr_plain(index),
                emit_expr_plain(value)
            );
        }
        Stmt::SetAttr { target, attr, value, .. } => {
            let _ = writeln!(
                out,
                "{pad}{}.{} = {}",
                emit_expr_plain(target),
                attr.name,
                emit_expr_plain(value)
            );
        }
        Stmt::If {
            test,
            then_body,
            else_body,
            ..
        } => {
            let _ = writeln!(out, "{pad}if {}:", emit_expr_plain(test));
            if then_body.is_empty() {
                let _ = writeln!(out, "{pad}    pass");
            }
            for s in then_body {
                emit_stmt_source(out, s, indent + 1);
            }
            if !else_body.is_empty() {
                let _ = writeln!(out, "{pad}else:");
                for s in else_body {
                    emit_stmt_source(out, s, indent + 1);
                }
            }
        }
        Stmt::While { test, body, .. } => {
            let _ = writeln!(out, "{pad}while {}:", emit_expr_plain(test));
            if body.is_empty() {
                let _ = writeln!(out, "{pad}    pass");
            }
            for s in body {
                emit_stmt_source(out, s, indent + 1);
            }
        }
        Stmt::For { target, iter, body, .. } => {
            let _ = writeln!(out, "{pad}for {} in {}:", target.name, emit_expr_plain(iter));
            if body.is_empty() {
                let _ = writeln!(out, "{pad}    pass");
            }
            for s in body {
                emit_stmt_source(out, s, indent + 1);
            }
        }
        Stmt::Raise { exc, .. } => {
            let _ = writeln!(out, "{pad}raise {}", emit_expr_plain(exc));
        }
        Stmt::Assert { test, msg, .. } => match msg {
            Some(m) => {
                let _ = writeln!(out, "{pad}assert {}, {}", emit_expr_plain(test), emit_expr_plain(m));
            }
            None => {
                let _ = writeln!(out, "{pad}assert {}", emit_expr_plain(test));
            }
        },
    }
}

/// Source-level expression emission (no VM context, pre-redshift nodes).
fn emit_expr_plain(expr: &Expr) -> String {
    Emitter { vm: None, format: FqnFormat::Short }.expr(expr, 0)
}

// =======================================================================
// dump of a module's (possibly redshifted) functions

/// Dumps the red functions of a module, in global registration order:
/// blue functions have been folded away, specialized/escaped closures
/// appear after the module-level ones.
pub fn dump_module(vm: &Vm, modname: &str, format: FqnFormat) -> String {
    let mut chunks: Vec<String> = Vec::new();
    for (fqn, obj) in vm.globals_snapshot() {
        if vm.fqns.modname(fqn) != modname {
            continue;
        }
        let Object::Func(func) = obj else { continue };
        let Some(ast) = func.as_ast() else { continue };
        if func.color() == crate::ast::Color::Blue || ast.invalid.get() {
            continue;
        }
        chunks.push(dump_funcdef(vm, fqn, &func, format));
    }
    chunks.join("\n")
}

fn dump_funcdef(vm: &Vm, fqn: Fqn, func: &FuncRef, format: FqnFormat) -> String {
    let ast = func.as_ast().expect("dumping an AST function");
    let fd = &ast.funcdef;
    let mut out = String::new();

    let name = if format == FqnFormat::Short && vm.fqns.is_plain_global(fqn) {
        vm.fqns.symbol_name(fqn).to_owned()
    } else {
        format!("`{}`", vm.fqns.render(fqn))
    };
    let emitter = Emitter { vm: Some(vm), format };
    let args: Vec<String> = func
        .functype()
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, emitter.type_name(&p.ty)))
        .collect();
    let _ = writeln!(
        out,
        "def {name}({}) -> {}:",
        args.join(", "),
        emitter.type_name(&func.functype().restype)
    );
    if fd.body.is_empty() {
        out.push_str("    pass\n");
    }
    for stmt in &fd.body {
        emitter.stmt(&mut out, stmt, 1);
    }
    out
}

struct Emitter<'vm> {
    vm: Option<&'vm Vm>,
    format: FqnFormat,
}

impl Emitter<'_> {
    fn type_name(&self, ty: &Type) -> String {
        let Some(vm) = self.vm else {
            return "?".to_owned();
        };
        match self.format {
            FqnFormat::Short => {
                let human = vm.fqns.human(ty.fqn());
                if human == "NoneType" {
                    // annotations spell it `None`
                    "None".to_owned()
                } else if human.contains("::") {
                    format!("`{human}`")
                } else {
                    human
                }
            }
            FqnFormat::Full => format!("`{}`", vm.fqns.render(ty.fqn())),
        }
    }

    fn fqn_name(&self, fqn: Fqn) -> String {
        let Some(vm) = self.vm else {
            return "?".to_owned();
        };
        if self.format == FqnFormat::Short && vm.fqns.modname(fqn) == "builtins" && vm.fqns.is_plain_global(fqn) {
            return vm.fqns.symbol_name(fqn).to_owned();
        }
        format!("`{}`", vm.fqns.render(fqn))
    }

    /// The re-sugaring table: primitive operator impls render as operators
    /// in short mode.
    fn sugar_of(&self, fqn: Fqn) -> Option<Sugar> {
        let vm = self.vm?;
        if self.format != FqnFormat::Short || vm.fqns.modname(fqn) != "operator" {
            return None;
        }
        let symbol = vm.fqns.symbol_name(fqn);
        let (prefix, op) = symbol.split_once('_')?;
        if !matches!(prefix, "i32" | "f64") {
            return None;
        }
        let sugar = match op {
            "add" => Sugar::Bin(BinOp::Add),
            "sub" => Sugar::Bin(BinOp::Sub),
            "mul" => Sugar::Bin(BinOp::Mul),
            "div" => Sugar::Bin(BinOp::Div),
            "floordiv" => Sugar::Bin(BinOp::FloorDiv),
            "mod" => Sugar::Bin(BinOp::Mod),
            "eq" => Sugar::Cmp(CmpOp::Eq),
            "ne" => Sugar::Cmp(CmpOp::Ne),
            "lt" => Sugar::Cmp(CmpOp::Lt),
            "le" => Sugar::Cmp(CmpOp::Le),
            "gt" => Sugar::Cmp(CmpOp::Gt),
            "ge" => Sugar::Cmp(CmpOp::Ge),
            "neg" => Sugar::Neg,
            _ => return None,
        };
        Some(sugar)
    }

    fn is_raise(&self, fqn: Fqn) -> bool {
        self.vm
            .is_some_and(|vm| vm.fqns.modname(fqn) == "operator" && vm.fqns.symbol_name(fqn) == "raise")
    }

    fn stmt(&self, out: &mut String, stmt: &Stmt, indent: usize) {
        let pad = "    ".repeat(indent);
        match stmt {
            Stmt::Pass { .. } => {
                let _ = writeln!(out, "{pad}pass");
            }
            Stmt::Break { .. } => {
                let _ = writeln!(out, "{pad}break");
            }
            Stmt::Continue { .. } => {
                let _ = writeln!(out, "{pad}continue");
            }
            Stmt::Expr { value, .. } => {
                let _ = writeln!(out, "{pad}{}", self.expr(value, 0));
            }
            Stmt::Return { value, .. } => {
                let _ = writeln!(out, "{pad}return {}", self.expr(value, 0));
            }
            Stmt::VarDef(v) => {
                let ty = match &*v.ty {
                    Expr::FqnConst { fqn, .. } => self
                        .vm
                        .and_then(|vm| vm.lookup_global(*fqn))
                        .and_then(|obj| obj.as_type().map(|t| self.type_name(t)))
                        .unwrap_or_else(|| self.expr(&v.ty, 0)),
                    ty => self.expr(ty, 0),
                };
                let _ = writeln!(out, "{pad}{}: {ty}", v.name.name);
            }
            Stmt::Assign { target, value, .. } => {
                let _ = writeln!(out, "{pad}{} = {}", target.name, self.expr(value, 0));
            }
            Stmt::AssignCell { fqn, value, .. } => {
                let name = self
                    .vm
                    .map_or_else(|| "?".to_owned(), |vm| format!("`{}`", vm.fqns.render(*fqn)));
                let _ = writeln!(out, "{pad}{name} = {}", self.expr(value, 0));
            }
            Stmt::UnpackAssign { targets, value, .. } => {
                let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
                let _ = writeln!(out, "{pad}{} = {}", names.join(", "), self.expr(value, 0));
            }
            Stmt::AugAssign { op, target, value, .. } => {
                let _ = writeln!(out, "{pad}{} {}= {}", target.name, op.token(), self.expr(value, 0));
            }
            Stmt::SetItem {
                target, index, value, ..
            } => {
                let _ = writeln!(
                    out,
                    "{pad}{}[{}] = {}",
                    self.expr(target, 0),
                    self.expr(index, 0),
                    self.expr(value, 0)
                );
            }
            Stmt::SetAttr { target, attr, value, .. } => {
                let _ = writeln!(
                    out,
                    "{pad}{}.{} = {}",
                    self.expr(target, 0),
                    attr.name,
                    self.expr(value, 0)
                );
            }
            Stmt::If {
                test,
                then_body,
                else_body,
                ..
            } => {
                let _ = writeln!(out, "{pad}if {}:", self.expr(test, 0));
                if then_body.is_empty() {
                    let _ = writeln!(out, "{pad}    pass");
                }
                for s in then_body {
                    self.stmt(out, s, indent + 1);
                }
                if !else_body.is_empty() {
                    let _ = writeln!(out, "{pad}else:");
                    for s in else_body {
                        self.stmt(out, s, indent + 1);
                    }
                }
            }
            Stmt::While { test, body, .. } => {
                let _ = writeln!(out, "{pad}while {}:", self.expr(test, 0));
                if body.is_empty() {
                    let _ = writeln!(out, "{pad}    pass");
                }
                for s in body {
                    self.stmt(out, s, indent + 1);
                }
            }
            Stmt::For { target, iter, body, .. } => {
                let _ = writeln!(out, "{pad}for {} in {}:", target.name, self.expr(iter, 0));
                if body.is_empty() {
                    let _ = writeln!(out, "{pad}    pass");
                }
                for s in body {
                    self.stmt(out, s, indent + 1);
                }
            }
            Stmt::Raise { exc, .. } => {
                let _ = writeln!(out, "{pad}raise {}", self.expr(exc, 0));
            }
            Stmt::Assert { test, msg, .. } => match msg {
                Some(m) => {
                    let _ = writeln!(out, "{pad}assert {}, {}", self.expr(test, 0), self.expr(m, 0));
                }
                None => {
                    let _ = writeln!(out, "{pad}assert {}", self.expr(test, 0));
                }
            },
            Stmt::FuncDef(_) => unreachable!("nested function definitions cannot survive redshift"),
        }
    }

    /// `min_prec`: parenthesize when this expression binds looser than the
    /// context requires.
    fn expr(&self, expr: &Expr, min_prec: u8) -> String {
        match expr {
            Expr::Auto { .. } => "<auto>".to_owned(),
            Expr::Constant { value, .. } => emit_constant(value),
            Expr::Name { id, .. } | Expr::NameLocal { id, .. } => id.clone(),
            Expr::NameCell { fqn, .. } => self
                .vm
                .map_or_else(|| "?".to_owned(), |vm| format!("`{}`", vm.fqns.render(*fqn))),
            Expr::FqnConst { fqn, .. } => self.fqn_name(*fqn),
            Expr::BinOp { op, left, right, .. } => self.binop(*op, left, right, min_prec),
            Expr::CmpOp { op, left, right, .. } => {
                let s = format!("{} {} {}", self.expr(left, 2), op.token(), self.expr(right, 2));
                maybe_paren(s, 1, min_prec)
            }
            Expr::UnaryOp { op, value, .. } => {
                let token = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "not ",
                };
                maybe_paren(format!("{token}{}", self.expr(value, 4)), 4, min_prec)
            }
            Expr::Call { func, args, .. } => self.call(func, args, min_prec),
            Expr::GetItem { value, index, .. } => {
                format!("{}[{}]", self.expr(value, 5), self.expr(index, 0))
            }
            Expr::GetAttr { value, attr, .. } => format!("{}.{}", self.expr(value, 5), attr.name),
            Expr::Tuple { items, .. } => {
                let inner: Vec<String> = items.iter().map(|i| self.expr(i, 0)).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Expr::List { items, .. } => {
                let inner: Vec<String> = items.iter().map(|i| self.expr(i, 0)).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }

    fn binop(&self, op: BinOp, left: &Expr, right: &Expr, min_prec: u8) -> String {
        let prec = bin_prec(op);
        let s = format!(
            "{} {} {}",
            self.expr(left, prec),
            op.token(),
            self.expr(right, prec + 1)
        );
        maybe_paren(s, prec, min_prec)
    }

    fn call(&self, func: &Expr, args: &[Expr], min_prec: u8) -> String {
        if let Expr::FqnConst { fqn, .. } = func {
            // `raise` lowering renders back as a raise in short mode
            if self.format == FqnFormat::Short && self.is_raise(*fqn) && args.len() == 4 {
                if let (
                    Expr::Constant {
                        value: Constant::Str(etype),
                        ..
                    },
                    Expr::Constant {
                        value: Constant::Str(message),
                        ..
                    },
                    Expr::Constant {
                        value: Constant::Str(filename),
                        ..
                    },
                    Expr::Constant {
                        value: Constant::I32(lineno),
                        ..
                    },
                ) = (&args[0], &args[1], &args[2], &args[3])
                {
                    let exc = if message.is_empty() {
                        etype.clone()
                    } else {
                        format!("{etype}('{message}')")
                    };
                    return format!("raise {exc} # {filename}:{lineno}");
                }
            }
            match self.sugar_of(*fqn) {
                Some(Sugar::Bin(op)) if args.len() == 2 => {
                    return self.binop(op, &args[0], &args[1], min_prec);
                }
                Some(Sugar::Cmp(op)) if args.len() == 2 => {
                    let s = format!(
                        "{} {} {}",
                        self.expr(&args[0], 2),
                        op.token(),
                        self.expr(&args[1], 2)
                    );
                    return maybe_paren(s, 1, min_prec);
                }
                Some(Sugar::Neg) if args.len() == 1 => {
                    return maybe_paren(format!("-{}", self.expr(&args[0], 4)), 4, min_prec);
                }
                _ => {}
            }
        }
        let inner: Vec<String> = args.iter().map(|a| self.expr(a, 0)).collect();
        format!("{}({})", self.expr(func, 5), inner.join(", "))
    }
}

enum Sugar {
    Bin(BinOp),
    Cmp(CmpOp),
    Neg,
}

fn bin_prec(op: BinOp) -> u8 {
    match op {
        BinOp::Add | BinOp::Sub => 2,
        BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => 3,
    }
}

fn maybe_paren(s: String, prec: u8, min_prec: u8) -> String {
    if prec < min_prec {
        format!("({s})")
    } else {
        s
    }
}

fn emit_constant(value: &Constant) -> String {
    match value {
        Constant::None => "None".to_owned(),
        Constant::Bool(true) => "True".to_owned(),
        Constant::Bool(false) => "False".to_owned(),
        Constant::I32(v) => v.to_string(),
        Constant::F64(v) => format_float(*v),
        Constant::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
    }
}
