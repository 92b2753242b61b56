//! The parser front-end: `var`/`const` preprocessing plus lowering of the
//! ruff Python AST into the typed SPy AST.
//!
//! The surface language is Python syntax with two storage qualifiers that
//! Python does not have:
//!
//! ```text
//! var x: i32 = 0
//! const y: i32 = 0
//! ```
//!
//! To reuse the Python parser, the preprocessor removes the qualifier token
//! and slides the name left into its place, padding with spaces so that
//! every following column keeps its position; the qualifier is recorded by
//! the (line, column) at which the rewritten name will appear. After
//! parsing, the lowering step looks the positions up again and attaches the
//! hint to the produced `VarDef`.

use std::rc::Rc;

use ahash::AHashMap;
use ruff_python_ast::{self as py, Expr as PyExpr, Number, Stmt as PyStmt};
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;

use crate::ast::{
    BinOp, CmpOp, Constant, Decl, Expr, FuncArg, FuncDef, GlobalVarDef, Ident, Import, Module, Stmt, UnaryOp, VarDef,
    VarKindHint,
};
use crate::ast::{Color, FuncKind};
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::location::{LineIndex, Loc};

/// Parses SPy source into a module AST (no scope analysis yet).
pub fn parse_source(src: &str, filename: &str, modname: &str) -> SpyResult<Module> {
    let filename: Rc<str> = Rc::from(filename);
    let (src2, varkinds) = preprocess(src, &filename)?;
    let line_index = LineIndex::new(&src2);

    let parsed = parse_module(&src2).map_err(|e| {
        let loc = line_index.loc(&filename, e.range());
        SpyError::simple(ErrorKind::ParseError, e.to_string(), "", loc)
    })?;
    let py_module = parsed.into_syntax();

    let mut lowering = Lowering {
        filename: Rc::clone(&filename),
        line_index,
        varkinds,
        for_seq: 0,
    };
    let mut decls = Vec::new();
    for stmt in py_module.body {
        lowering.lower_decl(stmt, &mut decls)?;
    }
    Ok(Module {
        loc: Loc::whole_line(Rc::clone(&filename), 1),
        filename: filename.to_string(),
        modname: modname.to_owned(),
        decls,
        symtable: None,
    })
}

/// Debug view of the preprocessed Python AST, for the `pyparse` subcommand.
pub fn pyparse_dump(src: &str, filename: &str) -> SpyResult<String> {
    let filename: Rc<str> = Rc::from(filename);
    let (src2, _) = preprocess(src, &filename)?;
    let line_index = LineIndex::new(&src2);
    let parsed = parse_module(&src2).map_err(|e| {
        let loc = line_index.loc(&filename, e.range());
        SpyError::simple(ErrorKind::ParseError, e.to_string(), "", loc)
    })?;
    Ok(format!("{:#?}", parsed.into_syntax()))
}

/// Rewrites `var x` / `const x` into `x` (columns preserved) and records
/// which (line, column) positions carried which qualifier.
pub fn preprocess(src: &str, filename: &Rc<str>) -> SpyResult<(String, AHashMap<(u32, u32), VarKindHint>)> {
    let mut out = String::with_capacity(src.len());
    let mut varkinds = AHashMap::new();

    for (line_no, line) in src.split_inclusive('\n').enumerate() {
        let line_no = u32::try_from(line_no).unwrap_or(u32::MAX) + 1;
        let bytes = line.as_bytes();
        let indent = bytes.iter().take_while(|b| matches!(b, b' ' | b'\t')).count();
        let rest = &line[indent..];

        let hint = if rest.starts_with("var ") {
            Some((VarKindHint::Var, 4))
        } else if rest.starts_with("const ") {
            Some((VarKindHint::Const, 6))
        } else {
            None
        };
        let Some((hint, kw_len)) = hint else {
            out.push_str(line);
            continue;
        };

        let after_kw = &rest[kw_len..];
        let name_len = after_kw
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let starts_ok = after_kw.bytes().next().is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');
        if name_len == 0 || !starts_ok {
            let loc = Loc::whole_line(Rc::clone(filename), line_no);
            return Err(SpyError::simple(
                ErrorKind::ParseError,
                "expected a name after `var`/`const`",
                "",
                loc,
            ));
        }

        let name = &after_kw[..name_len];
        // `var x: i32` becomes `x     : i32`: the name slides to the
        // qualifier's column, spaces keep everything after in place
        out.push_str(&line[..indent]);
        out.push_str(name);
        out.push_str(&" ".repeat(kw_len));
        out.push_str(&after_kw[name_len..]);

        let col = u32::try_from(indent).unwrap_or(u32::MAX);
        varkinds.insert((line_no, col), hint);
    }
    Ok((out, varkinds))
}

struct Lowering {
    filename: Rc<str>,
    line_index: LineIndex,
    varkinds: AHashMap<(u32, u32), VarKindHint>,
    for_seq: u32,
}

impl Lowering {
    fn loc(&self, node: &impl Ranged) -> Loc {
        self.line_index.loc(&self.filename, node.range())
    }

    fn err(&self, message: impl Into<String>, node: &impl Ranged) -> SpyError {
        SpyError::simple(ErrorKind::ParseError, message, "here", self.loc(node))
    }

    fn ident(&self, name: &str, node: &impl Ranged) -> Ident {
        Ident {
            loc: self.loc(node),
            name: name.to_owned(),
        }
    }

    fn varkind_of(&self, loc: &Loc) -> Option<VarKindHint> {
        self.varkinds.get(&(loc.line_start, loc.col_start)).copied()
    }

    // ===================================================================
    // module-level declarations

    fn lower_decl(&mut self, stmt: PyStmt, decls: &mut Vec<Decl>) -> SpyResult<()> {
        match stmt {
            PyStmt::FunctionDef(fd) => {
                let funcdef = self.lower_funcdef(fd)?;
                decls.push(Decl::FuncDef(funcdef));
                Ok(())
            }
            PyStmt::AnnAssign(ann) => {
                let loc = self.loc(&ann);
                let Some(value) = ann.value else {
                    return Err(self.err("module-level declarations need a value", &*ann.target));
                };
                let vardef = self.lower_vardef(&ann.target, *ann.annotation)?;
                let value = self.lower_expr(*value)?;
                decls.push(Decl::GlobalVarDef(GlobalVarDef { loc, vardef, value }));
                Ok(())
            }
            PyStmt::Assign(assign) => {
                let loc = self.loc(&assign);
                if assign.targets.len() != 1 {
                    return Err(self.err("chained assignments are not supported", &assign));
                }
                let PyExpr::Name(name) = &assign.targets[0] else {
                    return Err(self.err("only plain names can be assigned at module level", &assign.targets[0]));
                };
                let name_loc = self.loc(name);
                let vardef = VarDef {
                    loc: name_loc.clone(),
                    kind: self.varkind_of(&name_loc),
                    name: self.ident(name.id.as_str(), name),
                    ty: Box::new(Expr::Auto { loc: name_loc }),
                };
                let value = self.lower_expr(*assign.value)?;
                decls.push(Decl::GlobalVarDef(GlobalVarDef { loc, vardef, value }));
                Ok(())
            }
            PyStmt::Import(imp) => {
                let loc = self.loc(&imp);
                for alias in imp.names {
                    let full = alias.name.id.as_str();
                    let (modname, attr) = match full.split_once('.') {
                        Some((m, rest)) => (m.to_owned(), Some(rest.to_owned())),
                        None => (full.to_owned(), None),
                    };
                    let loc_asname = alias
                        .asname
                        .as_ref()
                        .map_or_else(|| self.loc(&alias.name), |a| self.loc(a));
                    let asname = alias.asname.as_ref().map_or_else(
                        || attr.clone().unwrap_or_else(|| modname.clone()),
                        |a| a.id.to_string(),
                    );
                    decls.push(Decl::Import(Import {
                        loc: loc.clone(),
                        loc_asname,
                        modname,
                        attr,
                        asname,
                    }));
                }
                Ok(())
            }
            PyStmt::Pass(_) => Ok(()),
            // a leading module docstring parses as a bare string expr
            PyStmt::Expr(e) if matches!(&*e.value, PyExpr::StringLiteral(_)) => Ok(()),
            PyStmt::ClassDef(c) => Err(self.err("class definitions are not supported yet", &c)),
            PyStmt::ImportFrom(imp) => Err(self.err("`from ... import ...` is not supported; use `import mod.attr`", &imp)),
            other => Err(self.err("only declarations are allowed at module level", &other)),
        }
    }

    fn lower_vardef(&mut self, target: &PyExpr, annotation: PyExpr) -> SpyResult<VarDef> {
        let PyExpr::Name(name) = target else {
            return Err(self.err("only plain names can be declared", target));
        };
        let name_loc = self.loc(name);
        Ok(VarDef {
            loc: name_loc.clone(),
            kind: self.varkind_of(&name_loc),
            name: self.ident(name.id.as_str(), name),
            ty: Box::new(self.lower_expr(annotation)?),
        })
    }

    fn lower_funcdef(&mut self, fd: py::StmtFunctionDef) -> SpyResult<FuncDef> {
        let loc = self.loc(&fd);
        let prototype_loc = self.loc(&fd.name);
        if fd.is_async {
            return Err(self.err("`async def` is not supported", &fd.name));
        }

        let mut color = Color::Red;
        let mut kind = FuncKind::Plain;
        for decorator in &fd.decorator_list {
            match &decorator.expression {
                PyExpr::Name(n) if n.id.as_str() == "blue" => {
                    color = Color::Blue;
                }
                PyExpr::Attribute(attr) => {
                    let base_is_blue =
                        matches!(&*attr.value, PyExpr::Name(n) if n.id.as_str() == "blue");
                    match (base_is_blue, attr.attr.as_str()) {
                        (true, "generic") => {
                            color = Color::Blue;
                            kind = FuncKind::Generic;
                        }
                        (true, "metafunc") => {
                            color = Color::Blue;
                            kind = FuncKind::Metafunc;
                        }
                        _ => return Err(self.err("unknown decorator", decorator)),
                    }
                }
                _ => return Err(self.err("unknown decorator", decorator)),
            }
        }

        let params = &fd.parameters;
        if params.vararg.is_some() || params.kwarg.is_some() || !params.kwonlyargs.is_empty() {
            return Err(self.err("only plain positional parameters are supported", &**params));
        }
        let mut args = Vec::new();
        for param in params.posonlyargs.iter().chain(&params.args) {
            if param.default.is_some() {
                return Err(self.err("default parameter values are not supported", param));
            }
            let p = &param.parameter;
            let ty = match &p.annotation {
                Some(ann) => self.lower_expr((**ann).clone())?,
                None if color == Color::Blue => Expr::Name {
                    loc: self.loc(p),
                    id: "dynamic".to_owned(),
                },
                None => {
                    return Err(self.err(
                        format!("missing type annotation for parameter `{}`", p.name.id),
                        p,
                    ));
                }
            };
            args.push(FuncArg {
                loc: self.loc(p),
                name: p.name.id.to_string(),
                ty,
            });
        }

        let return_type = match fd.returns {
            Some(ret) => self.lower_expr(*ret)?,
            None if color == Color::Blue => Expr::Name {
                loc: prototype_loc.clone(),
                id: "dynamic".to_owned(),
            },
            None => return Err(self.err("missing return type annotation", &fd.name)),
        };

        let body = self.lower_body(fd.body)?;
        Ok(FuncDef {
            loc,
            prototype_loc,
            color,
            kind,
            name: fd.name.id.to_string(),
            args,
            return_type: Box::new(return_type),
            body,
            symtable: None,
        })
    }

    // ===================================================================
    // statements

    fn lower_body(&mut self, stmts: impl IntoIterator<Item = PyStmt, IntoIter: ExactSizeIterator>) -> SpyResult<Vec<Stmt>> {
        let stmts = stmts.into_iter();
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.lower_stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn lower_stmt(&mut self, stmt: PyStmt, out: &mut Vec<Stmt>) -> SpyResult<()> {
        match stmt {
            PyStmt::Pass(p) => {
                out.push(Stmt::Pass { loc: self.loc(&p) });
                Ok(())
            }
            PyStmt::Break(b) => {
                out.push(Stmt::Break { loc: self.loc(&b) });
                Ok(())
            }
            PyStmt::Continue(c) => {
                out.push(Stmt::Continue { loc: self.loc(&c) });
                Ok(())
            }
            PyStmt::Expr(e) => {
                let loc = self.loc(&e);
                let value = self.lower_expr(*e.value)?;
                out.push(Stmt::Expr { loc, value });
                Ok(())
            }
            PyStmt::Return(r) => {
                let loc = self.loc(&r);
                let value = match r.value {
                    Some(v) => self.lower_expr(*v)?,
                    None => Expr::Constant {
                        loc: loc.clone(),
                        value: Constant::None,
                    },
                };
                out.push(Stmt::Return { loc, value });
                Ok(())
            }
            PyStmt::FunctionDef(fd) => {
                let funcdef = self.lower_funcdef(fd)?;
                out.push(Stmt::FuncDef(Box::new(funcdef)));
                Ok(())
            }
            PyStmt::AnnAssign(ann) => {
                let loc = self.loc(&ann);
                let vardef = self.lower_vardef(&ann.target, *ann.annotation)?;
                let target = vardef.name.clone();
                out.push(Stmt::VarDef(vardef));
                if let Some(value) = ann.value {
                    let value = self.lower_expr(*value)?;
                    out.push(Stmt::Assign { loc, target, value });
                }
                Ok(())
            }
            PyStmt::Assign(assign) => {
                let loc = self.loc(&assign);
                if assign.targets.len() != 1 {
                    return Err(self.err("chained assignments are not supported", &assign));
                }
                let value = self.lower_expr(*assign.value)?;
                match assign.targets.into_iter().next().expect("one target") {
                    PyExpr::Name(name) => {
                        out.push(Stmt::Assign {
                            loc,
                            target: self.ident(name.id.as_str(), &name),
                            value,
                        });
                    }
                    PyExpr::Tuple(tuple) => {
                        let mut targets = Vec::with_capacity(tuple.elts.len());
                        for elt in &tuple.elts {
                            let PyExpr::Name(name) = elt else {
                                return Err(self.err("unpack targets must be plain names", elt));
                            };
                            targets.push(self.ident(name.id.as_str(), name));
                        }
                        out.push(Stmt::UnpackAssign { loc, targets, value });
                    }
                    PyExpr::Attribute(attr) => {
                        let target = self.lower_expr(*attr.value)?;
                        out.push(Stmt::SetAttr {
                            loc,
                            target,
                            attr: self.ident(attr.attr.as_str(), &attr.attr),
                            value,
                        });
                    }
                    PyExpr::Subscript(sub) => {
                        let target = self.lower_expr(*sub.value)?;
                        let index = self.lower_expr(*sub.slice)?;
                        out.push(Stmt::SetItem {
                            loc,
                            target,
                            index,
                            value,
                        });
                    }
                    other => Err(self.err("unsupported assignment target", &other))?,
                }
                Ok(())
            }
            PyStmt::AugAssign(aug) => {
                let loc = self.loc(&aug);
                let PyExpr::Name(name) = &*aug.target else {
                    return Err(self.err("augmented assignment targets must be plain names", &*aug.target));
                };
                let op = self.lower_binop(aug.op, &aug)?;
                let value = self.lower_expr(*aug.value)?;
                out.push(Stmt::AugAssign {
                    loc,
                    op,
                    target: self.ident(name.id.as_str(), name),
                    value,
                });
                Ok(())
            }
            PyStmt::If(ifstmt) => {
                let stmt = self.lower_if(ifstmt)?;
                out.push(stmt);
                Ok(())
            }
            PyStmt::While(w) => {
                if !w.orelse.is_empty() {
                    return Err(self.err("`while ... else` is not supported", &w));
                }
                let loc = self.loc(&w);
                let test = self.lower_expr(*w.test)?;
                let body = self.lower_body(w.body)?;
                out.push(Stmt::While { loc, test, body });
                Ok(())
            }
            PyStmt::For(f) => {
                if !f.orelse.is_empty() {
                    return Err(self.err("`for ... else` is not supported", &f));
                }
                if f.is_async {
                    return Err(self.err("`async for` is not supported", &f));
                }
                let loc = self.loc(&f);
                let PyExpr::Name(name) = &*f.target else {
                    return Err(self.err("loop targets must be plain names", &*f.target));
                };
                let target = self.ident(name.id.as_str(), name);
                let iter = self.lower_expr(*f.iter)?;
                let seq = self.for_seq;
                self.for_seq += 1;
                let body = self.lower_body(f.body)?;
                out.push(Stmt::For {
                    loc,
                    seq,
                    target,
                    iter,
                    body,
                });
                Ok(())
            }
            PyStmt::Raise(r) => {
                let loc = self.loc(&r);
                let raise_range = r.range();
                let Some(exc) = r.exc else {
                    return Err(self.err("bare `raise` is not supported", &raise_range));
                };
                if r.cause.is_some() {
                    return Err(self.err("`raise ... from ...` is not supported", &raise_range));
                }
                let exc = self.lower_expr(*exc)?;
                out.push(Stmt::Raise { loc, exc });
                Ok(())
            }
            PyStmt::Assert(a) => {
                let loc = self.loc(&a);
                let test = self.lower_expr(*a.test)?;
                let msg = a.msg.map(|m| self.lower_expr(*m)).transpose()?;
                out.push(Stmt::Assert { loc, test, msg });
                Ok(())
            }
            PyStmt::Import(imp) => Err(self.err("imports are only allowed at module level", &imp)),
            PyStmt::ClassDef(c) => Err(self.err("class definitions are not supported yet", &c)),
            other => Err(self.err("unsupported statement", &other)),
        }
    }

    fn lower_if(&mut self, ifstmt: py::StmtIf) -> SpyResult<Stmt> {
        let loc = self.loc(&ifstmt);
        let test = self.lower_expr(*ifstmt.test)?;
        let then_body = self.lower_body(ifstmt.body)?;

        // elif chains become nested `If`s in the else branch
        let mut else_body = Vec::new();
        let mut clauses = ifstmt.elif_else_clauses.into_iter().rev();
        if let Some(last) = clauses.next() {
            let last_range = last.range();
            let mut acc = match last.test {
                None => self.lower_body(last.body)?,
                Some(test) => {
                    let clause_loc = self.loc(&last_range);
                    vec![Stmt::If {
                        loc: clause_loc,
                        test: self.lower_expr(test)?,
                        then_body: self.lower_body(last.body)?,
                        else_body: Vec::new(),
                    }]
                }
            };
            for clause in clauses {
                let clause_range = clause.range();
                let Some(test) = clause.test else {
                    return Err(self.err("`else` must be the last clause", &clause_range));
                };
                let clause_loc = self.loc(&clause_range);
                acc = vec![Stmt::If {
                    loc: clause_loc,
                    test: self.lower_expr(test)?,
                    then_body: self.lower_body(clause.body)?,
                    else_body: acc,
                }];
            }
            else_body = acc;
        }

        Ok(Stmt::If {
            loc,
            test,
            then_body,
            else_body,
        })
    }

    // ===================================================================
    // expressions

    fn lower_binop(&self, op: py::Operator, node: &impl Ranged) -> SpyResult<BinOp> {
        match op {
            py::Operator::Add => Ok(BinOp::Add),
            py::Operator::Sub => Ok(BinOp::Sub),
            py::Operator::Mult => Ok(BinOp::Mul),
            py::Operator::Div => Ok(BinOp::Div),
            py::Operator::FloorDiv => Ok(BinOp::FloorDiv),
            py::Operator::Mod => Ok(BinOp::Mod),
            _ => Err(self.err("unsupported binary operator", node)),
        }
    }

    fn lower_expr(&mut self, expr: PyExpr) -> SpyResult<Expr> {
        let loc = self.loc(&expr);
        match expr {
            PyExpr::Name(name) => Ok(Expr::Name {
                loc,
                id: name.id.to_string(),
            }),
            PyExpr::NoneLiteral(_) => Ok(Expr::Constant {
                loc,
                value: Constant::None,
            }),
            PyExpr::BooleanLiteral(b) => Ok(Expr::Constant {
                loc,
                value: Constant::Bool(b.value),
            }),
            PyExpr::NumberLiteral(n) => {
                let n_range = n.range();
                let value = match n.value {
                    Number::Int(i) => {
                        let v = i
                            .as_i64()
                            .and_then(|v| i32::try_from(v).ok())
                            .ok_or_else(|| self.err("integer literal out of the i32 range", &n_range))?;
                        Constant::I32(v)
                    }
                    Number::Float(f) => Constant::F64(f),
                    Number::Complex { .. } => {
                        return Err(self.err("complex literals are not supported", &n_range));
                    }
                };
                Ok(Expr::Constant { loc, value })
            }
            PyExpr::StringLiteral(s) => Ok(Expr::Constant {
                loc,
                value: Constant::Str(s.value.to_str().to_owned()),
            }),
            PyExpr::BinOp(b) => {
                let op = self.lower_binop(b.op, &b.range())?;
                Ok(Expr::BinOp {
                    loc,
                    op,
                    left: Box::new(self.lower_expr(*b.left)?),
                    right: Box::new(self.lower_expr(*b.right)?),
                })
            }
            PyExpr::UnaryOp(u) => match u.op {
                py::UnaryOp::USub => Ok(Expr::UnaryOp {
                    loc,
                    op: UnaryOp::Neg,
                    value: Box::new(self.lower_expr(*u.operand)?),
                }),
                py::UnaryOp::Not => Ok(Expr::UnaryOp {
                    loc,
                    op: UnaryOp::Not,
                    value: Box::new(self.lower_expr(*u.operand)?),
                }),
                py::UnaryOp::UAdd => self.lower_expr(*u.operand),
                py::UnaryOp::Invert => Err(self.err("`~` is not supported", &u.range())),
            },
            PyExpr::Compare(c) => {
                if c.ops.len() != 1 {
                    return Err(self.err("chained comparisons are not supported", &c.range()));
                }
                let op = match c.ops[0] {
                    py::CmpOp::Eq => CmpOp::Eq,
                    py::CmpOp::NotEq => CmpOp::Ne,
                    py::CmpOp::Lt => CmpOp::Lt,
                    py::CmpOp::LtE => CmpOp::Le,
                    py::CmpOp::Gt => CmpOp::Gt,
                    py::CmpOp::GtE => CmpOp::Ge,
                    _ => return Err(self.err("unsupported comparison operator", &c.range())),
                };
                let mut comparators = c.comparators.into_vec();
                let right = comparators.pop().expect("one comparator");
                Ok(Expr::CmpOp {
                    loc,
                    op,
                    left: Box::new(self.lower_expr(*c.left)?),
                    right: Box::new(self.lower_expr(right)?),
                })
            }
            PyExpr::Call(call) => {
                if !call.arguments.keywords.is_empty() {
                    return Err(self.err("keyword arguments are not supported", &call.range()));
                }
                let func = self.lower_expr(*call.func)?;
                let mut args = Vec::with_capacity(call.arguments.args.len());
                for arg in call.arguments.args.into_vec() {
                    if matches!(arg, PyExpr::Starred(_)) {
                        return Err(self.err("`*args` calls are not supported", &arg));
                    }
                    args.push(self.lower_expr(arg)?);
                }
                Ok(Expr::Call {
                    loc,
                    func: Box::new(func),
                    args,
                })
            }
            PyExpr::Subscript(sub) => {
                if matches!(&*sub.slice, PyExpr::Slice(_)) {
                    return Err(self.err("slices are not supported", &*sub.slice));
                }
                Ok(Expr::GetItem {
                    loc,
                    value: Box::new(self.lower_expr(*sub.value)?),
                    index: Box::new(self.lower_expr(*sub.slice)?),
                })
            }
            PyExpr::Attribute(attr) => {
                let attr_ident = self.ident(attr.attr.as_str(), &attr.attr);
                Ok(Expr::GetAttr {
                    loc,
                    value: Box::new(self.lower_expr(*attr.value)?),
                    attr: attr_ident,
                })
            }
            PyExpr::Tuple(t) => {
                let mut items = Vec::with_capacity(t.elts.len());
                for elt in t.elts {
                    items.push(self.lower_expr(elt)?);
                }
                Ok(Expr::Tuple { loc, items })
            }
            PyExpr::List(l) => {
                let mut items = Vec::with_capacity(l.elts.len());
                for elt in l.elts {
                    items.push(self.lower_expr(elt)?);
                }
                Ok(Expr::List { loc, items })
            }
            PyExpr::BoolOp(b) => Err(self.err("`and`/`or` are not supported yet", &b.range())),
            other => Err(self.err("unsupported expression", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_keeps_columns() {
        let filename: Rc<str> = Rc::from("test.spy");
        let (src2, kinds) = preprocess("var x: i32 = 0\n", &filename).unwrap();
        assert_eq!(src2, "x    : i32 = 0\n");
        assert_eq!(kinds.get(&(1, 0)), Some(&VarKindHint::Var));
    }

    #[test]
    fn preprocess_handles_indent() {
        let filename: Rc<str> = Rc::from("test.spy");
        let (src2, kinds) = preprocess("def f() -> None:\n    const y: i32 = 1\n", &filename).unwrap();
        assert!(src2.contains("    y      : i32 = 1"));
        assert_eq!(kinds.get(&(2, 4)), Some(&VarKindHint::Const));
    }
}
