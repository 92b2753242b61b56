//! The typed SPy AST.
//!
//! Produced by the parser front-end, annotated by the scope analyzer, and
//! rewritten by the redshifter. All nodes are serde-serializable so that
//! parsed+analyzed modules can be stored in the on-disk `.spyc` cache.
//!
//! A handful of node kinds only ever appear in residual (redshifted) code:
//! [`Expr::FqnConst`], [`Expr::NameCell`] and [`Stmt::AssignCell`]. They
//! reference VM globals directly by FQN and are never written to the cache.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::fqn::Fqn;
use crate::location::Loc;
use crate::symtable::SymTable;

/// Evaluation color: blue computations happen at compile time, red ones at
/// run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Blue,
}

/// Function flavor, selected by the `@blue` decorator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuncKind {
    Plain,
    /// `@blue.generic`: a blue function from types to a function.
    Generic,
    /// `@blue.metafunc`: a blue function from meta-arguments to an OpSpec.
    Metafunc,
}

/// The storage qualifier written in the source (`var x` / `const x`), if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKindHint {
    Var,
    Const,
}

/// An identifier occurrence with its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub loc: Loc,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub loc: Loc,
    pub filename: String,
    pub modname: String,
    pub decls: Vec<Decl>,
    /// Module-level symbol table, set by the scope analyzer.
    pub symtable: Option<Rc<SymTable>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    FuncDef(FuncDef),
    GlobalVarDef(GlobalVarDef),
    Import(Import),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVarDef {
    pub loc: Loc,
    pub vardef: VarDef,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub loc: Loc,
    pub loc_asname: Loc,
    pub modname: String,
    /// `from`-style attribute access is spelled `import mod.attr` in SPy.
    pub attr: Option<String>,
    pub asname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncArg {
    pub loc: Loc,
    pub name: String,
    pub ty: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    pub loc: Loc,
    /// Location of the `def name(...)` line, used for diagnostics.
    pub prototype_loc: Loc,
    pub color: Color,
    pub kind: FuncKind,
    pub name: String,
    pub args: Vec<FuncArg>,
    pub return_type: Box<Expr>,
    pub body: Vec<Stmt>,
    /// Function-level symbol table, set by the scope analyzer.
    pub symtable: Option<Rc<SymTable>>,
}

/// A variable declaration: `x: T`, optionally qualified with `var`/`const`.
///
/// `x: T = e` parses as a `VarDef` immediately followed by an [`Stmt::Assign`]
/// to the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDef {
    pub loc: Loc,
    pub kind: Option<VarKindHint>,
    pub name: Ident,
    pub ty: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Pass {
        loc: Loc,
    },
    /// An expression evaluated for its side effects.
    Expr {
        loc: Loc,
        value: Expr,
    },
    Return {
        loc: Loc,
        value: Expr,
    },
    FuncDef(Box<FuncDef>),
    VarDef(VarDef),
    Assign {
        loc: Loc,
        target: Ident,
        value: Expr,
    },
    /// Residual-only: store into a module-level cell addressed by FQN.
    AssignCell {
        loc: Loc,
        fqn: Fqn,
        value: Expr,
    },
    UnpackAssign {
        loc: Loc,
        targets: Vec<Ident>,
        value: Expr,
    },
    AugAssign {
        loc: Loc,
        op: BinOp,
        target: Ident,
        value: Expr,
    },
    SetItem {
        loc: Loc,
        target: Expr,
        index: Expr,
        value: Expr,
    },
    SetAttr {
        loc: Loc,
        target: Expr,
        attr: Ident,
        value: Expr,
    },
    If {
        loc: Loc,
        test: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        loc: Loc,
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        loc: Loc,
        /// Per-function sequence number, used to name the hidden iterator
        /// variable `_$iterN`.
        seq: u32,
        target: Ident,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break {
        loc: Loc,
    },
    Continue {
        loc: Loc,
    },
    Raise {
        loc: Loc,
        exc: Expr,
    },
    Assert {
        loc: Loc,
        test: Expr,
        msg: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    I32(i32),
    F64(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinOp {
    /// The surface token, used in diagnostics and by the source emitter.
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Placeholder for an inferred type annotation (`x = e` at module
    /// level); resolved from the assigned value during evaluation.
    Auto {
        loc: Loc,
    },
    Constant {
        loc: Loc,
        value: Constant,
    },
    /// Residual-only: a reference to a VM global.
    FqnConst {
        loc: Loc,
        fqn: Fqn,
    },
    Name {
        loc: Loc,
        id: String,
    },
    /// Residual-only: a direct-storage local read.
    NameLocal {
        loc: Loc,
        id: String,
    },
    /// Residual-only: a module-level cell read addressed by FQN.
    NameCell {
        loc: Loc,
        fqn: Fqn,
    },
    BinOp {
        loc: Loc,
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    CmpOp {
        loc: Loc,
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        loc: Loc,
        op: UnaryOp,
        value: Box<Expr>,
    },
    Call {
        loc: Loc,
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    GetItem {
        loc: Loc,
        value: Box<Expr>,
        index: Box<Expr>,
    },
    GetAttr {
        loc: Loc,
        value: Box<Expr>,
        attr: Ident,
    },
    Tuple {
        loc: Loc,
        items: Vec<Expr>,
    },
    List {
        loc: Loc,
        items: Vec<Expr>,
    },
}

impl Expr {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Auto { loc }
            | Self::Constant { loc, .. }
            | Self::FqnConst { loc, .. }
            | Self::Name { loc, .. }
            | Self::NameLocal { loc, .. }
            | Self::NameCell { loc, .. }
            | Self::BinOp { loc, .. }
            | Self::CmpOp { loc, .. }
            | Self::UnaryOp { loc, .. }
            | Self::Call { loc, .. }
            | Self::GetItem { loc, .. }
            | Self::GetAttr { loc, .. }
            | Self::Tuple { loc, .. }
            | Self::List { loc, .. } => loc,
        }
    }
}

impl Stmt {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Pass { loc }
            | Self::Expr { loc, .. }
            | Self::Return { loc, .. }
            | Self::VarDef(VarDef { loc, .. })
            | Self::Assign { loc, .. }
            | Self::AssignCell { loc, .. }
            | Self::UnpackAssign { loc, .. }
            | Self::AugAssign { loc, .. }
            | Self::SetItem { loc, .. }
            | Self::SetAttr { loc, .. }
            | Self::If { loc, .. }
            | Self::While { loc, .. }
            | Self::For { loc, .. }
            | Self::Break { loc }
            | Self::Continue { loc }
            | Self::Raise { loc, .. }
            | Self::Assert { loc, .. } => loc,
            Self::FuncDef(funcdef) => &funcdef.loc,
        }
    }
}

impl Module {
    /// Structural equality ignoring locations and symbol tables.
    ///
    /// This is the comparison used to validate the `.spyc` cache: a cached
    /// module must be structurally identical to a fresh parse of its source.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        strip_module(&mut a);
        strip_module(&mut b);
        a == b
    }
}

fn strip_module(m: &mut Module) {
    m.loc = Loc::fake();
    m.symtable = None;
    for decl in &mut m.decls {
        match decl {
            Decl::FuncDef(f) => strip_funcdef(f),
            Decl::GlobalVarDef(g) => {
                g.loc = Loc::fake();
                strip_vardef(&mut g.vardef);
                strip_expr(&mut g.value);
            }
            Decl::Import(imp) => {
                imp.loc = Loc::fake();
                imp.loc_asname = Loc::fake();
            }
        }
    }
}

fn strip_funcdef(f: &mut FuncDef) {
    f.loc = Loc::fake();
    f.prototype_loc = Loc::fake();
    f.symtable = None;
    for arg in &mut f.args {
        arg.loc = Loc::fake();
        strip_expr(&mut arg.ty);
    }
    strip_expr(&mut f.return_type);
    for stmt in &mut f.body {
        strip_stmt(stmt);
    }
}

fn strip_vardef(v: &mut VarDef) {
    v.loc = Loc::fake();
    v.name.loc = Loc::fake();
    strip_expr(&mut v.ty);
}

fn strip_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Pass { loc } | Stmt::Break { loc } | Stmt::Continue { loc } => *loc = Loc::fake(),
        Stmt::Expr { loc, value } | Stmt::Return { loc, value } => {
            *loc = Loc::fake();
            strip_expr(value);
        }
        Stmt::FuncDef(f) => strip_funcdef(f),
        Stmt::VarDef(v) => strip_vardef(v),
        Stmt::Assign { loc, target, value } => {
            *loc = Loc::fake();
            target.loc = Loc::fake();
            strip_expr(value);
        }
        Stmt::AssignCell { loc, value, .. } => {
            *loc = Loc::fake();
            strip_expr(value);
        }
        Stmt::UnpackAssign { loc, targets, value } => {
            *loc = Loc::fake();
            for t in targets {
                t.loc = Loc::fake();
            }
            strip_expr(value);
        }
        Stmt::AugAssign { loc, target, value, .. } => {
            *loc = Loc::fake();
            target.loc = Loc::fake();
            strip_expr(value);
        }
        Stmt::SetItem {
            loc,
            target,
            index,
            value,
        } => {
            *loc = Loc::fake();
            strip_expr(target);
            strip_expr(index);
            strip_expr(value);
        }
        Stmt::SetAttr { loc, target, attr, value } => {
            *loc = Loc::fake();
            strip_expr(target);
            attr.loc = Loc::fake();
            strip_expr(value);
        }
        Stmt::If {
            loc,
            test,
            then_body,
            else_body,
        } => {
            *loc = Loc::fake();
            strip_expr(test);
            for s in then_body.iter_mut().chain(else_body) {
                strip_stmt(s);
            }
        }
        Stmt::While { loc, test, body } => {
            *loc = Loc::fake();
            strip_expr(test);
            for s in body {
                strip_stmt(s);
            }
        }
        Stmt::For {
            loc, target, iter, body, ..
        } => {
            *loc = Loc::fake();
            target.loc = Loc::fake();
            strip_expr(iter);
            for s in body {
                strip_stmt(s);
            }
        }
        Stmt::Raise { loc, exc } => {
            *loc = Loc::fake();
            strip_expr(exc);
        }
        Stmt::Assert { loc, test, msg } => {
            *loc = Loc::fake();
            strip_expr(test);
            if let Some(m) = msg {
                strip_expr(m);
            }
        }
    }
}

fn strip_expr(expr: &mut Expr) {
    match expr {
        Expr::Auto { loc }
        | Expr::Constant { loc, .. }
        | Expr::FqnConst { loc, .. }
        | Expr::Name { loc, .. }
        | Expr::NameLocal { loc, .. }
        | Expr::NameCell { loc, .. } => *loc = Loc::fake(),
        Expr::BinOp { loc, left, right, .. } | Expr::CmpOp { loc, left, right, .. } => {
            *loc = Loc::fake();
            strip_expr(left);
            strip_expr(right);
        }
        Expr::UnaryOp { loc, value, .. } => {
            *loc = Loc::fake();
            strip_expr(value);
        }
        Expr::Call { loc, func, args } => {
            *loc = Loc::fake();
            strip_expr(func);
            for a in args {
                strip_expr(a);
            }
        }
        Expr::GetItem { loc, value, index } => {
            *loc = Loc::fake();
            strip_expr(value);
            strip_expr(index);
        }
        Expr::GetAttr { loc, value, attr } => {
            *loc = Loc::fake();
            strip_expr(value);
            attr.loc = Loc::fake();
        }
        Expr::Tuple { loc, items } | Expr::List { loc, items } => {
            *loc = Loc::fake();
            for i in items {
                strip_expr(i);
            }
        }
    }
}
