use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::Color;
use crate::location::Loc;

/// Whether a name may be re-assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Var,
    Const,
}

/// How a symbol acquired its [`VarKind`].
///
/// `Auto` consts (introduced by a plain first assignment) can later be
/// promoted to vars by a second assignment; explicit ones cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKindOrigin {
    Explicit,
    Auto,
    FuncDef,
    GlobalConst,
    RedParam,
    BlueParam,
}

/// Where the value of a symbol lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarStorage {
    /// A slot in the frame's local store.
    Direct,
    /// A module-level mutable cell, addressed by FQN.
    Cell,
    /// Unresolved name; reading it raises at evaluation time.
    Unresolved,
}

/// The kind of scope a symbol was defined in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Builtins,
    Module,
    Function,
}

/// Reference to an imported entity, attached to symbols introduced by
/// `import` declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRef {
    pub modname: String,
    pub attr: Option<String>,
}

impl ImportRef {
    pub fn spy_name(&self) -> String {
        match &self.attr {
            Some(attr) => format!("{}.{}", self.modname, attr),
            None => self.modname.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub varkind: VarKind,
    pub origin: VarKindOrigin,
    pub storage: VarStorage,
    /// Scope distance from the use site: 0 = defined here, >0 = captured from
    /// an outer scope, -1 = unresolved.
    pub level: i32,
    /// Kind of the scope the symbol was *defined* in.
    pub defined_in: ScopeKind,
    pub loc: Loc,
    /// Location of the declared type (or of the expression the type was
    /// inferred from).
    pub type_loc: Loc,
    pub impref: Option<ImportRef>,
}

impl Symbol {
    pub fn is_local(&self) -> bool {
        self.level == 0
    }

    #[must_use]
    pub fn with_level(&self, level: i32) -> Self {
        let mut sym = self.clone();
        sym.level = level;
        sym
    }

    #[must_use]
    pub fn with_varkind(&self, varkind: VarKind) -> Self {
        let mut sym = self.clone();
        sym.varkind = varkind;
        sym
    }
}

/// The symbol table of one scope (builtins, a module, or a function).
///
/// After the scope analyzer's `declare` pass it contains the names defined
/// in the scope; after the `flatten` pass it additionally contains every
/// outer name the scope references, with the capture level recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymTable {
    pub name: String,
    pub color: Color,
    pub kind: ScopeKind,
    symbols: IndexMap<String, Symbol>,
}

impl SymTable {
    pub fn new(name: impl Into<String>, color: Color, kind: ScopeKind) -> Self {
        Self {
            name: name.into(),
            color,
            kind,
            symbols: IndexMap::new(),
        }
    }

    pub fn add(&mut self, sym: Symbol) {
        self.symbols.insert(sym.name.clone(), sym);
    }

    pub fn replace(&mut self, sym: Symbol) {
        self.symbols.insert(sym.name.clone(), sym);
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// True when the scope itself defines `name` (as opposed to capturing it).
    pub fn has_definition(&self, name: &str) -> bool {
        self.symbols.get(name).is_some_and(Symbol::is_local)
    }

    pub fn lookup_definition(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name).filter(|s| s.is_local())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Debug dump, used by the `symtable` CLI subcommand.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "<symtable `{}` ({:?}, {:?})>", self.name, self.color, self.kind);
        for sym in self.symbols.values() {
            let _ = writeln!(
                out,
                "    {:<12} {:?}/{:?} storage={:?} level={}",
                sym.name, sym.varkind, sym.origin, sym.storage, sym.level
            );
        }
        out
    }
}
