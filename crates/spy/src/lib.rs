//! SPy: an ahead-of-time compiler and interpreter for a statically-typed,
//! Python-syntax language.
//!
//! The core is a multi-color evaluation engine: a single VM executes code
//! both symbolically ("blue", compile time) and concretely ("red", run
//! time), then *redshifts* each program into a fully monomorphized,
//! statically-typed residual form.
//!
//! Terminology note: SPy distinguishes interp-level code (this crate) from
//! app-level code (`.spy` files). App-level values are [`object::Object`]s;
//! app-level types are first-class [`types::Type`] values.

pub mod ast;
pub mod bluecache;
pub mod builtins;
pub mod errors;
pub mod fqn;
mod frame;
pub mod function;
pub mod importing;
pub mod io;
pub mod location;
pub mod metaarg;
pub mod module;
pub mod object;
pub mod opimpl;
pub mod operators;
pub mod opspec;
pub mod parse;
pub mod redshift;
pub mod registry;
pub mod render;
pub mod scope;
pub mod symtable;
pub mod typecheck;
pub mod types;
pub mod vm;

pub use crate::{
    ast::{Color, FuncKind},
    errors::{ErrorKind, Severity, SpyError, SpyResult},
    fqn::{Fqn, FqnTable},
    io::{CollectStringPrint, NoPrint, PrintWriter, SharedStringPrint, StdPrint},
    location::Loc,
    metaarg::MetaArg,
    object::Object,
    opimpl::OpImpl,
    opspec::OpSpec,
    redshift::ErrorMode,
    render::FqnFormat,
    types::Type,
    vm::Vm,
};
