//! The universal value type.
//!
//! Every value has an interp-level tag (the enum variant) and an app-level
//! type (reachable via `Vm::dynamic_type`). Immediate values are stored
//! inline; aggregates and everything with identity sit behind an `Rc`.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::errors::ErrorKind;
use crate::fqn::{Fqn, FqnTable};
use crate::function::FuncRef;
use crate::metaarg::MetaArg;
use crate::module::ModuleRef;
use crate::opimpl::OpImpl;
use crate::opspec::OpSpec;
use crate::types::Type;

/// A frame environment: the local store of one function activation, shared
/// with the closures created inside it.
pub type Env = Rc<RefCell<IndexMap<String, Object>>>;

/// An app-level exception value, as produced by `TypeError('...')`.
///
/// Only blue exception values exist for now; `raise` lowers to
/// `operator::raise` during redshift.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcValue {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub struct ListData {
    /// The `list[T]` instance type of this value.
    pub ty: Type,
    pub items: RefCell<Vec<Object>>,
}

#[derive(Debug, Clone)]
pub struct ListRef(pub Rc<ListData>);

impl ListRef {
    pub fn new(ty: Type, items: Vec<Object>) -> Self {
        Self(Rc::new(ListData {
            ty,
            items: RefCell::new(items),
        }))
    }
}

#[derive(Debug)]
pub struct DictData {
    /// The `dict[K, V]` instance type of this value.
    pub ty: Type,
    /// Keyed by the structural key of the key object; insertion-ordered.
    pub entries: RefCell<IndexMap<Key, (Object, Object)>>,
}

#[derive(Debug, Clone)]
pub struct DictRef(pub Rc<DictData>);

impl DictRef {
    pub fn new(ty: Type) -> Self {
        Self(Rc::new(DictData {
            ty,
            entries: RefCell::new(IndexMap::new()),
        }))
    }
}

/// A half-open integer range, the value produced by `range(n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i32,
    pub stop: i32,
}

#[derive(Debug, Clone)]
pub enum Object {
    None,
    Bool(bool),
    I8(i8),
    U8(u8),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
    Str(Rc<str>),
    Tuple(Rc<Vec<Object>>),
    List(ListRef),
    Dict(DictRef),
    Range(RangeValue),
    Type(Type),
    Func(FuncRef),
    Module(ModuleRef),
    MetaArg(Rc<MetaArg>),
    OpSpec(Rc<OpSpec>),
    OpImpl(Rc<OpImpl>),
    Exc(Rc<ExcValue>),
}

impl Object {
    pub fn from_str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    /// Identity comparison: value equality for immediates, pointer equality
    /// for everything that has identity. Used by `reverse_lookup_global`.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Range(a), Self::Range(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Func(a), Self::Func(b)) => a == b,
            (Self::Module(a), Self::Module(b)) => a == b,
            (Self::MetaArg(a), Self::MetaArg(b)) => Rc::ptr_eq(a, b),
            (Self::OpSpec(a), Self::OpSpec(b)) => Rc::ptr_eq(a, b),
            (Self::OpImpl(a), Self::OpImpl(b)) => Rc::ptr_eq(a, b),
            (Self::Exc(a), Self::Exc(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            Self::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncRef> {
        match self {
            Self::Func(f) => Some(f),
            _ => None,
        }
    }

    /// The hashable structural summary that keys the blue cache.
    ///
    /// Primitives map to themselves, types to their FQN, functions and other
    /// identity-carrying values to their identity, aggregates recursively.
    pub fn spy_key(&self) -> Key {
        match self {
            Self::None => Key::None,
            Self::Bool(v) => Key::Bool(*v),
            Self::I8(v) => Key::I8(*v),
            Self::U8(v) => Key::U8(*v),
            Self::I32(v) => Key::I32(*v),
            Self::U32(v) => Key::U32(*v),
            Self::F32(v) => Key::F32(v.to_bits()),
            Self::F64(v) => Key::F64(v.to_bits()),
            Self::Str(s) => Key::Str(Rc::clone(s)),
            Self::Tuple(items) => Key::Tuple(items.iter().map(Self::spy_key).collect()),
            Self::List(l) => Key::List(l.0.items.borrow().iter().map(Self::spy_key).collect()),
            Self::Dict(d) => Key::Dict(
                d.0.entries
                    .borrow()
                    .values()
                    .map(|(k, v)| (k.spy_key(), v.spy_key()))
                    .collect(),
            ),
            Self::Range(r) => Key::Range(r.start, r.stop),
            Self::Type(t) => Key::Fqn(t.fqn()),
            Self::Func(f) => Key::Identity(f.id()),
            Self::Module(m) => Key::Fqn(m.fqn()),
            Self::MetaArg(ma) => ma.spy_key(),
            Self::OpSpec(s) => Key::Identity(Rc::as_ptr(s) as usize),
            Self::OpImpl(i) => Key::Identity(Rc::as_ptr(i) as usize),
            Self::Exc(e) => Key::Tuple(vec![
                Key::Str(Rc::from(<&'static str>::from(e.kind))),
                Key::Str(Rc::from(e.message.as_str())),
            ]),
        }
    }

    /// App-level `str()` of the value, used by `print`.
    pub fn str_w(&self, fqns: &FqnTable) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            _ => self.repr(fqns),
        }
    }

    /// App-level `repr()` of the value.
    pub fn repr(&self, fqns: &FqnTable) -> String {
        match self {
            Self::None => "None".to_owned(),
            Self::Bool(true) => "True".to_owned(),
            Self::Bool(false) => "False".to_owned(),
            Self::I8(v) => v.to_string(),
            Self::U8(v) => v.to_string(),
            Self::I32(v) => v.to_string(),
            Self::U32(v) => v.to_string(),
            Self::F32(v) => format_float(f64::from(*v)),
            Self::F64(v) => format_float(*v),
            Self::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|o| o.repr(fqns)).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Self::List(l) => {
                let inner: Vec<String> = l.0.items.borrow().iter().map(|o| o.repr(fqns)).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Dict(d) => {
                let mut out = String::from("{");
                for (i, (k, v)) in d.0.entries.borrow().values().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}: {}", k.repr(fqns), v.repr(fqns));
                }
                out.push('}');
                out
            }
            Self::Range(r) => format!("range({}, {})", r.start, r.stop),
            Self::Type(t) => format!("<spy type `{}`>", fqns.human(t.fqn())),
            Self::Func(f) => format!("<spy function `{}`>", fqns.render(f.fqn())),
            Self::Module(m) => format!("<spy module `{}`>", m.name()),
            Self::MetaArg(ma) => ma.repr(fqns),
            Self::OpSpec(_) => "<spy OpSpec>".to_owned(),
            Self::OpImpl(_) => "<spy OpImpl>".to_owned(),
            Self::Exc(e) => format!("{}('{}')", <&'static str>::from(e.kind).trim_start_matches("W_"), e.message),
        }
    }
}

/// Python-style float formatting: integral floats keep a trailing `.0`.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v == v.trunc() && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// The hashable summary of an [`Object`], produced by `spy_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Bool(bool),
    I8(i8),
    U8(u8),
    I32(i32),
    U32(u32),
    F32(u32),
    F64(u64),
    Str(Rc<str>),
    Fqn(Fqn),
    Identity(usize),
    Range(i32, i32),
    Tuple(Vec<Key>),
    List(Vec<Key>),
    Dict(Vec<(Key, Key)>),
    MetaArg {
        blue: bool,
        ty: Box<Key>,
        value: Option<Box<Key>>,
    },
}
