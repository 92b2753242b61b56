//! The SPy type objects.
//!
//! The object model is ObjVlisp: `object` is the root, `type` is a subclass
//! of `object` and the metaclass of every type including itself. Types are
//! first-class values ([`crate::object::Object::Type`]); their member dicts
//! are interior-mutable while the type is being defined and frozen afterward.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::fqn::Fqn;
use crate::object::Object;

/// Interp-level discriminator used for dispatch, parallel to the app-level
/// type identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PyClass {
    Object,
    Type,
    NoneType,
    Bool,
    I8,
    U8,
    I32,
    U32,
    F32,
    F64,
    Str,
    Dynamic,
    Tuple,
    List,
    Dict,
    Func,
    Module,
    MetaArg,
    OpSpec,
    OpImpl,
    Range,
    Exc,
}

/// How instances of a type are stored by the C backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageCategory {
    Value,
    Reference,
}

#[derive(Debug)]
pub struct TypeData {
    fqn: Fqn,
    base: RefCell<Option<Type>>,
    pyclass: PyClass,
    storage: StorageCategory,
    dict: RefCell<IndexMap<String, Object>>,
    frozen: Cell<bool>,
}

/// A shared handle to a type object. Equality is identity.
#[derive(Debug, Clone)]
pub struct Type(Rc<TypeData>);

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Type {}

impl Type {
    pub fn new(fqn: Fqn, base: Option<Type>, pyclass: PyClass, storage: StorageCategory) -> Self {
        Self(Rc::new(TypeData {
            fqn,
            base: RefCell::new(base),
            pyclass,
            storage,
            dict: RefCell::new(IndexMap::new()),
            frozen: Cell::new(false),
        }))
    }

    pub fn fqn(&self) -> Fqn {
        self.0.fqn
    }

    pub fn base(&self) -> Option<Type> {
        self.0.base.borrow().clone()
    }

    /// Used only while bootstrapping the `object`/`type` pair.
    pub fn set_base(&self, base: Type) {
        debug_assert!(!self.0.frozen.get());
        *self.0.base.borrow_mut() = Some(base);
    }

    pub fn pyclass(&self) -> PyClass {
        self.0.pyclass
    }

    pub fn storage(&self) -> StorageCategory {
        self.0.storage
    }

    /// Stable identity for cache keys.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Adds a member (method, metafunction, class attr) to the type dict.
    ///
    /// # Panics
    /// Panics if the type has already been frozen.
    pub fn define(&self, name: &str, value: Object) {
        assert!(!self.0.frozen.get(), "type dict is frozen");
        self.0.dict.borrow_mut().insert(name.to_owned(), value);
    }

    /// Freezes the member dict; definition is over.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    /// Looks a member up on this type only.
    pub fn lookup_own(&self, name: &str) -> Option<Object> {
        self.0.dict.borrow().get(name).cloned()
    }

    /// Looks a member up along the base-type chain.
    pub fn lookup(&self, name: &str) -> Option<Object> {
        let mut ty = Some(self.clone());
        while let Some(t) = ty {
            if let Some(obj) = t.lookup_own(name) {
                return Some(obj);
            }
            ty = t.base();
        }
        None
    }

    pub fn members(&self) -> Vec<(String, Object)> {
        self.0.dict.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
