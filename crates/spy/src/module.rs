use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::fqn::Fqn;
use crate::symtable::VarKind;

#[derive(Debug)]
pub struct ModuleData {
    pub name: String,
    pub fqn: Fqn,
    pub filepath: Option<PathBuf>,
    /// Attribute name → FQN of the global holding the value, plus whether
    /// the attribute is a reassignable `var`.
    dict: RefCell<IndexMap<String, (Fqn, VarKind)>>,
}

/// A namespace of globals. The VM owns all modules; modules reference their
/// globals by FQN.
#[derive(Debug, Clone)]
pub struct ModuleRef(Rc<ModuleData>);

impl PartialEq for ModuleRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl ModuleRef {
    pub fn new(name: impl Into<String>, fqn: Fqn, filepath: Option<PathBuf>) -> Self {
        Self(Rc::new(ModuleData {
            name: name.into(),
            fqn,
            filepath,
            dict: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn fqn(&self) -> Fqn {
        self.0.fqn
    }

    pub fn filepath(&self) -> Option<&PathBuf> {
        self.0.filepath.as_ref()
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn add(&self, attr: &str, fqn: Fqn, varkind: VarKind) {
        self.0.dict.borrow_mut().insert(attr.to_owned(), (fqn, varkind));
    }

    pub fn getattr_fqn(&self, attr: &str) -> Option<Fqn> {
        self.0.dict.borrow().get(attr).map(|&(fqn, _)| fqn)
    }

    pub fn getattr_varkind(&self, attr: &str) -> Option<(Fqn, VarKind)> {
        self.0.dict.borrow().get(attr).copied()
    }

    pub fn attrs(&self) -> Vec<(String, Fqn)> {
        self.0.dict.borrow().iter().map(|(k, &(v, _))| (k.clone(), v)).collect()
    }
}
