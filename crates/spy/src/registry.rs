use crate::fqn::Fqn;
use crate::object::Object;
use crate::symtable::VarKind;

/// Keeps track of the objects belonging to a builtin module before the VM
/// turns it into a real module with [`crate::vm::Vm::make_module`].
#[derive(Debug)]
pub struct ModuleRegistry {
    pub name: String,
    pub fqn: Fqn,
    pub content: Vec<(Fqn, String, VarKind, Object)>,
}

impl ModuleRegistry {
    pub fn new(name: impl Into<String>, fqn: Fqn) -> Self {
        Self {
            name: name.into(),
            fqn,
            content: Vec::new(),
        }
    }

    /// Registers `fqn` as the attribute `attr` of the module.
    pub fn add(&mut self, attr: &str, fqn: Fqn, obj: Object) {
        self.content.push((fqn, attr.to_owned(), VarKind::Const, obj));
    }
}
