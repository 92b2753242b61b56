//! The VM kernel.
//!
//! Owns the module registry, the global namespace keyed by FQN, the blue
//! cache memoizing blue calls, and the call paths. Everything else (frames,
//! the redshifter, the import analyzer) borrows the VM mutably for the
//! duration of one operation; the VM itself is single-threaded and not
//! reentrant.

use std::path::PathBuf;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::ast::Color;
use crate::bluecache::BlueCache;
use crate::builtins::{self, Builtins};
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::fqn::{Fqn, FqnTable};
use crate::frame;
use crate::function::{BuiltinBody, BuiltinEnv, FuncBody, FuncParam, FuncRef, FuncType};
use crate::importing;
use crate::io::{PrintWriter, StdPrint};
use crate::location::Loc;
use crate::metaarg::MetaArg;
use crate::module::ModuleRef;
use crate::object::Object;
use crate::opimpl::OpImpl;
use crate::operators::{self, impls, Operators};
use crate::opspec::OpSpec;
use crate::redshift::{self, ErrorMode};
use crate::registry::ModuleRegistry;
use crate::symtable::VarKind;
use crate::types::{PyClass, Type};

/// A virtual machine executing SPy code, both symbolically (blue) and
/// concretely (red).
pub struct Vm {
    pub fqns: FqnTable,
    pub b: Builtins,
    pub ops: Operators,
    globals: IndexMap<Fqn, Object>,
    globals_types: AHashMap<Fqn, Type>,
    modules: IndexMap<String, ModuleRef>,
    unique_fqns: AHashSet<Fqn>,
    bluecache: BlueCache,
    /// Search path for `.spy` source files.
    pub path: Vec<PathBuf>,
    serial: u64,
    pub out: Box<dyn PrintWriter>,
    /// When set, `assert` statements are evaluated at run time.
    pub runtime_assert: bool,
    /// Warning sink for the lazy redshift error modes.
    pub warnings: Vec<SpyError>,
    /// When set, `.spyc` cache failures are collected instead of raised.
    pub cache_robust: bool,
    pub cache_errors: Vec<String>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_writer(Box::new(StdPrint))
    }

    pub fn with_writer(out: Box<dyn PrintWriter>) -> Self {
        let mut fqns = FqnTable::new();
        let b = Builtins::create(&mut fqns);
        let ops = operators::create(&mut fqns, &b);
        let mut vm = Self {
            fqns,
            b,
            ops,
            globals: IndexMap::new(),
            globals_types: AHashMap::new(),
            modules: IndexMap::new(),
            unique_fqns: AHashSet::new(),
            bluecache: BlueCache::new(),
            path: Vec::new(),
            serial: 0,
            out,
            runtime_assert: false,
            warnings: Vec::new(),
            cache_robust: false,
            cache_errors: Vec::new(),
        };
        builtins::install(&mut vm).expect("builtins bootstrap cannot fail");
        operators::install(&mut vm).expect("operator bootstrap cannot fail");
        for ty in vm.b.all_types() {
            ty.freeze();
        }
        vm
    }

    // ===================================================================
    // meta-argument construction

    pub fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    pub fn red_arg(&mut self, ty: Type, value: Option<Object>, loc: Loc) -> MetaArg {
        let serial = self.next_serial();
        MetaArg::red(serial, ty, value, loc)
    }

    /// A blue arg whose static type is the dynamic type of the value.
    pub fn blue_arg(&mut self, value: Object, loc: Loc) -> MetaArg {
        let ty = self.dynamic_type(&value);
        let serial = self.next_serial();
        MetaArg::blue(serial, ty, value, loc)
    }

    /// A blue arg with an explicit static type. "Blue dynamic" makes no
    /// sense (a blue value's type is precisely known), so `dynamic` narrows
    /// to the value's dynamic type.
    pub fn blue_arg_typed(&mut self, ty: Type, value: Object, loc: Loc) -> MetaArg {
        let ty = if ty.pyclass() == PyClass::Dynamic {
            self.dynamic_type(&value)
        } else {
            ty
        };
        let serial = self.next_serial();
        MetaArg::blue(serial, ty, value, loc)
    }

    // ===================================================================
    // type machinery

    pub fn dynamic_type(&self, obj: &Object) -> Type {
        match obj {
            Object::None => self.b.nonetype.clone(),
            Object::Bool(_) => self.b.bool_.clone(),
            Object::I8(_) => self.b.i8.clone(),
            Object::U8(_) => self.b.u8.clone(),
            Object::I32(_) => self.b.i32.clone(),
            Object::U32(_) => self.b.u32.clone(),
            Object::F32(_) => self.b.f32.clone(),
            Object::F64(_) => self.b.f64.clone(),
            Object::Str(_) => self.b.str_.clone(),
            Object::Tuple(_) => self.b.tuple.clone(),
            Object::List(l) => l.0.ty.clone(),
            Object::Dict(d) => d.0.ty.clone(),
            Object::Range(_) => self.b.range.clone(),
            Object::Type(_) => self.b.type_.clone(),
            Object::Func(_) => self.b.func.clone(),
            Object::Module(_) => self.b.module.clone(),
            Object::MetaArg(_) => self.b.metaarg.clone(),
            Object::OpSpec(_) => self.b.opspec.clone(),
            Object::OpImpl(_) => self.b.opimpl.clone(),
            Object::Exc(e) => self
                .b
                .exc_type(e.kind)
                .cloned()
                .unwrap_or_else(|| self.b.exception.clone()),
        }
    }

    pub fn issubclass(&self, sub: &Type, sup: &Type) -> bool {
        if sup.pyclass() == PyClass::Dynamic {
            return true;
        }
        let mut cur = Some(sub.clone());
        while let Some(ty) = cur {
            if ty == *sup {
                return true;
            }
            cur = ty.base();
        }
        false
    }

    /// The most precise common supertype of `a` and `b`.
    pub fn union_type(&self, a: &Type, b: &Type) -> Type {
        if self.issubclass(a, b) {
            return b.clone();
        }
        if self.issubclass(b, a) {
            return a.clone();
        }
        match (a.base(), b.base()) {
            (Some(ab), Some(bb)) => self.union_type(&ab, &bb),
            _ => self.b.object.clone(),
        }
    }

    pub fn isinstance(&self, obj: &Object, ty: &Type) -> bool {
        let got = self.dynamic_type(obj);
        self.issubclass(&got, ty)
    }

    /// Like `isinstance`, but raises `W_TypeError` on failure.
    pub fn typecheck(&self, obj: &Object, ty: &Type) -> SpyResult<()> {
        if self.isinstance(obj, ty) {
            return Ok(());
        }
        let exp = self.fqns.human(ty.fqn());
        let got = self.fqns.human(self.dynamic_type(obj).fqn());
        Err(SpyError::new(
            ErrorKind::TypeError,
            format!("Invalid cast. Expected `{exp}`, got `{got}`"),
        ))
    }

    pub fn make_list_type(&mut self, item: &Type) -> SpyResult<Type> {
        impls::instantiate_list_type(self, item)
    }

    pub fn make_dict_type(&mut self, key: &Type, value: &Type) -> SpyResult<Type> {
        impls::instantiate_dict_type(self, key, value)
    }

    // ===================================================================
    // globals

    pub fn add_global(&mut self, fqn: Fqn, ty: Option<Type>, value: Object) -> SpyResult<()> {
        if self.globals.contains_key(&fqn) {
            let name = self.fqns.render(fqn);
            return Err(SpyError::new(
                ErrorKind::ValueError,
                format!("global `{name}` already defined"),
            ));
        }
        let ty = match ty {
            Some(ty) => {
                self.typecheck(&value, &ty)?;
                ty
            }
            None => self.dynamic_type(&value),
        };
        self.unique_fqns.insert(fqn);
        self.globals_types.insert(fqn, ty);
        self.globals.insert(fqn, value);
        Ok(())
    }

    /// Module FQNs resolve to the module object itself.
    pub fn lookup_global(&self, fqn: Fqn) -> Option<Object> {
        if self.fqns.is_module(fqn) {
            return self.modules.get(self.fqns.modname(fqn)).map(|m| Object::Module(m.clone()));
        }
        self.globals.get(&fqn).cloned()
    }

    pub fn lookup_global_type(&self, fqn: Fqn) -> Option<Type> {
        self.globals_types.get(&fqn).cloned()
    }

    pub fn store_global(&mut self, fqn: Fqn, value: Object) -> SpyResult<()> {
        let Some(ty) = self.globals_types.get(&fqn).cloned() else {
            let name = self.fqns.render(fqn);
            return Err(SpyError::new(
                ErrorKind::ValueError,
                format!("global `{name}` does not exist"),
            ));
        };
        self.typecheck(&value, &ty)?;
        self.globals.insert(fqn, value);
        Ok(())
    }

    pub fn reverse_lookup_global(&self, value: &Object) -> Option<Fqn> {
        self.globals
            .iter()
            .find(|(_, obj)| obj.ptr_eq(value))
            .map(|(&fqn, _)| fqn)
    }

    /// Iterates over the global namespace in insertion order.
    pub fn globals_snapshot(&self) -> Vec<(Fqn, Object)> {
        self.globals.iter().map(|(&fqn, obj)| (fqn, obj.clone())).collect()
    }

    pub(crate) fn replace_global(&mut self, fqn: Fqn, value: Object) {
        let ty = self.dynamic_type(&value);
        self.globals_types.insert(fqn, ty);
        self.globals.insert(fqn, value);
    }

    /// Issues a fresh FQN under `namespace`, appending `#N` on collision.
    pub fn fresh_global_fqn(&mut self, namespace: Fqn, name: &str) -> Fqn {
        let fqn = self.fqns.join(namespace, name);
        if self.unique_fqns.insert(fqn) {
            return fqn;
        }
        for n in 1u32.. {
            let fqn = self.fqns.join(namespace, &format!("{name}#{n}"));
            if self.unique_fqns.insert(fqn) {
                return fqn;
            }
        }
        unreachable!("FQN counter exhausted")
    }

    /// Returns an existing FQN for `value`, or assigns and registers one.
    ///
    /// Used when a blue expression produces a value (a closure, a
    /// specialized function, a type) that residual code must reference.
    pub fn make_fqn_const(&mut self, value: &Object) -> SpyResult<Fqn> {
        if let Some(fqn) = self.reverse_lookup_global(value) {
            return Ok(fqn);
        }
        let fqn = match value {
            Object::Func(f) => f.fqn(),
            Object::Type(t) => t.fqn(),
            Object::Module(m) => return Ok(m.fqn()),
            other => {
                let repr = other.repr(&self.fqns);
                return Err(SpyError::new(
                    ErrorKind::PanicError,
                    format!("cannot create an FQN constant for {repr}"),
                ));
            }
        };
        self.add_global(fqn, None, value.clone())?;
        Ok(fqn)
    }

    // ===================================================================
    // modules

    pub fn register_module(&mut self, module: ModuleRef) -> SpyResult<()> {
        if self.modules.contains_key(module.name()) {
            return Err(SpyError::new(
                ErrorKind::ValueError,
                format!("module `{}` already registered", module.name()),
            ));
        }
        self.modules.insert(module.name().to_owned(), module);
        Ok(())
    }

    /// Turns a [`ModuleRegistry`] into a registered module with globals.
    pub fn make_module(&mut self, reg: ModuleRegistry) -> SpyResult<ModuleRef> {
        let module = ModuleRef::new(reg.name.clone(), reg.fqn, None);
        self.register_module(module.clone())?;
        for (fqn, attr, varkind, obj) in reg.content {
            if !self.globals.contains_key(&fqn) {
                self.add_global(fqn, None, obj)?;
            }
            module.add(&attr, fqn, varkind);
        }
        Ok(module)
    }

    pub fn module(&self, name: &str) -> Option<ModuleRef> {
        self.modules.get(name).cloned()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleRef> {
        self.modules.values()
    }

    /// Resolves an import reference (`import mod` / `import mod.attr`).
    pub fn lookup_import_ref(&self, modname: &str, attr: Option<&str>) -> Option<Object> {
        let module = self.modules.get(modname)?;
        match attr {
            None => Some(Object::Module(module.clone())),
            Some(attr) => {
                let fqn = module.getattr_fqn(attr)?;
                self.lookup_global(fqn)
            }
        }
    }

    pub fn find_file_on_path(&self, modname: &str, allow_py_files: bool) -> Option<PathBuf> {
        for dir in &self.path {
            let spy = dir.join(format!("{modname}.spy"));
            if spy.is_file() {
                return Some(spy);
            }
            if allow_py_files {
                let py = dir.join(format!("{modname}.py"));
                if py.is_file() {
                    return Some(py);
                }
            }
        }
        None
    }

    /// Statically resolves, loads and initializes `modname` and everything
    /// it imports, in dependency post-order.
    pub fn import_(&mut self, modname: &str) -> SpyResult<ModuleRef> {
        importing::import_module(self, modname)
    }

    /// Redshifts every red `ASTFunc` in the globals, repeating until no new
    /// ones appear.
    pub fn redshift(&mut self, error_mode: ErrorMode) -> SpyResult<()> {
        redshift::redshift_all(self, error_mode)
    }

    // ===================================================================
    // function registration

    /// Registers a builtin function under a deterministic FQN.
    ///
    /// Re-registering with an equivalent body (identical code, equal
    /// closed-over values) silently returns the existing function; a
    /// conflicting body is an error.
    #[expect(clippy::too_many_arguments, reason = "mirrors the registration protocol")]
    pub fn register_builtin_func(
        &mut self,
        namespace: Fqn,
        name: &str,
        qualifiers: &[Fqn],
        functype: FuncType,
        body: BuiltinBody,
        env: BuiltinEnv,
        pure: bool,
    ) -> SpyResult<FuncRef> {
        let fqn = self.fqns.join_q(namespace, name, qualifiers);
        let candidate = FuncRef::new_builtin(fqn, functype, body, env, pure);
        if let Some(existing) = self.globals.get(&fqn) {
            if let Object::Func(existing) = existing {
                if existing.equivalent_builtin(&candidate) {
                    return Ok(existing.clone());
                }
            }
            let name = self.fqns.render(fqn);
            return Err(SpyError::new(
                ErrorKind::ValueError,
                format!("conflicting registration for builtin `{name}`"),
            ));
        }
        self.add_global(fqn, None, Object::Func(candidate.clone()))?;
        if qualifiers.is_empty() && self.fqns.is_module(namespace) {
            let modname = self.fqns.modname(namespace).to_owned();
            if let Some(module) = self.modules.get(&modname) {
                module.add(name, fqn, VarKind::Const);
            }
        }
        Ok(candidate)
    }

    /// Per-FQN accessor used to read a module-level `var` from residual
    /// code.
    pub(crate) fn module_getattr_accessor(&mut self, target: Fqn) -> SpyResult<FuncRef> {
        let restype = self
            .lookup_global_type(target)
            .unwrap_or_else(|| self.b.dynamic.clone());
        let ns = self.ops.module_fqn;
        let rendered = self.fqns.render(target);
        self.register_builtin_func(
            ns,
            "module_get",
            &[target],
            FuncType::new(vec![], restype, Color::Red),
            BuiltinBody::Plain(module_get_impl),
            BuiltinEnv(vec![Object::from_str(&rendered)]),
            false,
        )
    }

    /// Per-FQN accessor used to write a module-level `var`.
    pub(crate) fn module_setattr_accessor(&mut self, target: Fqn) -> SpyResult<FuncRef> {
        let value_ty = self
            .lookup_global_type(target)
            .unwrap_or_else(|| self.b.dynamic.clone());
        let ns = self.ops.module_fqn;
        let rendered = self.fqns.render(target);
        self.register_builtin_func(
            ns,
            "module_set",
            &[target],
            FuncType::new(
                vec![FuncParam { name: "value".into(), ty: value_ty }],
                self.b.nonetype.clone(),
                Color::Red,
            ),
            BuiltinBody::Plain(module_set_impl),
            BuiltinEnv(vec![Object::from_str(&rendered)]),
            false,
        )
    }

    // ===================================================================
    // calls

    /// Typechecks the arguments against the function signature, then
    /// invokes. Blue calls consult the blue cache first.
    pub fn call(&mut self, func: &FuncRef, args: &[Object]) -> SpyResult<Object> {
        let functype = func.functype();
        if functype.arity() != args.len() {
            let name = self.fqns.human(func.fqn());
            return Err(SpyError::new(
                ErrorKind::TypeError,
                format!(
                    "this function takes {} arguments but {} were supplied",
                    functype.arity(),
                    args.len()
                ),
            )
            .with(
                crate::errors::Severity::Note,
                format!("while calling `{name}`"),
                Loc::fake(),
            ));
        }
        let params: Vec<Type> = functype.params.iter().map(|p| p.ty.clone()).collect();
        for (param_ty, arg) in params.iter().zip(args) {
            self.typecheck(arg, param_ty)?;
        }
        if func.color() == Color::Blue {
            let args_key = BlueCache::args_key(args);
            if let Some(result) = self.bluecache.lookup(func, &args_key) {
                return Ok(result);
            }
            let result = self.fast_call(func, args)?;
            self.bluecache.record(func, args_key, result.clone());
            return Ok(result);
        }
        self.fast_call(func, args)
    }

    /// Like `call`, without the argument-shape typecheck. Used from
    /// VM-internal code paths that have already validated.
    pub fn fast_call(&mut self, func: &FuncRef, args: &[Object]) -> SpyResult<Object> {
        match func.body() {
            FuncBody::Builtin(bf) => match bf.body {
                BuiltinBody::Plain(f) => f(self, &bf.env, args),
                BuiltinBody::Metafunc(f) => {
                    let metaargs = unwrap_metaargs(args)?;
                    let spec = f(self, &bf.env, &metaargs)?;
                    Ok(Object::OpSpec(Rc::new(spec)))
                }
                BuiltinBody::Operator(f) => {
                    let metaargs = unwrap_metaargs(args)?;
                    let opimpl = f(self, &bf.env, &metaargs)?;
                    Ok(Object::OpImpl(Rc::new(opimpl)))
                }
            },
            FuncBody::Ast(ast) => {
                if ast.invalid.get() {
                    if let Some(twin) = ast.redshifted_into.borrow().clone() {
                        return self.fast_call(&twin, args);
                    }
                }
                frame::call_ast(self, func, args)
            }
        }
    }

    /// Invokes a metafunction with a list of meta-arguments.
    pub fn fast_metacall(&mut self, func: &FuncRef, args: &[MetaArg]) -> SpyResult<OpSpec> {
        match func.body() {
            FuncBody::Builtin(bf) => match bf.body {
                BuiltinBody::Metafunc(f) => f(self, &bf.env, args),
                _ => Err(SpyError::new(ErrorKind::PanicError, "not a metafunction")),
            },
            FuncBody::Ast(_) => {
                // app-level metafunctions: call with wrapped MetaArg objects
                let wrapped: Vec<Object> = args.iter().map(|ma| Object::MetaArg(Rc::new(ma.clone()))).collect();
                match self.call(func, &wrapped)? {
                    Object::OpSpec(spec) => Ok((*spec).clone()),
                    other => {
                        let repr = other.repr(&self.fqns);
                        Err(SpyError::new(
                            ErrorKind::TypeError,
                            format!("metafunction did not return an OpSpec, got {repr}"),
                        ))
                    }
                }
            }
        }
    }

    /// Invokes a dispatch operator, memoizing through the blue cache.
    pub fn call_op(&mut self, func: &FuncRef, args: &[MetaArg]) -> SpyResult<Rc<OpImpl>> {
        let args_key: crate::bluecache::ArgsKey = args.iter().map(MetaArg::spy_key).collect();
        if let Some(Object::OpImpl(cached)) = self.bluecache.lookup(func, &args_key) {
            return Ok(cached);
        }
        let FuncBody::Builtin(bf) = func.body() else {
            return Err(SpyError::new(ErrorKind::PanicError, "operators are builtin functions"));
        };
        let BuiltinBody::Operator(f) = bf.body else {
            return Err(SpyError::new(ErrorKind::PanicError, "not an operator"));
        };
        let opimpl = Rc::new(f(self, &bf.env, args)?);
        self.bluecache
            .record(func, args_key, Object::OpImpl(Rc::clone(&opimpl)));
        Ok(opimpl)
    }

    /// `call_generic(f, [T0], [a0, a1])` ≡ `call(call(f, [T0]), [a0, a1])`.
    pub fn call_generic(
        &mut self,
        func: &FuncRef,
        generic_args: &[Object],
        args: &[Object],
    ) -> SpyResult<Object> {
        let specialized = self.call(func, generic_args)?;
        let Object::Func(specialized) = specialized else {
            let name = self.fqns.render(func.fqn());
            return Err(SpyError::new(
                ErrorKind::TypeError,
                format!("generic `{name}` did not produce a function"),
            ));
        };
        self.call(&specialized, args)
    }

    // ===================================================================
    // operator helpers

    fn dispatch_binary(&mut self, op: FuncRef, a: &Object, b: &Object) -> SpyResult<Object> {
        let ta = self.dynamic_type(a);
        let tb = self.dynamic_type(b);
        let ma = self.red_arg(ta, Some(a.clone()), Loc::fake());
        let mb = self.red_arg(tb, Some(b.clone()), Loc::fake());
        let opimpl = self.call_op(&op, &[ma, mb])?;
        opimpl.execute(self, &[a.clone(), b.clone()])
    }

    pub fn eq(&mut self, a: &Object, b: &Object) -> SpyResult<Object> {
        let op = self.ops.eq.clone();
        self.dispatch_binary(op, a, b)
    }

    pub fn ne(&mut self, a: &Object, b: &Object) -> SpyResult<Object> {
        let op = self.ops.ne.clone();
        self.dispatch_binary(op, a, b)
    }

    pub fn getitem(&mut self, obj: &Object, index: &Object) -> SpyResult<Object> {
        let op = self.ops.getitem.clone();
        self.dispatch_binary(op, obj, index)
    }

    /// Equality that never fails: unrelated types compare unequal instead of
    /// raising. Used for caching and anywhere arbitrary objects must be
    /// compared.
    pub fn universal_eq(&self, a: &Object, b: &Object) -> bool {
        // MetaArg pairs compare structurally to break the recursion between
        // universal_eq and the blue cache
        if let (Object::MetaArg(a), Object::MetaArg(b)) = (a, b) {
            return a.metaarg_eq(b);
        }
        a.spy_key() == b.spy_key()
    }

    pub fn universal_ne(&self, a: &Object, b: &Object) -> bool {
        !self.universal_eq(a, b)
    }

    pub fn is_true(&self, obj: &Object) -> bool {
        matches!(obj, Object::Bool(true))
    }

    /// App-level `str()` of a value.
    pub fn str_w(&self, obj: &Object) -> String {
        obj.str_w(&self.fqns)
    }

    pub fn bluecache_summary(&self) -> String {
        self.bluecache.summary(&self.fqns)
    }

    // ===================================================================
    // wrap/unwrap helpers (mostly for tests and builtins)

    pub fn unwrap_i32(&self, obj: &Object) -> SpyResult<i32> {
        obj.as_i32()
            .ok_or_else(|| SpyError::new(ErrorKind::TypeError, "expected an i32"))
    }

    pub fn unwrap_f64(&self, obj: &Object) -> SpyResult<f64> {
        obj.as_f64()
            .ok_or_else(|| SpyError::new(ErrorKind::TypeError, "expected an f64"))
    }

    pub fn unwrap_str(&self, obj: &Object) -> SpyResult<String> {
        obj.as_str()
            .map(str::to_owned)
            .ok_or_else(|| SpyError::new(ErrorKind::TypeError, "expected a str"))
    }

    pub fn unwrap_bool(&self, obj: &Object) -> SpyResult<bool> {
        obj.as_bool()
            .ok_or_else(|| SpyError::new(ErrorKind::TypeError, "expected a bool"))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn unwrap_metaargs(args: &[Object]) -> SpyResult<Vec<MetaArg>> {
    args.iter()
        .map(|obj| match obj {
            Object::MetaArg(ma) => Ok((**ma).clone()),
            _ => Err(SpyError::new(
                ErrorKind::TypeError,
                "metafunctions take MetaArg arguments",
            )),
        })
        .collect()
}

fn module_get_impl(vm: &mut Vm, env: &BuiltinEnv, _args: &[Object]) -> SpyResult<Object> {
    let rendered = env.get(0).as_str().expect("fqn in env").to_owned();
    let fqn = vm.fqns.parse(&rendered)?;
    vm.lookup_global(fqn).ok_or_else(|| {
        SpyError::new(
            ErrorKind::ValueError,
            format!("global `{rendered}` does not exist"),
        )
    })
}

fn module_set_impl(vm: &mut Vm, env: &BuiltinEnv, args: &[Object]) -> SpyResult<Object> {
    let rendered = env.get(0).as_str().expect("fqn in env").to_owned();
    let fqn = vm.fqns.parse(&rendered)?;
    vm.store_global(fqn, args[0].clone())?;
    Ok(Object::None)
}
