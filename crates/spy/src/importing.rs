//! The static import analyzer.
//!
//! The set of modules needed by a SPy program is determined ahead of time:
//! `import` is a declaration, not a statement with runtime effects. Starting
//! from a root module, the analyzer BFS-walks the `import` declarations,
//! parsing each module (or loading it from the on-disk `.spyc` cache), and
//! then initializes modules in a depth-first post-order of the dependency
//! graph, so that every module runs after all of its dependencies.
//!
//! Circular imports are currently rejected.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::ast::{Decl, Module};
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::frame;
use crate::module::ModuleRef;
use crate::scope;
use crate::vm::Vm;

/// Cache version: increment when the AST or symtable encoding changes.
pub const SPYC_VERSION: u32 = 1;

#[derive(Debug)]
pub enum ModEntry {
    /// Freshly parsed (or cache-loaded) module, not yet initialized.
    Parsed(Module),
    /// The module was already fully imported by the VM.
    Loaded(ModuleRef),
    /// No source file was found; using the module raises later.
    Failed,
}

pub struct ImportAnalyzer {
    queue: VecDeque<String>,
    pub mods: IndexMap<String, ModEntry>,
    /// modname → direct imports, in source order.
    deps: IndexMap<String, Vec<String>>,
    /// Modules whose AST (including symtables) came from the cache.
    cached: AHashSet<String>,
}

/// Entry point used by `Vm::import_`.
pub fn import_module(vm: &mut Vm, modname: &str) -> SpyResult<ModuleRef> {
    if let Some(module) = vm.module(modname) {
        return Ok(module);
    }
    let mut analyzer = ImportAnalyzer::new(modname);
    analyzer.parse_all(vm)?;
    match analyzer.mods.get(modname) {
        Some(ModEntry::Parsed(_) | ModEntry::Loaded(_)) => {}
        _ => {
            return Err(SpyError::new(
                ErrorKind::ImportError,
                format!("cannot import `{modname}`: module not found"),
            ));
        }
    }
    analyzer.import_all(vm)?;
    vm.module(modname)
        .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "imported module did not register"))
}

impl ImportAnalyzer {
    pub fn new(root: &str) -> Self {
        Self {
            queue: VecDeque::from([root.to_owned()]),
            mods: IndexMap::new(),
            deps: IndexMap::new(),
            cached: AHashSet::new(),
        }
    }

    /// Resolves the whole import graph, parsing (or cache-loading) each
    /// module exactly once.
    pub fn parse_all(&mut self, vm: &mut Vm) -> SpyResult<()> {
        while let Some(modname) = self.queue.pop_front() {
            if self.mods.contains_key(&modname) {
                continue;
            }
            if let Some(module) = vm.module(&modname) {
                self.mods.insert(modname, ModEntry::Loaded(module));
                continue;
            }
            let Some(source_file) = vm.find_file_on_path(&modname, false) else {
                self.mods.insert(modname, ModEntry::Failed);
                continue;
            };

            let cache_file = cache_path(&source_file);
            let mut module = None;
            if cache_is_fresh(&source_file, &cache_file) {
                match load_cache(&cache_file) {
                    Ok(Some(cached)) => {
                        tracing::debug!(module = %modname, "loaded from spyc cache");
                        self.cached.insert(modname.clone());
                        module = Some(cached);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        if vm.cache_robust {
                            vm.cache_errors.push(format!("{}: {err}", cache_file.display()));
                        }
                        // corrupted caches fall back to re-parsing
                    }
                }
            }
            let module = match module {
                Some(module) => module,
                None => {
                    let src = fs::read_to_string(&source_file).map_err(|e| {
                        SpyError::new(
                            ErrorKind::ImportError,
                            format!("cannot read `{}`: {e}", source_file.display()),
                        )
                    })?;
                    tracing::debug!(module = %modname, file = %source_file.display(), "parsing");
                    crate::parse::parse_source(&src, &source_file.to_string_lossy(), &modname)?
                }
            };

            let imports: Vec<String> = module
                .decls
                .iter()
                .filter_map(|decl| match decl {
                    Decl::Import(imp) => Some(imp.modname.clone()),
                    _ => None,
                })
                .collect();
            self.deps.insert(modname.clone(), imports.clone());
            self.mods.insert(modname, ModEntry::Parsed(module));
            for imported in imports {
                self.queue.push_back(imported);
            }
        }
        Ok(())
    }

    /// A deduplicated, depth-first, post-order traversal of the import
    /// graph: every module appears exactly once, after all its
    /// dependencies.
    pub fn get_import_list(&self) -> SpyResult<Vec<String>> {
        let mut result = Vec::with_capacity(self.mods.len());
        let mut done: AHashSet<&str> = AHashSet::new();
        let mut visiting: AHashSet<&str> = AHashSet::new();

        fn visit<'a>(
            analyzer: &'a ImportAnalyzer,
            modname: &'a str,
            done: &mut AHashSet<&'a str>,
            visiting: &mut AHashSet<&'a str>,
            result: &mut Vec<String>,
        ) -> SpyResult<()> {
            if done.contains(modname) {
                return Ok(());
            }
            if !visiting.insert(modname) {
                return Err(SpyError::new(
                    ErrorKind::ImportError,
                    format!("circular import involving `{modname}` (not supported)"),
                ));
            }
            for dep in analyzer.deps.get(modname).into_iter().flatten() {
                visit(analyzer, dep, done, visiting, result)?;
            }
            visiting.remove(modname);
            done.insert(modname);
            result.push(modname.to_owned());
            Ok(())
        }

        for modname in self.mods.keys() {
            visit(self, modname, &mut done, &mut visiting, &mut result)?;
        }
        Ok(result)
    }

    /// Runs the scope analyzer on each new module, saves its `.spyc`, and
    /// evaluates its top level with a module frame, in import order.
    pub fn import_all(&mut self, vm: &mut Vm) -> SpyResult<()> {
        let order = self.get_import_list()?;
        for modname in order {
            let Some(ModEntry::Parsed(module)) = self.mods.get_mut(&modname) else {
                continue;
            };
            if !self.cached.contains(&modname) {
                scope::analyze_module(vm, module)?;
                if let Some(source_file) = vm.find_file_on_path(&modname, false) {
                    if let Err(err) = save_cache(module, &source_file) {
                        if vm.cache_robust {
                            vm.cache_errors.push(format!("{}: {err}", source_file.display()));
                        }
                        // saving is best-effort either way
                    }
                }
            }
            let span = tracing::debug_span!("init_module", module = %modname);
            let _guard = span.enter();
            let fqn = vm.fqns.module(&modname);
            let filepath = vm.find_file_on_path(&modname, false);
            let module_ref = ModuleRef::new(modname.clone(), fqn, filepath);
            vm.register_module(module_ref.clone())?;
            frame::exec_module_body(vm, module, &module_ref)?;
        }
        Ok(())
    }

    /// The import tree in `tree(1)` format, for the `imports` subcommand.
    pub fn render_tree(&self) -> String {
        let mut imported: AHashSet<&str> = AHashSet::new();
        for deps in self.deps.values() {
            for dep in deps {
                imported.insert(dep);
            }
        }
        let roots: Vec<&str> = self
            .mods
            .keys()
            .map(String::as_str)
            .filter(|m| !imported.contains(m))
            .collect();

        fn print_node(
            analyzer: &ImportAnalyzer,
            out: &mut String,
            modname: &str,
            prefix: &str,
            marker: &str,
            indent: &str,
            seen: &mut AHashSet<String>,
        ) {
            if seen.contains(modname) {
                let _ = writeln!(out, "{prefix}{marker}{modname} (already seen)");
                return;
            }
            let _ = writeln!(out, "{prefix}{marker}{modname}");
            seen.insert(modname.to_owned());
            let deps = analyzer.deps.get(modname).cloned().unwrap_or_default();
            let new_prefix = format!("{prefix}{indent}");
            for (i, dep) in deps.iter().enumerate() {
                if i + 1 == deps.len() {
                    print_node(analyzer, out, dep, &new_prefix, "└── ", "    ", seen);
                } else {
                    print_node(analyzer, out, dep, &new_prefix, "├── ", "│   ", seen);
                }
            }
        }

        let mut out = String::new();
        for root in roots {
            let mut seen = AHashSet::new();
            print_node(self, &mut out, root, "", "", "", &mut seen);
        }
        out
    }

    /// The import order with the resolution of each module.
    pub fn render_list(&self) -> SpyResult<String> {
        let order = self.get_import_list()?;
        let width = order.iter().map(String::len).max().unwrap_or(0);
        let mut out = String::new();
        for (i, modname) in order.iter().enumerate() {
            let what = match self.mods.get(modname) {
                Some(ModEntry::Parsed(module)) => module.filename.clone(),
                Some(ModEntry::Loaded(_)) => "(already imported)".to_owned(),
                Some(ModEntry::Failed) | None => "ImportError".to_owned(),
            };
            let _ = writeln!(out, "{i:>3} {modname:>width$} => {what}");
        }
        Ok(out)
    }
}

// =======================================================================
// the .spyc cache

/// `<source-dir>/__pycache__/<stem>.spyc`
pub fn cache_path(source_file: &Path) -> PathBuf {
    let stem = source_file.file_stem().unwrap_or_default().to_string_lossy();
    source_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("__pycache__")
        .join(format!("{stem}.spyc"))
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// A cache file is usable only when its mtime exceeds the source's.
fn cache_is_fresh(source_file: &Path, cache_file: &Path) -> bool {
    match (mtime(source_file), mtime(cache_file)) {
        (Some(src), Some(cache)) => cache > src,
        _ => false,
    }
}

/// Loads a cached module; `Ok(None)` means a version mismatch (stale).
pub fn load_cache(cache_file: &Path) -> SpyResult<Option<Module>> {
    let bytes = fs::read(cache_file)
        .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("cannot read cache: {e}")))?;
    let (version, rest): (u32, &[u8]) = postcard::take_from_bytes(&bytes)
        .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("corrupted cache: {e}")))?;
    if version != SPYC_VERSION {
        return Ok(None);
    }
    let module: Module = postcard::from_bytes(rest)
        .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("corrupted cache: {e}")))?;
    Ok(Some(module))
}

/// Saves a module to its cache file, atomically (write-temp-then-rename).
pub fn save_cache(module: &Module, source_file: &Path) -> SpyResult<()> {
    let cache_file = cache_path(source_file);
    if let Some(parent) = cache_file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("cannot create cache dir: {e}")))?;
    }
    let mut bytes = postcard::to_allocvec(&SPYC_VERSION)
        .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("cannot encode cache: {e}")))?;
    let body = postcard::to_allocvec(module)
        .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("cannot encode cache: {e}")))?;
    bytes.extend_from_slice(&body);

    let tmp = cache_file.with_extension("spyc.tmp");
    fs::write(&tmp, &bytes)
        .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("cannot write cache: {e}")))?;
    fs::rename(&tmp, &cache_file)
        .map_err(|e| SpyError::new(ErrorKind::ImportError, format!("cannot write cache: {e}")))?;
    Ok(())
}

/// Removes the `.spyc` caches that belong to the given source files, for
/// the `cleanup` subcommand.
pub fn cleanup_caches(source_files: &[PathBuf]) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for source_file in source_files {
        let cache_file = cache_path(source_file);
        if cache_file.exists() && fs::remove_file(&cache_file).is_ok() {
            removed.push(cache_file);
        }
    }
    removed
}
