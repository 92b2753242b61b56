//! The static import analyzer: graph resolution, post-order load lists and
//! the `.spyc` cache.

use std::fs;
use std::path::Path;

use spy::importing::{self, ImportAnalyzer, ModEntry};
use spy::{ErrorKind, SharedStringPrint, Vm};

fn write_module(dir: &Path, name: &str, src: &str) {
    fs::write(dir.join(format!("{name}.spy")), src).unwrap();
}

fn vm_for(dir: &Path) -> Vm {
    let mut vm = Vm::with_writer(Box::new(SharedStringPrint::new()));
    vm.path.push(dir.to_path_buf());
    vm
}

#[test]
fn nested_imports_load_in_post_order() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(tmp.path(), "main", "import aaa\nimport bbb\n");
    write_module(tmp.path(), "aaa", "import a1\nimport a2\n");
    write_module(tmp.path(), "bbb", "import aaa\nimport b1\nimport b2\n");
    write_module(tmp.path(), "a1", "x = 'a1'\n");
    write_module(tmp.path(), "a2", "x = 'a2'\n");
    write_module(tmp.path(), "b1", "x = 'b1'\n");
    write_module(tmp.path(), "b2", "x = 'b2'\n");

    let mut vm = vm_for(tmp.path());
    let mut analyzer = ImportAnalyzer::new("main");
    analyzer.parse_all(&mut vm).unwrap();
    let order = analyzer.get_import_list().unwrap();
    assert_eq!(order, ["a1", "a2", "aaa", "b1", "b2", "bbb", "main"]);
}

#[test]
fn diamond_imports_appear_exactly_once() {
    // a; b imports a; c imports a and b; r imports c and a
    let tmp = tempfile::tempdir().unwrap();
    write_module(tmp.path(), "a", "x: i32 = 1\n");
    write_module(tmp.path(), "b", "import a\n");
    write_module(tmp.path(), "c", "import a\nimport b\n");
    write_module(tmp.path(), "r", "import c\nimport a\n");

    let mut vm = vm_for(tmp.path());
    let mut analyzer = ImportAnalyzer::new("r");
    analyzer.parse_all(&mut vm).unwrap();
    let order = analyzer.get_import_list().unwrap();
    assert_eq!(order, ["a", "b", "c", "r"]);
}

#[test]
fn missing_modules_leave_a_failed_entry() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(tmp.path(), "main", "import nonexistent\n");

    let mut vm = vm_for(tmp.path());
    let mut analyzer = ImportAnalyzer::new("main");
    analyzer.parse_all(&mut vm).unwrap();
    assert!(matches!(analyzer.mods.get("nonexistent"), Some(ModEntry::Failed)));

    // actually importing raises at scope analysis of `main`
    let mut vm = vm_for(tmp.path());
    let err = vm.import_("main").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
    assert!(err.message.contains("cannot import `nonexistent`"), "{err}");
}

#[test]
fn circular_imports_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(tmp.path(), "a", "import b\n");
    write_module(tmp.path(), "b", "import a\n");

    let mut vm = vm_for(tmp.path());
    let mut analyzer = ImportAnalyzer::new("a");
    analyzer.parse_all(&mut vm).unwrap();
    let err = analyzer.get_import_list().unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
    assert!(err.message.contains("circular import"), "{err}");
}

#[test]
fn importing_initializes_dependencies_first() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(tmp.path(), "dep", "answer: i32 = 42\n");
    write_module(
        tmp.path(),
        "main",
        "\
import dep

def main() -> i32:
    return dep.answer
",
    );
    let mut vm = vm_for(tmp.path());
    let module = vm.import_("main").unwrap();
    let fqn = module.getattr_fqn("main").unwrap();
    let spy::Object::Func(main) = vm.lookup_global(fqn).unwrap() else {
        panic!("not a function");
    };
    let result = vm.call(&main, &[]).unwrap();
    assert_eq!(vm.unwrap_i32(&result).unwrap(), 42);
}

#[test]
fn spyc_cache_roundtrips_structurally() {
    let tmp = tempfile::tempdir().unwrap();
    let src = "\
def foo(x: i32) -> i32:
    return x + 1
";
    write_module(tmp.path(), "main", src);

    let mut vm = vm_for(tmp.path());
    vm.import_("main").unwrap();

    let source_file = tmp.path().join("main.spy");
    let cache_file = importing::cache_path(&source_file);
    assert!(cache_file.exists(), "import should write the cache");

    let cached = importing::load_cache(&cache_file).unwrap().expect("version matches");
    let fresh = spy::parse::parse_source(src, &source_file.to_string_lossy(), "main").unwrap();
    assert!(cached.structurally_eq(&fresh));
}

#[test]
fn stale_cache_version_is_discarded() {
    let tmp = tempfile::tempdir().unwrap();
    let source_file = tmp.path().join("main.spy");
    write_module(tmp.path(), "main", "x: i32 = 1\n");

    let cache_file = importing::cache_path(&source_file);
    fs::create_dir_all(cache_file.parent().unwrap()).unwrap();
    // a bogus version stamp (postcard varint 99) followed by garbage
    fs::write(&cache_file, [99u8, 1, 2, 3]).unwrap();

    match importing::load_cache(&cache_file) {
        Ok(None) => {}                   // version mismatch detected
        Ok(Some(_)) => panic!("garbage cache accepted"),
        Err(_) => {}                     // or rejected as corrupt: also fine
    }

    // importing still works by re-parsing
    let mut vm = vm_for(tmp.path());
    vm.import_("main").unwrap();
}

#[test]
fn second_import_reuses_the_loaded_module() {
    let tmp = tempfile::tempdir().unwrap();
    write_module(tmp.path(), "main", "x: i32 = 1\n");
    let mut vm = vm_for(tmp.path());
    let first = vm.import_("main").unwrap();
    let second = vm.import_("main").unwrap();
    assert!(first == second);
}

#[test]
fn robust_cache_mode_collects_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let source_file = tmp.path().join("main.spy");
    write_module(tmp.path(), "main", "x: i32 = 1\n");

    // plant a corrupt cache that is newer than the source: the version
    // stamp matches but the module payload is garbage
    let cache_file = importing::cache_path(&source_file);
    fs::create_dir_all(cache_file.parent().unwrap()).unwrap();
    fs::write(&cache_file, [1u8, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap();

    let mut vm = vm_for(tmp.path());
    vm.cache_robust = true;
    vm.import_("main").unwrap();
    // the corrupted cache produced a diagnostic instead of an error
    assert!(!vm.cache_errors.is_empty());
}
