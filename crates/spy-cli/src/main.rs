use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::{env, fs};

use spy::importing::ImportAnalyzer;
use spy::render::{dump_module, emit_module_ast, FqnFormat};
use spy::{ErrorMode, SpyError, Vm};

const USAGE: &str = "\
usage: spy <command> [options] FILE.spy

commands:
  execute    import the module and run main()
  parse      parse and dump the SPy AST as source
  pyparse    dump the preprocessed Python AST
  redshift   redshift the module and dump the result
  imports    print the import tree and load order
  symtable   print the symbol tables
  cleanup    remove the .spyc caches of the module graph

options:
  -E {eager,lazy,warn}   error mode for redshift (default: eager)
  --full-fqn             dump with fully-qualified names
  --runtime-assert       evaluate assert statements at run time
";

struct Args {
    command: String,
    file: PathBuf,
    error_mode: ErrorMode,
    full_fqn: bool,
    runtime_assert: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = env::args().skip(1);
    let command = args.next().ok_or_else(|| USAGE.to_owned())?;
    let mut file = None;
    let mut error_mode = ErrorMode::Eager;
    let mut full_fqn = false;
    let mut runtime_assert = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-E" => {
                let mode = args.next().ok_or("-E needs an argument")?;
                error_mode = ErrorMode::from_str(&mode)?;
            }
            "--full-fqn" => full_fqn = true,
            "--runtime-assert" => runtime_assert = true,
            "--pdb" | "--spdb" => {
                return Err("the debugger is not supported in this build".to_owned());
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option `{other}`"));
            }
            other => {
                if file.replace(PathBuf::from(other)).is_some() {
                    return Err("exactly one FILE argument is expected".to_owned());
                }
            }
        }
    }

    let file = file.ok_or_else(|| USAGE.to_owned())?;
    Ok(Args {
        command,
        file,
        error_mode,
        full_fqn,
        runtime_assert,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn render_error(err: &SpyError) -> String {
    err.render(|filename| fs::read_to_string(filename).ok())
}

fn modname_of(file: &Path) -> String {
    file.file_stem().map_or_else(|| "main".to_owned(), |s| s.to_string_lossy().into_owned())
}

fn make_vm(args: &Args) -> Vm {
    let mut vm = Vm::new();
    vm.runtime_assert = args.runtime_assert;
    if let Some(dir) = args.file.parent() {
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        vm.path.push(dir.to_path_buf());
    }
    vm
}

fn run(args: &Args) -> Result<(), SpyError> {
    let modname = modname_of(&args.file);
    let format = if args.full_fqn { FqnFormat::Full } else { FqnFormat::Short };

    match args.command.as_str() {
        "execute" => {
            let mut vm = make_vm(args);
            let module = vm.import_(&modname)?;
            // run main() when the module defines one
            if let Some(fqn) = module.getattr_fqn("main") {
                if let Some(spy::Object::Func(main)) = vm.lookup_global(fqn) {
                    vm.call(&main, &[])?;
                }
            }
            Ok(())
        }
        "parse" => {
            let src = read_file(&args.file)?;
            let module = spy::parse::parse_source(&src, &args.file.to_string_lossy(), &modname)?;
            print!("{}", emit_module_ast(&module));
            Ok(())
        }
        "pyparse" => {
            let src = read_file(&args.file)?;
            let dump = spy::parse::pyparse_dump(&src, &args.file.to_string_lossy())?;
            println!("{dump}");
            Ok(())
        }
        "redshift" => {
            let mut vm = make_vm(args);
            vm.import_(&modname)?;
            vm.redshift(args.error_mode)?;
            for warning in &vm.warnings {
                eprint!("{}", render_error(warning));
            }
            print!("{}", dump_module(&vm, &modname, format));
            Ok(())
        }
        "imports" => {
            let mut vm = make_vm(args);
            let mut analyzer = ImportAnalyzer::new(&modname);
            analyzer.parse_all(&mut vm)?;
            println!("Import tree:");
            print!("{}", analyzer.render_tree());
            println!();
            println!("Import order:");
            print!("{}", analyzer.render_list()?);
            Ok(())
        }
        "symtable" => {
            let vm = make_vm(args);
            let src = read_file(&args.file)?;
            let mut module = spy::parse::parse_source(&src, &args.file.to_string_lossy(), &modname)?;
            spy::scope::analyze_module(&vm, &mut module)?;
            if let Some(table) = &module.symtable {
                print!("{}", table.dump());
            }
            for decl in &module.decls {
                if let spy::ast::Decl::FuncDef(fd) = decl {
                    print_symtables(fd);
                }
            }
            Ok(())
        }
        "cleanup" => {
            let mut vm = make_vm(args);
            let mut analyzer = ImportAnalyzer::new(&modname);
            analyzer.parse_all(&mut vm)?;
            let mut files = Vec::new();
            for name in analyzer.mods.keys() {
                if let Some(f) = vm.find_file_on_path(name, false) {
                    files.push(f);
                }
            }
            for removed in spy::importing::cleanup_caches(&files) {
                println!("removed {}", removed.display());
            }
            Ok(())
        }
        other => {
            eprintln!("unknown command `{other}`");
            eprintln!("{USAGE}");
            Err(SpyError::new(spy::ErrorKind::ValueError, format!("unknown command `{other}`")))
        }
    }
}

fn print_symtables(fd: &spy::ast::FuncDef) {
    if let Some(table) = &fd.symtable {
        println!();
        print!("{}", table.dump());
    }
    for stmt in &fd.body {
        if let spy::ast::Stmt::FuncDef(inner) = stmt {
            print_symtables(inner);
        }
    }
}

fn read_file(path: &Path) -> Result<String, SpyError> {
    fs::read_to_string(path).map_err(|e| {
        SpyError::new(
            spy::ErrorKind::ImportError,
            format!("cannot read `{}`: {e}", path.display()),
        )
    })
}
