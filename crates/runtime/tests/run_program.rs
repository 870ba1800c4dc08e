//! End-to-end compiler + VM tests, reading source from a real file on disk
//! the way the `osfl` binary does, rather than a hardcoded byte string.

use osfl_core::Value;
use osflc::{compile_source, CompilerConfig};
use osflr::run_program;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

fn run_file(contents: &str) -> Value {
    let mut file = NamedTempFile::new().expect("create temp source file");
    file.write_all(contents.as_bytes()).expect("write temp source file");
    let source = fs::read(file.path()).expect("read temp source file");
    let compiled = compile_source(&source, CompilerConfig::default()).expect("compile should succeed");
    run_program(compiled.bytecode).expect("run should succeed")
}

#[test]
fn main_frame_bootstrap_runs_and_returns() {
    let result = run_file("frame Main { func main() { return 1 + 2 * 3; } }");
    assert_eq!(result, Value::Int(7));
}

#[test]
fn calling_a_bare_top_level_function_from_main() {
    let result = run_file(
        r#"
        func greet(name) {
            return "hi ${name}";
        }

        frame Main {
            func main() {
                return greet("osfl");
            }
        }
        "#,
    );
    assert_eq!(result, Value::string("hi osfl"));
}

#[test]
fn string_interpolation_coerces_through_the_str_native() {
    let result = run_file(r#"frame Main { func main() { var n = 3; return "count: ${n}"; } }"#);
    assert_eq!(result, Value::string("count: 3"));
}

#[test]
fn undefined_name_diagnostic_surfaces_before_the_vm_runs() {
    // A compile with diagnostics still fails `compile_source`, so the
    // program never reaches the VM; confirms the pipeline boundary.
    let mut file = NamedTempFile::new().expect("create temp source file");
    file.write_all(b"frame Main { func main() { return missing_name; } }")
        .expect("write temp source file");
    let source = fs::read(file.path()).expect("read temp source file");
    let result = compile_source(&source, CompilerConfig::default());
    assert!(result.is_err());
}
