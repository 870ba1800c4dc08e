//! End-to-end front-end tests: source text on disk in, compiled bytecode
//! or a diagnostic out. Mirrors the way a real `osfl` invocation reads its
//! source file from a path rather than a hardcoded byte string.

use osflc::{compile_source, CompileError, CompilerConfig};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_source(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp source file");
    file.write_all(contents.as_bytes()).expect("write temp source file");
    file
}

#[test]
fn compiles_a_source_file_from_disk() {
    let file = write_source("frame Main { func main() { return 2 + 2; } }");
    let source = fs::read(file.path()).expect("read temp source file");

    let mut config = CompilerConfig::default();
    config.lexer.file_name = file.path().display().to_string();
    let compiled = compile_source(&source, config).expect("compile should succeed");

    assert!(!compiled.bytecode.instructions.is_empty());
}

#[test]
fn missing_main_is_a_diagnostic_not_a_parse_failure() {
    let file = write_source("frame Main { var x = 1; }");
    let source = fs::read(file.path()).expect("read temp source file");

    let result = compile_source(&source, CompilerConfig::default());
    match result {
        Err(CompileError::Diagnostics(diags)) => {
            assert!(diags.iter().any(|d| matches!(d, CompileError::MissingMain)));
        }
        other => panic!("expected Diagnostics(MissingMain), got {other:?}"),
    }
}

#[test]
fn a_malformed_file_reports_a_parse_error() {
    let file = write_source("frame Main { func main() { return ; } }");
    let source = fs::read(file.path()).expect("read temp source file");

    let result = compile_source(&source, CompilerConfig::default());
    assert!(matches!(result, Err(CompileError::Parse { .. })));
}

#[test]
fn imports_and_multiple_frames_compile_together() {
    let file = write_source(
        r#"
        import std.io;

        func helper(x) { return x * 2; }

        frame Setup {
            var ready = true;
        }

        frame Main {
            func main() {
                return helper(21);
            }
        }
        "#,
    );
    let source = fs::read(file.path()).expect("read temp source file");
    let compiled = compile_source(&source, CompilerConfig::default()).expect("compile should succeed");
    assert!(compiled.bytecode.instructions.iter().any(|i| i.opcode == osfl_core::Opcode::Call));
}
