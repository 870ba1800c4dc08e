//! Black-box tests of the `osfl` binary: write a source file to a temp
//! directory, invoke the built binary against it, and check its exit
//! status/stdout the way a user would from a shell.

use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn osfl_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_osfl"))
}

fn write_source(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".osfl")
        .tempfile()
        .expect("create temp source file");
    file.write_all(contents.as_bytes()).expect("write temp source file");
    file
}

#[test]
fn runs_a_program_that_prints_and_exits_zero() {
    let file = write_source(r#"frame Main { func main() { print("hello from osfl"); return 0; } }"#);

    let output = osfl_command().arg(file.path()).output().expect("spawn osfl");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("hello from osfl"));
}

#[test]
fn a_missing_file_exits_nonzero_with_a_message() {
    let output = osfl_command().arg("/no/such/file.osfl").output().expect("spawn osfl");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("could not read"));
}

#[test]
fn a_compile_error_exits_nonzero() {
    let file = write_source("frame Main { func main() { return ; } }");
    let output = osfl_command().arg(file.path()).output().expect("spawn osfl");
    assert!(!output.status.success());
}

#[test]
fn debug_flag_prints_a_disassembly_before_running() {
    let file = write_source("frame Main { func main() { return 1; } }");
    let output = osfl_command().arg("-d").arg(file.path()).output().expect("spawn osfl");
    assert!(output.status.success());
    assert!(!output.stderr.is_empty());
}
