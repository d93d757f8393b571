use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn magma() -> Command {
    Command::new(env!("CARGO_BIN_EXE_magma"))
}

#[test]
fn emits_fragment_to_stdout() {
    magma()
        .write_stdin("let x = 100I32;")
        .assert()
        .success()
        .stdout("#include <stdint.h>\nint32_t x = 100;\n");
}

#[test]
fn writes_output_file() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.mg");
    fs::write(&input_path, "struct Empty {} let value : Empty = Empty {};").expect("write input");
    let output_path = dir.path().join("build").join("out.c");

    magma()
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let c = fs::read_to_string(&output_path).expect("read output");
    assert_eq!(c, "#include <stdint.h>\nstruct Empty {}; struct Empty value = {};");
}

#[test]
fn emits_program_with_main() {
    magma()
        .arg("--emit")
        .arg("program")
        .write_stdin("let x = 2; printInt(x); x")
        .assert()
        .success()
        .stdout(predicate::str::contains("#include <stdio.h>"))
        .stdout(predicate::str::contains(
            "int main(void) { int32_t x = 2; printInt(x); return x; }",
        ));
}

#[test]
fn interprets_with_exit_code() {
    magma()
        .arg("--interpret")
        .write_stdin("let x = 40; printInt(x); x + 2")
        .assert()
        .code(42)
        .stdout("40\n");
}

#[test]
fn interpreter_reads_integers_from_stdin() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("sum.mg");
    fs::write(&input_path, "let a = readInt(); let b = readInt(); printInt(a + b); 0")
        .expect("write input");

    magma()
        .arg("--input")
        .arg(&input_path)
        .arg("--interpret")
        .write_stdin("3 4\n")
        .assert()
        .success()
        .stdout("7\n");
}

#[test]
fn reports_type_errors() {
    magma()
        .write_stdin("let x : Bool = 5;")
        .assert()
        .failure()
        .stderr(predicate::str::contains("type error at byte"));
}

#[test]
fn rejects_unknown_emit_format() {
    magma()
        .arg("--emit")
        .arg("wasm")
        .write_stdin("")
        .assert()
        .failure();
}
