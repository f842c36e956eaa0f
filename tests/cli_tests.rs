//! Exit status and usage output of the `f007th-send` binary.

use std::process::{Command, Output, Stdio};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_f007th-send"))
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn no_arguments_prints_help_and_fails() {
    let out = run(&[]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("Usage:"), "{err}");
    assert!(err.contains("--send-to"), "{err}");
}

#[test]
fn bad_flag_value_prints_help_and_fails() {
    let out = run(&["-g", "abc", "http://localhost/"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("--server-type"), "full help expected: {err}");
}

#[test]
fn unknown_server_type_prints_help_and_fails() {
    let out = run(&["-t", "mqtt", "http://localhost/"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("--log-file"));
}

#[test]
fn invalid_configuration_prints_help_and_fails() {
    let out = run(&["-g", "99", "http://localhost/"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("Invalid GPIO pin number"), "{err}");
    assert!(err.contains("--send-to"), "{err}");
}

#[test]
fn help_exits_successfully() {
    let out = run(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn end_of_input_exits_successfully() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("send.log");
    let out = run(&["-l", log.to_str().unwrap(), "http://127.0.0.1:9/"]);
    assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
    assert!(log.exists());
}
