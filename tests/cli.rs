//! Binary-level behaviour: exit codes and output streams.

use std::process::{Command, Stdio};
use std::time::Duration;

fn echo_trace() -> Command {
    Command::new(env!("CARGO_BIN_EXE_echo-trace"))
}

#[test]
fn check_accepts_defaults() {
    let output = echo_trace().arg("--check").output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "configuration OK");
}

#[test]
fn invalid_config_exits_two() {
    let output = echo_trace().args(["--bind", "nowhere"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn logs_stay_off_stdout_with_stdout_sink() {
    let mut child = echo_trace()
        .args(["--sink-stdout", "--bind", "127.0.0.1:0"])
        .env("RUST_LOG", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_millis(1500));
    child.kill().unwrap();
    let output = child.wait_with_output().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("echo-trace starting"), "{stderr}");
    assert!(!stdout.contains("echo-trace starting"), "{stdout}");
    assert!(!stdout.contains("Listener bound"), "{stdout}");
}
