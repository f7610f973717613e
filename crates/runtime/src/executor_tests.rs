// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Instant;

fn sh(script: &str) -> ExecRequest {
    ExecRequest::new(vec![
        "sh".to_string(),
        "-c".to_string(),
        script.to_string(),
    ])
}

#[test]
fn captures_stdout_and_exit_code() {
    let result = LocalExecutor.execute(&sh("echo hello")).unwrap();
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.return_code, 0);
    assert!(result.signal.is_none());
    assert!(result.reason.is_none());
}

#[test]
fn captures_stderr_and_nonzero_exit() {
    let result = LocalExecutor.execute(&sh("echo oops >&2; exit 3")).unwrap();
    assert_eq!(result.stderr, "oops\n");
    assert_eq!(result.return_code, 3);
}

#[test]
fn env_is_overlaid_onto_the_daemon_environment() {
    let mut request = sh("printf '%s' \"$HARNESS_TEST_VALUE\"");
    request
        .env
        .insert("HARNESS_TEST_VALUE".to_string(), "forty-two".to_string());
    let result = LocalExecutor.execute(&request).unwrap();
    assert_eq!(result.stdout, "forty-two");
}

#[test]
fn cwd_is_respected() {
    let dir = tempfile::TempDir::new().unwrap();
    let canonical = dir.path().canonicalize().unwrap();
    let mut request = sh("pwd");
    request.cwd = Some(canonical.clone());
    let result = LocalExecutor.execute(&request).unwrap();
    assert_eq!(result.stdout.trim(), canonical.display().to_string());
}

#[test]
fn empty_argv_is_rejected() {
    let result = LocalExecutor.execute(&ExecRequest::new(vec![]));
    assert!(matches!(result, Err(ExecError::EmptyArgv)));
}

#[test]
fn unknown_binary_is_a_spawn_error() {
    let request = ExecRequest::new(vec!["harness-no-such-binary".to_string()]);
    match LocalExecutor.execute(&request) {
        Err(ExecError::Spawn { program, .. }) => {
            assert_eq!(program, "harness-no-such-binary");
        }
        other => panic!("expected spawn error, got {other:?}"),
    }
}

#[test]
fn timeout_kills_the_process_group() {
    let mut request = sh("sleep 30");
    request.timeout = Duration::from_millis(100);

    let start = Instant::now();
    let result = LocalExecutor.execute(&request).unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(result.reason.as_deref(), Some("timeout"));
    assert!(result.return_code != 0);
    assert_eq!(result.signal.as_deref(), Some("SIGKILL"));
}

#[test]
fn signal_death_reports_negative_code_and_name() {
    let result = LocalExecutor.execute(&sh("kill -TERM $$")).unwrap();
    assert_eq!(result.return_code, -15);
    assert_eq!(result.signal.as_deref(), Some("SIGTERM"));
    assert!(result.reason.is_none());
}

#[test]
fn duration_is_reported() {
    let result = LocalExecutor.execute(&sh("sleep 0.1")).unwrap();
    assert!(result.duration_ms >= 100);
}

// ── Output sanitization ──────────────────────────────────────────────────────

#[test]
fn control_bytes_are_stripped_from_output() {
    // \001 (SOH) must vanish; \t and \n survive
    let result = LocalExecutor
        .execute(&sh(r#"printf 'a\001b\tc\n'"#))
        .unwrap();
    assert_eq!(result.stdout, "ab\tc\n");
}

#[yare::parameterized(
    plain       = { b"hello\n".as_slice(), "hello\n" },
    tabs_kept   = { b"a\tb".as_slice(), "a\tb" },
    bell_gone   = { b"ding\x07dong".as_slice(), "dingdong" },
    escape_gone = { b"\x1b[31mred\x1b[0m".as_slice(), "[31mred[0m" },
    crlf        = { b"line\r\n".as_slice(), "line\n" },
)]
fn sanitize_cases(input: &[u8], expected: &str) {
    assert_eq!(sanitize_output(input), expected);
}

#[test]
fn invalid_utf8_is_replaced_not_fatal() {
    let sanitized = sanitize_output(&[0xff, 0xfe, b'o', b'k']);
    assert!(sanitized.ends_with("ok"));
}

// ── Signal names ─────────────────────────────────────────────────────────────

#[yare::parameterized(
    kill = { 9, "SIGKILL" },
    term = { 15, "SIGTERM" },
    intr = { 2, "SIGINT" },
)]
fn known_signals_decode(n: i32, name: &str) {
    assert_eq!(signal_name(n), name);
}

#[test]
fn unknown_signals_fall_back_to_numbered_form() {
    assert_eq!(signal_name(250), "SIG250");
}

// ── Exclusive serialization ──────────────────────────────────────────────────

#[test]
#[serial_test::serial]
fn exclusive_requests_never_overlap() {
    // Each execution writes start/end markers around a sleep. If two
    // exclusive executions ever overlapped, the marker file would show
    // consecutive `start` lines.
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    let script = format!(
        "echo start >> {m}; sleep 0.1; echo end >> {m}",
        m = marker.display()
    );

    std::thread::scope(|scope| {
        for _ in 0..3 {
            let script = script.clone();
            scope.spawn(move || {
                let mut request = sh(&script);
                request.exclusive = true;
                LocalExecutor.execute(&request).unwrap();
            });
        }
    });

    let contents = std::fs::read_to_string(&marker).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines, vec!["start", "end", "start", "end", "start", "end"]);
}
