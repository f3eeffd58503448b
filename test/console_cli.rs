//! Console binary integration tests.
//!
//! Drives the `dllbridge` binary with command scripts end-to-end, the same
//! way the demonstration sessions exercise the embedding host.

use std::path::PathBuf;
use std::process::Command;

fn demo_extension_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    let file = "libfib_extension.so";
    #[cfg(target_os = "macos")]
    let file = "libfib_extension.dylib";
    #[cfg(target_os = "windows")]
    let file = "fib_extension.dll";

    let target_dir = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target"));

    ["debug", "release"]
        .iter()
        .map(|profile| target_dir.join(profile).join(file))
        .find(|p| p.exists())
}

#[test]
fn script_drives_load_call_list() {
    let Some(artifact) = demo_extension_path() else {
        eprintln!("skipping: fib-extension cdylib not built");
        return;
    };

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("session.txt");
    std::fs::write(
        &script,
        format!(
            "# demonstration session\nload {}\ncall fib 10\nlist\nquit\n",
            artifact.display()
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dllbridge"))
        .arg(&script)
        .output()
        .expect("failed to run console");

    assert!(
        output.status.success(),
        "console failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[fib, fib_at]"), "stdout: {stdout}");
    assert!(stdout.contains("88"), "stdout: {stdout}");
    assert!(stdout.contains("version 1"), "stdout: {stdout}");
}

#[test]
fn bridge_errors_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("session.txt");
    std::fs::write(
        &script,
        "call missing_fn 1\nunload /nonexistent/libnope.so\nquit\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dllbridge"))
        .arg(&script)
        .output()
        .expect("failed to run console");

    // The console keeps going and exits cleanly; the errors land on stderr
    // with their stable kinds.
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("UnknownFunction"), "stderr: {stderr}");
    assert!(stderr.contains("NotLoaded"), "stderr: {stderr}");
}

#[test]
fn preload_flag_binds_before_first_command() {
    let Some(artifact) = demo_extension_path() else {
        eprintln!("skipping: fib-extension cdylib not built");
        return;
    };

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("session.txt");
    std::fs::write(&script, "call fib_at 10\nquit\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dllbridge"))
        .arg("--load")
        .arg(artifact.display().to_string())
        .arg(&script)
        .output()
        .expect("failed to run console");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[fib, fib_at]"), "stdout: {stdout}");
    assert!(stdout.contains("55"), "stdout: {stdout}");
}
