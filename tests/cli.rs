use std::{
    env, fs,
    path::PathBuf,
    process::{Command, Output, Stdio},
};

fn bin_path() -> String {
    if let Some(path) = option_env!("CARGO_BIN_EXE_shape") {
        return path.to_string();
    }
    if let Ok(path) = env::var("CARGO_BIN_EXE_shape") {
        return path;
    }
    let mut fallback = PathBuf::from(root());
    fallback.push("target");
    fallback.push("debug");
    fallback.push("shape");
    if cfg!(windows) {
        fallback.set_extension("exe");
    }
    if fallback.exists() {
        return fallback.to_string_lossy().into_owned();
    }
    panic!(
        "binary path not set by cargo test and fallback {:?} not found",
        fallback
    );
}

fn root() -> String {
    env::var("CARGO_MANIFEST_DIR").expect("manifest dir not set by cargo")
}

/// Writes `source` to a scratch file named `name` and runs it.
fn run_script(name: &str, source: &str, args: &[&str]) -> Output {
    let dir = env::temp_dir().join(format!("shape-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("failed to create scratch dir");
    let script = dir.join(name);
    fs::write(&script, source).expect("failed to write script");

    let output = Command::new(bin_path())
        .current_dir(root())
        .arg(&script)
        .args(args)
        .env_remove("SHAPE_LOG")
        .env_remove("SHAPE_NO_TYPECHECK")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to run shape");
    let _ = fs::remove_file(&script);
    output
}

#[test]
fn runs_a_script_and_passes_arguments() {
    let output = run_script(
        "hello.shape",
        "fn greet(name: String) => \"hello \" + name\nprintln(greet(argv[0]))\n",
        &["world"],
    );
    assert!(
        output.status.success(),
        "script failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world\n");
}

#[test]
fn exit_code_comes_from_the_script() {
    let output = run_script("exit.shape", "exit(4)\n", &[]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn runtime_errors_exit_with_one() {
    let output = run_script("broken.shape", "var a = 1\nfoo()\n", &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("undefined function 'foo'"), "{stderr}");
    assert!(stderr.contains("@ (2, 1)"), "{stderr}");
}

#[test]
fn type_errors_stop_before_running() {
    let output = run_script(
        "typed.shape",
        "println(\"never\")\nvar s: String = 5\n",
        &[],
    );
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("declared as String"), "{stderr}");
}

#[test]
fn rejects_other_file_extensions() {
    let output = Command::new(bin_path())
        .arg("script.txt")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to run shape");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid file extension"));
}

#[test]
fn missing_files_are_reported() {
    let output = Command::new(bin_path())
        .arg("does-not-exist.shape")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to run shape");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("does-not-exist.shape"));
}
