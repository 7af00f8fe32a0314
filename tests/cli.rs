//! End-to-end runs of the `blockverity` binary against scratch files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn blockverity(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_blockverity"))
        .args(args)
        .output()
        .expect("failed to launch blockverity")
}

fn scratch_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(content).unwrap();
    file.sync_all().unwrap();
    path
}

fn pseudo_random(len: usize, mut state: u64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_no_arguments_prints_usage_and_exits_1() {
    let output = blockverity(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[HELP]"));
    assert!(stderr.contains("-rw"));
    assert!(stderr.contains("--no-fail"));
}

#[test]
fn test_read_only_pattern_file_passes() {
    let dir = TempDir::new().unwrap();
    let path = scratch_file(&dir, "pattern.img", &[0xC3; 4096]);

    let output = blockverity(&["-ro", arg(&path)]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains(&format!("{}: ", path.display())));
    assert!(stdout.contains(&format!("{:>32}\n", 4096)));
    assert!(stdout.contains("100% OK"));
    assert_eq!(fs::read(&path).unwrap(), vec![0xC3; 4096]);
}

#[test]
fn test_read_write_restores_random_content() {
    let dir = TempDir::new().unwrap();
    let content = pseudo_random(4096, 42);
    let path = scratch_file(&dir, "scratch.img", &content);

    let output = blockverity(&["-rw", arg(&path)]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains(" OK"));
    assert_eq!(fs::read(&path).unwrap(), content);
}

#[test]
fn test_read_write_restores_unaligned_multi_chunk_file() {
    let dir = TempDir::new().unwrap();
    let content = pseudo_random(1_300_003, 7);
    let path = scratch_file(&dir, "odd.img", &content);

    let output = blockverity(&["-rw", arg(&path)]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("1300003"));
    let after = fs::read(&path).unwrap();
    assert_eq!(after.len(), content.len());
    assert!(after == content);
}

#[test]
fn test_no_fail_skips_missing_target() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.img");
    let valid = scratch_file(&dir, "valid.img", &[1u8; 8192]);

    let output = blockverity(&["--no-fail", arg(&missing), arg(&valid)]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("{}: ", valid.display())));
    assert!(stdout.contains("OK"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[ERROR]"));
}

#[test]
fn test_fail_aborts_before_next_target() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.img");
    let valid = scratch_file(&dir, "valid.img", &[1u8; 8192]);

    let output = blockverity(&["--fail", arg(&missing), arg(&valid)]);
    assert!(!output.status.success());
    assert_ne!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains(&valid.display().to_string()));
    assert!(String::from_utf8_lossy(&output.stderr).contains("[FATAL]"));
}

#[test]
fn test_empty_regular_file_needs_sector_query() {
    let dir = TempDir::new().unwrap();
    let path = scratch_file(&dir, "empty.img", &[]);

    // A zero reported length is resolved through the sector-count query,
    // which regular files do not support; that is fatal regardless of policy.
    let output = blockverity(&["--no-fail", arg(&path)]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[FATAL] Failed to discover device size (BLKGETSIZE)"));
}
