#![cfg(all(unix, feature = "cli"))]

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/respframe-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_connect(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

struct MockDevice {
    child: Child,
    dir: PathBuf,
    sock_path: PathBuf,
}

impl MockDevice {
    fn start(tag: &str, extra: &[&str]) -> Self {
        let dir = unique_temp_dir(tag);
        let sock_path = dir.join("modem.sock");

        let child = Command::new(env!("CARGO_BIN_EXE_respframe"))
            .arg("--log-level")
            .arg("error")
            .arg("mock")
            .arg(&sock_path)
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("mock command should start");

        wait_for_connect(&sock_path, Duration::from_secs(3));
        Self {
            child,
            dir,
            sock_path,
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn respframe(args: &[&str], target: &Path) -> std::process::Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_respframe"));
    command
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json");
    for arg in args {
        command.arg(arg);
    }
    command.arg(target).output().expect("respframe should run")
}

#[test]
fn query_frames_fragmented_reply() {
    let device = MockDevice::start("query", &["--reply", "\\r\\nOK\\r\\n", "--split", "3"]);

    let output = respframe(
        &["query", "--prompt", "AT", "--timeout", "2s", "--chunk-timeout", "150ms"],
        &device.sock_path,
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let record: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("query should emit one json record");
    assert_eq!(record["size"], 6);
    assert_eq!(record["hex"], "0d0a4f4b0d0a");
    assert_eq!(record["sequence"], 1);
}

#[test]
fn query_discards_banner_before_prompt() {
    let device = MockDevice::start(
        "banner",
        &["--banner", "RING\\r\\n", "--reply", "OK\\r\\n"],
    );

    let output = respframe(
        &["query", "--prompt", "ATA", "--timeout", "2s", "--chunk-timeout", "200ms"],
        &device.sock_path,
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let record: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json record");
    assert_eq!(record["hex"], "4f4b0d0a");
}

#[test]
fn query_repeat_prints_one_record_per_prompt() {
    let device = MockDevice::start("repeat", &[]);

    let output = respframe(
        &[
            "query",
            "--prompt",
            "AT",
            "--repeat",
            "3",
            "--interval",
            "10ms",
            "--chunk-timeout",
            "100ms",
        ],
        &device.sock_path,
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let sequences: Vec<u64> = stdout
        .lines()
        .map(|line| {
            let record: serde_json::Value = serde_json::from_str(line).expect("json record");
            record["sequence"].as_u64().expect("sequence")
        })
        .collect();
    assert_eq!(sequences, [1, 2, 3]);
}

#[test]
fn query_silent_device_returns_124() {
    let device = MockDevice::start("silent", &["--delay", "3s"]);

    let output = respframe(
        &["query", "--prompt", "AT", "--timeout", "200ms", "--chunk-timeout", "50ms"],
        &device.sock_path,
    );

    assert_eq!(output.status.code(), Some(124));
    assert!(output.stdout.is_empty());
}

#[test]
fn query_missing_socket_returns_transport_error() {
    let missing = unique_temp_dir("missing").join("absent.sock");

    let output = respframe(&["query", "--prompt", "AT"], &missing);

    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(missing.parent().expect("socket has a parent"));
}

#[test]
fn monitor_prints_unsolicited_reply() {
    let device = MockDevice::start("monitor", &["--banner", "RING\\r\\n"]);

    let output = respframe(
        &["monitor", "--count", "1", "--timeout", "2s", "--chunk-timeout", "100ms"],
        &device.sock_path,
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let record: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json record");
    assert_eq!(record["payload"], "RING\\r\\n");
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_respframe"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("respframe {}", env!("CARGO_PKG_VERSION")));
}
