//! End-to-end integration tests for winprobe
//!
//! These tests start the `mock_devtools` binary, which simulates a
//! three-window desktop application behind a DevTools endpoint, and drive it
//! both through the library API and through the `winprobe` CLI.

use std::fs;
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;
use tempfile::TempDir;

use winprobe::cdp::Endpoint;
use winprobe::common::config::{AmbiguityPolicy, Config};
use winprobe::observe::{self, Observation, Poller, Query, QuerySet, RetryPolicy};
use winprobe::testing::{self, Outcome, TestSuite};
use winprobe::{actions, Connection, Error, WindowTable};

const BASE: &str = "http://demoappdirectory.openf.in/desktop/config/apps/OpenFin/HelloOpenFin";

/// A running mock application, killed on drop
struct MockDevtools {
    child: Child,
    port: u16,
}

impl MockDevtools {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_mock_devtools"))
            .args(["--port", "0"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to start mock_devtools");

        let stdout = child.stdout.take().expect("mock_devtools has no stdout");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("Failed to read mock_devtools banner");

        let re = Regex::new(r"ws://127\.0\.0\.1:(\d+)/").unwrap();
        let port = re
            .captures(&line)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or_else(|| panic!("Unexpected banner: {}", line));

        Self { child, port }
    }

    fn endpoint(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Wait up to `timeout` for the process to exit on its own
    fn exited_within(&mut self, timeout: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }
}

impl Drop for MockDevtools {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Output from a winprobe command
#[derive(Debug)]
struct WinprobeOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

/// Run the CLI with an isolated config directory
fn run_winprobe(config_dir: &Path, args: &[&str]) -> WinprobeOutput {
    let output = Command::new(env!("CARGO_BIN_EXE_winprobe"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_dir)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to run winprobe");

    WinprobeOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    }
}

fn fast_config() -> Config {
    Config::parse(
        r#"
[timeouts]
attach_secs = 5
request_secs = 5

[retry]
poll_interval_ms = 20
default_within_ms = 2000
"#,
    )
    .unwrap()
}

fn hello_suite_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("suites/hello-openfin.yaml")
}

/// Copy of the HelloOpenFin suite pointed at `endpoint`
fn write_suite(dir: &Path, endpoint: &str) -> PathBuf {
    let content = fs::read_to_string(hello_suite_path()).unwrap();
    let content = content.replace("endpoint: localhost:9090", &format!("endpoint: {}", endpoint));
    let path = dir.join("hello-openfin.yaml");
    fs::write(&path, content).unwrap();
    path
}

fn hello_table() -> WindowTable {
    WindowTable::new([
        ("main", format!("{}/index.html", BASE)),
        ("cpuInfo", format!("{}/views/cpu.html", BASE)),
        ("notification", format!("{}/views/notification.html", BASE)),
    ])
}

/// A port nothing listens on
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn attach(mock: &MockDevtools) -> Connection {
    let endpoint = Endpoint::parse(&mock.endpoint()).unwrap();
    Connection::attach(&endpoint, &fast_config()).await.unwrap()
}

#[tokio::test]
async fn test_attach_sees_single_context_and_pages() {
    let mock = MockDevtools::start();
    let mut conn = attach(&mock).await;

    let contexts = conn.contexts().await.unwrap();
    assert_eq!(contexts.len(), 1);

    // the service worker is not a window
    let targets = conn.targets(&contexts[0]).await.unwrap();
    assert_eq!(targets.len(), 3);

    let table = hello_table();
    let main = table
        .resolve("main", &targets, AmbiguityPolicy::Reject)
        .unwrap()
        .target()
        .cloned()
        .unwrap();
    assert_eq!(main.url, format!("{}/index.html", BASE));
    assert!(!table
        .resolve("notification", &targets, AmbiguityPolicy::Reject)
        .unwrap()
        .is_found());

    let version = observe::read(&mut conn, &contexts[0], Some(&main), Query::Version, &QuerySet::default())
        .await
        .unwrap();
    let re = Regex::new(r"^\d+\.\d+\.\d+\.\d+$").unwrap();
    assert!(re.is_match(&version.to_string()), "{}", version);

    conn.close().await;
    conn.close().await;
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_target_list_includes_non_page_targets() {
    let mock = MockDevtools::start();
    let url = format!("http://127.0.0.1:{}/json/list", mock.port);
    let entries: Vec<Value> = reqwest::get(&url).await.unwrap().json().await.unwrap();

    // /json/list is unfiltered, unlike the page targets a connection sees
    assert_eq!(entries.len(), 4);
    assert!(entries
        .iter()
        .any(|e| e["url"] == format!("{}/index.html", BASE) && e["type"] == "page"));
    assert!(entries.iter().any(|e| e["type"] == "service_worker"));
    for entry in &entries {
        let ws = entry["webSocketDebuggerUrl"].as_str().unwrap();
        assert!(ws.starts_with(&format!("ws://127.0.0.1:{}/devtools/page/", mock.port)), "{}", ws);
    }
}

#[tokio::test]
async fn test_cpu_window_shows_after_click() {
    let mock = MockDevtools::start();
    let mut conn = attach(&mock).await;
    let context = conn.single_context().await.unwrap();
    let table = hello_table();
    let queries = QuerySet::default();

    let targets = conn.targets(&context).await.unwrap();
    let main = table.resolve("main", &targets, AmbiguityPolicy::Reject).unwrap().target().cloned().unwrap();
    let cpu = table.resolve("cpuInfo", &targets, AmbiguityPolicy::Reject).unwrap().target().cloned().unwrap();

    let before = observe::read(&mut conn, &context, Some(&cpu), Query::IsShowing, &queries)
        .await
        .unwrap();
    assert_eq!(before, Observation::Flag(false));

    actions::click(&mut conn, &main, "#cpu-info").await.unwrap();

    let mut poller = Poller::new(RetryPolicy::new(Duration::from_millis(20), Duration::from_secs(2)));
    let mut showing = false;
    while poller.next_attempt().await {
        let obs = observe::read(&mut conn, &context, Some(&cpu), Query::IsShowing, &queries)
            .await
            .unwrap();
        if obs == Observation::Flag(true) {
            showing = true;
            break;
        }
    }
    assert!(showing, "cpu window never showed");

    conn.close().await;
}

#[tokio::test]
async fn test_missing_selector_and_bad_expression_fail() {
    let mock = MockDevtools::start();
    let mut conn = attach(&mock).await;
    let context = conn.single_context().await.unwrap();
    let targets = conn.targets(&context).await.unwrap();

    let err = actions::click(&mut conn, &targets[0], "#does-not-exist")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Evaluation { ref message, .. } if message.contains("no element matches")), "{}", err);

    let err = observe::read_expression(&mut conn, &targets[0], "notDefinedAnywhere")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Evaluation { .. }));

    // a failed evaluation leaves the connection usable
    let value = observe::read_expression(&mut conn, &targets[0], "fin.System.getVersion()")
        .await
        .unwrap();
    assert_eq!(value, Value::from("21.93.63.4"));

    conn.close().await;
}

#[tokio::test]
async fn test_hello_suite_passes_against_mock() {
    let mut mock = MockDevtools::start();
    let mut suite = TestSuite::load(&hello_suite_path()).unwrap();
    suite.endpoint = mock.endpoint();

    let report = testing::run_suite(&suite, &fast_config(), false).await;
    assert!(report.passed(), "{:#?}", report);
    assert_eq!(report.count(|o| *o == Outcome::Passed), 9);

    // the last scenario clicks #close-app
    assert!(mock.exited_within(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_close_after_application_exit() {
    let mut mock = MockDevtools::start();
    let mut conn = attach(&mock).await;
    let context = conn.single_context().await.unwrap();
    let targets = conn.targets(&context).await.unwrap();
    let main = hello_table()
        .resolve("main", &targets, AmbiguityPolicy::Reject)
        .unwrap()
        .target()
        .cloned()
        .unwrap();

    actions::click_terminal(&mut conn, &main, "#close-app").await.unwrap();
    assert!(mock.exited_within(Duration::from_secs(3)));

    assert!(conn.targets(&context).await.is_err());
    conn.close().await;
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_connection_refused() {
    let endpoint = Endpoint::parse(&format!("127.0.0.1:{}", closed_port())).unwrap();
    let err = Connection::attach(&endpoint, &fast_config()).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed { .. }), "{}", err);
    assert!(err.is_fatal());
}

#[test]
fn test_cli_runs_suite() {
    let mock = MockDevtools::start();
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), &mock.endpoint());

    let output = run_winprobe(dir.path(), &["run", suite.to_str().unwrap()]);
    assert!(
        output.success,
        "winprobe run failed:\nstdout: {}\nstderr: {}",
        output.stdout, output.stderr
    );
    assert!(output.stdout.contains("9 passed, 0 failed, 0 skipped"), "{}", output.stdout);
}

#[test]
fn test_cli_fails_when_unreachable() {
    let dir = TempDir::new().unwrap();
    let suite = write_suite(dir.path(), &format!("127.0.0.1:{}", closed_port()));

    let output = run_winprobe(dir.path(), &["run", suite.to_str().unwrap()]);
    assert!(!output.success);
    assert!(output.stdout.contains("Failed to connect"), "{}", output.stdout);
    assert!(output.stdout.contains("0 passed, 0 failed, 9 skipped"), "{}", output.stdout);
}

#[test]
fn test_cli_lists_targets() {
    let mock = MockDevtools::start();
    let dir = TempDir::new().unwrap();

    let output = run_winprobe(
        dir.path(),
        &[
            "targets",
            &mock.endpoint(),
            "--suite",
            hello_suite_path().to_str().unwrap(),
        ],
    );
    assert!(output.success, "stderr: {}", output.stderr);
    assert!(output.stdout.contains("cpuInfo"));
    assert!(output.stdout.contains("views/interappbus.html"));
    assert!(output.stdout.contains("(absent)"), "{}", output.stdout);
    assert!(!output.stdout.contains("sw.js"));
}

#[test]
fn test_cli_rejects_invalid_suite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(
        &path,
        "name: broken\nendpoint: localhost:1\nwindows: {}\nscenarios:\n  - name: s\n    steps:\n      - action: expect_window\n        window: main\n",
    )
    .unwrap();

    let output = run_winprobe(dir.path(), &["run", path.to_str().unwrap()]);
    assert!(!output.success);
    assert!(output.stderr.contains("Unknown window name 'main'"), "{}", output.stderr);
}

#[test]
fn test_config_loading() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("winprobe");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[retry\n").unwrap();

    let output = run_winprobe(dir.path(), &["run", hello_suite_path().to_str().unwrap()]);
    assert!(!output.success);
    assert!(output.stderr.contains("Invalid configuration file"), "{}", output.stderr);
}
