use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn sandbox() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sandbox_main"));
    cmd.current_dir(PathBuf::from(env!("CARGO_MANIFEST_DIR")));
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.env("RUST_LOG", "info");
    cmd
}

fn capture(stream: impl Read + Send + 'static) -> (Arc<Mutex<String>>, JoinHandle<()>) {
    let captured = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&captured);
    let handle = thread::spawn(move || {
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            let mut data = sink.lock().unwrap();
            data.push_str(&line);
            data.push('\n');
        }
    });
    (captured, handle)
}

/// Runs the sandbox to completion and returns its exit status with both streams.
fn run(cmd: &mut Command) -> (ExitStatus, String, String) {
    let mut child = cmd.spawn().expect("Failed to spawn sandbox_main process");
    let (stdout, stdout_handle) = capture(child.stdout.take().unwrap());
    let (stderr, stderr_handle) = capture(child.stderr.take().unwrap());

    let timeout = Duration::from_secs(30);
    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            child.kill().expect("Failed to kill timed-out process");
            panic!("sandbox_main timed out after {timeout:?}");
        }
        Err(e) => panic!("Failed to wait for sandbox_main: {e}"),
    };
    stdout_handle.join().expect("Stdout reader thread panicked");
    stderr_handle.join().expect("Stderr reader thread panicked");

    let stdout = stdout.lock().unwrap().clone();
    let stderr = stderr.lock().unwrap().clone();
    eprintln!("--- sandbox_main STDOUT ---\n{stdout}");
    eprintln!("--- sandbox_main STDERR ---\n{stderr}");
    (status, stdout, stderr)
}

#[test]
fn sandbox_runs_the_bundled_config() {
    let (status, stdout, _) = run(sandbox().args([
        "--config",
        "configs/sandbox.json",
        "--frames",
        "120",
        "--bodies",
        "8",
    ]));

    assert!(status.success(), "sandbox_main exited with {:?}", status.code());
    assert!(stdout.contains("scene populated"), "Expected populate log in stdout.");
    assert!(stdout.contains("sandbox finished"), "Expected final report in stdout.");
}

#[test]
fn sandbox_rejects_a_missing_config() {
    let (status, stdout, stderr) = run(sandbox().args(["--config", "configs/missing.json"]));

    assert!(!status.success());
    assert!(!stdout.contains("sandbox finished"));
    assert!(stderr.contains("Failed to read config"));
}

#[test]
fn sandbox_rejects_a_bad_timestep() {
    let (status, _, stderr) = run(sandbox().arg("--dt=0"));
    assert!(!status.success());
    assert!(stderr.contains("--dt must be positive"), "stderr={stderr}");
}

// `Child` has no timed wait on stable, so poll.
trait ChildExt {
    fn wait_timeout(&mut self, duration: Duration) -> std::io::Result<Option<ExitStatus>>;
}

impl ChildExt for Child {
    fn wait_timeout(&mut self, duration: Duration) -> std::io::Result<Option<ExitStatus>> {
        let start_time = std::time::Instant::now();
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if start_time.elapsed() > duration {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(50));
        }
    }
}
