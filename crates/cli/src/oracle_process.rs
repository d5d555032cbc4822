//! `ProcessOracle`: drives an external oracle process over stdin/stdout,
//! one JSON request/response line per `pred()` call. Grounded in the
//! teacher's `ShellExecutor` (command queue, timeout-bounded response wait)
//! but translated to a single blocking child rather than a PTY shell: the
//! `Oracle` trait's `pred` is synchronous, and every `ProcessOracle` lives
//! inside its own `tokio::task::spawn_blocking` (see `main.rs`), so a plain
//! worker thread plus `std::sync::mpsc` is simpler than wiring up the
//! tokio reactor a second time.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use syzmini_engine::model::Program;
use syzmini_engine::oracle::{Oracle, StepKind, Telemetry};

/// Bound on retry attempts for a single oracle consultation before it is
/// treated as a fatal infrastructure failure (spec §7: "retried up to a
/// small bound (default 10) with back-off; if still failing, fatal").
const MAX_ORACLE_ATTEMPTS: u32 = 10;

#[derive(Serialize)]
struct Request<'a> {
    program: &'a Program,
    k: i64,
    step: u8,
}

#[derive(Deserialize)]
struct Response {
    accept: bool,
    telemetry: Option<WireTelemetry>,
}

#[derive(Deserialize)]
struct WireTelemetry {
    per_call_cov_hash: Vec<u32>,
    execution_reached: bool,
}

/// Talks to one external oracle process for the lifetime of a single
/// minimization session. The process is expected to read one JSON object
/// per line on stdin and write one JSON object per line on stdout, in
/// lockstep — exactly one response per request.
pub struct ProcessOracle {
    _child: Child,
    stdin: ChildStdin,
    lines_rx: mpsc::Receiver<std::io::Result<String>>,
    timeout: Duration,
    last_telemetry: Option<Telemetry>,
    failed: Option<String>,
}

impl ProcessOracle {
    pub fn spawn(cmd: &[String], timeout: Duration) -> anyhow::Result<Self> {
        let [program, args @ ..] = cmd else {
            anyhow::bail!("--oracle-cmd must name a program to run");
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(ProcessOracle {
            _child: child,
            stdin,
            lines_rx: rx,
            timeout,
            last_telemetry: None,
            failed: None,
        })
    }

    fn step_code(step: StepKind) -> u8 {
        match step {
            StepKind::CallLevel => 1,
            StepKind::ArgLevel => 2,
        }
    }

    /// Writes one request and waits for its response line, retrying with
    /// back-off on write errors, timeouts, or a closed stdout, up to
    /// `MAX_ORACLE_ATTEMPTS` attempts total.
    fn send_with_retry(&mut self, line: &[u8]) -> Result<String, String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let outcome = self
                .stdin
                .write_all(line)
                .and_then(|_| self.stdin.flush())
                .map_err(|e| format!("failed to write request: {e}"))
                .and_then(|_| match self.lines_rx.recv_timeout(self.timeout) {
                    Ok(Ok(line)) => Ok(line),
                    Ok(Err(e)) => Err(format!("stdout read error: {e}")),
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        Err(format!("no response within {:?}", self.timeout))
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        Err("stdout stream closed".to_string())
                    }
                });

            match outcome {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt >= MAX_ORACLE_ATTEMPTS => {
                    return Err(format!(
                        "oracle process unavailable after {attempt} attempts: {e}"
                    ));
                }
                Err(e) => {
                    let backoff = Duration::from_millis(50u64 * (1u64 << attempt.min(6)));
                    warn!(attempt, error = %e, ?backoff, "oracle request failed, retrying after back-off");
                    thread::sleep(backoff);
                }
            }
        }
    }
}

impl Oracle for ProcessOracle {
    fn pred(&mut self, program: &Program, k: i64, step: StepKind) -> bool {
        let request = Request { program, k, step: Self::step_code(step) };
        let mut line = serde_json::to_vec(&request).expect("request serializes to JSON");
        line.push(b'\n');

        let raw = match self.send_with_retry(&line) {
            Ok(raw) => raw,
            Err(e) => {
                self.failed = Some(e);
                return false;
            }
        };

        let response: Response = match serde_json::from_str(&raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, line = %raw, "oracle response was not valid JSON; rejecting this proposal");
                self.last_telemetry = None;
                return false;
            }
        };

        self.last_telemetry = response.telemetry.map(|t| Telemetry {
            per_call_cov_hash: t.per_call_cov_hash,
            execution_reached: t.execution_reached,
        });
        response.accept
    }

    fn telemetry(&self) -> Option<Telemetry> {
        self.last_telemetry.clone()
    }

    fn infrastructure_failure(&self) -> Option<String> {
        self.failed.clone()
    }
}
