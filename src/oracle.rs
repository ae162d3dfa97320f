//! # Equivalence oracle
//!
//! Asks an external ABC-compatible verifier whether two BLIF files describe
//! the same boolean function. The verifier is spawned with no arguments and
//! driven over stdin with a three-line script:
//!
//! ```text
//! read <a>
//! read <b>
//! cec <a> <b>
//! ```
//!
//! Any stderr output, or `NOT EQUIVALENT` on stdout, counts as a negative
//! verdict. Every failure mode maps to "not equivalent"; the [`Verdict`]
//! keeps the reason around for logging.

use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default wall-clock budget for one verifier run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one equivalence query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Equivalent,
    /// The verifier reported `NOT EQUIVALENT`
    NotEquivalent,
    /// The verifier wrote to stderr
    VerifierStderr(String),
    TimedOut,
    /// One of the two circuit files does not exist; the verifier was not run
    MissingCircuit(PathBuf),
    /// Spawn or I/O failure talking to the verifier
    VerifierFailed(String),
}

impl Verdict {
    pub fn is_equivalent(&self) -> bool {
        matches!(self, Verdict::Equivalent)
    }
}

/// Handle on an external verifier binary.
#[derive(Debug, Clone)]
pub struct EquivalenceOracle {
    verifier: PathBuf,
    timeout: Duration,
}

impl EquivalenceOracle {
    pub fn new(verifier: impl Into<PathBuf>, timeout: Duration) -> Self {
        EquivalenceOracle {
            verifier: verifier.into(),
            timeout,
        }
    }

    pub fn verifier(&self) -> &Path {
        &self.verifier
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the verifier on `a` and `b`.
    pub fn check(&self, a: &Path, b: &Path) -> Verdict {
        for path in [a, b] {
            if !path.exists() {
                debug!(path = %path.display(), "circuit file missing");
                return Verdict::MissingCircuit(path.to_path_buf());
            }
        }

        let child = Command::new(&self.verifier)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(verifier = %self.verifier.display(), error = %e, "failed to spawn verifier");
                return Verdict::VerifierFailed(e.to_string());
            }
        };

        let script = format!(
            "read {a}\nread {b}\ncec {a} {b}\n",
            a = a.display(),
            b = b.display()
        );
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(script.as_bytes()) {
                // A verifier that exits early closes its end of the pipe.
                if e.kind() != ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Verdict::VerifierFailed(e.to_string());
                }
            }
        }

        // Readers run alongside the wait so a chatty verifier cannot fill a pipe and stall.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        match child.wait_timeout(self.timeout) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(timeout_ms = self.timeout.as_millis() as u64, "verifier timed out");
                return Verdict::TimedOut;
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Verdict::VerifierFailed(e.to_string());
            }
        }

        let stdout = match collect_output(stdout) {
            Ok(text) => text,
            Err(verdict) => return verdict,
        };
        let stderr = match collect_output(stderr) {
            Ok(text) => text,
            Err(verdict) => return verdict,
        };

        let verdict = if !stderr.is_empty() {
            Verdict::VerifierStderr(stderr)
        } else if stdout.contains("NOT EQUIVALENT") {
            Verdict::NotEquivalent
        } else {
            Verdict::Equivalent
        };
        debug!(a = %a.display(), b = %b.display(), ?verdict, "equivalence check");
        verdict
    }
}

impl Default for EquivalenceOracle {
    fn default() -> Self {
        EquivalenceOracle::new("abc", DEFAULT_TIMEOUT)
    }
}

/// Boolean form of [`EquivalenceOracle::check`].
pub fn check_equivalent(a: &Path, b: &Path, verifier: &Path, timeout: Duration) -> bool {
    EquivalenceOracle::new(verifier, timeout)
        .check(a, b)
        .is_equivalent()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

/// Decodes a reader's bytes lossily. A failed read or a panicked reader is a
/// verifier failure, never an empty stream.
fn collect_output(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<String, Verdict> {
    match reader.join() {
        Ok(Ok(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(Err(e)) => Err(Verdict::VerifierFailed(format!("reading verifier output: {e}"))),
        Err(_) => Err(Verdict::VerifierFailed("verifier output reader panicked".to_string())),
    }
}
