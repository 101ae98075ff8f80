//! Subprocess supervision: streaming capture, deadline, exit classification.
//!
//! [`capture`] owns a prepared child command and returns three channels:
//! a stdout stream, a stderr stream, and a single-shot `done` signal.
//! Internally it runs four threads:
//!
//! - one pump per pipe, relaying 1 KiB chunks until EOF
//! - a deadline timer that writes `error: timeout` and kills the child
//! - a reaper that joins the pumps, reaps the child, classifies the exit,
//!   runs the after-exit hook, and only then fires `done`
//!
//! Ordering guarantee: `done` is sent strictly after both pipes have hit
//! EOF, the exit status has been collected, and the hook has finished.
//! Consumers may therefore drain the output channels to disconnection and
//! then wait on `done` without losing tail output.
//!
//! Exit classification: a SIGSYS termination (seccomp kill) surfaces as
//! `error: operation not permitted`; any other failure surfaces as
//! `error: <status>`.

use std::io::{Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::debug;

/// Wall-clock limit applied when the caller passes a zero timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const CHUNK_SIZE: usize = 1024;

/// Handle to a supervised execution.
pub struct Capture {
    pub stdout: Receiver<Vec<u8>>,
    pub stderr: Receiver<Vec<u8>>,
    pub done: Receiver<()>,
}

/// Cleanup closure run after the child has been reaped, before `done`.
pub type AfterExitHook = Box<dyn FnOnce() + Send + 'static>;

/// Spawn `cmd` and supervise it until exit or deadline.
///
/// The command's stdio configuration is owned here: stdout/stderr are
/// piped, stdin is fed `stdin` if provided and closed otherwise.
pub fn capture(
    mut cmd: Command,
    timeout: Duration,
    stdin: Option<Vec<u8>>,
    after_exit: Option<AfterExitHook>,
) -> std::io::Result<Capture> {
    let timeout = if timeout.is_zero() {
        DEFAULT_TIMEOUT
    } else {
        timeout
    };

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn()?;
    let pid = Pid::from_raw(child.id() as i32);

    let (stdout_tx, stdout_rx) = mpsc::channel::<Vec<u8>>();
    let (stderr_tx, stderr_rx) = mpsc::channel::<Vec<u8>>();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        thread::spawn(move || {
            let _ = pipe.write_all(&data);
            // dropping the pipe closes the child's stdin
        });
    }

    let child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout not piped"))?;
    let child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr not piped"))?;

    let stdout_pump = {
        let data_tx = stdout_tx;
        let err_tx = stderr_tx.clone();
        thread::spawn(move || pump(child_stdout, data_tx, err_tx))
    };
    let stderr_pump = {
        let data_tx = stderr_tx.clone();
        let err_tx = stderr_tx.clone();
        thread::spawn(move || pump(child_stderr, data_tx, err_tx))
    };

    // Deadline timer: parked on the cancel channel; a timeout means the
    // reaper never got there first.
    let timer = {
        let err_tx = stderr_tx.clone();
        thread::spawn(move || match cancel_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                let _ = err_tx.send(b"error: timeout\n".to_vec());
                let _ = kill(pid, Signal::SIGKILL);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        })
    };

    thread::spawn(move || {
        // Both pipes must EOF before the exit status is read, so no output
        // can race the classification below.
        let _ = stdout_pump.join();
        let _ = stderr_pump.join();

        match child.wait() {
            Ok(status) if !status.success() => {
                if status.signal() == Some(libc::SIGSYS) {
                    let _ = stderr_tx.send(b"error: operation not permitted\n".to_vec());
                } else {
                    let _ = stderr_tx.send(format!("error: {status}\n").into_bytes());
                }
            }
            Ok(_) => {}
            Err(err) => {
                let _ = stderr_tx.send(format!("error: {err}\n").into_bytes());
            }
        }

        if let Some(hook) = after_exit {
            hook();
        }

        let _ = cancel_tx.send(());
        let _ = timer.join();
        drop(stderr_tx);

        debug!(pid = pid.as_raw(), "execution finished");
        let _ = done_tx.send(());
    });

    Ok(Capture {
        stdout: stdout_rx,
        stderr: stderr_rx,
        done: done_rx,
    })
}

fn pump(mut source: impl Read, data_tx: Sender<Vec<u8>>, err_tx: Sender<Vec<u8>>) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if data_tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = err_tx.send(format!("error: {err}\n").into_bytes());
                break;
            }
        }
    }
}

/// Drain a capture to completion: concatenated stdout, concatenated stderr.
///
/// Returns only after `done` has fired, so the buffers always reflect the
/// full streams.
pub fn drain(capture: Capture) -> (Vec<u8>, Vec<u8>) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for chunk in capture.stdout.iter() {
        stdout.extend_from_slice(&chunk);
    }
    for chunk in capture.stderr.iter() {
        stderr.extend_from_slice(&chunk);
    }
    let _ = capture.done.recv();
    (stdout, stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout() {
        let capture = capture(sh("echo hello"), Duration::from_secs(5), None, None).unwrap();
        let (stdout, stderr) = drain(capture);
        assert_eq!(stdout, b"hello\n");
        assert!(stderr.is_empty());
    }

    #[test]
    fn nonzero_exit_is_reported_on_stderr() {
        let capture = capture(sh("exit 3"), Duration::from_secs(5), None, None).unwrap();
        let (_, stderr) = drain(capture);
        let text = String::from_utf8_lossy(&stderr);
        assert!(text.starts_with("error: "), "got: {text}");
        assert!(text.contains('3'), "got: {text}");
    }

    #[test]
    fn timeout_kills_and_reports() {
        let started = Instant::now();
        let capture = capture(sh("sleep 30"), Duration::from_millis(200), None, None).unwrap();
        let (_, stderr) = drain(capture);
        let text = String::from_utf8_lossy(&stderr);
        assert!(text.contains("error: timeout\n"), "got: {text}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_uses_default() {
        // Must complete normally, not be killed at t=0.
        let capture = capture(sh("echo quick"), Duration::ZERO, None, None).unwrap();
        let (stdout, _) = drain(capture);
        assert_eq!(stdout, b"quick\n");
    }

    #[test]
    fn stdin_is_delivered_and_closed() {
        let capture = capture(
            sh("cat"),
            Duration::from_secs(5),
            Some(b"piped input".to_vec()),
            None,
        )
        .unwrap();
        let (stdout, _) = drain(capture);
        assert_eq!(stdout, b"piped input");
    }

    #[test]
    fn hook_runs_before_done() {
        let fired = Arc::new(AtomicBool::new(false));
        let hook_fired = fired.clone();
        let capture = capture(
            sh("true"),
            Duration::from_secs(5),
            None,
            Some(Box::new(move || {
                hook_fired.store(true, Ordering::SeqCst);
            })),
        )
        .unwrap();
        capture.done.recv().unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn done_fires_after_output_channels_close() {
        let capture = capture(sh("echo out; echo err 1>&2"), Duration::from_secs(5), None, None)
            .unwrap();
        // Drain everything first; done must still be deliverable.
        let stdout: Vec<u8> = capture.stdout.iter().flatten().collect();
        let stderr: Vec<u8> = capture.stderr.iter().flatten().collect();
        capture.done.recv().unwrap();
        assert_eq!(stdout, b"out\n");
        assert_eq!(stderr, b"err\n");
    }
}
