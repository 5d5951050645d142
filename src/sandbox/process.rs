// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded child-process execution.
//!
//! Shared by the sandbox runner and the external structural parser. A
//! child is spawned from an argument vector (never through a shell) as the
//! leader of its own process group on unix. Its output streams are drained
//! on helper threads that hand their buffers back over a channel, and every
//! wait is bounded by the same wall-clock deadline.
//!
//! Once the child exits, whatever is left of its process group (background
//! jobs the script started) is killed. At the deadline the whole group is
//! killed and partial output is dropped.

use std::io::{Read, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::sandbox::SandboxError;

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Exit code and captured output of a finished process
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs `command` to completion or until `timeout` elapses
///
/// The deadline covers both the child's exit and the collection of its
/// output, so a descendant holding a pipe open cannot stall the caller.
///
/// # Errors
///
/// - `SandboxError::Spawn` if the program cannot be started
/// - `SandboxError::TimedOut` if the deadline passes (the process group is killed)
/// - `SandboxError::Io` if polling the child fails
pub fn run_with_timeout(
    mut command: Command,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<ExecutionOutcome, SandboxError> {
    let program = command.get_program().to_string_lossy().into_owned();

    command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    new_process_group(&mut command);

    let mut child = command
        .spawn()
        .map_err(|source| SandboxError::Spawn { program, source })?;
    let deadline = Instant::now() + timeout;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_string();
        // Writer thread: a child that never reads must not block us
        thread::spawn(move || {
            let _ = pipe.write_all(input.as_bytes());
        });
    }

    let (sender, receiver) = mpsc::channel();
    drain(Stream::Stdout, child.stdout.take(), sender.clone());
    drain(Stream::Stderr, child.stderr.take(), sender);

    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            terminate(&mut child);
            tracing::warn!(timeout = ?timeout, "child process timed out and was killed");
            return Err(SandboxError::TimedOut { after: timeout });
        }
        Err(e) => {
            terminate(&mut child);
            return Err(SandboxError::Io(e));
        }
    };

    // Leftover background jobs end with the script
    kill_process_group(child.id());

    let Some((stdout, stderr)) = collect(&receiver, deadline) else {
        tracing::warn!(timeout = ?timeout, "child output still open at deadline");
        return Err(SandboxError::TimedOut { after: timeout });
    };

    Ok(ExecutionOutcome {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

#[cfg(unix)]
fn new_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn new_process_group(_command: &mut Command) {}

/// Sends SIGKILL to the group led by `pid`; a group that is already gone is fine
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            tracing::debug!(pgid, error = %e, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn terminate(child: &mut Child) {
    kill_process_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

fn wait_until(
    child: &mut Child,
    deadline: Instant,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

trait OutputPipe: Read + Send + 'static {}
impl OutputPipe for ChildStdout {}
impl OutputPipe for ChildStderr {}

fn drain<P: OutputPipe>(stream: Stream, pipe: Option<P>, sender: Sender<(Stream, Vec<u8>)>) {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        // Receiver is gone after a timeout
        let _ = sender.send((stream, buffer));
    });
}

/// Both buffers, or `None` if the deadline passes first
fn collect(receiver: &Receiver<(Stream, Vec<u8>)>, deadline: Instant) -> Option<(String, String)> {
    let mut stdout = None;
    let mut stderr = None;

    while stdout.is_none() || stderr.is_none() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok((Stream::Stdout, bytes)) => stdout = Some(bytes),
            Ok((Stream::Stderr, bytes)) => stderr = Some(bytes),
            Err(RecvTimeoutError::Timeout) => return None,
            // A reader panicked; its stream counts as empty
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let text = |bytes: Option<Vec<u8>>| String::from_utf8_lossy(&bytes.unwrap_or_default()).into_owned();
    Some((text(stdout), text(stderr)))
}
