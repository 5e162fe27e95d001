//! Supervised child process
//!
//! Owns the three pipes of one external program:
//! - stdin: framed lines are written here
//! - stdout: drained with a bounded wait, or read line by line
//! - stderr: handed to a [`watch_stderr`] task

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::drain::{self, Drained};
use crate::error::SupervisorError;
use crate::state::{ProcessState, StateCell};
use crate::watchdog::{watch_stderr, CrashEvent, CrashSignature};

/// How long a failed write waits for the watchdog to classify the exit
const CRASH_SETTLE: Duration = Duration::from_millis(500);

/// One running external program
#[derive(Debug)]
pub struct SupervisedProcess {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    pending: Vec<u8>,
    state: StateCell,
    watchdog: Option<JoinHandle<Option<CrashSignature>>>,
}

impl SupervisedProcess {
    /// Start `command_line`, split on whitespace
    ///
    /// Crashes seen on stderr are reported on `crashes`.
    #[instrument(name = "supervisor_spawn", skip(crashes))]
    pub fn spawn(
        command_line: &str,
        crashes: mpsc::UnboundedSender<CrashEvent>,
    ) -> Result<Self, SupervisorError> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or(SupervisorError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                command: command_line.to_string(),
                source,
            })?;

        let name = command_line.to_string();
        let state = StateCell::new();
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(SupervisorError::io(
                name,
                std::io::Error::other("child pipes unavailable"),
            ));
        };

        let watchdog = tokio::spawn(watch_stderr(stderr, name.clone(), state.clone(), crashes));
        state.advance(ProcessState::Ready);
        info!(process = %name, pid = ?child.id(), "Process spawned");

        Ok(Self {
            name,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
            state,
            watchdog: Some(watchdog),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state.get()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write newline-terminated lines to stdin and flush
    ///
    /// A write failure caused by a crash is reported as `Crashed` once the
    /// watchdog has classified the exit.
    pub async fn write_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<(), SupervisorError> {
        self.ensure_alive()?;
        let result = self.write_all(lines).await;
        match result {
            Ok(()) => {
                self.state.advance(ProcessState::AwaitingDrain);
                Ok(())
            }
            Err(e) => {
                self.settle().await;
                self.ensure_alive()?;
                Err(SupervisorError::io(&self.name, e))
            }
        }
    }

    async fn write_all<S: AsRef<str>>(&mut self, lines: &[S]) -> std::io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        };
        for line in lines {
            stdin.write_all(line.as_ref().as_bytes()).await?;
        }
        stdin.flush().await
    }

    /// Read at most one stdout line, waiting no longer than `wait`
    pub async fn drain(&mut self, wait: Duration) -> Result<Drained, SupervisorError> {
        let drained = drain::drain_line(&mut self.stdout, &mut self.pending, wait)
            .await
            .map_err(|e| SupervisorError::io(&self.name, e))?;
        self.state.advance(ProcessState::Ready);
        Ok(drained)
    }

    /// Read the output answering `written` input lines
    ///
    /// Up to `written` lines are each awaited for at most `wait`; lines
    /// beyond that are taken only while already available. Stops at the
    /// first empty read or at EOF, so stdout never backs up across units.
    pub async fn drain_reply(
        &mut self,
        written: usize,
        wait: Duration,
    ) -> Result<Vec<String>, SupervisorError> {
        let mut reply = Vec::new();
        loop {
            let wait = if reply.len() < written { wait } else { Duration::ZERO };
            match self.drain(wait).await? {
                Drained::Line(line) => reply.push(line),
                Drained::Empty | Drained::Closed => return Ok(reply),
            }
        }
    }

    /// Read the next stdout line, waiting for it; `None` at EOF
    pub async fn read_line(&mut self) -> Result<Option<String>, SupervisorError> {
        drain::read_line(&mut self.stdout, &mut self.pending)
            .await
            .map_err(|e| SupervisorError::io(&self.name, e))
    }

    /// Close stdin, wait for exit and for the watchdog to finish
    #[instrument(name = "supervisor_close", skip(self), fields(process = %self.name))]
    pub async fn close(mut self) -> Result<ExitStatus, SupervisorError> {
        self.stdin.take();
        self.state.advance(ProcessState::Closed);

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SupervisorError::io(&self.name, e))?;
        if let Some(watchdog) = self.watchdog.take() {
            if let Err(e) = watchdog.await {
                warn!(error = %e, "stderr watchdog failed");
            }
        }

        if status.success() {
            debug!(?status, "Process exited");
        } else {
            warn!(?status, "Process exited with failure");
        }
        self.state.advance(ProcessState::Terminated);
        Ok(status)
    }

    fn ensure_alive(&self) -> Result<(), SupervisorError> {
        match self.state.get() {
            ProcessState::Crashed => Err(SupervisorError::Crashed {
                process: self.name.clone(),
            }),
            ProcessState::Closed | ProcessState::Terminated => Err(SupervisorError::Closed {
                process: self.name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Give the watchdog a moment to classify a dying process
    async fn settle(&mut self) {
        if let Some(watchdog) = self.watchdog.as_mut() {
            if timeout(CRASH_SETTLE, watchdog).await.is_ok() {
                self.watchdog = None;
            }
        }
    }
}
