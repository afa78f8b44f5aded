//! Signal-trapping wrapper around a foreground test command
//!
//! The wrapper runs one child and waits for it. The first SIGINT or SIGTERM
//! it receives trips [`SignalTrap`], which runs exactly one cascade that
//! spares the wrapper and the child, then hands the signal on to the child
//! and exits with `128 + signo`. Any later signal is ignored.

use crate::error::{Result, SupervisorError};
use crate::process::{Delivery, ProcessSignaler, ProcessSource, ProtectedPids};
use crate::report::CascadeReport;
use crate::supervisor::Supervisor;
use nix::sys::signal::Signal;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Exit status used when the command could not be found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status used when the command exists but could not be started
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapState {
    Running,
    SignalReceived(Signal),
    CleaningUp(Signal),
    Exited(i32),
}

/// Guards the single transition from running into cleanup
#[derive(Debug)]
pub struct SignalTrap {
    state: TrapState,
}

impl Default for SignalTrap {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalTrap {
    pub fn new() -> Self {
        Self {
            state: TrapState::Running,
        }
    }

    pub fn state(&self) -> TrapState {
        self.state
    }

    /// Record a trapped signal. Only the first one counts; returns whether
    /// this call tripped the trap.
    pub fn trip(&mut self, signal: Signal) -> bool {
        if self.state != TrapState::Running {
            debug!(signal = signal.as_str(), state = ?self.state, "signal ignored");
            return false;
        }
        self.state = TrapState::SignalReceived(signal);
        true
    }

    /// Move from `SignalReceived` into `CleaningUp`
    pub fn begin_cleanup(&mut self) -> Option<Signal> {
        match self.state {
            TrapState::SignalReceived(signal) => {
                self.state = TrapState::CleaningUp(signal);
                Some(signal)
            }
            _ => None,
        }
    }

    pub fn exit(&mut self, code: i32) {
        self.state = TrapState::Exited(code);
    }
}

/// Source of trapped signals. `None` means no more signals will arrive.
#[allow(async_fn_in_trait)]
pub trait SignalInbox {
    async fn recv(&mut self) -> Option<Signal>;
}

/// SIGINT and SIGTERM handlers on the tokio runtime
pub struct TrapHandlers {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
}

impl TrapHandlers {
    /// Install both handlers. A handler that fails to install is logged and
    /// that signal keeps its default disposition.
    pub fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind, name: &str| match signal(kind) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(signal = name, error = %e, "failed to install signal handler");
                None
            }
        };

        Self {
            interrupt: install(SignalKind::interrupt(), "SIGINT"),
            terminate: install(SignalKind::terminate(), "SIGTERM"),
        }
    }
}

async fn next_from(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

impl SignalInbox for TrapHandlers {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            Some(()) = next_from(&mut self.interrupt) => Some(Signal::SIGINT),
            Some(()) = next_from(&mut self.terminate) => Some(Signal::SIGTERM),
            else => None,
        }
    }
}

impl SignalInbox for tokio::sync::mpsc::UnboundedReceiver<Signal> {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::sync::mpsc::UnboundedReceiver::recv(self).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WrapOptions {
    /// Run the cascade after a normal child exit too
    pub sweep_on_exit: bool,
}

#[derive(Debug)]
pub struct WrapOutcome {
    pub exit_code: i32,
    pub child_pid: Option<u32>,
    /// The signal that tripped the trap, if any
    pub trapped: Option<Signal>,
    pub cascade: Option<CascadeReport>,
    pub state: TrapState,
}

enum Event {
    ChildExited(io::Result<ExitStatus>),
    Trapped(Signal),
}

/// Shell-style exit code for a finished child
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

/// Exit code a shell reports for a failed spawn
pub fn spawn_failure_code(err: &SupervisorError) -> i32 {
    match err {
        SupervisorError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
            EXIT_NOT_FOUND
        }
        _ => EXIT_CANNOT_EXECUTE,
    }
}

/// Run `command` in the foreground, cleaning up stray test processes if a
/// signal interrupts it.
///
/// Errors are either a spawn failure (no cascade has run) or a fatal process
/// table error raised by the cascade.
pub async fn run_wrapped<T, S, I>(
    supervisor: &mut Supervisor<T, S>,
    command: &[String],
    inbox: &mut I,
    options: WrapOptions,
) -> Result<WrapOutcome>
where
    T: ProcessSource,
    S: ProcessSignaler,
    I: SignalInbox,
{
    let Some((program, args)) = command.split_first() else {
        return Err(SupervisorError::Spawn {
            command: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "no command given"),
        });
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            command: command.join(" "),
            source,
        })?;

    let child_pid = child.id();
    let mut protected = ProtectedPids::for_caller();
    if let Some(pid) = child_pid {
        protected.insert(pid);
    }
    info!(pid = ?child_pid, command = %command.join(" "), "child started");

    let mut trap = SignalTrap::new();
    let mut inbox_open = true;

    let event = loop {
        tokio::select! {
            status = child.wait() => break Event::ChildExited(status),
            signal = inbox.recv(), if inbox_open => match signal {
                Some(signal) if trap.trip(signal) => break Event::Trapped(signal),
                Some(_) => {}
                None => inbox_open = false,
            },
        }
    };

    match event {
        Event::ChildExited(status) => {
            let exit_code = match status {
                Ok(status) => exit_code(status),
                Err(e) => {
                    error!(error = %e, "failed to wait for child");
                    1
                }
            };
            info!(exit_code, "child exited");

            let cascade = if options.sweep_on_exit {
                match supervisor.cascade(&protected).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!(error = %e, "post-exit sweep failed");
                        None
                    }
                }
            } else {
                None
            };

            trap.exit(exit_code);
            Ok(WrapOutcome {
                exit_code,
                child_pid,
                trapped: None,
                cascade,
                state: trap.state(),
            })
        }
        Event::Trapped(signal) => {
            trap.begin_cleanup();
            info!(signal = signal.as_str(), "signal trapped, cleaning up");

            let cascade = supervisor.cascade(&protected).await?;

            // The child is protected from the cascade, but not left behind
            if let (Some(pid), Ok(None)) = (child_pid, child.try_wait()) {
                match supervisor.signaler_mut().send(pid, signal) {
                    Delivery::Sent => {
                        debug!(pid, signal = signal.as_str(), "signal forwarded to child")
                    }
                    Delivery::NoSuchProcess => debug!(pid, "child exited before forwarding"),
                    Delivery::Failed(reason) => {
                        warn!(pid, %reason, "failed to forward signal to child")
                    }
                }
                let grace = supervisor.settings().policy.grace_window;
                if tokio::time::timeout(grace, child.wait()).await.is_err() {
                    warn!(pid, "child ignored forwarded signal, killing");
                    if let Err(e) = child.kill().await {
                        warn!(pid, error = %e, "failed to kill child");
                    }
                }
            }

            let exit_code = 128 + signal as i32;
            trap.exit(exit_code);
            Ok(WrapOutcome {
                exit_code,
                child_pid,
                trapped: Some(signal),
                cascade: Some(cascade),
                state: trap.state(),
            })
        }
    }
}
