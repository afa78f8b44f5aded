//! Graceful-then-forceful termination of a pid batch

use super::exclusion::TerminationPlan;
use super::table::ProcessRecord;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of sending one signal to one pid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    NoSuchProcess,
    Failed(String),
}

/// Sends signals and probes liveness
pub trait ProcessSignaler {
    fn send(&mut self, pid: u32, signal: Signal) -> Delivery;
    fn is_alive(&mut self, pid: u32) -> bool;
}

/// Signals real processes with kill(2)
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignaler;

impl ProcessSignaler for NixSignaler {
    fn send(&mut self, pid: u32, sig: Signal) -> Delivery {
        let Ok(raw) = i32::try_from(pid) else {
            return Delivery::Failed(format!("pid {pid} out of range"));
        };
        match signal::kill(Pid::from_raw(raw), sig) {
            Ok(()) => Delivery::Sent,
            Err(Errno::ESRCH) => Delivery::NoSuchProcess,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // EPERM still means the pid exists
        if matches!(signal::kill(Pid::from_raw(raw), None), Err(Errno::ESRCH)) {
            return false;
        }
        // kill(pid, 0) succeeds until the parent reaps, so an exited child still answers
        !is_zombie(pid)
    }
}

/// Whether `pid` has exited but not been reaped yet.
///
/// Reads the state field of `/proc/<pid>/stat`; where procfs is missing this
/// is always false.
fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // comm may itself contain ") ", the state follows the last one
    let state = stat
        .rfind(')')
        .and_then(|end| stat[end + 1..].split_whitespace().next());
    matches!(state, Some("Z") | Some("X"))
}

/// How a batch is escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub grace_signal: Signal,
    pub grace_window: Duration,
    pub kill_signal: Signal,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            grace_signal: Signal::SIGTERM,
            grace_window: Duration::from_secs(1),
            kill_signal: Signal::SIGKILL,
        }
    }
}

/// Final state of one pid after escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PidOutcome {
    /// The forceful signal was delivered
    Terminated,
    /// Gone before the graceful signal, during the grace window, or before the kill
    AlreadyGone,
    SignalFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PidReport {
    pub pid: u32,
    pub command_line: String,
    pub graceful_sent: bool,
    pub force_sent: bool,
    #[serde(flatten)]
    pub outcome: PidOutcome,
}

impl PidReport {
    fn pending(record: &ProcessRecord) -> Self {
        Self {
            pid: record.pid,
            command_line: record.command_line.clone(),
            graceful_sent: false,
            force_sent: false,
            outcome: PidOutcome::AlreadyGone,
        }
    }
}

/// Per-pid outcomes of one batch, in plan order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminationReport {
    pub grace_signal: &'static str,
    pub kill_signal: &'static str,
    pub pids: Vec<PidReport>,
}

impl TerminationReport {
    pub fn count(&self, outcome: &PidOutcome) -> usize {
        self.pids.iter().filter(|p| &p.outcome == outcome).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PidReport> {
        self.pids
            .iter()
            .filter(|p| matches!(p.outcome, PidOutcome::SignalFailed { .. }))
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

/// Escalate every pid in `plan`: graceful signal, one shared grace window,
/// liveness recheck, forceful signal for survivors.
///
/// Never fails as a whole; per-pid problems end up in the report.
pub async fn terminate<S: ProcessSignaler>(
    signaler: &mut S,
    plan: &TerminationPlan,
    policy: &EscalationPolicy,
) -> TerminationReport {
    let mut pids: Vec<PidReport> = plan.records().iter().map(PidReport::pending).collect();
    // Indices still worth a recheck after the grace window
    let mut candidates = Vec::with_capacity(pids.len());

    for (idx, report) in pids.iter_mut().enumerate() {
        match signaler.send(report.pid, policy.grace_signal) {
            Delivery::Sent => {
                debug!(
                    pid = report.pid,
                    signal = policy.grace_signal.as_str(),
                    "graceful signal sent"
                );
                report.graceful_sent = true;
                candidates.push(idx);
            }
            Delivery::NoSuchProcess => {
                debug!(pid = report.pid, "gone before graceful signal");
            }
            Delivery::Failed(reason) => {
                warn!(pid = report.pid, %reason, "graceful signal failed");
                report.outcome = PidOutcome::SignalFailed { reason };
                candidates.push(idx);
            }
        }
    }

    if pids.iter().any(|p| p.graceful_sent) && !policy.grace_window.is_zero() {
        tokio::time::sleep(policy.grace_window).await;
    }

    for idx in candidates {
        let report = &mut pids[idx];
        if !signaler.is_alive(report.pid) {
            debug!(pid = report.pid, "exited during grace window");
            report.outcome = PidOutcome::AlreadyGone;
            continue;
        }
        match signaler.send(report.pid, policy.kill_signal) {
            Delivery::Sent => {
                debug!(
                    pid = report.pid,
                    signal = policy.kill_signal.as_str(),
                    "forceful signal sent"
                );
                report.force_sent = true;
                report.outcome = PidOutcome::Terminated;
            }
            Delivery::NoSuchProcess => {
                // Vanished between the recheck and the kill
                report.outcome = PidOutcome::AlreadyGone;
            }
            Delivery::Failed(reason) => {
                warn!(pid = report.pid, %reason, "forceful signal failed");
                report.outcome = PidOutcome::SignalFailed { reason };
            }
        }
    }

    TerminationReport {
        grace_signal: policy.grace_signal.as_str(),
        kill_signal: policy.kill_signal.as_str(),
        pids,
    }
}
