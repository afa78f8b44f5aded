//! Cascade and audit reports, rendered as status lines or JSON

use crate::process::{PidOutcome, ProcessRecord, TerminationReport};
use serde::Serialize;
use std::fmt;

/// What happened to one category during a cascade
#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: String,
    pub pattern: String,
    /// Matches selected for escalation, protected pids already removed
    pub discovered: Vec<ProcessRecord>,
    /// Matches skipped because the pid was protected
    pub protected: usize,
    /// `None` on a dry run
    pub termination: Option<TerminationReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CascadeReport {
    pub categories: Vec<CategoryReport>,
}

impl CascadeReport {
    pub fn targeted_pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.categories
            .iter()
            .filter_map(|c| c.termination.as_ref())
            .flat_map(|t| t.pids.iter().map(|p| p.pid))
    }

    pub fn failures(&self) -> usize {
        self.categories
            .iter()
            .filter_map(|c| c.termination.as_ref())
            .map(|t| t.failures().count())
            .sum()
    }
}

/// A process still matching a known pattern after cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Survivor {
    pub category: String,
    #[serde(flatten)]
    pub record: ProcessRecord,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub survivors: Vec<Survivor>,
    /// Set when the closing snapshot couldn't be taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditReport {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            survivors: Vec::new(),
            error: Some(reason.into()),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.survivors.is_empty()
    }
}

impl fmt::Display for CategoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = &self.category;
        if self.discovered.is_empty() {
            return writeln!(f, "[{tag}] no matching processes");
        }

        for record in &self.discovered {
            writeln!(f, "[{tag}] discovered pid {}: {}", record.pid, record.command_line)?;
        }
        if self.protected > 0 {
            writeln!(f, "[{tag}] skipped {} protected pid(s)", self.protected)?;
        }

        let Some(report) = &self.termination else {
            return writeln!(f, "[{tag}] dry run, no signals sent");
        };
        for pid in &report.pids {
            let id = pid.pid;
            if pid.graceful_sent {
                writeln!(f, "[{tag}] pid {id} signaled gracefully ({})", report.grace_signal)?;
            }
            match &pid.outcome {
                PidOutcome::Terminated => {
                    writeln!(f, "[{tag}] pid {id} force-killed ({})", report.kill_signal)?
                }
                PidOutcome::AlreadyGone => writeln!(f, "[{tag}] pid {id} already gone")?,
                PidOutcome::SignalFailed { reason } => {
                    writeln!(f, "[{tag}] pid {id} could not be signaled: {reason}")?
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for CascadeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in &self.categories {
            write!(f, "{category}")?;
        }
        Ok(())
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cleanup completed")?;
        if let Some(reason) = &self.error {
            return writeln!(f, "audit unavailable: {reason}");
        }
        if self.survivors.is_empty() {
            return writeln!(f, "no processes still matching known patterns");
        }
        writeln!(f, "processes still matching known patterns:")?;
        for s in &self.survivors {
            writeln!(
                f,
                "  [{}] pid {}: {}",
                s.category, s.record.pid, s.record.command_line
            )?;
        }
        Ok(())
    }
}
