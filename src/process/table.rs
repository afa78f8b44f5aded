//! Process table snapshots

use crate::error::{Result, SupervisorError};
use serde::Serialize;
use sysinfo::{ProcessRefreshKind, System, UpdateKind};

/// One live OS process at the moment of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub command_line: String,
}

impl ProcessRecord {
    pub fn new(pid: u32, command_line: impl Into<String>) -> Self {
        Self {
            pid,
            command_line: command_line.into(),
        }
    }
}

/// A single read of the process table, ordered by pid
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    records: Vec<ProcessRecord>,
}

impl ProcessSnapshot {
    pub fn new(mut records: Vec<ProcessRecord>) -> Self {
        records.sort_by_key(|r| r.pid);
        records.dedup_by_key(|r| r.pid);
        Self { records }
    }

    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.records.binary_search_by_key(&pid, |r| r.pid).is_ok()
    }

}

/// Anything that can produce a snapshot of the process table
pub trait ProcessSource {
    fn snapshot(&mut self) -> Result<ProcessSnapshot>;
}

/// The live OS process table, read through sysinfo
pub struct SystemProcessTable {
    sys: System,
    own_pid: u32,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            own_pid: std::process::id(),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SystemProcessTable {
    fn snapshot(&mut self) -> Result<ProcessSnapshot> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SupervisorError::ProcessTable(format!(
                "process listing is not supported on {}",
                std::env::consts::OS
            )));
        }

        // A plain refresh_processes() leaves cmd() empty
        self.sys
            .refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));

        let records: Vec<ProcessRecord> = self
            .sys
            .processes()
            .iter()
            .map(|(pid, proc)| {
                let cmd = proc.cmd().join(" ");
                // Kernel threads and zombies have no cmdline
                let command_line = if cmd.is_empty() {
                    proc.name().to_string()
                } else {
                    cmd
                };
                ProcessRecord::new(pid.as_u32(), command_line)
            })
            .collect();

        let snapshot = ProcessSnapshot::new(records);

        // sysinfo swallows read errors, so a table that can't see us is unreadable
        if !snapshot.contains(self.own_pid) {
            return Err(SupervisorError::ProcessTable(format!(
                "own pid {} not visible ({} entries read)",
                self.own_pid,
                snapshot.records().len()
            )));
        }

        tracing::debug!(entries = snapshot.records().len(), "process table snapshot");
        Ok(snapshot)
    }
}
