//! Protected pids - processes the cascade must never target

use super::table::ProcessRecord;
use std::collections::HashSet;

/// Pids that are never signaled, whatever they match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedPids {
    pids: HashSet<u32>,
}

impl ProtectedPids {
    /// An empty set. Production callers want [`ProtectedPids::for_caller`].
    pub fn none() -> Self {
        Self {
            pids: HashSet::new(),
        }
    }

    /// The current process and the process that launched it.
    ///
    /// The parent is often a shell whose command line carries the test
    /// command (`sh -c "test-reaper -- pytest ..."`).
    pub fn for_caller() -> Self {
        Self::none()
            .with(std::process::id())
            .with(std::os::unix::process::parent_id())
    }

    pub fn with(mut self, pid: u32) -> Self {
        self.pids.insert(pid);
        self
    }

    pub fn insert(&mut self, pid: u32) {
        self.pids.insert(pid);
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }
}

/// Drop every record whose pid is protected
pub fn exclude(records: Vec<ProcessRecord>, protected: &ProtectedPids) -> Vec<ProcessRecord> {
    records
        .into_iter()
        .filter(|r| !protected.contains(r.pid))
        .collect()
}

/// The records of one category selected for escalation.
///
/// Only constructible through [`TerminationPlan::build`], which applies
/// [`exclude`], so a plan never holds a protected pid.
#[derive(Debug, Clone)]
pub struct TerminationPlan {
    category: String,
    records: Vec<ProcessRecord>,
    skipped: usize,
}

impl TerminationPlan {
    pub fn build(
        category: impl Into<String>,
        matched: Vec<ProcessRecord>,
        protected: &ProtectedPids,
    ) -> Self {
        let before = matched.len();
        let records = exclude(matched, protected);
        Self {
            category: category.into(),
            skipped: before - records.len(),
            records,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn records(&self) -> &[ProcessRecord] {
        &self.records
    }

    /// Matches dropped because they were protected
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
