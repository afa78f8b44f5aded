//! In-memory process table and signaler shared by the integration tests

#![allow(dead_code)]

use nix::sys::signal::Signal;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use test_reaper::process::{Delivery, ProcessRecord, ProcessSignaler, ProcessSnapshot, ProcessSource};
use test_reaper::SupervisorError;

#[derive(Default)]
struct State {
    table: BTreeMap<u32, String>,
    sent: Vec<(u32, Signal)>,
    /// Pids that ignore the graceful signal
    stubborn: HashSet<u32>,
    refuses: HashMap<u32, String>,
    unreadable: bool,
}

/// A process table where signals actually remove processes
#[derive(Clone, Default)]
pub struct FakeSystem {
    state: Rc<RefCell<State>>,
}

impl FakeSystem {
    pub fn with(processes: &[(u32, &str)]) -> Self {
        let system = Self::default();
        for &(pid, cmd) in processes {
            system.spawn(pid, cmd);
        }
        system
    }

    pub fn spawn(&self, pid: u32, cmd: &str) {
        self.state.borrow_mut().table.insert(pid, cmd.to_string());
    }

    /// `pid` survives the graceful signal and needs the forceful one
    pub fn stubborn(&self, pid: u32) {
        self.state.borrow_mut().stubborn.insert(pid);
    }

    pub fn refuse(&self, pid: u32, reason: &str) {
        self.state.borrow_mut().refuses.insert(pid, reason.to_string());
    }

    pub fn make_unreadable(&self) {
        self.state.borrow_mut().unreadable = true;
    }

    pub fn sent(&self) -> Vec<(u32, Signal)> {
        self.state.borrow().sent.clone()
    }

    pub fn signaled_pids(&self) -> HashSet<u32> {
        self.state.borrow().sent.iter().map(|(pid, _)| *pid).collect()
    }

    pub fn sends_to(&self, pid: u32, signal: Signal) -> usize {
        self.state
            .borrow()
            .sent
            .iter()
            .filter(|&&(p, s)| p == pid && s == signal)
            .count()
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.state.borrow().table.contains_key(&pid)
    }
}

impl ProcessSource for FakeSystem {
    fn snapshot(&mut self) -> Result<ProcessSnapshot, SupervisorError> {
        let state = self.state.borrow();
        if state.unreadable {
            return Err(SupervisorError::ProcessTable("permission denied".to_string()));
        }
        Ok(ProcessSnapshot::new(
            state
                .table
                .iter()
                .map(|(&pid, cmd)| ProcessRecord::new(pid, cmd.clone()))
                .collect(),
        ))
    }
}

impl ProcessSignaler for FakeSystem {
    fn send(&mut self, pid: u32, signal: Signal) -> Delivery {
        let mut state = self.state.borrow_mut();
        if !state.table.contains_key(&pid) {
            return Delivery::NoSuchProcess;
        }
        if let Some(reason) = state.refuses.get(&pid).cloned() {
            return Delivery::Failed(reason);
        }
        state.sent.push((pid, signal));
        if signal == Signal::SIGKILL || !state.stubborn.contains(&pid) {
            state.table.remove(&pid);
        }
        Delivery::Sent
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        self.state.borrow().table.contains_key(&pid)
    }
}
