//! test-reaper library - find and terminate stray test processes

pub mod config;
pub mod error;
pub mod process;
pub mod report;
pub mod supervisor;
pub mod wrapper;

// Re-export commonly used types
pub use config::{Config, Settings};
pub use error::SupervisorError;
pub use process::{EscalationPolicy, PidOutcome, ProcessRecord, ProtectedPids};
pub use supervisor::Supervisor;
pub use wrapper::{run_wrapped, SignalTrap, TrapHandlers, TrapState, WrapOptions, WrapOutcome};
