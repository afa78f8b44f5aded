//! Process discovery and termination for stray test processes

pub mod escalator;
pub mod exclusion;
pub mod matcher;
pub mod table;

pub use escalator::{
    terminate, Delivery, EscalationPolicy, NixSignaler, PidOutcome, PidReport, ProcessSignaler,
    TerminationReport,
};
pub use exclusion::{exclude, ProtectedPids, TerminationPlan};
pub use matcher::{discover, Category, MatchRule, PatternSet};
pub use table::{ProcessRecord, ProcessSnapshot, ProcessSource, SystemProcessTable};
