//! The discover -> exclude -> terminate cascade over every category

use crate::config::Settings;
use crate::error::Result;
use crate::process::{
    discover, terminate, NixSignaler, ProcessSignaler, ProcessSource, ProtectedPids,
    SystemProcessTable, TerminationPlan,
};
use crate::report::{AuditReport, CascadeReport, CategoryReport, Survivor};
use tracing::{info, warn};

/// Runs cascades against a process table with a signaler
pub struct Supervisor<T, S> {
    settings: Settings,
    table: T,
    signaler: S,
    dry_run: bool,
}

impl Supervisor<SystemProcessTable, NixSignaler> {
    /// Supervisor over the live process table
    pub fn system(settings: Settings) -> Self {
        Self::new(settings, SystemProcessTable::new(), NixSignaler)
    }
}

impl<T: ProcessSource, S: ProcessSignaler> Supervisor<T, S> {
    pub fn new(settings: Settings, table: T, signaler: S) -> Self {
        Self {
            settings,
            table,
            signaler,
            dry_run: false,
        }
    }

    /// Discover and report, but never send a signal
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn signaler(&self) -> &S {
        &self.signaler
    }

    pub fn signaler_mut(&mut self) -> &mut S {
        &mut self.signaler
    }

    /// One pass over every category, in declared order.
    ///
    /// Each category reads its own snapshot so processes killed by an earlier
    /// category are not rediscovered. Fails only if the table can't be read,
    /// and then before signaling anything for that category.
    pub async fn cascade(&mut self, protected: &ProtectedPids) -> Result<CascadeReport> {
        let mut report = CascadeReport::default();

        for category in self.settings.patterns.categories() {
            let snapshot = self.table.snapshot()?;
            let matched = discover(&snapshot, &category.rule);
            let plan = TerminationPlan::build(category.name.clone(), matched, protected);

            info!(
                category = plan.category(),
                matched = plan.records().len(),
                protected = plan.skipped(),
                "category scanned"
            );

            let termination = if self.dry_run {
                None
            } else {
                let outcome =
                    terminate(&mut self.signaler, &plan, &self.settings.policy).await;
                if outcome.failures().next().is_some() {
                    warn!(
                        category = plan.category(),
                        failed = outcome.failures().count(),
                        "some processes could not be signaled"
                    );
                }
                Some(outcome)
            };

            report.categories.push(CategoryReport {
                category: category.name.clone(),
                pattern: category.rule.as_str().to_string(),
                discovered: plan.records().to_vec(),
                protected: plan.skipped(),
                termination,
            });
        }

        Ok(report)
    }

    /// Processes that still match any category, protected pids left out
    pub fn audit(&mut self, protected: &ProtectedPids) -> Result<AuditReport> {
        let snapshot = self.table.snapshot()?;
        let mut audit = AuditReport::default();

        for category in self.settings.patterns.categories() {
            let plan = TerminationPlan::build(
                category.name.clone(),
                discover(&snapshot, &category.rule),
                protected,
            );
            audit
                .survivors
                .extend(plan.records().iter().cloned().map(|record| Survivor {
                    category: category.name.clone(),
                    record,
                }));
        }

        Ok(audit)
    }

    /// Full standalone run: cascade, then a best-effort audit
    pub async fn run(&mut self, protected: &ProtectedPids) -> Result<(CascadeReport, AuditReport)> {
        let cascade = self.cascade(protected).await?;
        let audit = match self.audit(protected) {
            Ok(audit) => audit,
            Err(e) => {
                warn!(error = %e, "final audit failed");
                AuditReport::unavailable(e.to_string())
            }
        };
        Ok((cascade, audit))
    }
}
