use grantshift_core::AppResult;
use grantshift_domain::{GrantCategory, Instruction};
use tracing::{info, warn};

use crate::Session;
use crate::replay_planner::is_unsupported_privilege;

/// How a failed instruction affects the rest of the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Log and move on.
    Continue,
    /// Keep for the retry pass.
    Defer,
    /// Abort the replay.
    Fatal,
}

/// Decides what a statement failure of an instruction means for the replay.
#[must_use]
pub fn classify_failure(instruction: &Instruction) -> FailureDisposition {
    match instruction {
        Instruction::AssignGrant(grant) if grant.is_warehouse_usage() => {
            FailureDisposition::Continue
        }
        Instruction::AssignGrant(grant)
            if matches!(
                grant.category(),
                GrantCategory::Database | GrantCategory::Schema
            ) =>
        {
            FailureDisposition::Defer
        }
        Instruction::AssignFutureGrant { .. } => FailureDisposition::Defer,
        _ => FailureDisposition::Fatal,
    }
}

/// Append-only queue of instructions deferred to the retry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailedGrantLog {
    entries: Vec<Instruction>,
}

impl FailedGrantLog {
    /// Appends a failed instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.entries.push(instruction);
    }

    /// Appends every entry of another log.
    pub fn extend(&mut self, other: FailedGrantLog) {
        self.entries.extend(other.entries);
    }

    /// Iterates entries in failure order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of replaying a list of instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    attempted: usize,
    succeeded: usize,
    warnings: usize,
    failed: FailedGrantLog,
}

impl ExecutionReport {
    /// Returns the number of statements issued.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Returns the number of statements that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Returns the number of failures that were logged and skipped.
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// Returns the failures kept for the retry pass.
    #[must_use]
    pub fn failed(&self) -> &FailedGrantLog {
        &self.failed
    }

    /// Folds another report into this one.
    pub fn absorb(&mut self, other: ExecutionReport) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.warnings += other.warnings;
        self.failed.extend(other.failed);
    }
}

/// Applies ordered instructions to the destination account.
#[derive(Debug, Clone)]
pub struct ReplayExecutor {
    migration_user: String,
}

impl ReplayExecutor {
    /// Creates an executor; created roles are granted to the migration user.
    #[must_use]
    pub fn new(migration_user: impl Into<String>) -> Self {
        Self {
            migration_user: migration_user.into(),
        }
    }

    /// Replays instructions in order.
    ///
    /// Warehouse usage failures are logged, database and schema grant failures
    /// are deferred, and any other statement failure aborts the replay.
    pub async fn execute<'a>(
        &self,
        session: &mut Session,
        instructions: impl IntoIterator<Item = &'a Instruction>,
    ) -> AppResult<ExecutionReport> {
        let mut report = ExecutionReport::default();
        for instruction in instructions {
            self.apply(session, instruction, &mut report).await?;
        }

        Ok(report)
    }

    /// Retries every deferred instruction once; failures are reported, not retried.
    pub async fn reapply_failed(
        &self,
        session: &mut Session,
        failed: &FailedGrantLog,
    ) -> AppResult<ExecutionReport> {
        let mut report = ExecutionReport::default();
        if failed.is_empty() {
            info!("there were no failed grants, nothing to apply");
            return Ok(report);
        }

        info!(count = failed.len(), "reapplying failed grants");
        for instruction in failed.iter() {
            report.attempted += 1;
            match self.run_instruction(session, instruction).await {
                Ok(()) => report.succeeded += 1,
                Err(error) if error.is_statement_failure() => {
                    warn!(
                        instruction = %instruction,
                        error = %error,
                        "grant still failing after retry"
                    );
                    report.failed.push(instruction.clone());
                }
                Err(error) => return Err(error),
            }
        }

        Ok(report)
    }

    async fn apply(
        &self,
        session: &mut Session,
        instruction: &Instruction,
        report: &mut ExecutionReport,
    ) -> AppResult<()> {
        if is_skipped(instruction) {
            return Ok(());
        }

        report.attempted += 1;
        let error = match self.run_instruction(session, instruction).await {
            Ok(()) => {
                report.succeeded += 1;
                return Ok(());
            }
            Err(error) if error.is_statement_failure() => error,
            Err(error) => return Err(error),
        };

        match classify_failure(instruction) {
            FailureDisposition::Continue => {
                warn!(
                    instruction = %instruction,
                    error = %error,
                    "failed to grant warehouse usage"
                );
                report.warnings += 1;
                Ok(())
            }
            FailureDisposition::Defer => {
                warn!(
                    instruction = %instruction,
                    error = %error,
                    "grant failed, deferring to the retry pass"
                );
                report.failed.push(instruction.clone());
                Ok(())
            }
            FailureDisposition::Fatal => Err(error),
        }
    }

    async fn run_instruction(
        &self,
        session: &mut Session,
        instruction: &Instruction,
    ) -> AppResult<()> {
        session.use_role(instruction.acting_role()).await?;
        session.run(&instruction.to_statement()).await?;

        match instruction {
            Instruction::CreateRole { role, .. } => {
                session.grant_role_to_user(role, &self.migration_user).await?;
            }
            Instruction::AssignGrant(grant) if grant.is_warehouse_usage() => {
                session.record_warehouse_usage(grant.grantee_name(), grant.object_name());
            }
            _ => {}
        }

        Ok(())
    }
}

fn is_skipped(instruction: &Instruction) -> bool {
    match instruction {
        Instruction::AssignGrant(grant) => is_unsupported_privilege(grant.privilege()),
        Instruction::AssignFutureGrant { grant, .. } => is_unsupported_privilege(grant.privilege()),
        Instruction::CreateRole { .. } | Instruction::CreateUser { .. } => false,
    }
}
