//! Report-producing queue tasks.
//!
//! Both tasks convert every failure into a report; nothing escapes the task
//! boundary. [`TaskOutcome`] keeps the business report apart from the error
//! that caused a failure and from the state of any cleanup that followed.

pub mod import_and_compile;
pub mod update_delivery;

pub use import_and_compile::{ImportAndCompileRequest, ImportAndCompileTask};
pub use update_delivery::{UpdateDeliveryRequest, UpdateDeliveryTask};

use crate::domain::{DeliveryError, Report};

/// Whether resources left by a failed run were cleaned up.
#[derive(Debug)]
pub enum CleanupStatus {
    /// Nothing had been allocated yet
    NotNeeded,
    Cleaned,
    Failed(DeliveryError),
}

/// Result of running a report-producing task.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(Report),
    Failed {
        /// Failure report handed to the caller
        report: Report,
        error: DeliveryError,
        cleanup: CleanupStatus,
    },
}

impl TaskOutcome {
    pub fn report(&self) -> &Report {
        match self {
            TaskOutcome::Completed(report) => report,
            TaskOutcome::Failed { report, .. } => report,
        }
    }

    pub fn into_report(self) -> Report {
        match self {
            TaskOutcome::Completed(report) => report,
            TaskOutcome::Failed { report, .. } => report,
        }
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        match self {
            TaskOutcome::Completed(_) => None,
            TaskOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }
}
