use crate::translate::SkipReason;
use std::fmt;

/// A record left out of the output.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedRecord {
    pub row: usize,
    pub reason: SkipReason,
}

/// A statement the target rejected.
#[derive(Clone, Debug, PartialEq)]
pub struct FailedStatement {
    pub row: usize,
    pub statement: String,
    pub error: String,
}

/// What one run did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScriptSummary {
    pub records_read: usize,
    /// Statements written to the script, or submitted to the target.
    pub statements: usize,
    pub skipped: Vec<SkippedRecord>,
    pub failures: Vec<FailedStatement>,
}

impl ScriptSummary {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Statements the target accepted. In file mode every statement counts.
    pub fn succeeded(&self) -> usize {
        self.statements - self.failures.len()
    }

    pub(crate) fn skip(&mut self, row: usize, reason: SkipReason) {
        self.skipped.push(SkippedRecord { row, reason });
    }
}

impl fmt::Display for ScriptSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records read, {} statements, {} skipped, {} failed",
            self.records_read,
            self.statements,
            self.skipped.len(),
            self.failures.len()
        )
    }
}
