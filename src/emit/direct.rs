use crate::context::RunContext;
use crate::error::Result;
use crate::schema::TableSchema;
use crate::source::FeatureSource;
use crate::sql_functions::register_spatial_functions;
use crate::translate::VariableMode;
use rusqlite::Connection;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EmitState, FailedStatement, ScriptSummary, enter, open_translator, stream};

/// A live target that runs statements one at a time.
pub trait StatementExecutor {
    /// Run one statement and make it durable before returning.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Where statements go, for logs.
    fn target(&self) -> String;
}

/// Executes statements against a SQLite database in autocommit mode, so each
/// statement is committed on its own.
#[derive(Debug)]
pub struct SqliteExecutor {
    conn: Connection,
    target: String,
}

impl SqliteExecutor {
    /// Open (or create) the database at `path`.
    ///
    /// `busy_timeout` bounds how long a statement waits on a lock held by
    /// another connection.
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let executor = Self::from_connection(conn, path.display().to_string(), busy_timeout)?;
        debug!(target = %executor.target, "opened target database");
        Ok(executor)
    }

    pub fn from_connection(
        conn: Connection,
        target: impl Into<String>,
        busy_timeout: Duration,
    ) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            target: target.into(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl StatementExecutor for SqliteExecutor {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// Runs the statements for one source against a live target, one commit per
/// statement.
///
/// A rejected statement is logged and counted and the run carries on with
/// the next record. There is no transaction around the run, so an
/// interrupted run leaves every row before the interruption in place.
pub struct DirectWriter<'a> {
    schema: &'a TableSchema,
    context: &'a RunContext,
}

impl<'a> DirectWriter<'a> {
    pub fn new(schema: &'a TableSchema, context: &'a RunContext) -> Self {
        Self { schema, context }
    }

    /// Execute every statement and write the run log to `log`.
    pub fn run<W: Write>(
        &self,
        source: &dyn FeatureSource,
        executor: &mut dyn StatementExecutor,
        mut log: W,
    ) -> Result<ScriptSummary> {
        let table = self.schema.table.as_str();
        enter(EmitState::Idle, table);
        info!(table, source = %source.description(), target = %executor.target(), "loading records");

        enter(EmitState::Opening, table);
        let (projection, mut translator) =
            open_translator(source, self.schema, self.context, VariableMode::Inline)?;
        self.write_log_header(&mut log, source, executor)?;

        enter(EmitState::Streaming, table);
        let mut summary = ScriptSummary::default();
        stream(
            source,
            &projection,
            &mut translator,
            self.context,
            &mut summary,
            |row, sql, summary| {
                match executor.execute(sql) {
                    Ok(()) => writeln!(log, "Success|Row: {row}|{sql}|")?,
                    Err(err) => {
                        warn!(row, error = %err, "statement failed");
                        writeln!(log, "FAILED|Row: {row}|{sql}|{err}")?;
                        summary.failures.push(FailedStatement {
                            row,
                            statement: sql.to_string(),
                            error: err.to_string(),
                        });
                    }
                }
                Ok(())
            },
        )?;

        enter(EmitState::Closing, table);
        for skipped in &summary.skipped {
            writeln!(log, "SKIPPED|Row: {}|{}|", skipped.row, skipped.reason)?;
        }
        writeln!(log)?;
        writeln!(log, "{} queries failed to execute", summary.failure_count())?;
        log.flush()?;

        enter(EmitState::Done, table);
        info!(%summary, "load finished");
        Ok(summary)
    }

    fn write_log_header<W: Write>(
        &self,
        log: &mut W,
        source: &dyn FeatureSource,
        executor: &dyn StatementExecutor,
    ) -> Result<()> {
        writeln!(
            log,
            "Import {} into {} ({})",
            source.description(),
            self.schema.table,
            executor.target()
        )?;
        writeln!(log, "Operator: {}", self.context.operator)?;
        writeln!(log, "Started: {}", self.context.timestamp())?;
        writeln!(log, "Source: {}", source.description())?;
        writeln!(log, "Target: {}", executor.target())?;
        for (name, value) in &self.context.parameters {
            writeln!(log, "Parameter: {name} = {value}")?;
        }
        writeln!(log)?;
        Ok(())
    }
}
