//! Script and direct-write emitters.
//!
//! Both emitters run the same pipeline: build the projection once, stream the
//! source's records through the [`Translator`], then hand each statement to
//! a sink (a script writer or a live connection).

mod direct;
mod script;
mod summary;

pub use direct::{DirectWriter, SqliteExecutor, StatementExecutor};
pub use script::ScriptEmitter;
pub use summary::{FailedStatement, ScriptSummary, SkippedRecord};

use crate::config::MissingGeometry;
use crate::context::RunContext;
use crate::error::{ExportError, Result};
use crate::projection::{Projection, build_projection};
use crate::schema::TableSchema;
use crate::source::FeatureSource;
use crate::translate::{SkipReason, SourceLabel, Translation, Translator, VariableMode};
use tracing::{debug, warn};

/// Stage of an emitter run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EmitState {
    Idle,
    Opening,
    Streaming,
    Closing,
    Done,
}

pub(crate) fn enter(state: EmitState, table: &str) {
    debug!(?state, table, "emitter state");
}

pub(crate) fn source_label(source: &dyn FeatureSource) -> SourceLabel {
    SourceLabel {
        name: source.name(),
        description: source.description(),
    }
}

pub(crate) fn open_translator<'a>(
    source: &dyn FeatureSource,
    schema: &'a TableSchema,
    context: &'a RunContext,
    variables: VariableMode,
) -> Result<(Projection, Translator<'a>)> {
    let projection = build_projection(&source.fields()?);
    let translator = Translator::new(schema, context, source_label(source), &projection, variables)?;
    Ok((projection, translator))
}

/// Stream every record through the translator and pass each statement, with
/// the row it came from, to `sink`.
pub(crate) fn stream<F>(
    source: &dyn FeatureSource,
    projection: &Projection,
    translator: &mut Translator<'_>,
    context: &RunContext,
    summary: &mut ScriptSummary,
    mut sink: F,
) -> Result<()>
where
    F: FnMut(usize, &str, &mut ScriptSummary) -> Result<()>,
{
    let mut last_row = 0;
    for record in source.records(projection, context.config.epsg)? {
        summary.records_read += 1;
        let record = match record {
            Ok(record) => record,
            Err(err) if err.is_recoverable() => {
                let row = summary.records_read;
                warn!(row, error = %err, "unreadable record skipped");
                summary.skip(row, SkipReason::Invalid(err.to_string()));
                continue;
            }
            Err(err) => return Err(err),
        };
        last_row = record.row();
        let translation = translator.translate(&record)?;
        dispatch(record.row(), translation, context, summary, &mut sink)?;
    }

    if let Some(translation) = translator.finish()? {
        dispatch(last_row, translation, context, summary, &mut sink)?;
    }
    Ok(())
}

fn dispatch<F>(
    row: usize,
    translation: Translation,
    context: &RunContext,
    summary: &mut ScriptSummary,
    sink: &mut F,
) -> Result<()>
where
    F: FnMut(usize, &str, &mut ScriptSummary) -> Result<()>,
{
    match translation {
        Translation::Statement(sql) => {
            summary.statements += 1;
            debug!(row, %sql, "statement");
            sink(row, &sql, summary)
        }
        Translation::Skip(SkipReason::MissingGeometry { column })
            if context.config.missing_geometry == MissingGeometry::Abort =>
        {
            Err(ExportError::MissingGeometry { row, column })
        }
        Translation::Skip(reason) => {
            warn!(row, %reason, "record skipped");
            summary.skip(row, reason);
            Ok(())
        }
        Translation::Accumulated => Ok(()),
    }
}
