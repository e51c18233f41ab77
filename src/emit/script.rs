use crate::context::RunContext;
use crate::error::Result;
use crate::geometry::Dialect;
use crate::projection::Projection;
use crate::schema::TableSchema;
use crate::source::FeatureSource;
use crate::translate::{Translator, VariableMode};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{EmitState, ScriptSummary, enter, open_translator, stream};

const REMINDER: &str = "Do not forget to COMMIT or ROLLBACK the changes after executing or the database will be in a locked state ";

/// Writes the statements for one source as a reviewable SQL script.
///
/// The script opens a transaction and never closes it: the operator reads the
/// script, runs it, and commits or rolls back by hand.
pub struct ScriptEmitter<'a> {
    schema: &'a TableSchema,
    context: &'a RunContext,
    script_name: Option<String>,
}

impl<'a> ScriptEmitter<'a> {
    pub fn new(schema: &'a TableSchema, context: &'a RunContext) -> Self {
        Self {
            schema,
            context,
            script_name: None,
        }
    }

    /// Name the script file in the `sqlcmd` hint of the header.
    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = Some(name.into());
        self
    }

    /// Write the script to a new file at `path`.
    pub fn emit_to_path<P: AsRef<Path>>(
        self,
        source: &dyn FeatureSource,
        path: P,
    ) -> Result<ScriptSummary> {
        let path = path.as_ref();
        let emitter = if self.script_name.is_some() {
            self
        } else {
            self.with_script_name(path.display().to_string())
        };
        // Setup errors surface before the file is created.
        let prepared = emitter.open(source)?;
        let mut writer = BufWriter::new(File::create(path)?);
        let summary = emitter.write_script(source, prepared, &mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), %summary, "script written");
        Ok(summary)
    }

    /// Write header, one statement per translated record, and footer.
    ///
    /// Example:
    /// ```
    /// use survey_sql::{FieldSpec, MemorySource, RunContext, ScriptEmitter, Value, preset};
    ///
    /// let schema = preset("flat_areas")?;
    /// let context = RunContext::default().with_parameter("survey_id", "DENA-2024");
    /// let mut source = MemorySource::new(
    ///     "FlatAreas",
    ///     vec![FieldSpec::attribute("Shape"), FieldSpec::attribute("GeneratedSurveyID")],
    /// );
    /// source.push(vec![
    ///     Value::from("POLYGON((0 0, 1 0, 1 1, 0 0))"),
    ///     Value::from("DENA-2024-07"),
    /// ]);
    ///
    /// let mut script = Vec::new();
    /// let summary = ScriptEmitter::new(&schema, &context).emit(&source, &mut script)?;
    /// assert_eq!(summary.statements, 1);
    /// let script = String::from_utf8(script).unwrap();
    /// assert!(script.contains("INSERT INTO FlatAreas("));
    /// # Ok::<(), survey_sql::ExportError>(())
    /// ```
    pub fn emit<W: Write>(&self, source: &dyn FeatureSource, writer: W) -> Result<ScriptSummary> {
        let prepared = self.open(source)?;
        self.write_script(source, prepared, writer)
    }

    fn open(&self, source: &dyn FeatureSource) -> Result<(Projection, Translator<'a>)> {
        let table = self.schema.table.as_str();
        enter(EmitState::Idle, table);
        info!(table, source = %source.description(), "generating script");

        enter(EmitState::Opening, table);
        let variables = match self.dialect() {
            Dialect::SqlServer => VariableMode::Declared,
            Dialect::Sqlite => VariableMode::Inline,
        };
        open_translator(source, self.schema, self.context, variables)
    }

    fn write_script<W: Write>(
        &self,
        source: &dyn FeatureSource,
        (projection, mut translator): (Projection, Translator<'a>),
        mut writer: W,
    ) -> Result<ScriptSummary> {
        let table = self.schema.table.as_str();
        self.write_header(&mut writer, source, &translator)?;

        enter(EmitState::Streaming, table);
        let batched = self.batch_statements();
        let mut summary = ScriptSummary::default();
        stream(
            source,
            &projection,
            &mut translator,
            self.context,
            &mut summary,
            |row, sql, _| {
                if batched {
                    write!(writer, "PRINT 'ROW {row}';\n{sql}\nGO\n\n")?;
                } else {
                    writeln!(writer, "{sql}")?;
                }
                Ok(())
            },
        )?;

        enter(EmitState::Closing, table);
        if self.open_transaction() {
            write!(writer, "\n-- {REMINDER}\n")?;
        }
        writer.flush()?;

        enter(EmitState::Done, table);
        debug!(%summary, "script complete");
        Ok(summary)
    }

    fn write_header<W: Write>(
        &self,
        writer: &mut W,
        source: &dyn FeatureSource,
        translator: &Translator<'_>,
    ) -> Result<()> {
        let config = &self.context.config;
        let title = match &self.schema.title {
            Some(title) => title.clone(),
            None => format!(
                "Insert queries to transfer data from {} into {} database",
                source.description(),
                config.database
            ),
        };
        writeln!(writer, "-- {title}")?;
        writeln!(
            writer,
            "-- File generated {} by {}",
            self.context.timestamp(),
            self.context.operator
        )?;

        match self.dialect() {
            Dialect::SqlServer => {
                if let Some(name) = &self.script_name {
                    writeln!(
                        writer,
                        "-- If this file is too big to run in Sql Server Management Studio then run from a Windows Power Shell prompt:"
                    )?;
                    writeln!(writer, "-- sqlcmd /S SERVER\\INSTANCE /i \"{name}\"")?;
                }
                writeln!(writer, "USE {} ", config.database)?;
                if self.open_transaction() {
                    writeln!(writer, "BEGIN TRANSACTION -- {REMINDER}")?;
                } else {
                    writeln!(writer, "-- BEGIN TRANSACTION -- {REMINDER}")?;
                }
                write!(writer, "SET QUOTED_IDENTIFIER ON\n\n")?;
            }
            Dialect::Sqlite => {
                if self.open_transaction() {
                    writeln!(writer, "BEGIN TRANSACTION; -- {REMINDER}")?;
                }
                writeln!(writer)?;
            }
        }

        writeln!(
            writer,
            "\n-- insert the {} from {} -----------------------------------------------------------",
            self.schema.section,
            source.name()
        )?;
        if self.dialect() == Dialect::SqlServer {
            for line in translator.variable_declarations()? {
                writeln!(writer, "{line}")?;
            }
        }
        Ok(())
    }

    fn dialect(&self) -> Dialect {
        self.context.config.dialect
    }

    fn open_transaction(&self) -> bool {
        self.schema
            .open_transaction
            .unwrap_or(self.context.config.open_transaction)
    }

    // `PRINT` and `GO` are SQL Server batch commands.
    fn batch_statements(&self) -> bool {
        self.dialect() == Dialect::SqlServer
            && self
                .schema
                .batch_statements
                .unwrap_or(self.context.config.batch_statements)
    }
}

#[cfg(test)]
mod tests {
    use super::ScriptEmitter;
    use crate::config::{ExportConfig, MissingGeometry};
    use crate::context::RunContext;
    use crate::error::ExportError;
    use crate::geometry::Dialect;
    use crate::schema::TableSchema;
    use crate::source::MemorySource;
    use crate::types::{FieldSpec, Value};
    use crate::Result;
    use chrono::{Local, TimeZone};

    const POINTS: &str = r#"
table: GPSTracks
section: GPS track points
columns:
  - {column: PilotName, kind: field, field: PILOTLNAM, quoted: true}
  - {column: PointFeature, kind: geometry, geography: point}
"#;

    fn context(config: ExportConfig) -> RunContext {
        let generated_at = Local
            .with_ymd_and_hms(2024, 6, 1, 10, 15, 0)
            .single()
            .expect("unambiguous local time");
        RunContext::new(config)
            .with_operator("sheep")
            .with_generated_at(generated_at)
    }

    fn source() -> MemorySource {
        let mut source = MemorySource::new(
            "GPSPoints",
            vec![FieldSpec::attribute("Shape"), FieldSpec::attribute("PILOTLNAM")],
        );
        source.push(vec![Value::from("POINT(-149 63)"), Value::from("Smith")]);
        source.push(vec![Value::Null, Value::from("Jones")]);
        source.push(vec![Value::from("POINT(-150 64)"), Value::from("O'Hara")]);
        source
    }

    fn emit(schema: &TableSchema, context: &RunContext) -> Result<(String, crate::ScriptSummary)> {
        let mut out = Vec::new();
        let summary = ScriptEmitter::new(schema, context)
            .with_script_name("Import_GPSPoints.sql")
            .emit(&source(), &mut out)?;
        Ok((String::from_utf8_lossy(&out).into_owned(), summary))
    }

    #[test]
    fn script_layout_for_sql_server() -> Result<()> {
        let schema = TableSchema::from_yaml_str(POINTS)?;
        let context = context(ExportConfig::default());
        let (script, summary) = emit(&schema, &context)?;

        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(
            lines[0],
            "-- Insert queries to transfer data from GPSPoints into ARCN_Sheep database"
        );
        assert!(lines[1].starts_with("-- File generated ") && lines[1].ends_with(" by sheep"));
        assert_eq!(lines[3], "-- sqlcmd /S SERVER\\INSTANCE /i \"Import_GPSPoints.sql\"");
        assert_eq!(lines[4], "USE ARCN_Sheep ");
        assert!(lines[5].starts_with("BEGIN TRANSACTION -- Do not forget to COMMIT"));
        assert_eq!(lines[6], "SET QUOTED_IDENTIFIER ON");
        assert!(lines[9].starts_with("-- insert the GPS track points from GPSPoints ---"));
        assert_eq!(
            lines[10],
            "INSERT INTO GPSTracks(PilotName,PointFeature) VALUES('Smith',geography::STPointFromText('POINT(-149 63)', 4326));"
        );
        assert_eq!(
            lines[11],
            "INSERT INTO GPSTracks(PilotName,PointFeature) VALUES('O''Hara',geography::STPointFromText('POINT(-150 64)', 4326));"
        );
        assert!(script.ends_with(
            "\n-- Do not forget to COMMIT or ROLLBACK the changes after executing or the database will be in a locked state \n"
        ));
        assert!(!script.contains("COMMIT;") && !script.contains("ROLLBACK;"));

        assert_eq!(summary.records_read, 3);
        assert_eq!(summary.statements, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].row, 2);
        Ok(())
    }

    #[test]
    fn batched_statements_without_transaction() -> Result<()> {
        let mut schema = TableSchema::from_yaml_str(POINTS)?;
        schema.open_transaction = Some(false);
        schema.batch_statements = Some(true);
        let context = context(ExportConfig::default());
        let (script, _) = emit(&schema, &context)?;

        assert!(script.contains("\n-- BEGIN TRANSACTION -- "));
        assert!(script.contains("PRINT 'ROW 1';\nINSERT INTO GPSTracks("));
        assert!(script.contains("PRINT 'ROW 3';\nINSERT INTO GPSTracks("));
        assert!(!script.contains("PRINT 'ROW 2'"));
        assert!(script.ends_with(";\nGO\n\n"));
        Ok(())
    }

    #[test]
    fn sqlite_dialect_drops_server_boilerplate() -> Result<()> {
        let schema = TableSchema::from_yaml_str(POINTS)?;
        let context = context(ExportConfig::default().with_dialect(Dialect::Sqlite));
        let (script, _) = emit(&schema, &context)?;

        assert!(!script.contains("USE "));
        assert!(!script.contains("QUOTED_IDENTIFIER"));
        assert!(!script.contains("sqlcmd"));
        assert!(script.contains("\nBEGIN TRANSACTION; -- "));
        assert!(script.contains("ST_PointFromText('POINT(-149 63)', 4326)"));
        Ok(())
    }

    #[test]
    fn setup_failure_leaves_no_script_behind() -> Result<()> {
        let schema = TableSchema::from_yaml_str(
            r#"
table: GPSTracks
columns:
  - {column: PilotName, kind: field, field: PILOTLNAM, quoted: true}
  - {column: SurveyID, kind: parameter, name: survey_id, quoted: true}
"#,
        )?;
        let context = context(ExportConfig::default());
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Import_GPSPoints.sql");

        let err = ScriptEmitter::new(&schema, &context)
            .emit_to_path(&source(), &path)
            .err()
            .expect("survey_id is not set");
        assert!(matches!(err, ExportError::MissingParameter { .. }));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn unreadable_record_is_skipped_and_later_ones_emitted() -> Result<()> {
        let schema = TableSchema::from_yaml_str(POINTS)?;
        let context = context(ExportConfig::default());
        let mut source = MemorySource::new(
            "GPSPoints",
            vec![FieldSpec::attribute("Shape"), FieldSpec::attribute("PILOTLNAM")],
        );
        source.push(vec![Value::from("POINT(-149 63)"), Value::from("Smith")]);
        source.push(vec![Value::from("POINT(oops)"), Value::from("Jones")]);
        source.push(vec![Value::from("POINT(-150 64)"), Value::from("Brown")]);

        let mut out = Vec::new();
        let summary = ScriptEmitter::new(&schema, &context).emit(&source, &mut out)?;
        assert_eq!(summary.records_read, 3);
        assert_eq!(summary.statements, 2);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].row, 2);

        let script = String::from_utf8_lossy(&out);
        assert!(script.contains("VALUES('Smith',"));
        assert!(!script.contains("'Jones'"));
        assert!(script.contains("VALUES('Brown',"));
        Ok(())
    }

    #[test]
    fn abort_policy_fails_on_missing_geometry() -> Result<()> {
        let schema = TableSchema::from_yaml_str(POINTS)?;
        let config = ExportConfig {
            missing_geometry: MissingGeometry::Abort,
            ..ExportConfig::default()
        };
        let context = context(config);
        let err = emit(&schema, &context).err().expect("row 2 has no geometry");
        assert!(matches!(
            err,
            ExportError::MissingGeometry { row: 2, column } if column == "PointFeature"
        ));
        Ok(())
    }
}
