//! Record-to-statement translation.
//!
//! A [`Translator`] is built once per run from a [`TableSchema`] and turns
//! each [`Record`] into one `INSERT` statement, or a reason to leave the
//! record out. Schemas that aggregate a line fold every record into a single
//! statement returned by [`Translator::finish`].

use crate::context::RunContext;
use crate::error::{ExportError, Result};
use crate::geometry::{
    Dialect, GeographyKind, LineBuilder, ZPolicy, geography_expression, wrap_wkt,
};
use crate::normalize::{is_null_marker, normalize, normalize_text, quote};
use crate::projection::Projection;
use crate::record::Record;
use crate::schema::{
    AggregateLine, ColumnSource, Conversion, SOURCE_PLACEHOLDER, TableSchema,
    TemplateSegment, template_segments,
};
use crate::types::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// How `variable` columns are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableMode {
    /// `@Name`, declared in the script header.
    Declared,
    /// The parameter value itself, for statements run one at a time.
    Inline,
}

/// Naming of the source a run reads, as it appears in statements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLabel {
    /// Base name, e.g. the layer or file name.
    pub name: String,
    /// Full path or provenance.
    pub description: String,
}

/// Why a record produced no statement.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// A geometry column that does not accept NULL had nothing to write.
    MissingGeometry { column: String },
    /// The record's data could not be turned into SQL.
    Invalid(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingGeometry { column } => {
                write!(f, "no geometry for mandatory column {column}")
            }
            SkipReason::Invalid(reason) => f.write_str(reason),
        }
    }
}

/// Outcome of feeding one record to the translator.
#[derive(Clone, Debug, PartialEq)]
pub enum Translation {
    Statement(String),
    Skip(SkipReason),
    /// Folded into the aggregated line; the statement comes from `finish`.
    Accumulated,
}

struct LineState {
    builder: LineBuilder,
    last: Option<Record>,
}

pub struct Translator<'a> {
    schema: &'a TableSchema,
    context: &'a RunContext,
    source: SourceLabel,
    variables: VariableMode,
    z_policy: ZPolicy,
    line: Option<LineState>,
}

impl<'a> Translator<'a> {
    /// Check the schema against the run and the source's projection.
    ///
    /// Every run parameter the schema needs must be present and every field
    /// it reads must be projected; both are setup errors.
    pub fn new(
        schema: &'a TableSchema,
        context: &'a RunContext,
        source: SourceLabel,
        projection: &Projection,
        variables: VariableMode,
    ) -> Result<Self> {
        schema.validate()?;
        for name in schema.referenced_parameters() {
            context.parameter(name)?;
        }
        for field in schema.referenced_fields() {
            if !projection.contains(field) {
                return Err(ExportError::UnknownColumn {
                    layer_name: source.name.clone(),
                    column: field.to_string(),
                });
            }
        }
        if schema.reads_geometry() && projection.geometry_field().is_none() {
            return Err(ExportError::InvalidSchema {
                table: schema.table.clone(),
                reason: format!("source {} has no geometry column", source.name),
            });
        }

        let line = schema.aggregate_line.as_ref().map(|_| LineState {
            builder: LineBuilder::new(),
            last: None,
        });
        Ok(Self {
            schema,
            context,
            source,
            variables,
            z_policy: schema.z_policy.unwrap_or(context.config.z_policy),
            line,
        })
    }

    /// Translate one record.
    ///
    /// Data problems confined to the record (unparseable numbers, broken
    /// geometry) come back as [`Translation::Skip`]; only setup problems are
    /// errors.
    pub fn translate(&mut self, record: &Record) -> Result<Translation> {
        let outcome = if self.line.is_some() {
            self.accumulate(record)
        } else {
            self.statement(record, None)
        };
        match outcome {
            Err(err) if err.is_recoverable() => {
                Ok(Translation::Skip(SkipReason::Invalid(err.to_string())))
            }
            other => other,
        }
    }

    /// The aggregated statement, if this schema aggregates and any record
    /// was fed.
    pub fn finish(&mut self) -> Result<Option<Translation>> {
        let Some(state) = self.line.take() else {
            return Ok(None);
        };
        let Some(last) = state.last.as_ref() else {
            return Ok(None);
        };
        debug!(vertices = state.builder.len(), "closing aggregated line");
        let outcome = match self.statement(last, Some(&state.builder)) {
            Err(err) if err.is_recoverable() => {
                Translation::Skip(SkipReason::Invalid(err.to_string()))
            }
            other => other?,
        };
        Ok(Some(outcome))
    }

    /// `DECLARE` lines followed by `SET` lines for the schema's variables.
    pub fn variable_declarations(&self) -> Result<Vec<String>> {
        let mut declares = Vec::with_capacity(self.schema.variables.len());
        let mut sets = Vec::with_capacity(self.schema.variables.len());
        for variable in &self.schema.variables {
            let mut declare = format!("DECLARE @{} {}", variable.name, variable.sql_type);
            if let Some(comment) = &variable.comment {
                declare.push_str(" -- ");
                declare.push_str(comment);
            }
            declares.push(declare);

            let value = self.context.parameter(&variable.parameter)?;
            sets.push(format!(
                "SET @{} = {}",
                variable.name,
                normalize_text(value, variable.quoted, false)
            ));
        }
        declares.extend(sets);
        Ok(declares)
    }

    fn accumulate(&mut self, record: &Record) -> Result<Translation> {
        let coordinates = match &self.schema.aggregate_line {
            Some(AggregateLine {
                longitude: Some(longitude),
                latitude: Some(latitude),
            }) => {
                let lon = number(record, longitude, record.value(longitude)?)?;
                let lat = number(record, latitude, record.value(latitude)?)?;
                lon.zip(lat)
            }
            _ => None,
        };
        let geometry = match coordinates {
            Some(_) => None,
            None if self.uses_field_coordinates() => None,
            None => Some(record.geometry()?),
        };

        let Some(state) = self.line.as_mut() else {
            return Ok(Translation::Accumulated);
        };
        let added = match (coordinates, geometry) {
            (Some((lon, lat)), _) => {
                state.builder.push(lon, lat);
                true
            }
            (None, Some(Some(point))) => state.builder.push_point(&point),
            _ => false,
        };

        if added {
            // Attribute columns come from the last record that added a vertex.
            state.last = Some(record.clone());
            Ok(Translation::Accumulated)
        } else {
            Ok(Translation::Skip(SkipReason::Invalid(format!(
                "record {} has no location for the line",
                record.row()
            ))))
        }
    }

    fn uses_field_coordinates(&self) -> bool {
        self.schema
            .aggregate_line
            .as_ref()
            .is_some_and(|line| line.longitude.is_some())
    }

    fn statement(&self, record: &Record, line: Option<&LineBuilder>) -> Result<Translation> {
        let mut columns = Vec::with_capacity(self.schema.columns.len());
        let mut values = Vec::with_capacity(self.schema.columns.len());

        for spec in &self.schema.columns {
            let value = match &spec.source {
                ColumnSource::Field {
                    field,
                    quoted,
                    null_to_zero,
                    convert,
                    remap,
                } => self.field(record, field, *quoted, *null_to_zero, *convert, remap)?,
                ColumnSource::Geometry {
                    geography,
                    nullable,
                } => {
                    let expression = match (line, geography) {
                        (Some(line), GeographyKind::Line) => {
                            line.expression(self.epsg(), self.dialect())
                        }
                        _ => {
                            let geometry = record.geometry()?;
                            geography_expression(
                                geometry.as_ref(),
                                self.epsg(),
                                *geography,
                                self.dialect(),
                                self.z_policy,
                            )?
                        }
                    };
                    if expression == "NULL" && !nullable {
                        return Ok(Translation::Skip(SkipReason::MissingGeometry {
                            column: spec.column.clone(),
                        }));
                    }
                    expression
                }
                ColumnSource::PointFromFields {
                    longitude,
                    latitude,
                    elevation,
                } => self.point_from_fields(record, longitude, latitude, elevation.as_deref())?,
                ColumnSource::TransectLookup {
                    field,
                    table,
                    key,
                    match_column,
                    survey_column,
                    survey_variable,
                    quoted,
                } => {
                    let value = record.value(field)?;
                    let generated = normalize(value, *quoted, false);
                    if generated == "NULL" {
                        generated
                    } else {
                        format!(
                            "(SELECT {key} FROM {table} WHERE ({survey_column} = {}) AND ({match_column} = {generated}))",
                            self.variable(survey_variable)?
                        )
                    }
                }
                ColumnSource::Literal { sql } => sql.clone(),
                ColumnSource::Text { value } => quote(value),
                ColumnSource::Parameter { name, quoted } => {
                    normalize_text(self.context.parameter(name)?, *quoted, false)
                }
                ColumnSource::Variable { name } => self.variable(name)?,
                ColumnSource::SourceName { full_path } => {
                    if *full_path {
                        quote(&self.source.description)
                    } else {
                        quote(&self.source.name)
                    }
                }
                ColumnSource::Template { template, quoted } => {
                    self.template(record, template, *quoted)?
                }
                ColumnSource::Flag { field, true_values } => {
                    let text = record.value(field)?.to_string();
                    if true_values.iter().any(|t| t == text.trim()) {
                        "1".to_string()
                    } else {
                        "0".to_string()
                    }
                }
            };
            columns.push(spec.column.as_str());
            values.push(value);
        }

        Ok(Translation::Statement(format!(
            "INSERT INTO {}({}) VALUES({});",
            self.schema.table,
            columns.join(","),
            values.join(",")
        )))
    }

    fn field(
        &self,
        record: &Record,
        field: &str,
        quoted: bool,
        null_to_zero: bool,
        convert: Option<Conversion>,
        remap: &BTreeMap<String, String>,
    ) -> Result<String> {
        let raw = record.value(field)?;
        let converted;
        let value = match convert {
            Some(conversion) => {
                converted = match number(record, field, raw)? {
                    Some(number) => Value::Real(conversion.apply(number)),
                    None => Value::Null,
                };
                &converted
            }
            None => raw,
        };

        let text = value.to_string();
        let text = match remap.get(text.trim()) {
            Some(replacement) => replacement.as_str(),
            None => text.as_str(),
        };
        Ok(normalize_text(text, quoted, null_to_zero))
    }

    fn point_from_fields(
        &self,
        record: &Record,
        longitude: &str,
        latitude: &str,
        elevation: Option<&str>,
    ) -> Result<String> {
        let lon = number(record, longitude, record.value(longitude)?)?;
        let lat = number(record, latitude, record.value(latitude)?)?;
        let (Some(lon), Some(lat)) = (lon, lat) else {
            return Ok("NULL".to_string());
        };
        let elevation = match elevation {
            Some(field) => number(record, field, record.value(field)?)?,
            None => None,
        };
        let wkt = match elevation {
            Some(elevation) => format!("POINT({lon} {lat} {elevation})"),
            None => format!("POINT({lon} {lat})"),
        };
        Ok(wrap_wkt(&wkt, self.epsg(), GeographyKind::Point, self.dialect()))
    }

    fn template(&self, record: &Record, template: &str, quoted: bool) -> Result<String> {
        // Single pass, so substituted values are never expanded again.
        let mut text = String::with_capacity(template.len());
        for segment in template_segments(template) {
            match segment {
                TemplateSegment::Literal(literal) => text.push_str(literal),
                TemplateSegment::Placeholder(SOURCE_PLACEHOLDER) => {
                    text.push_str(&self.source.name)
                }
                TemplateSegment::Placeholder(name) => {
                    let value = record.value(name)?.to_string();
                    let value = value.trim();
                    if is_null_marker(value) {
                        return Ok("NULL".to_string());
                    }
                    text.push_str(value);
                }
            }
        }
        Ok(normalize_text(&text, quoted, false))
    }

    fn variable(&self, name: &str) -> Result<String> {
        match self.variables {
            VariableMode::Declared => Ok(format!("@{name}")),
            VariableMode::Inline => {
                let spec = self
                    .schema
                    .variable(name)
                    .ok_or_else(|| ExportError::InvalidSchema {
                        table: self.schema.table.clone(),
                        reason: format!("undeclared variable @{name}"),
                    })?;
                let value = self.context.parameter(&spec.parameter)?;
                Ok(normalize_text(value, spec.quoted, false))
            }
        }
    }

    fn epsg(&self) -> u32 {
        self.context.config.epsg
    }

    fn dialect(&self) -> Dialect {
        self.context.config.dialect
    }
}

/// Read a numeric attribute; null markers give `None`.
fn number(record: &Record, field: &str, value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Integer(value) => Ok(Some(*value as f64)),
        Value::Real(value) => Ok(Some(*value)),
        other => {
            let text = other.to_string();
            let text = text.trim();
            if is_null_marker(text) {
                return Ok(None);
            }
            text.parse::<f64>().map(Some).map_err(|_| {
                warn!(row = record.row(), field, value = text, "not a number");
                ExportError::InvalidNumber {
                    row: record.row(),
                    field: field.to_string(),
                    value: text.to_string(),
                }
            })
        }
    }
}
