use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;

/// Per-run settings and parameters handed to the translator and emitters.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub config: ExportConfig,
    /// Values supplied by the operator, such as `survey_id` or `pilot_name`.
    pub parameters: BTreeMap<String, String>,
    /// Who ran the export, written into headers and logs.
    pub operator: String,
    pub generated_at: DateTime<Local>,
}

impl RunContext {
    /// A context stamped with the current time and the login name from the
    /// environment.
    pub fn new(config: ExportConfig) -> Self {
        let operator = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            config,
            parameters: BTreeMap::new(),
            operator,
            generated_at: Local::now(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    pub fn with_generated_at(mut self, generated_at: DateTime<Local>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn parameter(&self, name: &str) -> Result<&str> {
        self.parameters
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ExportError::MissingParameter {
                name: name.to_string(),
            })
    }

    /// Timestamp in the locale's date and time representation.
    pub fn timestamp(&self) -> String {
        self.generated_at.format("%c").to_string()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}
