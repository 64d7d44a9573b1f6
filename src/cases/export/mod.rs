//! Case export formatter.
//!
//! Turns one case and its related collections into delivery payloads: a set
//! of CSV tables (spreadsheet friendly, lossy for nested values) or a single
//! JSON document (lossless, with export metadata). Pure and synchronous; the
//! caller decides how the payloads reach the user.

mod csv;
mod json;

pub use self::csv::{csv_table, export_csv, render_cell, table_columns};
pub use self::json::{FORMAT_VERSION, export_json};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{CaseRecord, EntityFields, RelatedCollection};
use crate::error::ExportError;

/// Fields a case must carry before anything is exported.
pub const REQUIRED_CASE_FIELDS: &[&str] = &["case_number", "title", "status"];

/// Name of the single-row CSV table holding the case's own fields.
pub const CASE_INFO_TABLE: &str = "case-info";

/// A case plus its related collections, as fetched by the caller.
///
/// Collections hold raw JSON values so bundles assembled outside the store
/// (for example a saved JSON file) can be formatted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseBundle {
    pub case: Option<EntityFields>,
    pub parties: Vec<Value>,
    pub tasks: Vec<Value>,
    pub events: Vec<Value>,
    pub documents: Vec<Value>,
    #[serde(rename = "landParcels", alias = "land_parcels")]
    pub land_parcels: Vec<Value>,
}

impl CaseBundle {
    /// Build a bundle from a stored case and the rows of its collections.
    pub fn from_records(
        case: &CaseRecord,
        related: Vec<(RelatedCollection, Vec<EntityFields>)>,
    ) -> Result<Self, serde_json::Error> {
        let case_fields = match serde_json::to_value(case)? {
            Value::Object(fields) => fields,
            _ => EntityFields::new(),
        };

        let mut bundle = CaseBundle {
            case: Some(case_fields),
            ..Default::default()
        };
        for (collection, rows) in related {
            *bundle.collection_mut(collection) = rows.into_iter().map(Value::Object).collect();
        }
        Ok(bundle)
    }

    pub fn collection(&self, collection: RelatedCollection) -> &[Value] {
        match collection {
            RelatedCollection::Parties => &self.parties,
            RelatedCollection::Tasks => &self.tasks,
            RelatedCollection::Events => &self.events,
            RelatedCollection::Documents => &self.documents,
            RelatedCollection::LandParcels => &self.land_parcels,
        }
    }

    fn collection_mut(&mut self, collection: RelatedCollection) -> &mut Vec<Value> {
        match collection {
            RelatedCollection::Parties => &mut self.parties,
            RelatedCollection::Tasks => &mut self.tasks,
            RelatedCollection::Events => &mut self.events,
            RelatedCollection::Documents => &mut self.documents,
            RelatedCollection::LandParcels => &mut self.land_parcels,
        }
    }

    /// The case fields, checked for the required identifiers.
    pub fn validated_case(&self) -> Result<&EntityFields, ExportError> {
        let case = self.case.as_ref().ok_or(ExportError::MissingCase)?;
        for field in REQUIRED_CASE_FIELDS {
            let present = match case.get(*field) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            };
            if !present {
                return Err(ExportError::MissingCaseField {
                    field: (*field).to_string(),
                });
            }
        }
        Ok(case)
    }

    /// The case number rendered as a cell value. Only meaningful after
    /// `validated_case` succeeded.
    pub fn case_number(&self) -> String {
        self.case
            .as_ref()
            .and_then(|c| c.get("case_number"))
            .map(render_cell)
            .unwrap_or_default()
    }
}

/// Export-time settings that are not part of the case data.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub source_system: String,
    pub exported_at: DateTime<Utc>,
}

impl ExportOptions {
    pub fn new(source_system: impl Into<String>) -> Self {
        Self {
            source_system: source_system.into(),
            exported_at: Utc::now(),
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new("caseledger")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// One named output unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFile {
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutput {
    Csv(Vec<ExportFile>),
    Json(ExportFile),
}

impl ExportOutput {
    pub fn files(&self) -> Vec<&ExportFile> {
        match self {
            Self::Csv(files) => files.iter().collect(),
            Self::Json(file) => vec![file],
        }
    }

    pub fn into_files(self) -> Vec<ExportFile> {
        match self {
            Self::Csv(files) => files,
            Self::Json(file) => vec![file],
        }
    }
}

/// Filesystem-safe stem for a case number: ASCII alphanumerics, `-` and `_`
/// kept, everything else replaced with `_`.
pub fn case_slug(case_number: &str) -> String {
    let slug: String = case_number
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if slug.is_empty() {
        "case".to_string()
    } else {
        slug
    }
}

/// Format a bundle in the requested mode.
pub fn export_case(
    bundle: &CaseBundle,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<ExportOutput, ExportError> {
    let output = match format {
        ExportFormat::Csv => ExportOutput::Csv(export_csv(bundle)?),
        ExportFormat::Json => ExportOutput::Json(export_json(bundle, options)?),
    };
    tracing::debug!(
        case_number = %bundle.case_number(),
        format = format.as_str(),
        files = output.files().len(),
        "Formatted case export"
    );
    Ok(output)
}
