use serde_json::Value;

use crate::db::{EntityFields, RelatedCollection};
use crate::error::ExportError;

use super::{CASE_INFO_TABLE, CaseBundle, ExportFile, case_slug};

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Render one value as a cell: strings verbatim, null empty, nested values
/// as compact JSON.
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Header for a set of entities: the first entity's field order, then any
/// fields later entities introduce, in the order first seen.
pub fn table_columns(entities: &[&EntityFields]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for entity in entities {
        for key in entity.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Render a collection as one CSV table. `None` when there is nothing to
/// export; `null` entries are skipped.
pub fn csv_table(name: &str, entries: &[Value]) -> Result<Option<String>, ExportError> {
    let mut entities: Vec<&EntityFields> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match entry {
            Value::Object(fields) => entities.push(fields),
            Value::Null => {}
            _ => {
                return Err(ExportError::InvalidEntity {
                    collection: name.to_string(),
                    index,
                });
            }
        }
    }
    if entities.is_empty() {
        return Ok(None);
    }

    let columns = table_columns(&entities);
    let mut writer = ::csv::WriterBuilder::new()
        .quote_style(::csv::QuoteStyle::Necessary)
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&columns)?;
    for entity in &entities {
        let row: Vec<String> = columns
            .iter()
            .map(|column| entity.get(column).map(render_cell).unwrap_or_default())
            .collect();
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    let content = String::from_utf8(bytes).map_err(|e| ExportError::Csv(e.to_string()))?;
    Ok(Some(content))
}

fn csv_file(slug: &str, name: &str, content: String) -> ExportFile {
    ExportFile {
        name: name.to_string(),
        filename: format!("{slug}_{name}.csv"),
        content_type: CSV_CONTENT_TYPE.to_string(),
        content,
    }
}

/// `case-info` plus one table per non-empty collection. Documents are not
/// exported as CSV.
pub fn export_csv(bundle: &CaseBundle) -> Result<Vec<ExportFile>, ExportError> {
    let case = bundle.validated_case()?;
    let slug = case_slug(&bundle.case_number());

    let mut files = Vec::new();
    let case_row = [Value::Object(case.clone())];
    if let Some(content) = csv_table(CASE_INFO_TABLE, &case_row)? {
        files.push(csv_file(&slug, CASE_INFO_TABLE, content));
    }

    for collection in RelatedCollection::ALL {
        if !collection.included_in_csv() {
            continue;
        }
        let name = collection.export_name();
        if let Some(content) = csv_table(name, bundle.collection(collection))? {
            files.push(csv_file(&slug, name, content));
        }
    }
    Ok(files)
}
