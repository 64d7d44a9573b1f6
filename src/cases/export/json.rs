use serde_json::{Value, json};

use crate::db::RelatedCollection;
use crate::error::ExportError;

use super::{CaseBundle, ExportFile, ExportOptions, case_slug};

pub const FORMAT_VERSION: &str = "1.0";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One pretty-printed document holding the case, every collection verbatim
/// (empty ones as `[]`), and export metadata.
pub fn export_json(bundle: &CaseBundle, options: &ExportOptions) -> Result<ExportFile, ExportError> {
    let case = bundle.validated_case()?;

    let mut document = serde_json::Map::new();
    document.insert("case".to_string(), Value::Object(case.clone()));
    for collection in RelatedCollection::ALL {
        document.insert(
            collection.json_key().to_string(),
            Value::Array(bundle.collection(collection).to_vec()),
        );
    }
    document.insert(
        "exportMetadata".to_string(),
        json!({
            "exportedAt": options.exported_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "formatVersion": FORMAT_VERSION,
            "sourceSystem": options.source_system,
        }),
    );

    let content = serde_json::to_string_pretty(&Value::Object(document))?;
    Ok(ExportFile {
        name: "export".to_string(),
        filename: format!("{}_export.json", case_slug(&bundle.case_number())),
        content_type: JSON_CONTENT_TYPE.to_string(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::export_json;
    use crate::cases::export::fixtures::smith_v_jones;
    use crate::cases::export::{ExportOptions, export_csv};

    fn options() -> ExportOptions {
        ExportOptions {
            source_system: "county-portal".to_string(),
            exported_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn document_shape_matches_example_case() {
        let file = export_json(&smith_v_jones(), &options()).expect("export");
        let doc: Value = serde_json::from_str(&file.content).expect("valid json");

        let keys: Vec<&str> = doc
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            keys,
            vec![
                "case",
                "parties",
                "tasks",
                "events",
                "documents",
                "landParcels",
                "exportMetadata"
            ]
        );
        assert_eq!(doc["case"]["case_number"], "CV-2024-001");
        assert_eq!(doc["parties"].as_array().expect("parties").len(), 2);
        assert_eq!(doc["tasks"], json!([]));
        assert_eq!(doc["events"].as_array().expect("events").len(), 1);
        assert_eq!(doc["documents"], json!([]));
        assert_eq!(doc["landParcels"], json!([]));
        assert_eq!(
            doc["exportMetadata"],
            json!({
                "exportedAt": "2024-06-01T12:00:00.000Z",
                "formatVersion": "1.0",
                "sourceSystem": "county-portal"
            })
        );
    }

    #[test]
    fn collections_are_copied_verbatim() {
        let bundle = smith_v_jones();
        let file = export_json(&bundle, &options()).expect("export");
        let doc: Value = serde_json::from_str(&file.content).expect("valid json");
        assert_eq!(doc["events"][0], bundle.events[0]);
        assert_eq!(doc["events"][0]["attendees"], json!(["Smith", "Jones"]));
    }

    #[test]
    fn every_csv_scalar_appears_in_the_document() {
        let bundle = smith_v_jones();
        let file = export_json(&bundle, &options()).expect("export");
        let doc: Value = serde_json::from_str(&file.content).expect("valid json");

        for table in export_csv(&bundle).expect("csv") {
            let key = match table.name.as_str() {
                "case-info" => "case",
                "land-parcels" => "landParcels",
                other => other,
            };
            let entities: Vec<&Value> = match &doc[key] {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };

            let mut reader = ::csv::Reader::from_reader(table.content.as_bytes());
            let headers = reader.headers().expect("headers").clone();
            for (record, entity) in reader.records().zip(entities) {
                let record = record.expect("record");
                for (header, cell) in headers.iter().zip(record.iter()) {
                    match &entity[header] {
                        Value::String(s) => assert_eq!(cell, s),
                        Value::Number(n) => assert_eq!(cell, n.to_string()),
                        Value::Bool(b) => assert_eq!(cell, b.to_string()),
                        _ => {}
                    }
                }
            }
        }
    }

    #[test]
    fn missing_case_produces_no_document() {
        let mut bundle = smith_v_jones();
        bundle.case = None;
        assert!(export_json(&bundle, &options()).is_err());
    }
}
