//! Tabular codecs: CSV export and spreadsheet import.
//!
//! Both readers return the sheet as rows of cell text, header row first.

pub mod csv;
pub mod xlsx;

use thiserror::Error;

use crate::asset_store::batch;
use crate::models::{Asset, AssetType};

/// Errors from reading or writing a spreadsheet.
#[derive(Error, Debug)]
pub enum TabularError {
    #[error("Unsupported file type: {0} (expected .xlsx or .csv)")]
    UnsupportedFormat(String),

    #[error("File is not valid UTF-8")]
    Encoding,

    #[error("Failed to read workbook: {0}")]
    Read(String),

    #[error("Failed to write workbook: {0}")]
    Write(String),

    #[error("Workbook has no worksheet")]
    EmptyWorkbook,
}

/// Decodes an uploaded spreadsheet, picking the format from the file name.
pub fn read_table(filename: &str, bytes: &[u8]) -> Result<Vec<Vec<String>>, TabularError> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".xlsx") || lower.ends_with(".xlsm") {
        xlsx::read_xlsx(bytes)
    } else if lower.ends_with(".csv") {
        let text = std::str::from_utf8(bytes).map_err(|_| TabularError::Encoding)?;
        Ok(csv::parse_csv(text))
    } else {
        Err(TabularError::UnsupportedFormat(filename.to_string()))
    }
}

/// Renders assets of one type as a CSV document.
pub fn export_assets_csv(asset_type: AssetType, assets: &[Asset]) -> String {
    let headers = batch::export_headers(asset_type);
    let fields: Vec<String> = headers.iter().map(|h| batch::normalize_header(h)).collect();

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(assets.len() + 1);
    rows.push(headers.iter().map(|h| h.to_string()).collect());
    for asset in assets {
        rows.push(fields.iter().map(|f| batch::export_cell(asset, f)).collect());
    }

    csv::write_csv(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetDetails, SystemDetails, Tag};
    use chrono::Utc;

    fn system_asset(notes: &str) -> Asset {
        let now = Utc::now();
        Asset {
            id: 7,
            name: "git".into(),
            description: None,
            created_by: None,
            created_at: now,
            updated_at: now,
            details: AssetDetails::System(SystemDetails {
                ip_address: Some("10.0.0.1".into()),
                port: Some(8080),
                notes: Some(notes.into()),
                ..Default::default()
            }),
            tags: vec![Tag {
                id: 1,
                key: "env".into(),
                value: "prod".into(),
                created_at: now,
            }],
            credentials: Vec::new(),
        }
    }

    #[test]
    fn test_export_quotes_and_parses_back() {
        let notes = "primary, \"do not\" reboot";
        let text = export_assets_csv(AssetType::System, &[system_asset(notes)]);
        assert!(text.starts_with(csv::BOM));
        assert!(text.contains("\"primary, \"\"do not\"\" reboot\""));

        let table = read_table("export.csv", text.as_bytes()).unwrap();
        let rows = batch::rows_from_table(table);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["notes"], notes);
        assert_eq!(rows[0]["id"], "7");
        assert_eq!(rows[0]["port"], "8080");
        assert_eq!(rows[0]["tags"], "env=prod");
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            read_table("assets.txt", b"a,b"),
            Err(TabularError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            read_table("assets.csv", &[0xff, 0xfe, 0x00]),
            Err(TabularError::Encoding)
        ));
    }
}
