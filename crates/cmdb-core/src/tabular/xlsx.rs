//! XLSX import templates and workbook reading.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate};
use rust_xlsxwriter::{Format, Workbook};

use super::TabularError;
use crate::asset_store::batch;
use crate::models::AssetType;

/// MIME type of `.xlsx` files.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const MAX_COLUMN_WIDTH: usize = 30;

/// Builds the batch-import template for a type: a bold header row and one
/// example row.
pub fn build_template(asset_type: AssetType) -> Result<Vec<u8>, TabularError> {
    let (headers, sample) = batch::template(asset_type);

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Template").map_err(write_err)?;

    for (col, (header, example)) in headers.iter().zip(sample.iter()).enumerate() {
        let col = col as u16;
        sheet
            .write_string_with_format(0, col, *header, &bold)
            .map_err(write_err)?;
        sheet.write_string(1, col, *example).map_err(write_err)?;

        let width = header
            .chars()
            .count()
            .max(example.lines().map(|l| l.chars().count()).max().unwrap_or(0));
        sheet
            .set_column_width(col, (width + 2).min(MAX_COLUMN_WIDTH) as f64)
            .map_err(write_err)?;
    }

    workbook.save_to_buffer().map_err(write_err)
}

/// Reads the first worksheet as rows of cell text.
pub fn read_xlsx(bytes: &[u8]) -> Result<Vec<Vec<String>>, TabularError> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| TabularError::Read(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(TabularError::EmptyWorkbook)?
        .map_err(|e| TabularError::Read(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn write_err(err: rust_xlsxwriter::XlsxError) -> TabularError {
    TabularError::Write(err.to_string())
}

/// Cell text as a user would read it; whole numbers lose their `.0`, dates
/// become `YYYY-MM-DD`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{:?}", e),
    }
}

fn format_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Excel serial day numbers count from 1899-12-30.
fn excel_date(serial: f64) -> String {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(serial.floor() as i64)))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format_number(serial))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_reads_back() {
        for asset_type in AssetType::ALL {
            let bytes = build_template(asset_type).unwrap();
            let table = read_xlsx(&bytes).unwrap();
            let (headers, sample) = batch::template(asset_type);

            assert_eq!(table.len(), 2);
            assert_eq!(table[0], headers.iter().map(|h| h.to_string()).collect::<Vec<_>>());
            assert_eq!(table[1].len(), sample.len());
        }
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(22.0)), "22");
        assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(excel_date(45292.0), "2024-01-01");
    }

    #[test]
    fn test_read_garbage() {
        assert!(matches!(
            read_xlsx(b"not a zip"),
            Err(TabularError::Read(_))
        ));
    }
}
