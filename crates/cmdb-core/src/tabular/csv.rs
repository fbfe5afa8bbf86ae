//! RFC 4180 CSV.
//!
//! Rows are separated by `\n`. Fields containing a comma, quote, CR or LF
//! are quoted with internal quotes doubled. Output starts with a UTF-8 BOM
//! so spreadsheet tools pick the right encoding.

/// UTF-8 byte order mark.
pub const BOM: &str = "\u{feff}";

/// Writes rows as a CSV document, BOM first.
pub fn write_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::from(BOM);
    for row in rows {
        let line: Vec<String> = row.iter().map(|f| escape_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parses a CSV document with quoted fields, which may span lines.
///
/// A leading BOM is ignored, `\r\n` is accepted as a row separator and
/// blank lines are skipped.
pub fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let content = content.strip_prefix(BOM).unwrap_or(content);

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    // Escaped quote
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row);
    }

    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().any(|f| !f.is_empty()) || row.len() > 1 {
        rows.push(row);
    }
}
