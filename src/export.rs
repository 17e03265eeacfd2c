//! CSV export of the active chart series.

use crate::error::Result;
use crate::schema::SeriesRow;
use std::io::Write;

/// Renders rows as `Year,Month,Label,<categories...>`.
///
/// Cells without a value (null or absent) are written empty.
pub fn series_to_csv(rows: &[SeriesRow], categories: &[String]) -> String {
    let mut output = String::new();

    let mut header = vec!["Year".to_string(), "Month".to_string(), "Label".to_string()];
    header.extend(categories.iter().map(|c| escape_csv_field(c)));
    output.push_str(&header.join(","));
    output.push('\n');

    for row in rows {
        let mut line = vec![
            row.year.to_string(),
            row.month.to_string(),
            escape_csv_field(&row.label),
        ];
        line.extend(
            categories
                .iter()
                .map(|c| row.get(c).map(format_number).unwrap_or_default()),
        );
        output.push_str(&line.join(","));
        output.push('\n');
    }

    output
}

pub fn write_series_csv<W: Write>(
    writer: &mut W,
    rows: &[SeriesRow],
    categories: &[String],
) -> Result<()> {
    writer.write_all(series_to_csv(rows, categories).as_bytes())?;
    Ok(())
}

/// Wraps a field in double quotes when it contains a comma, quote or line
/// break, doubling any embedded quotes.
pub fn escape_csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Shortest round-tripping decimal form; non-finite values render empty.
pub fn format_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}
