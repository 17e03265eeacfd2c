use crate::error::{Result, TrendError};
use crate::schema::{CellValue, ColumnSynonyms, DashboardConfig, Dataset, Fact, MonthBounds, RawRow, RawTable};
use crate::summary::natural_cmp;
use crate::utils::{is_supported_year, parse_month_token};
use log::{debug, info};
use std::collections::BTreeSet;
use std::io::Read;

/// Resolved roles of the headers of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    pub year: String,
    pub period: String,
    pub branch: Option<String>,
    pub categories: Vec<String>,
}

pub struct Normalizer<'a> {
    columns: &'a ColumnSynonyms,
}

impl<'a> Normalizer<'a> {
    pub fn new(columns: &'a ColumnSynonyms) -> Self {
        Self { columns }
    }

    pub fn resolve_columns(&self, headers: &[String]) -> Result<ColumnLayout> {
        let year = find_header(headers, &self.columns.year)
            .ok_or_else(|| TrendError::MissingColumn("Year".to_string()))?;
        let period = find_header(headers, &self.columns.period)
            .ok_or_else(|| TrendError::MissingColumn("Period/Month".to_string()))?;
        let branch = find_header(headers, &self.columns.branch);

        let excluded: BTreeSet<String> = self
            .columns
            .excluded_dimensions
            .iter()
            .map(|d| d.trim().to_lowercase())
            .collect();

        let categories = headers
            .iter()
            .filter(|h| !h.trim().is_empty())
            .filter(|h| **h != year && **h != period && Some(*h) != branch.as_ref())
            .filter(|h| !excluded.contains(&h.trim().to_lowercase()))
            .cloned()
            .collect();

        Ok(ColumnLayout {
            year,
            period,
            branch,
            categories,
        })
    }

    /// Flattens every row into one fact per numeric category cell.
    ///
    /// Rows with an unusable year or month are skipped whole; an unusable
    /// category cell only drops that cell.
    pub fn normalize(&self, table: &RawTable) -> Result<Vec<Fact>> {
        let layout = self.resolve_columns(&table.headers)?;

        let mut facts = Vec::new();
        let mut skipped_rows = 0usize;
        let mut skipped_cells = 0usize;

        for row in &table.rows {
            let (year, month) = match (
                cell(row, &layout.year).and_then(parse_year),
                cell(row, &layout.period).and_then(parse_month_cell),
            ) {
                (Some(year), Some(month)) => (year, month),
                _ => {
                    skipped_rows += 1;
                    continue;
                }
            };

            let branch = layout
                .branch
                .as_ref()
                .and_then(|b| cell(row, b))
                .and_then(CellValue::as_text);

            for category in &layout.categories {
                match cell(row, category).and_then(CellValue::as_number) {
                    Some(value) => facts.push(Fact {
                        year,
                        month,
                        category: category.clone(),
                        value,
                        branch: branch.clone(),
                    }),
                    None => skipped_cells += 1,
                }
            }
        }

        if skipped_rows > 0 || skipped_cells > 0 {
            debug!(
                "Skipped {} rows with unusable year/period and {} non-numeric cells",
                skipped_rows, skipped_cells
            );
        }

        if facts.is_empty() {
            return Err(TrendError::EmptyDataset);
        }

        Ok(facts)
    }

    pub fn normalize_dataset(&self, name: &str, table: &RawTable) -> Result<Dataset> {
        let layout = self.resolve_columns(&table.headers)?;
        let facts = self.normalize(table)?;

        let present: BTreeSet<&str> = facts.iter().map(|f| f.category.as_str()).collect();
        let categories: Vec<String> = layout
            .categories
            .iter()
            .filter(|c| present.contains(c.as_str()))
            .cloned()
            .collect();

        let mut branches: Vec<String> = facts
            .iter()
            .filter_map(|f| f.branch.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        branches.sort_by(|a, b| natural_cmp(a, b));

        let bounds = MonthBounds::from_keys(facts.iter().map(Fact::key))
            .ok_or(TrendError::EmptyDataset)?;

        info!(
            "Normalized dataset '{}': {} facts, {} categories, {} branches, {} to {}",
            name,
            facts.len(),
            categories.len(),
            branches.len(),
            bounds.min,
            bounds.max
        );

        Ok(Dataset {
            name: name.to_string(),
            facts,
            categories,
            branches,
            bounds,
        })
    }
}

pub fn normalize_records(
    name: &str,
    table: &RawTable,
    config: &DashboardConfig,
) -> Result<Dataset> {
    Normalizer::new(&config.columns).normalize_dataset(name, table)
}

/// Lexes CSV text into a `RawTable`. Short rows get `Empty` cells.
pub fn read_csv_table<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let value = match record.get(idx) {
                    Some(text) => CellValue::Text(text.to_string()),
                    None => CellValue::Empty,
                };
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

fn find_header(headers: &[String], synonyms: &[String]) -> Option<String> {
    synonyms.iter().find_map(|synonym| {
        let wanted = synonym.trim().to_lowercase();
        headers
            .iter()
            .find(|h| h.trim().to_lowercase() == wanted)
            .cloned()
    })
}

fn cell<'r>(row: &'r RawRow, column: &str) -> Option<&'r CellValue> {
    row.get(column)
}

fn parse_year(cell: &CellValue) -> Option<i32> {
    let year = cell.as_number()?;
    if year == 0.0 || year.fract() != 0.0 || year.abs() > i32::MAX as f64 {
        return None;
    }
    let year = year as i32;
    is_supported_year(year).then_some(year)
}

fn parse_month_cell(cell: &CellValue) -> Option<u32> {
    if let Some(month) = cell.as_text().as_deref().and_then(parse_month_token) {
        return Some(month);
    }

    let month = cell.as_number()?;
    if month.fract() == 0.0 && (1.0..=12.0).contains(&month) {
        Some(month as u32)
    } else {
        None
    }
}
