use crate::error::{Result, TrendError};
use crate::filter::BranchGroups;
use crate::utils::{clamp_key, month_label, MonthKey};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single cell as handed over by the tabular lexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Trimmed textual form of the cell, `None` when blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(n.to_string()),
            CellValue::Number(_) | CellValue::Empty => None,
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    /// Numeric form of the cell with thousands separators stripped.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
            CellValue::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            CellValue::Empty => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

pub type RawRow = BTreeMap<String, CellValue>;

/// Lexed rows plus the header list they were read with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One numeric value for one category column of one source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Fact {
    pub year: i32,
    pub month: u32,
    pub category: String,
    pub value: f64,
    pub branch: Option<String>,
}

impl Fact {
    pub fn new(
        year: i32,
        month: u32,
        category: impl Into<String>,
        value: f64,
        branch: Option<&str>,
    ) -> Self {
        Self {
            year,
            month,
            category: category.into(),
            value,
            branch: branch.map(str::to_string),
        }
    }

    pub fn key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }
}

/// Earliest and latest month observed in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MonthBounds {
    pub min: MonthKey,
    pub max: MonthKey,
}

impl MonthBounds {
    pub fn from_keys(keys: impl IntoIterator<Item = MonthKey>) -> Option<Self> {
        let mut iter = keys.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), k| (lo.min(k), hi.max(k)));
        Some(Self { min, max })
    }

    pub fn clamp(&self, key: MonthKey) -> MonthKey {
        clamp_key(key, self.min, self.max)
    }

    pub fn as_window(&self) -> DateWindow {
        DateWindow::new(self.min, self.max)
    }
}

/// A normalized dataset: the fact list plus what the filter UI needs to know about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub facts: Vec<Fact>,
    /// Categories that produced at least one fact, in header order.
    pub categories: Vec<String>,
    /// Distinct non-blank branches in natural order.
    pub branches: Vec<String>,
    pub bounds: MonthBounds,
}

/// Inclusive month range. A window with a missing bound, or with start after
/// end, is treated as "no filtering".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateWindow {
    pub start: Option<MonthKey>,
    pub end: Option<MonthKey>,
}

impl DateWindow {
    pub fn new(start: MonthKey, end: MonthKey) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        matches!((self.start, self.end), (Some(start), Some(end)) if start <= end)
    }

    pub fn contains(&self, key: MonthKey) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start <= end => start <= key && key <= end,
            _ => true,
        }
    }
}

/// Per-month sums for one month of the branch-filtered history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub sums: BTreeMap<String, f64>,
}

impl MonthBucket {
    pub fn new(key: MonthKey) -> Self {
        Self {
            year: key.year(),
            month: key.month(),
            label: key.label(),
            sums: BTreeMap::new(),
        }
    }

    pub fn get(&self, category: &str) -> f64 {
        self.sums.get(category).copied().unwrap_or(0.0)
    }
}

pub type MonthlyAggregate = BTreeMap<MonthKey, MonthBucket>;

/// One chart row: `{Year, Month, label, <category>: number|null, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Month")]
    pub month: u32,
    pub label: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl SeriesRow {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            label: month_label(year, month),
            values: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> MonthKey {
        MonthKey::new(self.year, self.month)
    }

    pub fn get(&self, category: &str) -> Option<f64> {
        self.values.get(category).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeriesView {
    /// Monthly totals inside the window.
    #[default]
    Value,
    /// Trailing twelve-entry sums.
    RollingValue,
    /// Trailing twelve-entry sums against the twelve entries before them, as a fraction.
    RollingGrowth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ColumnSynonyms {
    #[schemars(description = "Header names (case-insensitive) accepted for the year column")]
    pub year: Vec<String>,

    #[schemars(description = "Header names (case-insensitive) accepted for the period/month column")]
    pub period: Vec<String>,

    #[schemars(description = "Header names (case-insensitive) accepted for the optional branch column")]
    pub branch: Vec<String>,

    #[schemars(
        description = "Dimension headers that are never treated as category columns, even when not used as the year/period/branch column"
    )]
    pub excluded_dimensions: Vec<String>,
}

impl Default for ColumnSynonyms {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            year: owned(&["year", "yr", "fy", "fiscal year"]),
            period: owned(&["period", "per", "month"]),
            branch: owned(&["branch name", "branch", "store", "location"]),
            excluded_dimensions: owned(&["date", "month", "year", "period", "branch"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DashboardConfig {
    pub columns: ColumnSynonyms,

    #[schemars(description = "Row label used for facts without a branch in the branch summary")]
    pub blank_branch_label: String,

    #[schemars(description = "Named groups of branch identifiers (for example regions)")]
    pub branch_groups: BranchGroups,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            columns: ColumnSynonyms::default(),
            blank_branch_label: "(Blank)".to_string(),
            branch_groups: BranchGroups::default(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let sets = [
            ("year", &self.columns.year),
            ("period", &self.columns.period),
        ];
        for (name, synonyms) in sets {
            if synonyms.iter().all(|s| s.trim().is_empty()) {
                return Err(TrendError::InvalidConfig(format!(
                    "column synonyms for '{}' must not be empty",
                    name
                )));
            }
        }

        if self.blank_branch_label.trim().is_empty() {
            return Err(TrendError::InvalidConfig(
                "blank_branch_label must not be empty".to_string(),
            ));
        }

        if self.branch_groups.groups.keys().any(|g| g.trim().is_empty()) {
            return Err(TrendError::InvalidConfig(
                "branch group names must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DashboardConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
