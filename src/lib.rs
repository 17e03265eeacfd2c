//! # Financial Trend Builder
//!
//! A library for turning tabular financial records (year, period, branch and
//! category columns) into time-indexed series for charting: monthly totals,
//! rolling twelve-month sums and rolling twelve-month year-over-year growth,
//! filtered by branch and date window.
//!
//! ## Core Concepts
//!
//! - **Facts**: One `(Year, Month, Category, Value, Branch)` record per numeric cell of the source table
//! - **Month Keys**: `year * 100 + month`, so integer order is chronological order
//! - **Monthly Aggregate**: Branch-filtered sums per month over the *whole* history
//! - **Rolling Views**: Trailing twelve-entry sums and growth, computed on the full history and then clipped
//! - **Branch Summary**: Branch × category matrix with row, column and grand totals
//! - **Derived Views**: Always recomputed from facts and filters, never mutated in place
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_trend_builder::*;
//!
//! let csv = "Year,Month,Branch,Sales\n2023,Jan,North,\"1,200\"\n2023,Feb,South,800\n";
//! let table = read_csv_table(csv.as_bytes())?;
//!
//! let config = DashboardConfig::default();
//! let dataset = normalize_records("sales", &table, &config)?;
//!
//! let mut dashboard = Dashboard::new(config);
//! dashboard.replace_dataset(dataset);
//! dashboard.set_view(SeriesView::RollingValue);
//!
//! let series = dashboard.series();
//! let summary = dashboard.branch_summary();
//! let csv_out = dashboard.export_csv();
//! ```

pub mod engine;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingestion;
pub mod loader;
pub mod rolling;
pub mod schema;
pub mod session;
pub mod summary;
pub mod utils;

pub use engine::{aggregate_period_values, build_monthly_aggregate, PeriodAggregator};
pub use error::{Result, TrendError};
pub use export::{escape_csv_field, series_to_csv, write_series_csv};
pub use filter::{in_window, matches_branch, BranchGroups, BranchSelection};
pub use ingestion::{normalize_records, read_csv_table, ColumnLayout, Normalizer};
pub use loader::{DatasetLoader, LoadOutcome};
pub use rolling::{
    clip_to_window, rolling_growth, rolling_series, rolling_values, RollingEngine, RollingKind,
};
pub use schema::*;
pub use session::{resolve_window, Dashboard, DerivedViews, RangeSelection};
pub use summary::{
    build_branch_summary, natural_cmp, verify_conservation, BranchSummary, BranchSummaryBuilder,
    BranchSummaryRow, BranchSummaryTotals,
};
pub use utils::*;

use log::info;

pub struct TrendProcessor;

impl TrendProcessor {
    /// Normalizes a table and derives every view with default filters.
    pub fn process(name: &str, table: &RawTable, config: &DashboardConfig) -> Result<DerivedViews> {
        config.validate()?;

        let dataset = normalize_records(name, table, config)?;
        let mut dashboard = Dashboard::new(config.clone());
        dashboard.replace_dataset(dataset);

        let views = dashboard.require_views()?;
        info!(
            "Processed '{}': {} series rows, {} summary rows",
            name,
            views.series.len(),
            views.summary.rows.len()
        );
        Ok(views)
    }

    /// Reads CSV text and derives every view with default filters.
    pub fn process_csv<R: std::io::Read>(
        name: &str,
        reader: R,
        config: &DashboardConfig,
    ) -> Result<DerivedViews> {
        let table = read_csv_table(reader)?;
        Self::process(name, &table, config)
    }
}

pub fn process_table(name: &str, table: &RawTable, config: &DashboardConfig) -> Result<DerivedViews> {
    TrendProcessor::process(name, table, config)
}
