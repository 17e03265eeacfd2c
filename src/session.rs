use crate::engine::PeriodAggregator;
use crate::error::{Result, TrendError};
use crate::export::series_to_csv;
use crate::filter::BranchSelection;
use crate::loader::LoadOutcome;
use crate::rolling::{RollingEngine, RollingKind};
use crate::schema::{
    DashboardConfig, Dataset, DateWindow, MonthBounds, MonthlyAggregate, SeriesRow, SeriesView,
};
use crate::summary::{BranchSummary, BranchSummaryBuilder};
use crate::utils::{parse_month_string, MonthKey};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The caller's date range choice.
///
/// Until the caller picks a range (`touched == false`) the window is fitted
/// automatically to the data; afterwards the picked range is only ever
/// clamped to the loaded dataset, never replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSelection {
    pub touched: bool,
    pub start: Option<MonthKey>,
    pub end: Option<MonthKey>,
}

impl RangeSelection {
    pub fn untouched() -> Self {
        Self::default()
    }

    pub fn picked(start: MonthKey, end: MonthKey) -> Self {
        Self {
            touched: true,
            start: Some(start),
            end: Some(end),
        }
    }
}

impl From<RollingKind> for SeriesView {
    fn from(kind: RollingKind) -> Self {
        match kind {
            RollingKind::Value => SeriesView::RollingValue,
            RollingKind::Growth => SeriesView::RollingGrowth,
        }
    }
}

impl SeriesView {
    pub fn rolling_kind(self) -> Option<RollingKind> {
        match self {
            SeriesView::Value => None,
            SeriesView::RollingValue => Some(RollingKind::Value),
            SeriesView::RollingGrowth => Some(RollingKind::Growth),
        }
    }
}

/// Turns the range choice into the window used by the derived views.
pub fn resolve_window(
    range: &RangeSelection,
    bounds: &MonthBounds,
    aggregate: &MonthlyAggregate,
    view: SeriesView,
) -> DateWindow {
    if range.touched {
        let start = bounds.clamp(range.start.unwrap_or(bounds.min));
        let end = bounds.clamp(range.end.unwrap_or(bounds.max));
        return if start <= end {
            DateWindow::new(start, end)
        } else {
            DateWindow::new(end, start)
        };
    }

    let first_available = view
        .rolling_kind()
        .and_then(|kind| aggregate.keys().nth(kind.required_history() - 1).copied());

    match first_available {
        Some(start) => {
            debug!("Auto-fitting {:?} window to start at {}", view, start);
            DateWindow::new(start, bounds.max)
        }
        None => bounds.as_window(),
    }
}

/// Every derived view for the current dataset and filters, computed together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedViews {
    pub window: DateWindow,
    pub series: Vec<SeriesRow>,
    pub summary: BranchSummary,
}

/// Current dataset plus the caller's filters.
///
/// Views are recomputed from the facts on every request; nothing derived
/// is stored.
pub struct Dashboard {
    config: DashboardConfig,
    dataset: Option<Dataset>,
    applied_generation: u64,
    branches: BranchSelection,
    categories: Vec<String>,
    range: RangeSelection,
    view: SeriesView,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            dataset: None,
            applied_generation: 0,
            branches: BranchSelection::All,
            categories: Vec::new(),
            range: RangeSelection::untouched(),
            view: SeriesView::Value,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn branches(&self) -> &BranchSelection {
        &self.branches
    }

    pub fn selected_categories(&self) -> &[String] {
        &self.categories
    }

    pub fn range(&self) -> &RangeSelection {
        &self.range
    }

    pub fn view(&self) -> SeriesView {
        self.view
    }

    /// Installs a freshly normalized dataset, carrying over the filters that
    /// still make sense for it.
    pub fn replace_dataset(&mut self, dataset: Dataset) {
        let kept: Vec<String> = self
            .categories
            .iter()
            .filter(|c| dataset.categories.contains(c))
            .cloned()
            .collect();
        self.categories = if kept.is_empty() {
            dataset.categories.clone()
        } else {
            kept
        };
        self.branches = self.branches.retain_available(&dataset.branches);

        info!(
            "Applied dataset '{}' ({} facts, {} to {})",
            dataset.name,
            dataset.facts.len(),
            dataset.bounds.min,
            dataset.bounds.max
        );
        self.dataset = Some(dataset);
    }

    /// Applies a finished load. Returns whether a new dataset was installed.
    ///
    /// Results, successful or not, from requests no newer than the last
    /// applied one are ignored. Other failures leave the current dataset in
    /// place and are returned to the caller.
    pub fn apply_load(&mut self, outcome: LoadOutcome) -> Result<bool> {
        match outcome {
            LoadOutcome::Ready {
                generation,
                dataset,
            } => {
                if generation <= self.applied_generation {
                    debug!(
                        "Ignoring dataset '{}' from request {}: request {} already applied",
                        dataset.name, generation, self.applied_generation
                    );
                    return Ok(false);
                }
                self.applied_generation = generation;
                self.replace_dataset(dataset);
                Ok(true)
            }
            LoadOutcome::Superseded { .. } => Ok(false),
            LoadOutcome::Failed { generation, error } => {
                if generation <= self.applied_generation {
                    debug!(
                        "Ignoring failure from request {}: request {} already applied ({})",
                        generation, self.applied_generation, error
                    );
                    return Ok(false);
                }
                Err(error)
            }
        }
    }

    pub fn select_branches(&mut self, selection: BranchSelection) {
        self.branches = selection;
    }

    pub fn select_branch_groups(&mut self, groups: &[&str]) {
        self.branches = self.config.branch_groups.selection_for(groups);
    }

    /// Keeps the given categories that exist in the current dataset, in the
    /// order given.
    pub fn select_categories<I, S>(&mut self, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let available = self
            .dataset
            .as_ref()
            .map(|d| d.categories.as_slice())
            .unwrap_or(&[]);
        let mut selected: Vec<String> = Vec::new();
        for category in categories {
            let category: String = category.into();
            if available.contains(&category) && !selected.contains(&category) {
                selected.push(category);
            }
        }
        self.categories = selected;
    }

    pub fn set_view(&mut self, view: SeriesView) {
        self.view = view;
    }

    pub fn set_range(&mut self, start: MonthKey, end: MonthKey) {
        self.range = RangeSelection::picked(start, end);
    }

    /// Same as [`Dashboard::set_range`] for `YYYY-MM` inputs.
    pub fn set_range_strings(&mut self, start: &str, end: &str) -> Result<()> {
        let start = parse_month_string(start)?;
        let end = parse_month_string(end)?;
        self.set_range(start, end);
        Ok(())
    }

    /// Forgets the picked range so the window auto-fits again.
    pub fn reset_range(&mut self) {
        self.range = RangeSelection::untouched();
    }

    pub fn monthly_aggregate(&self) -> MonthlyAggregate {
        match &self.dataset {
            Some(dataset) => {
                PeriodAggregator::new(&self.branches, &self.categories)
                    .monthly_aggregate(&dataset.facts)
            }
            None => BTreeMap::new(),
        }
    }

    pub fn active_window(&self) -> Option<DateWindow> {
        let dataset = self.dataset.as_ref()?;
        let aggregate = self.monthly_aggregate();
        Some(resolve_window(
            &self.range,
            &dataset.bounds,
            &aggregate,
            self.view,
        ))
    }

    pub fn series(&self) -> Vec<SeriesRow> {
        self.views().map(|v| v.series).unwrap_or_default()
    }

    pub fn branch_summary(&self) -> BranchSummary {
        self.views().map(|v| v.summary).unwrap_or_default()
    }

    pub fn export_csv(&self) -> String {
        series_to_csv(&self.series(), &self.categories)
    }

    /// Computes window, chart series and branch summary for the current state.
    pub fn views(&self) -> Option<DerivedViews> {
        let dataset = self.dataset.as_ref()?;

        let aggregate = self.monthly_aggregate();
        let window = resolve_window(&self.range, &dataset.bounds, &aggregate, self.view);

        let series = match self.view.rolling_kind() {
            None => PeriodAggregator::new(&self.branches, &self.categories)
                .period_values(&dataset.facts, Some(&window)),
            Some(kind) => {
                RollingEngine::new(&self.categories).series(&aggregate, kind, Some(&window))
            }
        };

        let summary = BranchSummaryBuilder::new(
            &self.branches,
            Some(&window),
            &self.categories,
            &self.config.blank_branch_label,
        )
        .build(&dataset.facts);

        Some(DerivedViews {
            window,
            series,
            summary,
        })
    }

    /// Like [`Dashboard::views`], failing when no dataset has been loaded.
    pub fn require_views(&self) -> Result<DerivedViews> {
        self.views().ok_or(TrendError::EmptyDataset)
    }
}
