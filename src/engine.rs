use crate::filter::{in_window, matches_branch, BranchSelection};
use crate::schema::{DateWindow, Fact, MonthBucket, MonthlyAggregate, SeriesRow};
use crate::utils::MonthKey;
use log::debug;
use std::collections::{BTreeMap, HashSet};

/// Groups facts into months for one branch selection and category list.
pub struct PeriodAggregator<'a> {
    selection: &'a BranchSelection,
    categories: &'a [String],
}

impl<'a> PeriodAggregator<'a> {
    pub fn new(selection: &'a BranchSelection, categories: &'a [String]) -> Self {
        Self {
            selection,
            categories,
        }
    }

    /// Full-history monthly sums for the branch selection, every category.
    ///
    /// Neither the date window nor the category selection is applied here:
    /// rolling sums look back past the visible range, and the months present
    /// must not depend on which categories are being charted.
    pub fn monthly_aggregate(&self, facts: &[Fact]) -> MonthlyAggregate {
        let mut aggregate: MonthlyAggregate = BTreeMap::new();

        for fact in facts {
            if !matches_branch(fact, self.selection) {
                continue;
            }
            let key = fact.key();
            *aggregate
                .entry(key)
                .or_insert_with(|| MonthBucket::new(key))
                .sums
                .entry(fact.category.clone())
                .or_insert(0.0) += fact.value;
        }

        debug!("Monthly aggregate: {} months", aggregate.len());

        aggregate
    }

    /// Monthly totals inside `window`, ascending by month.
    ///
    /// Only selected categories are accumulated; a category with no facts in
    /// a month is absent from that row.
    pub fn period_values(&self, facts: &[Fact], window: Option<&DateWindow>) -> Vec<SeriesRow> {
        let wanted: HashSet<&str> = self.categories.iter().map(String::as_str).collect();
        let mut rows: BTreeMap<MonthKey, SeriesRow> = BTreeMap::new();

        for fact in facts {
            let key = fact.key();
            if !matches_branch(fact, self.selection)
                || !in_window(key, window)
                || !wanted.contains(fact.category.as_str())
            {
                continue;
            }

            let slot = rows
                .entry(key)
                .or_insert_with(|| SeriesRow::new(fact.year, fact.month))
                .values
                .entry(fact.category.clone())
                .or_insert(Some(0.0));
            *slot = Some(slot.unwrap_or(0.0) + fact.value);
        }

        rows.into_values().collect()
    }
}

pub fn build_monthly_aggregate(facts: &[Fact], selection: &BranchSelection) -> MonthlyAggregate {
    PeriodAggregator::new(selection, &[]).monthly_aggregate(facts)
}

pub fn aggregate_period_values(
    facts: &[Fact],
    selection: &BranchSelection,
    window: Option<&DateWindow>,
    categories: &[String],
) -> Vec<SeriesRow> {
    PeriodAggregator::new(selection, categories).period_values(facts, window)
}
