//! Trailing twelve-month sums and their year-over-year growth.
//!
//! Windows are taken over positions in the monthly aggregate, not over
//! calendar months: "the last twelve" means the current entry plus the eleven
//! entries before it that exist in the aggregate. When the aggregate skips a
//! month (no matching facts), a window covers more than twelve calendar months.

use crate::filter::in_window;
use crate::schema::{DateWindow, MonthBucket, MonthlyAggregate, SeriesRow};
use log::debug;

pub const ROLLING_MONTHS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingKind {
    /// Sum of the trailing twelve entries.
    Value,
    /// `(current12 - prior12) / prior12`, as a fraction.
    Growth,
}

impl RollingKind {
    /// Number of aggregate entries needed before the first value exists.
    pub fn required_history(self) -> usize {
        match self {
            RollingKind::Value => ROLLING_MONTHS,
            RollingKind::Growth => ROLLING_MONTHS * 2,
        }
    }
}

pub struct RollingEngine<'a> {
    categories: &'a [String],
}

impl<'a> RollingEngine<'a> {
    pub fn new(categories: &'a [String]) -> Self {
        Self { categories }
    }

    /// Computes the unclipped series over the whole aggregate.
    pub fn compute(&self, aggregate: &MonthlyAggregate, kind: RollingKind) -> Vec<SeriesRow> {
        let buckets: Vec<&MonthBucket> = aggregate.values().collect();

        buckets
            .iter()
            .enumerate()
            .map(|(idx, bucket)| {
                let mut row = SeriesRow::new(bucket.year, bucket.month);
                for category in self.categories {
                    let value = match kind {
                        RollingKind::Value => trailing_sum(&buckets, idx, category),
                        RollingKind::Growth => trailing_growth(&buckets, idx, category),
                    };
                    row.values.insert(category.clone(), value);
                }
                row
            })
            .collect()
    }

    /// Computes the full series, then keeps the rows inside `window`.
    pub fn series(
        &self,
        aggregate: &MonthlyAggregate,
        kind: RollingKind,
        window: Option<&DateWindow>,
    ) -> Vec<SeriesRow> {
        let full = self.compute(aggregate, kind);
        let total = full.len();
        let clipped = clip_to_window(full, window);
        debug!(
            "Rolling {:?}: {} of {} months inside window",
            kind,
            clipped.len(),
            total
        );
        clipped
    }
}

pub fn rolling_values(aggregate: &MonthlyAggregate, categories: &[String]) -> Vec<SeriesRow> {
    RollingEngine::new(categories).compute(aggregate, RollingKind::Value)
}

pub fn rolling_growth(aggregate: &MonthlyAggregate, categories: &[String]) -> Vec<SeriesRow> {
    RollingEngine::new(categories).compute(aggregate, RollingKind::Growth)
}

pub fn rolling_series(
    aggregate: &MonthlyAggregate,
    categories: &[String],
    kind: RollingKind,
    window: Option<&DateWindow>,
) -> Vec<SeriesRow> {
    RollingEngine::new(categories).series(aggregate, kind, window)
}

/// Keeps rows inside the window; an absent or invalid window keeps everything.
pub fn clip_to_window(rows: Vec<SeriesRow>, window: Option<&DateWindow>) -> Vec<SeriesRow> {
    rows.into_iter()
        .filter(|row| in_window(row.key(), window))
        .collect()
}

fn window_sum(buckets: &[&MonthBucket], last: usize, category: &str) -> f64 {
    let first = last + 1 - ROLLING_MONTHS;
    buckets[first..=last].iter().map(|b| b.get(category)).sum()
}

fn trailing_sum(buckets: &[&MonthBucket], idx: usize, category: &str) -> Option<f64> {
    if idx + 1 < ROLLING_MONTHS {
        return None;
    }
    Some(window_sum(buckets, idx, category))
}

fn trailing_growth(buckets: &[&MonthBucket], idx: usize, category: &str) -> Option<f64> {
    if idx + 1 < ROLLING_MONTHS * 2 {
        return None;
    }

    let current = window_sum(buckets, idx, category);
    let prior = window_sum(buckets, idx - ROLLING_MONTHS, category);
    if prior == 0.0 {
        return None;
    }

    let growth = (current - prior) / prior;
    growth.is_finite().then_some(growth)
}
