use crate::error::{Result, TrendError};
use crate::export::{escape_csv_field, format_number};
use crate::filter::{in_window, matches_branch, BranchSelection};
use crate::schema::{DateWindow, Fact};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSummaryRow {
    pub branch: String,
    pub sums: BTreeMap<String, f64>,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchSummaryTotals {
    pub sums: BTreeMap<String, f64>,
    pub total: f64,
}

impl BranchSummaryTotals {
    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }
}

/// Branch × category matrix with row, column and grand totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub rows: Vec<BranchSummaryRow>,
    pub totals: BranchSummaryTotals,
}

pub struct BranchSummaryBuilder<'a> {
    selection: &'a BranchSelection,
    window: Option<&'a DateWindow>,
    categories: &'a [String],
    blank_label: &'a str,
}

impl<'a> BranchSummaryBuilder<'a> {
    pub fn new(
        selection: &'a BranchSelection,
        window: Option<&'a DateWindow>,
        categories: &'a [String],
        blank_label: &'a str,
    ) -> Self {
        Self {
            selection,
            window,
            categories,
            blank_label,
        }
    }

    fn accepts(&self, fact: &Fact, wanted: &HashSet<&str>) -> bool {
        matches_branch(fact, self.selection)
            && in_window(fact.key(), self.window)
            && wanted.contains(fact.category.as_str())
    }

    pub fn build(&self, facts: &[Fact]) -> BranchSummary {
        let wanted: HashSet<&str> = self.categories.iter().map(String::as_str).collect();
        let mut by_branch: HashMap<String, BranchSummaryRow> = HashMap::new();
        let mut totals = BranchSummaryTotals::default();

        for fact in facts.iter().filter(|f| self.accepts(f, &wanted)) {
            let branch = match fact.branch.as_deref().map(str::trim) {
                Some(b) if !b.is_empty() => b.to_string(),
                _ => self.blank_label.to_string(),
            };

            let row = by_branch
                .entry(branch.clone())
                .or_insert_with(|| BranchSummaryRow {
                    branch,
                    sums: BTreeMap::new(),
                    total: 0.0,
                });
            *row.sums.entry(fact.category.clone()).or_insert(0.0) += fact.value;
            row.total += fact.value;

            *totals.sums.entry(fact.category.clone()).or_insert(0.0) += fact.value;
            totals.total += fact.value;
        }

        let mut rows: Vec<BranchSummaryRow> = by_branch.into_values().collect();
        rows.sort_by(|a, b| natural_cmp(&a.branch, &b.branch));

        BranchSummary { rows, totals }
    }

    /// Direct sum of the values the summary should account for.
    pub fn matching_total(&self, facts: &[Fact]) -> f64 {
        let wanted: HashSet<&str> = self.categories.iter().map(String::as_str).collect();
        facts
            .iter()
            .filter(|f| self.accepts(f, &wanted))
            .map(|f| f.value)
            .sum()
    }
}

pub fn build_branch_summary(
    facts: &[Fact],
    selection: &BranchSelection,
    window: Option<&DateWindow>,
    categories: &[String],
    blank_label: &str,
) -> BranchSummary {
    BranchSummaryBuilder::new(selection, window, categories, blank_label).build(facts)
}

/// Checks that the grand total accounts for every matching fact.
pub fn verify_conservation(
    summary: &BranchSummary,
    builder: &BranchSummaryBuilder<'_>,
    facts: &[Fact],
    tolerance: f64,
) -> Result<()> {
    let fact_total = builder.matching_total(facts);
    let row_total: f64 = summary.rows.iter().map(|r| r.total).sum();

    for summary_total in [summary.totals.total, row_total] {
        if (summary_total - fact_total).abs() > tolerance {
            return Err(TrendError::ConservationViolation {
                summary_total,
                fact_total,
            });
        }
    }

    Ok(())
}

impl BranchSummary {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_csv(&self, categories: &[String]) -> String {
        let mut output = String::new();

        let mut header = vec!["Branch".to_string()];
        header.extend(categories.iter().map(|c| escape_csv_field(c)));
        header.push("Total".to_string());
        output.push_str(&header.join(","));
        output.push('\n');

        for row in &self.rows {
            let mut line = vec![escape_csv_field(&row.branch)];
            line.extend(categories.iter().map(|c| cell(row.sums.get(c))));
            line.push(format_number(row.total));
            output.push_str(&line.join(","));
            output.push('\n');
        }

        if !self.is_empty() {
            let mut line = vec!["Grand Total".to_string()];
            line.extend(categories.iter().map(|c| cell(self.totals.sums.get(c))));
            line.push(format_number(self.totals.total));
            output.push_str(&line.join(","));
            output.push('\n');
        }

        output
    }

    pub fn to_markdown(&self, categories: &[String]) -> String {
        let mut output = String::new();

        output.push_str("| Branch |");
        for category in categories {
            output.push_str(&format!(" {} |", category));
        }
        output.push_str(" Total |\n");

        output.push_str("|---|");
        for _ in categories {
            output.push_str("---:|");
        }
        output.push_str("---:|\n");

        for row in &self.rows {
            output.push_str(&format!("| {} |", row.branch));
            for category in categories {
                let value = row.sums.get(category).copied().unwrap_or(0.0);
                output.push_str(&format!(" {:.2} |", value));
            }
            output.push_str(&format!(" {:.2} |\n", row.total));
        }

        if !self.is_empty() {
            output.push_str("| **Grand Total** |");
            for category in categories {
                let value = self.totals.sums.get(category).copied().unwrap_or(0.0);
                output.push_str(&format!(" **{:.2}** |", value));
            }
            output.push_str(&format!(" **{:.2}** |\n", self.totals.total));
        }

        output
    }
}

fn cell(value: Option<&f64>) -> String {
    value.map(|v| format_number(*v)).unwrap_or_default()
}

/// Case-insensitive ordering that compares digit runs by numeric value,
/// so `"9"` sorts before `"10"` and `"Branch 2"` before `"branch 11"`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = split_runs(a);
    let right = split_runs(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Run::Digits(x), Run::Digits(y)) => compare_digits(x, y),
            (Run::Digits(_), Run::Text(_)) => Ordering::Less,
            (Run::Text(_), Run::Digits(_)) => Ordering::Greater,
            (Run::Text(x), Run::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

enum Run<'s> {
    Digits(&'s str),
    Text(&'s str),
}

fn split_runs(s: &str) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (idx, ch) in s.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match in_digits {
            Some(current) if current != is_digit => {
                runs.push(make_run(&s[start..idx], current));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }

    if let Some(current) = in_digits {
        runs.push(make_run(&s[start..], current));
    }
    runs
}

fn make_run(s: &str, digits: bool) -> Run<'_> {
    if digits {
        Run::Digits(s)
    } else {
        Run::Text(s)
    }
}

fn compare_digits(x: &str, y: &str) -> Ordering {
    let x_trim = x.trim_start_matches('0');
    let y_trim = y.trim_start_matches('0');
    x_trim
        .len()
        .cmp(&y_trim.len())
        .then_with(|| x_trim.cmp(y_trim))
        .then_with(|| x.len().cmp(&y.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MonthKey;

    fn cats(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample_facts() -> Vec<Fact> {
        vec![
            Fact::new(2023, 1, "Sales", 100.0, Some("10")),
            Fact::new(2023, 1, "Parts", 40.0, Some("10")),
            Fact::new(2023, 2, "Sales", 60.0, Some("9")),
            Fact::new(2023, 2, "Sales", 5.0, None),
            Fact::new(2023, 3, "Labor", 1000.0, Some("9")),
            Fact::new(2022, 12, "Sales", 70.0, Some("9")),
        ]
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("9", "10"), Ordering::Less);
        assert_eq!(natural_cmp("Branch 2", "branch 11"), Ordering::Less);
        assert_eq!(natural_cmp("abc", "ABD"), Ordering::Less);
        assert_eq!(natural_cmp("007", "7"), Ordering::Greater);
        assert_eq!(natural_cmp("A1", "A1b"), Ordering::Less);
        assert_eq!(natural_cmp("same", "same"), Ordering::Equal);

        let mut names = vec!["110", "(Blank)", "12", "2", "North"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["2", "12", "110", "(Blank)", "North"]);
    }

    #[test]
    fn test_branch_summary_rows_and_totals() {
        let facts = sample_facts();
        let window = DateWindow::new(MonthKey::new(2023, 1), MonthKey::new(2023, 12));
        let summary = build_branch_summary(
            &facts,
            &BranchSelection::All,
            Some(&window),
            &cats(&["Sales", "Parts"]),
            "(Blank)",
        );

        let branches: Vec<&str> = summary.rows.iter().map(|r| r.branch.as_str()).collect();
        assert_eq!(branches, vec!["9", "10", "(Blank)"]);

        assert_eq!(summary.rows[0].total, 60.0);
        assert_eq!(summary.rows[1].sums["Parts"], 40.0);
        assert_eq!(summary.rows[1].total, 140.0);
        assert_eq!(summary.rows[2].total, 5.0);

        assert_eq!(summary.totals.sums["Sales"], 165.0);
        assert_eq!(summary.totals.sums["Parts"], 40.0);
        assert_eq!(summary.totals.total, 205.0);
    }

    #[test]
    fn test_unselected_categories_are_ignored() {
        let facts = sample_facts();
        let summary = build_branch_summary(
            &facts,
            &BranchSelection::explicit(["9"]),
            None,
            &cats(&["Parts"]),
            "(Blank)",
        );
        assert!(summary.is_empty());
        assert!(summary.totals.is_empty());
        assert_eq!(summary.totals.total, 0.0);
    }

    #[test]
    fn test_empty_input() {
        let summary =
            build_branch_summary(&[], &BranchSelection::All, None, &cats(&["Sales"]), "(Blank)");
        assert_eq!(summary, BranchSummary::default());
    }

    #[test]
    fn test_conservation() {
        let facts = sample_facts();
        let categories = cats(&["Sales", "Labor"]);
        let selection = BranchSelection::All;
        let builder = BranchSummaryBuilder::new(&selection, None, &categories, "(Blank)");
        let summary = builder.build(&facts);

        assert_eq!(summary.totals.total, 1235.0);
        assert!(verify_conservation(&summary, &builder, &facts, 1e-9).is_ok());

        let mut tampered = summary.clone();
        tampered.totals.total += 1.0;
        assert!(matches!(
            verify_conservation(&tampered, &builder, &facts, 1e-9),
            Err(TrendError::ConservationViolation { .. })
        ));
    }

    #[test]
    fn test_summary_to_csv() {
        let facts = vec![
            Fact::new(2023, 1, "Sales", 1.5, Some("North, East")),
            Fact::new(2023, 1, "Sales", 2.0, Some("2")),
        ];
        let categories = cats(&["Sales", "Parts"]);
        let summary =
            build_branch_summary(&facts, &BranchSelection::All, None, &categories, "(Blank)");
        let csv = summary.to_csv(&categories);

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Branch,Sales,Parts,Total");
        assert_eq!(lines[1], "2,2,,2");
        assert_eq!(lines[2], "\"North, East\",1.5,,1.5");
        assert_eq!(lines[3], "Grand Total,3.5,,3.5");
    }

    #[test]
    fn test_summary_to_markdown() {
        let facts = sample_facts();
        let categories = cats(&["Sales"]);
        let summary =
            build_branch_summary(&facts, &BranchSelection::All, None, &categories, "(Blank)");
        let markdown = summary.to_markdown(&categories);

        assert!(markdown.contains("| Branch | Sales | Total |"));
        assert!(markdown.contains("| 9 | 130.00 | 130.00 |"));
        assert!(markdown.contains("**Grand Total**"));
    }

    #[test]
    fn test_empty_summary_renders_header_only() {
        let categories = cats(&["Sales"]);
        let summary = BranchSummary::default();

        assert_eq!(summary.to_csv(&categories), "Branch,Sales,Total\n");
        let markdown = summary.to_markdown(&categories);
        assert_eq!(markdown.lines().count(), 2);
        assert!(!markdown.contains("Grand Total"));
    }
}
