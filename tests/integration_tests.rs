use financial_trend_builder::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;

fn branch_csv(start_year: i32, months: usize, branches: &[&str], value: f64) -> String {
    let mut csv = String::from("Fiscal Year,Month,Store,Date,Total,Units\n");
    let start = MonthKey::new(start_year, 1);
    for offset in 0..months {
        let key = start.shift(offset as i32);
        let month_name = &month_name(key.month()).unwrap()[..3];
        for branch in branches {
            csv.push_str(&format!(
                "{},{},{},{}-{:02}-01,\"{}\",1\n",
                key.year(),
                month_name,
                branch,
                key.year(),
                key.month(),
                value
            ));
        }
    }
    csv
}

fn load(name: &str, csv: &str) -> Dataset {
    let table = read_csv_table(csv.as_bytes()).unwrap();
    normalize_records(name, &table, &DashboardConfig::default()).unwrap()
}

#[test]
fn test_normalizer_invariants() {
    let csv = "Year,Period,Branch,Sales,Returns\n\
               2023,Jan,1,\"1,000\",-5\n\
               2023,February,2,250,oops\n\
               ,3,2,1,1\n\
               2023,Smarch,2,1,1\n\
               2024,12,,10,\n";
    let dataset = load("mixed", csv);

    assert_eq!(dataset.facts.len(), 4);
    for fact in &dataset.facts {
        assert!((1..=12).contains(&fact.month));
        assert!(fact.value.is_finite());
    }
    assert_eq!(dataset.categories, vec!["Sales", "Returns"]);
    assert_eq!(dataset.branches, vec!["1", "2"]);
    assert_eq!(dataset.bounds.min, MonthKey::new(2023, 1));
    assert_eq!(dataset.bounds.max, MonthKey::new(2024, 12));
}

#[test]
fn test_two_branch_month_sums() {
    let facts = vec![
        Fact::new(2023, 1, "Total", 100.0, Some("A")),
        Fact::new(2023, 1, "Total", 50.0, Some("B")),
    ];
    let aggregate = build_monthly_aggregate(&facts, &BranchSelection::All);
    assert_eq!(aggregate[&MonthKey::new(2023, 1)].get("Total"), 150.0);
}

#[test]
fn test_twenty_four_months_of_constant_totals() {
    let dataset = load("constant", &branch_csv(2022, 24, &["A"], 100.0));
    let aggregate = build_monthly_aggregate(&dataset.facts, &BranchSelection::All);
    let categories = vec!["Total".to_string()];

    let values = rolling_values(&aggregate, &categories);
    assert_eq!(values[10].get("Total"), None);
    assert_eq!(values[11].get("Total"), Some(1200.0));

    let growth = rolling_growth(&aggregate, &categories);
    assert!(growth[..23].iter().all(|r| r.get("Total").is_none()));
    assert_eq!(growth[23].get("Total"), Some(0.0));
}

#[test]
fn test_rolling_window_spans_gaps_positionally() {
    // 2022 has a three-month hole; the twelfth entry lands in March 2023.
    let mut csv = String::from("Year,Month,Total\n");
    for month in [1, 2, 3, 7, 8, 9, 10, 11, 12] {
        csv.push_str(&format!("2022,{},10\n", month));
    }
    for month in 1..=3 {
        csv.push_str(&format!("2023,{},10\n", month));
    }
    let dataset = load("gappy", &csv);
    let aggregate = build_monthly_aggregate(&dataset.facts, &BranchSelection::All);
    let rows = rolling_values(&aggregate, &["Total".to_string()]);

    assert_eq!(rows.len(), 12);
    assert_eq!(rows[11].key(), MonthKey::new(2023, 3));
    assert_eq!(rows[11].get("Total"), Some(120.0));
}

#[test]
fn test_branch_filter_over_dataset() {
    let mut csv = branch_csv(2023, 2, &["A", "B"], 10.0);
    csv.push_str("2023,Jan,,2023-01-01,7,1\n");
    let dataset = load("branches", &csv);
    let categories = vec!["Total".to_string()];

    let all = aggregate_period_values(&dataset.facts, &BranchSelection::All, None, &categories);
    assert_eq!(all[0].get("Total"), Some(27.0));

    let only_b = aggregate_period_values(
        &dataset.facts,
        &BranchSelection::explicit(["B"]),
        None,
        &categories,
    );
    assert_eq!(only_b[0].get("Total"), Some(10.0));
    assert_eq!(only_b[1].get("Total"), Some(10.0));
}

#[test]
fn test_summary_conservation_randomized() {
    let mut rng = StdRng::seed_from_u64(7);
    let branches = ["1", "2", "10", "North"];
    let categories = ["Sales", "Parts", "Labor"];

    for _ in 0..20 {
        let facts: Vec<Fact> = (0..200)
            .map(|_| {
                let branch = if rng.gen_bool(0.1) {
                    None
                } else {
                    Some(branches[rng.gen_range(0..branches.len())])
                };
                Fact::new(
                    rng.gen_range(2020..2025),
                    rng.gen_range(1..=12),
                    categories[rng.gen_range(0..categories.len())],
                    rng.gen_range(-500.0..500.0),
                    branch,
                )
            })
            .collect();

        let selected = vec!["Sales".to_string(), "Labor".to_string()];
        let selection = BranchSelection::explicit(["2", "10", "North"]);
        let window = DateWindow::new(MonthKey::new(2021, 4), MonthKey::new(2023, 9));
        let builder = BranchSummaryBuilder::new(&selection, Some(&window), &selected, "(Blank)");
        let summary = builder.build(&facts);

        verify_conservation(&summary, &builder, &facts, 1e-6).unwrap();

        let row_names: Vec<&str> = summary.rows.iter().map(|r| r.branch.as_str()).collect();
        assert!(!row_names.contains(&"(Blank)"));
        assert!(!row_names.contains(&"1"));
        let mut sorted = row_names.clone();
        sorted.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(row_names, sorted);
    }
}

#[test]
fn test_dashboard_csv_export() -> anyhow::Result<()> {
    let mut dashboard = Dashboard::new(DashboardConfig::default());
    dashboard.replace_dataset(load("export", &branch_csv(2022, 24, &["A", "B"], 50.0)));
    dashboard.select_categories(["Total"]);
    dashboard.set_view(SeriesView::RollingValue);

    let window = dashboard.active_window().expect("dataset loaded");
    assert_eq!(window.start, Some(MonthKey::new(2022, 12)));

    let csv = dashboard.export_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Year,Month,Label,Total");
    assert_eq!(lines[1], "2022,12,Dec 2022,1200");
    assert_eq!(lines.len(), 14);

    dashboard.set_range_strings("2022-01", "2022-03")?;
    let csv = dashboard.export_csv();
    assert_eq!(
        csv,
        "Year,Month,Label,Total\n2022,1,Jan 2022,\n2022,2,Feb 2022,\n2022,3,Mar 2022,\n"
    );
    Ok(())
}

#[test]
fn test_region_groups_from_config() -> anyhow::Result<()> {
    let config = DashboardConfig::from_json_str(
        r#"{ "branch_groups": { "East": ["A"], "West": ["B", "C"] } }"#,
    )?;
    let mut dashboard = Dashboard::new(config);
    dashboard.replace_dataset(load("regions", &branch_csv(2023, 1, &["A", "B", "C"], 5.0)));

    dashboard.select_branch_groups(&["West"]);
    let summary = dashboard.branch_summary();
    let branches: Vec<&str> = summary.rows.iter().map(|r| r.branch.as_str()).collect();
    assert_eq!(branches, vec!["B", "C"]);
    assert_eq!(summary.totals.sums["Total"], 10.0);
    assert_eq!(summary.totals.sums["Units"], 2.0);
    Ok(())
}

#[test]
fn test_processor_rejects_empty_dataset() {
    let csv = "Year,Month,Branch,Comment\n2023,1,A,hello\n";
    let result = TrendProcessor::process_csv("words", csv.as_bytes(), &DashboardConfig::default());
    assert!(matches!(result, Err(TrendError::EmptyDataset)));
}

#[tokio::test]
async fn test_switching_dataset_mid_load() {
    let loader = DatasetLoader::new(DashboardConfig::default());
    let mut dashboard = Dashboard::new(DashboardConfig::default());

    let (tx_first, rx_first) = oneshot::channel::<String>();
    let (tx_second, rx_second) = oneshot::channel::<String>();

    let fetch = |rx: oneshot::Receiver<String>| async move {
        let text = rx
            .await
            .map_err(|e| TrendError::LoadFailed(e.to_string()))?;
        read_csv_table(text.as_bytes())
    };

    let first = loader.load("2019 data".to_string(), fetch(rx_first));
    let second = loader.load("2024 data".to_string(), fetch(rx_second));

    tx_second
        .send(branch_csv(2024, 3, &["A"], 1.0))
        .expect("receiver alive");
    tx_first
        .send(branch_csv(2019, 3, &["Z"], 1.0))
        .expect("receiver alive");

    let (first, second) = tokio::join!(first, second);

    assert!(dashboard.apply_load(second).unwrap());
    assert!(!dashboard.apply_load(first).unwrap());

    let dataset = dashboard.dataset().unwrap();
    assert_eq!(dataset.name, "2024 data");
    assert!(dataset.facts.iter().all(|f| f.year == 2024));
}

#[tokio::test]
async fn test_failed_load_leaves_state_untouched() {
    let loader = DatasetLoader::new(DashboardConfig::default());
    let mut dashboard = Dashboard::new(DashboardConfig::default());

    let csv = branch_csv(2023, 2, &["A"], 3.0);
    let ok = loader
        .load("good".to_string(), async move { read_csv_table(csv.as_bytes()) })
        .await;
    dashboard.apply_load(ok).unwrap();
    let before = dashboard.series();

    let failed = loader
        .load("bad".to_string(), async {
            Err(TrendError::LoadFailed("HTTP 404".to_string()))
        })
        .await;
    let error = dashboard.apply_load(failed).unwrap_err();
    assert!(error.is_user_facing());
    assert_eq!(dashboard.series(), before);
}
