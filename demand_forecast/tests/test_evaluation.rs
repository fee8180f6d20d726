mod common;

use demand_forecast::windows::{ExogenousSplit, WindowingStrategy};
use demand_forecast::{evaluate, reconcile, ModelKind, ModelPredictions, PredictionRow};
use pretty_assertions::assert_eq;

/// Predictions for every test week, each model off by a fixed factor
fn predictions() -> ModelPredictions {
    let series = common::weekly_series(&common::REGIONS, 20);
    let split = ExogenousSplit.split(&series, 4).unwrap();
    let rows = |factor: f64| -> Vec<PredictionRow> {
        split
            .test
            .iter()
            .map(|p| PredictionRow::new(p.key(), p.y, p.y * factor))
            .collect()
    };
    ModelPredictions {
        sarimax: rows(1.1),
        lgbm: rows(0.9),
        lstm: rows(1.0),
    }
}

#[test]
fn test_full_overlap() {
    let evaluation = evaluate(&predictions()).unwrap();

    assert_eq!(evaluation.reconciliation.rows.len(), 12);
    assert!(evaluation.reconciliation.dropped.is_empty());
    assert_eq!(evaluation.by_region.len(), 3);

    let overall = &evaluation.overall;
    assert!((overall.wape[&ModelKind::Sarimax] - 0.1).abs() < 1e-12);
    assert!((overall.bias[&ModelKind::Lgbm] + 0.1).abs() < 1e-12);
    assert_eq!(overall.wape[&ModelKind::Lstm], 0.0);
}

#[test]
fn test_row_missing_from_one_model() {
    let mut predictions = predictions();
    let removed = predictions.lgbm.remove(5);

    let evaluation = evaluate(&predictions).unwrap();
    let reconciled = &evaluation.reconciliation;

    assert_eq!(reconciled.rows.len(), 11);
    assert!(reconciled.rows.iter().all(|r| r.key() != removed.key));
    assert_eq!(reconciled.dropped.len(), 1);
    assert_eq!(reconciled.dropped[0].key, removed.key);
    assert_eq!(reconciled.dropped[0].missing, vec![ModelKind::Lgbm]);

    // the region keeps its metrics, over its remaining weeks
    let region = &removed.key.region_id;
    let region_rows: Vec<_> = reconciled.rows.iter().filter(|r| &r.region_id == region).collect();
    assert_eq!(region_rows.len(), 3);
    assert!(evaluation.by_region.iter().any(|m| &m.region_id == region));
}

#[test]
fn test_reconciled_order_follows_sarimax() {
    let mut predictions = predictions();
    predictions.sarimax.reverse();
    predictions.lstm.rotate_left(5);

    let reconciled = reconcile(&predictions).unwrap();
    let order: Vec<_> = reconciled.rows.iter().map(|r| r.key()).collect();
    let expected: Vec<_> = predictions.sarimax.iter().map(|r| r.key.clone()).collect();
    assert_eq!(order, expected);
}

#[test]
fn test_metrics_by_region_sorted() {
    let evaluation = evaluate(&predictions()).unwrap();
    let regions: Vec<&str> = evaluation
        .by_region
        .iter()
        .map(|m| m.region_id.as_str())
        .collect();
    assert_eq!(regions, vec!["CA", "TX", "WI"]);
    for metrics in &evaluation.by_region {
        assert!((metrics.wape_sarimax - 0.1).abs() < 1e-12);
        assert!((metrics.bias_sarimax - 0.1).abs() < 1e-12);
        assert_eq!(metrics.wape_lstm, 0.0);
    }
}
