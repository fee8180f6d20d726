mod common;

use demand_forecast::{
    evaluate, ForecastError, ModelKind, PathsConfig, Pipeline, PipelineConfig, Stage,
    WeeklySeries,
};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn pipeline_in(dir: &TempDir) -> Pipeline {
    let config = PipelineConfig {
        paths: PathsConfig {
            data_root: dir.path().join("data"),
            output_root: dir.path().join("outputs"),
        },
        ..common::fast_config()
    };
    Pipeline::new(config).unwrap()
}

fn header(path: &Path) -> String {
    let text = fs::read_to_string(path).unwrap();
    text.lines().next().unwrap_or_default().to_string()
}

fn line_count(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

#[test]
fn test_three_regions_thirty_weeks() {
    let series = common::weekly_series(&common::REGIONS, 30);
    let pipeline = Pipeline::new(common::fast_config()).unwrap();

    let predictions = pipeline.forecast_all(&series).unwrap();
    for model in ModelKind::ALL {
        assert_eq!(predictions.get(model).len(), 24, "{}", model);
    }

    let evaluation = evaluate(&predictions).unwrap();
    assert!(evaluation.reconciliation.rows.len() <= 24);
    assert_eq!(
        evaluation.reconciliation.rows.len() + evaluation.reconciliation.dropped.len(),
        24
    );
    assert_eq!(evaluation.by_region.len(), 3);
    for model in ModelKind::ALL {
        let metrics = evaluation.overall.get(model).unwrap();
        assert!(metrics.wape >= 0.0 && metrics.wape.is_finite());
        assert!(metrics.bias.is_finite());
    }
}

#[test]
fn test_short_region_fails_whole_run() {
    let mut points = common::weekly_series(&["CA", "TX"], 30).points().to_vec();
    points.retain(|p| p.region_id == "CA" || p.week_key < 11109);
    let series = WeeklySeries::new(points).unwrap();
    let pipeline = Pipeline::new(common::fast_config()).unwrap();

    for model in ModelKind::ALL {
        match pipeline.forecast(model, &series) {
            Err(ForecastError::ConfigurationError(message)) => {
                assert!(message.contains("'TX'"), "{}", message)
            }
            other => panic!("{}: expected a configuration error, got {:?}", model, other),
        }
    }
}

#[test]
fn test_all_stages_write_every_artifact() {
    let dir = tempdir().unwrap();
    common::write_raw_inputs(&dir.path().join("data"), 30);
    let pipeline = pipeline_in(&dir);
    let paths = pipeline.config().paths.clone();

    pipeline.run(Stage::All).unwrap();

    assert_eq!(
        header(&paths.weekly_series()),
        "state_id,wm_yr_wk,week_start,y,snap,event_flag"
    );
    assert_eq!(line_count(&paths.weekly_series()), 1 + 90);

    for model in ModelKind::ALL {
        let path = paths.predictions(model);
        assert_eq!(
            header(&path),
            format!("state_id,wm_yr_wk,week_start,y_true,yhat_{}", model)
        );
        assert_eq!(line_count(&path), 1 + 24);
    }

    assert_eq!(
        header(&paths.reconciled()),
        "state_id,wm_yr_wk,week_start,y_true,yhat_sarimax,yhat_lgbm,yhat_lstm"
    );
    assert_eq!(
        header(&paths.metrics_by_region()),
        "state_id,wape_sarimax,wape_lgbm,wape_lstm,bias_sarimax,bias_lgbm,bias_lstm"
    );
    assert_eq!(line_count(&paths.metrics_by_region()), 1 + 3);

    let overall: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(paths.metrics_overall()).unwrap()).unwrap();
    for metric in ["wape", "bias"] {
        for model in ModelKind::ALL {
            assert!(overall[metric][model.as_str()].is_number());
        }
    }

    let payload: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(paths.site_payload()).unwrap()).unwrap();
    assert_eq!(payload["table"].as_array().unwrap().len(), 24);
    assert_eq!(payload["geojson"]["features"].as_array().unwrap().len(), 3);
    assert!(payload["table"][0]["y_actual"].is_number());

    let site_overall: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(paths.site_metrics_overall()).unwrap()).unwrap();
    assert_eq!(site_overall, overall);
    let by_state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(paths.site_metrics_by_region()).unwrap()).unwrap();
    assert_eq!(by_state.as_array().unwrap().len(), 3);
    assert!(by_state[0]["state_id"].is_string());
}

#[test]
fn test_weekly_series_from_raw_tables() {
    let dir = tempdir().unwrap();
    common::write_raw_inputs(&dir.path().join("data"), 4);
    let pipeline = pipeline_in(&dir);

    let series = pipeline.build_series().unwrap();
    assert_eq!(series.len(), 12);
    assert_eq!(series.regions(), vec!["CA", "TX", "WI"]);

    // two stores, seven days
    let first = &series.points()[0];
    let expected: i64 = (0..2)
        .flat_map(|store| (0..7).map(move |day| common::daily_units(0, store, day)))
        .sum();
    assert_eq!(first.y, expected as f64);
    assert_eq!(first.week_key, 11101);
    // calendar days 0, 3 and 6 carry the CA flag
    assert!((first.snap_flag - 3.0 / 7.0).abs() < 1e-12);
    assert_eq!(first.event_flag, 1);
}

#[test]
fn test_failed_stage_writes_nothing() {
    let dir = tempdir().unwrap();
    common::write_raw_inputs(&dir.path().join("data"), 30);
    let pipeline = pipeline_in(&dir);
    let paths = pipeline.config().paths.clone();

    // no weekly series yet
    assert!(pipeline.run(Stage::Sarimax).is_err());
    assert!(!paths.predictions(ModelKind::Sarimax).exists());

    pipeline.run(Stage::Dataset).unwrap();
    let too_long = Pipeline::new(PipelineConfig {
        test_weeks: 30,
        ..pipeline.config().clone()
    })
    .unwrap();
    assert!(matches!(
        too_long.run(Stage::Lgbm),
        Err(ForecastError::ConfigurationError(_))
    ));
    assert!(!paths.predictions(ModelKind::Lgbm).exists());
}

#[test]
fn test_missing_snap_column_is_configuration_error() {
    let dir = tempdir().unwrap();
    common::write_raw_inputs(&dir.path().join("data"), 4);
    let config = PipelineConfig {
        regions: vec!["CA".to_string(), "NV".to_string()],
        ..pipeline_in(&dir).config().clone()
    };

    let err = Pipeline::new(config).unwrap().run(Stage::Dataset).unwrap_err();
    assert!(matches!(err, ForecastError::ConfigurationError(_)));
    assert!(err.to_string().contains("snap_NV"));
}
