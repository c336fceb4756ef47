use assert_approx_eq::assert_approx_eq;

use adoption_forecast::{
    analysis::{
        blend_scenarios, confidence_bounds, estimate_covariance, fit_curve, logistic, BandRequest,
        Bound, ConfidenceOutcome, Covariance, CurveKind, CycleParameter, CycleParams, FitOptions,
        Forecaster, GrowthCycleModel, ModelOutcome, PiecewiseBlend, DEFAULT_JACOBIAN_STEP,
    },
    config::{BlendSettings, ForecastConfig, ManualLogistic, SigmoidSettings},
    error::ForecastError,
    io::{self, ColumnSelection},
    models::{Observation, ObservationSeries},
};

/// Ten years of accelerating adoption.
fn adoption_series() -> ObservationSeries {
    let values = [1.2, 1.9, 2.8, 4.1, 5.9, 8.4, 11.6, 15.3, 20.1, 25.2];
    let obs = (2015..=2024)
        .zip(values)
        .map(|(year, value)| Observation { year, value })
        .collect();
    ObservationSeries::from_observations("Installed", obs).unwrap()
}

// ============================================================================
// End-to-end logistic fit
// ============================================================================

#[test]
fn test_logistic_fit_within_bounds() {
    let series = adoption_series();
    let max = series.max_value().unwrap();
    let bounds = Bound::from_vectors(&[max, 0.0, 2015.0], &[max * 10.0, 5.0, 2035.0]).unwrap();

    let fit = fit_curve(
        "Logistic",
        |x, p| CurveKind::Logistic.evaluate(x, p),
        &series.years(),
        &series.values(),
        &[max * 3.0, 0.1, 2026.0],
        &bounds,
        &FitOptions::default(),
    )
    .unwrap();

    let (k, b, x0) = (fit.params[0], fit.params[1], fit.params[2]);
    assert!(k > max, "K = {k}");
    assert!(k <= max * 10.0);
    assert!(b > 0.0, "b = {b}");
    assert!((2015.0..=2035.0).contains(&x0), "x0 = {x0}");
    assert_eq!(fit.covariance.dimension(), 3);
}

#[test]
fn test_forecaster_matches_direct_fit_bounds() {
    let series = adoption_series();
    let config = ForecastConfig {
        models: vec![CurveKind::Logistic, CurveKind::Gompertz],
        ..ForecastConfig::default()
    };
    let report = Forecaster::new(&series, &config).run().unwrap();
    assert_eq!(report.future_years.first(), Some(&2014));
    assert_eq!(report.future_years.last(), Some(&2050));

    for model in &report.models {
        if let ModelOutcome::Fitted(fitted) = &model.outcome {
            assert!(fitted.params[0] >= 25.2 - 1e-9);
            assert!(fitted.params[2] <= 2035.0 + 1e-9);
            assert_eq!(fitted.predictions.len(), report.future_years.len());
            assert!(fitted.predictions.iter().all(|v| v.is_finite()));
            if let Some(band) = &fitted.band {
                assert_eq!(band.rows.first().map(|r| r.year), Some(2024));
                assert_eq!(band.rows.last().map(|r| r.year), Some(2050));
            }
        }
    }
}

#[test]
fn test_every_model_reproduces_history() {
    let series = adoption_series();
    let config = ForecastConfig {
        models: CurveKind::ALL.to_vec(),
        ..ForecastConfig::default()
    };
    let forecaster = Forecaster::new(&series, &config);
    let report = forecaster.run().unwrap();
    assert_eq!(report.models.len(), 5);
    assert_eq!(report.fitted_count(), 5);

    for model in &report.models {
        let ModelOutcome::Fitted(fitted) = &model.outcome else {
            panic!("{} failed: {:?}", model.kind, model.outcome);
        };
        assert!(fitted.params.iter().all(|p| p.is_finite()), "{}", model.kind);
        assert!(fitted.r_squared > 0.95, "{}: R² {}", model.kind, fitted.r_squared);

        // Predictions on the observed years track the data
        let curve = forecaster.fit_model(model.kind).unwrap();
        for obs in series.observations() {
            let predicted = curve.predict(obs.year as f64);
            assert!(
                (predicted - obs.value).abs() < 3.0,
                "{} at {}: {predicted} vs {}",
                model.kind,
                obs.year,
                obs.value
            );
        }
    }
}

// ============================================================================
// Confidence intervals
// ============================================================================

#[test]
fn test_confidence_bounds_from_fit() {
    let series = adoption_series();
    let config = ForecastConfig::default();
    let forecaster = Forecaster::new(&series, &config);
    let curve = forecaster.fit_model(CurveKind::Logistic).unwrap();

    let outcome = confidence_bounds(75.0, series.len(), &curve.params, &curve.covariance, "t").unwrap();
    let bounds = outcome.bounds().unwrap();
    for i in 0..3 {
        let up = bounds.upper[i] - curve.params[i];
        let down = curve.params[i] - bounds.lower[i];
        if up.is_finite() {
            assert_approx_eq!(up, down, 1e-9 * curve.params[i].abs().max(1.0));
        }
    }

    let unsupported = confidence_bounds(75.0, series.len(), &curve.params, &curve.covariance, "f").unwrap();
    assert_eq!(unsupported, ConfidenceOutcome::Unsupported);
}

#[test]
fn test_manual_parameters_covariance() {
    let series = adoption_series();
    let cov = estimate_covariance(
        logistic_slice,
        &series.years(),
        &series.values(),
        &[315.0, 0.18, 2033.0],
        DEFAULT_JACOBIAN_STEP,
    )
    .unwrap();
    assert!(matches!(cov, Covariance::Defined(_) | Covariance::Undefined { .. }));
    assert_eq!(cov.dimension(), 3);
}

fn logistic_slice(x: f64, p: &[f64]) -> f64 {
    logistic(x, p[0], p[1], p[2])
}

// ============================================================================
// Blending
// ============================================================================

#[test]
fn test_blend_keeps_history_and_hands_over() {
    let series = adoption_series();
    let blend = PiecewiseBlend::new(&series, 2022.0, 2.0).unwrap();
    let model = |x: f64| logistic(x, 100.0, 0.3, 2026.0);
    assert_eq!(blend.value_at(2020.0, model), 8.4);
    assert_eq!(blend.value_at(2022.0, model), 15.3);
    assert_approx_eq!(blend.value_at(2024.0, model), model(2024.0), 1e-9);
    assert_approx_eq!(blend.value_at(2030.0, model), model(2030.0), 1e-12);
}

#[test]
fn test_blend_scenarios_with_manual_line() {
    let series = adoption_series();
    let settings = BlendSettings {
        cutoff_year: Some(2023),
        manual: Some(ManualLogistic {
            k: 315.0,
            b: 0.18,
            x0: 2033.0,
        }),
        ..BlendSettings::default()
    };
    let request = BandRequest {
        level_percent: 75.0,
        distribution: "z",
    };
    let scenarios = blend_scenarios(&series, &settings, 2050, request, &FitOptions::default()).unwrap();
    assert_eq!(scenarios.years.len(), 2050 - 2015 + 1);
    let manual = scenarios.manual.as_ref().unwrap();
    // 2023 is the cutoff, so history is kept through index 8
    assert_eq!(manual.values[8], 20.1);
    assert_approx_eq!(manual.values[35], logistic(2050.0, 315.0, 0.18, 2033.0), 1e-9);

    let band = manual.band.as_ref().expect("manual band");
    assert_eq!(band.rows.first().map(|r| r.year), Some(2024));
    assert_eq!(band.rows.last().map(|r| r.year), Some(2050));
    let params = [315.0, 0.18, 2033.0];
    for i in 0..3 {
        let up = band.upper_params[i] - params[i];
        let down = params[i] - band.lower_params[i];
        assert_approx_eq!(up, down, 1e-9 * params[i]);
    }
}

// ============================================================================
// Growth-cycle model
// ============================================================================

#[test]
fn test_growth_cycle_override_flow() {
    let truth = CycleParams::new(1000.0, 0.3, 2020.0, 0.05, 8.0, 0.5, 1.0);
    let t: Vec<f64> = (2008..=2030).map(f64::from).collect();
    let y: Vec<f64> = t.iter().map(|&ti| adoption_forecast::analysis::growth_cycle(ti, &truth)).collect();

    let mut model = GrowthCycleModel::new();
    assert!(matches!(
        model.adjust_named(&[("T", 15.0)]),
        Err(ForecastError::ModelNotFitted)
    ));

    model.fit(&t, &y, Some(truth), &FitOptions::default()).unwrap();
    model.adjust_named(&[("T", 15.0), ("L", 1100.0)]).unwrap();
    let params = *model.params().unwrap();
    assert_eq!(params.get(CycleParameter::Period), 15.0);
    assert_eq!(params.get(CycleParameter::Saturation), 1100.0);

    let err = model.adjust_named(&[("k", 0.1), ("omega", 2.0)]).unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameterName(_)));
    assert_eq!(*model.params().unwrap(), params);
}

#[test]
fn test_forecaster_growth_cycle_applies_config_overrides() {
    let truth = CycleParams::new(500.0, 0.4, 2018.0, 0.03, 6.0, 0.0, 1.0);
    let obs = (2005..=2025)
        .map(|year| Observation {
            year,
            value: adoption_forecast::analysis::growth_cycle(year as f64, &truth),
        })
        .collect();
    let series = ObservationSeries::from_observations("cycle", obs).unwrap();

    let mut config = ForecastConfig::default();
    config.cycle.overrides.insert("T".to_string(), 12.0);
    config.cycle.horizon = Some(2040);

    match Forecaster::new(&series, &config).growth_cycle() {
        Ok((model, report)) => {
            assert_eq!(model.params().unwrap().get(CycleParameter::Period), 12.0);
            assert_eq!(report.params.get(CycleParameter::Period), 12.0);
            let last = report.points.last().unwrap();
            assert_approx_eq!(last.t, 2041.0, 1e-9);
        }
        Err(e) => assert!(matches!(e, ForecastError::FitNonConvergence { .. }), "{e}"),
    }
}

// ============================================================================
// Trend/seasonal decomposition
// ============================================================================

#[test]
fn test_periodic_forecast_exports_components() {
    let pattern = [2.0, -1.0, 0.5, -3.0, 1.5];
    let obs = (2008..=2031)
        .enumerate()
        .map(|(i, year)| Observation {
            year,
            value: logistic(year as f64, 100.0, 0.4, 2020.0) + pattern[i % 5],
        })
        .collect();
    let series = ObservationSeries::from_observations("seasonal", obs).unwrap();
    let mut config = ForecastConfig::default();
    config.end_year = 2036;

    let forecaster = Forecaster::new(&series, &config);
    let decomposition = forecaster.decompose().unwrap();
    assert_eq!(decomposition.period, 5);
    let deepest = (0..5)
        .min_by(|&a, &b| decomposition.seasonal[a].total_cmp(&decomposition.seasonal[b]))
        .unwrap();
    assert_eq!(deepest, 3);

    let forecast = forecaster.periodic().unwrap();
    assert_eq!(forecast.points.first().unwrap().year, 2007);
    assert_eq!(forecast.points.last().unwrap().year, 2036);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("periodic.csv");
    io::write_periodic_csv(&forecast, &path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), forecast.points.len() + 1);
}

// ============================================================================
// IO round trips through the pipeline
// ============================================================================

#[test]
fn test_csv_to_exports() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let mut text = String::from("Year,Installed\n");
    for obs in adoption_series().observations() {
        text.push_str(&format!("{},{}\n", obs.year, obs.value));
    }
    text.push_str("2025,\n");
    std::fs::write(&input, text).unwrap();

    let series = io::read_csv(&input, &ColumnSelection::default()).unwrap();
    assert_eq!(series.len(), 10);

    let config = ForecastConfig::default();
    let report = Forecaster::new(&series, &config).run().unwrap();

    let predictions = dir.path().join("predictions.csv");
    io::write_predictions_csv(&report, &predictions).unwrap();
    let content = std::fs::read_to_string(&predictions).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("Year,Logistic"));
    assert!(lines.next().unwrap().starts_with("2014,"));
    assert_eq!(content.lines().count(), 1 + report.future_years.len());

    let confidence = dir.path().join("confidence.csv");
    io::write_confidence_csv(&report, &confidence).unwrap();
    let content = std::fs::read_to_string(&confidence).unwrap();
    if report.fitted(CurveKind::Logistic).and_then(|f| f.band.as_ref()).is_some() {
        assert!(content.starts_with("Year,Logistic Lower,Logistic exact,Logistic Upper"));
        assert_eq!(content.lines().count(), 1 + (2050 - 2024 + 1));
    }

    let json = dir.path().join("report.json");
    io::write_report_json(&report, &json, false).unwrap();
    assert!(std::fs::read_to_string(&json).unwrap().contains("\"series_name\":\"Installed\""));
}

#[test]
fn test_json_report_reads_back_nan_entries() {
    let dir = tempfile::tempdir().unwrap();
    let config = ForecastConfig {
        models: vec![CurveKind::Logistic, CurveKind::PowerLaw],
        ..ForecastConfig::default()
    };
    let report = Forecaster::new(&adoption_series(), &config).run().unwrap();
    let path = dir.path().join("report.json");
    io::write_report_json(&report, &path, true).unwrap();
    let back = io::read_report_json(&path).unwrap();
    assert_eq!(back.models.len(), 2);
    assert_eq!(back.future_years, report.future_years);
    for (before, after) in report.models.iter().zip(&back.models) {
        assert_eq!(before.kind, after.kind);
        assert_eq!(before.fitted().is_some(), after.fitted().is_some());
        if let (Some(b), Some(a)) = (before.fitted(), after.fitted()) {
            for (x, y) in b.predictions.iter().zip(&a.predictions) {
                assert!(x.is_nan() == y.is_nan());
            }
        }
    }

    // Three points leave no degrees of freedom, so the covariance is undefined
    let short = ObservationSeries::from_observations(
        "short",
        vec![
            Observation { year: 2020, value: 1.0 },
            Observation { year: 2021, value: 2.0 },
            Observation { year: 2022, value: 3.5 },
        ],
    )
    .unwrap();
    let report = Forecaster::new(&short, &ForecastConfig::default()).run().unwrap();
    let path = dir.path().join("short.json");
    io::write_report_json(&report, &path, false).unwrap();
    let back = io::read_report_json(&path).unwrap();
    assert_eq!(back.models.len(), 1);
    if let Some(fitted) = back.fitted(CurveKind::Logistic) {
        assert!(!fitted.covariance_defined);
        assert!(fitted.covariance.iter().flatten().all(|v| v.is_nan()));
    }
}

#[test]
fn test_config_file_drives_models() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forecast.toml");
    std::fs::write(
        &path,
        r#"
confidence_level = 90
distribution = "z"
end_year = 2040
models = ["logistic", "power_law"]

[sigmoid]
preset_year_max = 2035
"#,
    )
    .unwrap();

    let config = ForecastConfig::load(&path).unwrap();
    assert_eq!(config.models, vec![CurveKind::Logistic, CurveKind::PowerLaw]);
    assert_eq!(config.sigmoid, SigmoidSettings { preset_year_max: 2035, ..SigmoidSettings::default() });

    let report = Forecaster::new(&adoption_series(), &config).run().unwrap();
    assert_eq!(report.future_years.last(), Some(&2040));
    assert_eq!(report.distribution, "z");
}
