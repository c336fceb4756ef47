//! Logistic forecast example: fit competing growth curves to a short history
//! and compare their confidence bands.
//!
//! Run from the project root:
//!   cargo run --example logistic_forecast

use adoption_forecast::analysis::{CurveKind, Forecaster};
use adoption_forecast::config::ForecastConfig;
use adoption_forecast::models::{Observation, ObservationSeries};
use adoption_forecast::visualization::{
    print_confidence_table, print_forecast_chart, print_parameter_table,
};

fn main() {
    let values = [1.2, 1.9, 2.8, 4.1, 5.9, 8.4, 11.6, 15.3, 20.1, 25.2];
    let observations = (2015..=2024)
        .zip(values)
        .map(|(year, value)| Observation { year, value })
        .collect();
    let series = ObservationSeries::from_observations("Installed", observations)
        .expect("Failed to build series");

    let config = ForecastConfig {
        models: vec![CurveKind::Logistic, CurveKind::Gompertz],
        end_year: 2040,
        confidence_level: 90.0,
        ..ForecastConfig::default()
    };

    let report = Forecaster::new(&series, &config)
        .run()
        .expect("Forecast failed");
    print_parameter_table(&report);

    for model in &report.models {
        // Only the sigmoid models carry a band
        println!("\n=== {} ===", model.kind.label());
        match model.fitted().and_then(|f| f.band.as_ref()) {
            Some(band) => print_confidence_table(
                model.kind.label(),
                band,
                report.confidence_level,
                &report.distribution,
            ),
            None => eprintln!("{} has no confidence band", model.kind.label()),
        }
        print_forecast_chart(&report, model.kind);
    }
}
