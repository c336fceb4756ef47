use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, ContentArrangement, Table};

use crate::analysis::{
    BlendedScenarios, ConfidenceBand, CycleReport, Decomposition, ForecastReport, GrowthRate, ModelOutcome,
    PeriodicForecast,
};
use crate::models::SeriesSummary;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn heading(title: &str, width: usize) -> String {
    format!("\n{}\n{}\n", title.bold().green(), "=".repeat(width))
}

/// Format a series summary table as a string.
pub fn format_series_summary(name: &str, summary: &SeriesSummary) -> String {
    let mut output = heading(&format!("Series: {name}"), 50);

    let mut table = new_table(vec!["Metric", "Value"]);
    table.add_row(vec![Cell::new("Observations"), Cell::new(summary.count)]);
    table.add_row(vec![
        Cell::new("Years"),
        Cell::new(format!("{} - {}", summary.min_year, summary.max_year)),
    ]);
    table.add_row(vec![Cell::new("Minimum"), Cell::new(format!("{:.2}", summary.min_value))]);
    table.add_row(vec![Cell::new("Maximum"), Cell::new(format!("{:.2}", summary.max_value))]);
    table.add_row(vec![Cell::new("Mean"), Cell::new(format!("{:.2}", summary.mean_value))]);

    output.push_str(&format!("{table}"));
    output
}

/// Print a series summary table.
pub fn print_series_summary(name: &str, summary: &SeriesSummary) {
    print!("{}", format_series_summary(name, summary));
}

/// Format fitted parameters of every model in the report.
pub fn format_parameter_table(report: &ForecastReport) -> String {
    let mut output = heading("Fitted Models", 60);

    let mut table = new_table(vec!["Model", "Parameter", "Value", "Std. Error", "R²", "Preset Year"]);
    for model in &report.models {
        match &model.outcome {
            ModelOutcome::Fitted(fitted) => {
                let names = model.kind.parameter_names();
                for (i, (name, value)) in names.iter().zip(&fitted.params).enumerate() {
                    let first = i == 0;
                    let se = fitted.standard_errors.get(i).copied().unwrap_or(f64::NAN);
                    table.add_row(vec![
                        Cell::new(if first { model.kind.label() } else { "" }),
                        Cell::new(*name),
                        Cell::new(format!("{value:.5}")),
                        Cell::new(if se.is_finite() { format!("{se:.5}") } else { "n/a".to_string() }),
                        Cell::new(if first { format!("{:.4}", fitted.r_squared) } else { String::new() }),
                        Cell::new(match (first, fitted.preset_year) {
                            (true, Some(year)) => year.to_string(),
                            _ => String::new(),
                        }),
                    ]);
                }
            }
            ModelOutcome::Failed { reason } => {
                table.add_row(vec![
                    Cell::new(model.kind.label()),
                    Cell::new("failed"),
                    Cell::new(reason),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(""),
                ]);
            }
        }
    }

    output.push_str(&format!("{table}"));
    output
}

/// Print the fitted parameter table.
pub fn print_parameter_table(report: &ForecastReport) {
    print!("{}", format_parameter_table(report));
}

/// Format a confidence band as a string.
pub fn format_confidence_table(label: &str, band: &ConfidenceBand, level: f64, distribution: &str) -> String {
    let mut output = heading(&format!("{label} Confidence Band"), 60);
    output.push_str(&format!(
        "{}\n",
        format!(
            "Confidence Level: {level:.0}% | Distribution: {distribution} | Critical Value: {:.4}",
            band.critical_value
        )
        .dimmed()
    ));

    let mut table = new_table(vec!["Year", "Lower", "Exact", "Upper"]);
    for row in &band.rows {
        table.add_row(vec![
            Cell::new(row.year),
            Cell::new(format!("{:.2}", row.lower)),
            Cell::new(format!("{:.2}", row.exact)),
            Cell::new(format!("{:.2}", row.upper)),
        ]);
    }

    output.push_str(&format!("{table}"));
    output
}

/// Print a confidence band table.
pub fn print_confidence_table(label: &str, band: &ConfidenceBand, level: f64, distribution: &str) {
    print!("{}", format_confidence_table(label, band, level, distribution));
}

/// Format a growth-cycle report: the parameters and a sampled prediction grid.
pub fn format_cycle_report(report: &CycleReport, max_rows: usize) -> String {
    let mut output = heading("Growth-Cycle Model", 60);
    output.push_str(&format!("{}\n", format!("R²: {:.4}", report.r_squared).dimmed()));

    let mut params = new_table(vec!["Parameter", "Description", "Value"]);
    for (symbol, description, value) in report.named_params() {
        params.add_row(vec![
            Cell::new(symbol),
            Cell::new(description),
            Cell::new(format!("{value:.5}")),
        ]);
    }
    output.push_str(&format!("{params}\n"));

    let stride = (report.points.len() / max_rows.max(1)).max(1);
    let mut grid = new_table(vec!["t", "Predicted", "Trend", "Envelope Low", "Envelope High"]);
    for point in report.points.iter().step_by(stride) {
        grid.add_row(vec![
            Cell::new(format!("{:.2}", point.t)),
            Cell::new(format!("{:.2}", point.predicted)),
            Cell::new(format!("{:.2}", point.trend)),
            Cell::new(format!("{:.2}", point.envelope_lower)),
            Cell::new(format!("{:.2}", point.envelope_upper)),
        ]);
    }

    output.push_str(&format!("{grid}"));
    output
}

/// Print a growth-cycle report.
pub fn print_cycle_report(report: &CycleReport, max_rows: usize) {
    print!("{}", format_cycle_report(report, max_rows));
}

/// Format year-over-year growth rates as a string.
pub fn format_growth_rate_table(label: &str, rates: &[GrowthRate]) -> String {
    let mut output = heading(&format!("{label} Growth Rates"), 50);

    let mut table = new_table(vec!["Year", "Growth Rate"]);
    for rate in rates {
        table.add_row(vec![
            Cell::new(rate.year),
            Cell::new(if rate.rate.is_finite() {
                format!("{:.2}%", rate.rate * 100.0)
            } else {
                "n/a".to_string()
            }),
        ]);
    }

    output.push_str(&format!("{table}"));
    output
}

/// Print a growth-rate table.
pub fn print_growth_rate_table(label: &str, rates: &[GrowthRate]) {
    print!("{}", format_growth_rate_table(label, rates));
}

fn finite_or_blank(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.2}")
    } else {
        String::new()
    }
}

/// Format a trend/seasonal decomposition as a string.
pub fn format_decomposition_table(decomposition: &Decomposition) -> String {
    let mut output = heading(&format!("Decomposition (period {})", decomposition.period), 60);

    let mut table = new_table(vec!["Year", "Observed", "Trend", "Seasonal", "Residual"]);
    for (i, year) in decomposition.years.iter().enumerate() {
        table.add_row(vec![
            Cell::new(year),
            Cell::new(finite_or_blank(decomposition.observed[i])),
            Cell::new(finite_or_blank(decomposition.trend[i])),
            Cell::new(finite_or_blank(decomposition.seasonal[i])),
            Cell::new(finite_or_blank(decomposition.residual[i])),
        ]);
    }

    output.push_str(&format!("{table}"));
    output
}

/// Print a trend/seasonal decomposition.
pub fn print_decomposition_table(decomposition: &Decomposition) {
    print!("{}", format_decomposition_table(decomposition));
}

/// Format the periodic forecast: fitted component parameters, then one row per year.
pub fn format_periodic_forecast(forecast: &PeriodicForecast) -> String {
    let mut output = heading("Periodic Forecast", 60);
    output.push_str(&format!(
        "{}
",
        format!(
            "Trend R²: {:.4}   Seasonal R²: {:.4}",
            forecast.trend_r_squared, forecast.seasonal_r_squared
        )
        .dimmed()
    ));

    let mut params = new_table(vec!["Component", "Parameters"]);
    let joined = |values: &[f64]| values.iter().map(|v| format!("{v:.4}")).collect::<Vec<_>>().join(", ");
    params.add_row(vec![Cell::new("Trend (K, b, x0)"), Cell::new(joined(&forecast.trend_params))]);
    params.add_row(vec![
        Cell::new("Seasonal (A0, k, f, phi)"),
        Cell::new(joined(&forecast.seasonal_params)),
    ]);
    output.push_str(&format!("{params}
"));

    let mut table = new_table(vec!["Year", "Trend", "Seasonal", "Forecast"]);
    for point in &forecast.points {
        table.add_row(vec![
            Cell::new(point.year),
            Cell::new(finite_or_blank(point.trend)),
            Cell::new(finite_or_blank(point.seasonal)),
            Cell::new(finite_or_blank(point.forecast)),
        ]);
    }

    output.push_str(&format!("{table}"));
    output
}

/// Print the periodic forecast.
pub fn print_periodic_forecast(forecast: &PeriodicForecast) {
    print!("{}", format_periodic_forecast(forecast));
}

/// Format blended scenarios as a string.
pub fn format_blend_table(scenarios: &BlendedScenarios) -> String {
    let mut output = heading("Blended Scenarios", 60);
    output.push_str(&format!(
        "{}\n",
        format!("History used up to {}", scenarios.cutoff_year).dimmed()
    ));
    if let Some(reason) = &scenarios.auto.failure {
        output.push_str(&format!("{} {reason}\n", "Automatic fit failed:".yellow()));
    }

    let columns = scenarios.columns();
    let mut header = vec!["Year"];
    header.extend(columns.iter().map(|(name, _)| *name));
    let mut table = new_table(header);
    for (i, year) in scenarios.years.iter().enumerate() {
        let mut row = vec![Cell::new(year)];
        row.extend(columns.iter().map(|(_, values)| {
            Cell::new(match values.get(i).copied().flatten() {
                Some(v) => format!("{v:.2}"),
                None => String::new(),
            })
        }));
        table.add_row(row);
    }

    output.push_str(&format!("{table}"));
    output
}

/// Print blended scenarios.
pub fn print_blend_table(scenarios: &BlendedScenarios) {
    print!("{}", format_blend_table(scenarios));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        BandRow, BlendScenario, CurveKind, CycleParams, CyclePoint, FittedModel, ModelForecast, PeriodicPoint,
    };

    fn sample_report() -> ForecastReport {
        ForecastReport {
            series_name: "Installed".to_string(),
            observed_years: vec![2020, 2021, 2022],
            observed_values: vec![1.0, 2.0, 3.5],
            future_years: vec![2019, 2020, 2021, 2022, 2023],
            confidence_level: 75.0,
            distribution: "t".to_string(),
            models: vec![
                ModelForecast {
                    kind: CurveKind::Logistic,
                    outcome: ModelOutcome::Fitted(FittedModel {
                        params: vec![12.5, 0.42, 2024.3],
                        standard_errors: vec![1.0, 0.01, f64::NAN],
                        covariance: vec![],
                        covariance_defined: false,
                        predictions: vec![0.5, 1.0, 2.0, 3.4, 5.0],
                        r_squared: 0.9981,
                        preset_year: Some(2024),
                        band: None,
                    }),
                },
                ModelForecast {
                    kind: CurveKind::PowerLaw,
                    outcome: ModelOutcome::Failed {
                        reason: "Power Law fit did not converge".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_format_series_summary() {
        let summary = SeriesSummary {
            count: 3,
            min_year: 2020,
            max_year: 2022,
            min_value: 1.0,
            max_value: 3.5,
            mean_value: 2.1666,
        };
        let output = format_series_summary("Installed", &summary);
        assert!(output.contains("Installed"));
        assert!(output.contains("2020 - 2022"));
        assert!(output.contains("2.17"));
    }

    #[test]
    fn test_format_parameter_table_fitted_and_failed() {
        let output = format_parameter_table(&sample_report());
        assert!(output.contains("Logistic"));
        assert!(output.contains("x0"));
        assert!(output.contains("2024.30000"));
        assert!(output.contains("0.9981"));
        assert!(output.contains("n/a"));
        assert!(output.contains("Power Law"));
        assert!(output.contains("did not converge"));
    }

    #[test]
    fn test_format_confidence_table() {
        let band = ConfidenceBand {
            critical_value: 0.3249,
            lower_params: vec![],
            upper_params: vec![],
            rows: vec![BandRow {
                year: 2030,
                lower: 9.0,
                exact: 10.0,
                upper: 11.25,
            }],
        };
        let output = format_confidence_table("Logistic", &band, 75.0, "t");
        assert!(output.contains("Logistic Confidence Band"));
        assert!(output.contains("75%"));
        assert!(output.contains("2030"));
        assert!(output.contains("11.25"));
    }

    #[test]
    fn test_format_cycle_report_limits_rows() {
        let points = (0..100)
            .map(|i| CyclePoint {
                t: 2000.0 + i as f64,
                predicted: 1.0,
                trend: 1.0,
                envelope_lower: 0.5,
                envelope_upper: 1.5,
            })
            .collect();
        let report = CycleReport {
            params: CycleParams::new(1000.0, 0.3, 2020.0, 0.05, 8.0, 0.5, 1.0),
            r_squared: 0.97,
            points,
        };
        let output = format_cycle_report(&report, 10);
        assert!(output.contains("Period of cycle"));
        assert!(output.contains("0.9700"));
        assert!(output.contains("2090.00"));
        assert!(!output.contains("2091.00"));
    }

    #[test]
    fn test_format_growth_rate_table() {
        let rates = vec![
            GrowthRate { year: 2021, rate: 0.5 },
            GrowthRate { year: 2022, rate: f64::INFINITY },
        ];
        let output = format_growth_rate_table("Logistic", &rates);
        assert!(output.contains("50.00%"));
        assert!(output.contains("n/a"));
    }

    #[test]
    fn test_format_blend_table_reports_failure() {
        let scenarios = BlendedScenarios {
            years: vec![2020, 2021],
            cutoff_year: 2021,
            auto: BlendScenario {
                params: None,
                values: vec![1.0, 2.0],
                band: None,
                failure: Some("bounds".to_string()),
            },
            manual: None,
        };
        let output = format_blend_table(&scenarios);
        assert!(output.contains("Automatic fit failed"));
        assert!(output.contains("Auto_Piecewise_Blended"));
        assert!(!output.contains("Manual"));
        assert!(!output.contains("Auto_Lower"));
    }

    #[test]
    fn test_format_decomposition_table_blanks_missing_trend() {
        let decomposition = Decomposition {
            period: 2,
            years: vec![2020, 2021, 2022],
            observed: vec![1.0, 3.0, 2.0],
            trend: vec![f64::NAN, 2.25, f64::NAN],
            seasonal: vec![-0.5, 0.5, -0.5],
            residual: vec![f64::NAN, 0.25, f64::NAN],
        };
        let output = format_decomposition_table(&decomposition);
        assert!(output.contains("Decomposition (period 2)"));
        assert!(output.contains("2.25"));
        assert!(!output.contains("NaN"));
    }

    #[test]
    fn test_format_periodic_forecast() {
        let forecast = PeriodicForecast {
            decomposition: Decomposition {
                period: 2,
                years: vec![2020, 2021],
                observed: vec![1.0, 3.0],
                trend: vec![f64::NAN, f64::NAN],
                seasonal: vec![-1.0, 1.0],
                residual: vec![f64::NAN, f64::NAN],
            },
            trend_params: vec![10.0, 0.3, 2025.0],
            seasonal_params: vec![1.0, 0.01, 0.5, 0.0],
            trend_r_squared: 0.98,
            seasonal_r_squared: 0.9,
            points: vec![PeriodicPoint {
                year: 2022,
                trend: 2.5,
                seasonal: -1.0,
                forecast: 1.5,
            }],
        };
        let output = format_periodic_forecast(&forecast);
        assert!(output.contains("Periodic Forecast"));
        assert!(output.contains("2025.0000"));
        assert!(output.contains("2022"));
        assert!(output.contains("1.50"));
    }

    #[test]
    fn test_format_blend_table_shows_band() {
        let scenarios = BlendedScenarios {
            years: vec![2020, 2021],
            cutoff_year: 2020,
            auto: BlendScenario {
                params: Some(vec![10.0, 0.3, 2022.0]),
                values: vec![1.0, 2.0],
                band: Some(ConfidenceBand {
                    critical_value: 1.2,
                    lower_params: vec![9.0, 0.3, 2022.0],
                    upper_params: vec![11.0, 0.3, 2022.0],
                    rows: vec![BandRow {
                        year: 2021,
                        lower: 1.75,
                        exact: 2.0,
                        upper: 2.25,
                    }],
                }),
                failure: None,
            },
            manual: None,
        };
        let output = format_blend_table(&scenarios);
        assert!(output.contains("Auto_Lower"));
        assert!(output.contains("1.75"));
        assert!(output.contains("2.25"));
    }
}
