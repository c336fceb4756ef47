use colored::Colorize;

use crate::analysis::{CurveKind, ForecastReport};

const BAR_WIDTH: usize = 40;

/// Format a text bar chart of one model's forecast, with observed values marked.
pub fn format_forecast_chart(report: &ForecastReport, kind: CurveKind) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{}\n", format!("{kind} Forecast").bold().green()));
    output.push_str(&format!("{}\n", "=".repeat(60)));

    let Some(fitted) = report.fitted(kind) else {
        output.push_str("  No forecast available.\n");
        return output;
    };

    let max_value = fitted
        .predictions
        .iter()
        .chain(&report.observed_values)
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);

    output.push_str(&format!("  {:>6}  {:>12}  {:>12}  Forecast\n", "Year", "Predicted", "Observed"));
    output.push_str(&format!("  {}\n", "-".repeat(76)));

    for (year, predicted) in report.future_years.iter().zip(&fitted.predictions) {
        let observed = report
            .observed_years
            .iter()
            .position(|y| y == year)
            .and_then(|i| report.observed_values.get(i).copied());

        let bar_len = if max_value > 0.0 && predicted.is_finite() && *predicted > 0.0 {
            ((predicted / max_value) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let bar = "\u{2588}".repeat(bar_len);
        let observed_text = observed.map(|v| format!("{v:.2}")).unwrap_or_default();

        output.push_str(&format!(
            "  {:>6}  {:>12.2}  {:>12}  {}\n",
            year,
            predicted,
            observed_text,
            if observed.is_some() { bar.blue() } else { bar.green() }
        ));
    }

    output.push('\n');
    output
}

/// Print a text bar chart of one model's forecast.
pub fn print_forecast_chart(report: &ForecastReport, kind: CurveKind) {
    print!("{}", format_forecast_chart(report, kind));
}
