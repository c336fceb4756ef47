use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use adoption_forecast::{
    analysis::{growth_rates, CurveKind, Forecaster},
    config::{ForecastConfig, ManualLogistic},
    io::{self, ColumnSelection, ColumnSelector},
    models::ObservationSeries,
    visualization::{
        print_blend_table, print_confidence_table, print_cycle_report, print_decomposition_table,
        print_forecast_chart, print_growth_rate_table, print_parameter_table, print_periodic_forecast,
        print_series_summary,
    },
};

#[derive(Parser)]
#[command(
    name = "adoption-forecast",
    about = "Adoption Forecast - fit growth curves to market data and project them forward",
    version,
    author
)]
struct Cli {
    /// TOML configuration file; built-in defaults are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Path to input file (CSV or Excel)
    #[arg(short, long)]
    input: PathBuf,

    /// Year column: zero-based index, header name, or spreadsheet letter
    #[arg(long, default_value = "0")]
    year_column: String,

    /// Value column: zero-based index, header name, or spreadsheet letter
    #[arg(long, default_value = "1")]
    value_column: String,

    /// Worksheet name (Excel input only)
    #[arg(long)]
    sheet: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the configured growth models and forecast them with confidence bands
    Forecast {
        #[command(flatten)]
        input: InputArgs,

        /// Models to fit, comma separated (logistic, gompertz, gaussian, exponential, power-law)
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<CurveKind>,

        /// Last forecast year
        #[arg(short, long)]
        end_year: Option<i32>,

        /// Confidence level in percent (0-100)
        #[arg(short = 'l', long)]
        level: Option<f64>,

        /// Critical-value distribution: z or t
        #[arg(short, long)]
        distribution: Option<String>,

        /// Directory for the predictions, confidence and growth-rate CSV files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Also write the full report as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,

        /// Show a text chart for each fitted model
        #[arg(long)]
        chart: bool,
    },

    /// Stitch the history onto automatic and manual logistic scenarios
    Blend {
        #[command(flatten)]
        input: InputArgs,

        /// Last year taken from the history (defaults to the last observed year)
        #[arg(long)]
        cutoff: Option<i32>,

        /// Transition width in years
        #[arg(short, long)]
        width: Option<f64>,

        /// Last scenario year
        #[arg(short, long)]
        end_year: Option<i32>,

        /// Manual scenario saturation K
        #[arg(long, requires_all = ["manual_b", "manual_x0"])]
        manual_k: Option<f64>,

        /// Manual scenario growth rate b
        #[arg(long, requires_all = ["manual_k", "manual_x0"])]
        manual_b: Option<f64>,

        /// Manual scenario midpoint x0
        #[arg(long, requires_all = ["manual_k", "manual_b"])]
        manual_x0: Option<f64>,

        /// Output file (.xlsx or .csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fit the logistic-plus-cycle model and report it
    Cycle {
        #[command(flatten)]
        input: InputArgs,

        /// Last year of the prediction grid
        #[arg(long)]
        horizon: Option<i32>,

        /// Override a fitted parameter, e.g. --set T=15 (L, k, t0, A, T, phi, w)
        #[arg(long = "set", value_parser = parse_assignment)]
        overrides: Vec<(String, f64)>,

        /// Rows of the prediction grid to print
        #[arg(long, default_value = "20")]
        rows: usize,

        /// Write the full prediction grid to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Split the series into a moving-average trend and a repeating seasonal pattern
    Decompose {
        #[command(flatten)]
        input: InputArgs,

        /// Seasonal period in observations
        #[arg(short, long)]
        period: Option<usize>,

        /// Write the components to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forecast as a fitted logistic trend plus a fitted seasonal sine
    Periodic {
        #[command(flatten)]
        input: InputArgs,

        /// Seasonal period in observations
        #[arg(short, long)]
        period: Option<usize>,

        /// Last forecast year
        #[arg(short, long)]
        end_year: Option<i32>,

        /// Write the forecast to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Year-over-year growth rates of a fitted model's forecast
    GrowthRates {
        #[command(flatten)]
        input: InputArgs,

        /// Model whose forecast is used
        #[arg(short, long, default_value = "logistic")]
        model: CurveKind,

        /// Write the rates to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Display a quick summary of the input series
    Summary {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Print the default configuration as TOML
    Config,
}

fn parse_assignment(s: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((name.trim().to_string(), value))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("adoption_forecast=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ForecastConfig> {
    match path {
        Some(path) => ForecastConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(ForecastConfig::default()),
    }
}

fn load_series(args: &InputArgs) -> Result<ObservationSeries> {
    let columns = ColumnSelection {
        year: args.year_column.parse::<ColumnSelector>()?,
        value: args.value_column.parse::<ColumnSelector>()?,
    };
    let reader = io::reader_for_path(&args.input, args.sheet.clone(), columns)?;
    let series = reader
        .read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    if series.is_empty() {
        anyhow::bail!("No complete (year, value) rows in {}", args.input.display());
    }
    println!(
        "  Loaded {} observations of '{}'",
        series.len(),
        series.name
    );
    Ok(series)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Forecast {
            input,
            models,
            end_year,
            level,
            distribution,
            output_dir,
            json,
            chart,
        } => {
            println!(
                "\n{}",
                format!("Growth Forecast: {}", input.input.display()).bold().cyan()
            );
            if !models.is_empty() {
                config.models = models;
            }
            if let Some(end_year) = end_year {
                config.end_year = end_year;
            }
            if let Some(level) = level {
                config.confidence_level = level;
            }
            if let Some(distribution) = distribution {
                config.distribution = distribution;
            }
            config.validate()?;

            let series = load_series(&input)?;
            let report = Forecaster::new(&series, &config).run()?;
            print_parameter_table(&report);

            for model in &report.models {
                if let Some(band) = model.fitted().and_then(|f| f.band.as_ref()) {
                    print_confidence_table(
                        model.kind.label(),
                        band,
                        report.confidence_level,
                        &report.distribution,
                    );
                }
                if chart {
                    print_forecast_chart(&report, model.kind);
                }
            }

            if report.fitted_count() == 0 {
                eprintln!("{}: no model could be fitted", "Warning".yellow());
            }

            if let Some(dir) = output_dir {
                std::fs::create_dir_all(&dir)?;
                io::write_predictions_csv(&report, dir.join("predictions.csv"))?;
                io::write_confidence_csv(&report, dir.join("confidence.csv"))?;
                io::write_growth_rates_csv(&report, dir.join("growth_rates.csv"))?;
                println!(
                    "{} Wrote forecast files to {}",
                    "Success:".green().bold(),
                    dir.display()
                );
            }
            if let Some(path) = json {
                io::write_report_json(&report, &path, true)?;
                println!("{} Wrote report to {}", "Success:".green().bold(), path.display());
            }
        }

        Commands::Blend {
            input,
            cutoff,
            width,
            end_year,
            manual_k,
            manual_b,
            manual_x0,
            output,
        } => {
            println!(
                "\n{}",
                format!("Blended Scenarios: {}", input.input.display()).bold().cyan()
            );
            if cutoff.is_some() {
                config.blending.cutoff_year = cutoff;
            }
            if let Some(width) = width {
                config.blending.transition_width = width;
            }
            if let Some(end_year) = end_year {
                config.end_year = end_year;
            }
            if let (Some(k), Some(b), Some(x0)) = (manual_k, manual_b, manual_x0) {
                config.blending.manual = Some(ManualLogistic { k, b, x0 });
            }
            config.validate()?;

            let series = load_series(&input)?;
            let scenarios = Forecaster::new(&series, &config).blend()?;
            print_blend_table(&scenarios);

            if let Some(path) = output {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("")
                    .to_lowercase();
                match ext.as_str() {
                    "xlsx" => io::write_blended_excel(&scenarios, "Year", &path)?,
                    "csv" => io::write_blended_csv(&scenarios, &path)?,
                    _ => anyhow::bail!("Unsupported output format: .{ext}. Use .xlsx or .csv"),
                }
                println!("{} Wrote scenarios to {}", "Success:".green().bold(), path.display());
            }
        }

        Commands::Cycle {
            input,
            horizon,
            overrides,
            rows,
            output,
        } => {
            println!(
                "\n{}",
                format!("Growth-Cycle Model: {}", input.input.display()).bold().cyan()
            );
            if horizon.is_some() {
                config.cycle.horizon = horizon;
            }
            config.cycle.overrides.extend(overrides);
            config.validate()?;

            let series = load_series(&input)?;
            let (_, report) = Forecaster::new(&series, &config).growth_cycle()?;
            print_cycle_report(&report, rows);

            if let Some(path) = output {
                io::write_cycle_csv(&report, &path)?;
                println!("{} Wrote grid to {}", "Success:".green().bold(), path.display());
            }
        }

        Commands::Decompose {
            input,
            period,
            output,
        } => {
            println!(
                "\n{}",
                format!("Decomposition: {}", input.input.display()).bold().cyan()
            );
            if let Some(period) = period {
                config.decomposition.period = period;
            }
            config.validate()?;

            let series = load_series(&input)?;
            let decomposition = Forecaster::new(&series, &config).decompose()?;
            print_decomposition_table(&decomposition);

            if let Some(path) = output {
                io::write_decomposition_csv(&decomposition, &path)?;
                println!("{} Wrote components to {}", "Success:".green().bold(), path.display());
            }
        }

        Commands::Periodic {
            input,
            period,
            end_year,
            output,
        } => {
            println!(
                "\n{}",
                format!("Periodic Forecast: {}", input.input.display()).bold().cyan()
            );
            if let Some(period) = period {
                config.decomposition.period = period;
            }
            if let Some(end_year) = end_year {
                config.end_year = end_year;
            }
            config.validate()?;

            let series = load_series(&input)?;
            let forecast = Forecaster::new(&series, &config).periodic()?;
            print_periodic_forecast(&forecast);

            if let Some(path) = output {
                io::write_periodic_csv(&forecast, &path)?;
                println!("{} Wrote forecast to {}", "Success:".green().bold(), path.display());
            }
        }

        Commands::GrowthRates {
            input,
            model,
            output,
        } => {
            config.models = vec![model];
            let series = load_series(&input)?;
            let report = Forecaster::new(&series, &config).run()?;
            let Some(fitted) = report.fitted(model) else {
                anyhow::bail!("{model} model could not be fitted to {}", input.input.display());
            };
            let rates = growth_rates(&report.future_years, &fitted.predictions);
            print_growth_rate_table(model.label(), &rates);

            if let Some(path) = output {
                io::write_growth_rates_csv(&report, &path)?;
                println!("{} Wrote growth rates to {}", "Success:".green().bold(), path.display());
            }
        }

        Commands::Summary { input } => {
            let series = load_series(&input)?;
            print_series_summary(&series.name, &series.summary()?);
        }

        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}
