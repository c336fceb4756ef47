mod charts;
mod tables;

pub use charts::{format_forecast_chart, print_forecast_chart};
pub use tables::{
    format_blend_table, format_confidence_table, format_cycle_report, format_decomposition_table,
    format_growth_rate_table, format_parameter_table, format_periodic_forecast, format_series_summary,
    print_blend_table, print_confidence_table, print_cycle_report, print_decomposition_table,
    print_growth_rate_table, print_parameter_table, print_periodic_forecast, print_series_summary,
};
