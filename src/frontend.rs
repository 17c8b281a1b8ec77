use std::fs::OpenOptions;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use console::Style;
use env_logger::Env;
use log::{debug, error};
use regex::Regex;

use crate::interval_clock::ChartMode;
use crate::pipeline;

#[derive(clap::Parser)]
#[command(
    name = "linerate",
    about = "Measures the throughput of a piped byte stream in lines per second.",
    after_help = "Usage example:\n  some_command | linerate --delta 10 --pattern '^ERROR'"
)]
pub struct CliArgs {
    /// Interval in seconds over which the throughput is measured and reported.
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub delta: u64,

    /// A regexp pattern to filter the lines. Filtering means the throughput is
    /// measured over matching lines only. If this option is unspecified, every
    /// line counts.
    #[arg(long)]
    pub pattern: Option<String>,

    /// Stop after this many intervals have been reported. Zero or negative
    /// measures until the input stream closes.
    #[arg(long, default_value_t = 0, allow_hyphen_values(true))]
    pub limit: i64,

    /// Append the reports to this file (created if absent) instead of writing
    /// them to stdout.
    #[arg(long)]
    pub out: Option<String>,

    /// Don't echo the input stream back out on stdout.
    #[arg(long)]
    pub no_tee: bool,

    /// Show the throughput as a bar chart. The value is the throughput rendered
    /// as 100%. Negative disables the chart; zero samples the first five
    /// intervals to pick the 100% level automatically.
    #[arg(long, default_value_t = -1.0, allow_hyphen_values(true))]
    pub chart: f64,

    /// Colorize the report lines. Accepts dotted style strings such as "red" or
    /// "green.bold".
    #[arg(long)]
    pub color: Option<String>,

    /// Prepend an ISO-8601 timestamp in brackets to each report line.
    #[arg(long)]
    pub timestamp: bool,

    /// Hides all diagnostic output except warnings and errors.
    #[arg(short, long, group = "verbosity")]
    pub quiet: bool,

    /// Shows additional diagnostic output.
    #[arg(short, long, group = "verbosity")]
    pub verbose: bool,
}

/// Everything the measurement pipeline needs to know, resolved from the command
/// line once at startup.
pub struct MeterConfig {
    pub delta: u64,
    pub filter: Option<Regex>,
    pub limit: Option<u64>,
    pub chart: ChartMode,
    pub style: Style,
    pub timestamp: bool,
}

pub fn frontend_main() -> ExitCode {
    let args = CliArgs::parse();

    // Configure logging, based on the user's --quiet/--verbose flag.
    // If the RUST_LOG env var is set though then this overrides everything, as this is useful for developers.
    // Diagnostics go to stderr; the report stream and the tee output own stdout.
    let args_level = match (args.quiet, args.verbose) {
        (true, false) => "warn",
        (false, true) => "debug",
        (false, false) => "info",
        (true, true) => panic!("Shouldn't be allowed by cmd args parser"),
    };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or(args_level));
    builder.format(|buf, record| {
        if record.level() == log::Level::Info {
            // Info messages are intended for the average user, so format them plainly
            writeln!(buf, "{}", record.args())
        } else {
            let level_style = buf.default_level_style(record.level());
            writeln!(buf, "{:5} | {}", level_style.value(record.level()), record.args())
        }
    });
    builder.init();

    // Compile the filter up front. A malformed pattern is a startup error, not
    // something to silently fall back from - the user asked for filtering.
    let filter = match &args.pattern {
        Some(p) => match Regex::new(p) {
            Ok(r) => Some(r),
            Err(e) => {
                error!("Invalid filter pattern '{}': {}", p, e);
                return ExitCode::from(18);
            }
        },
        None => None,
    };

    // Reports go to either stdout or an append-mode file, created if absent
    let report_sink: Box<dyn Write + Send> = match &args.out {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Box::new(f),
            Err(e) => {
                error!("Failed to open output file '{}': {}", path, e);
                return ExitCode::from(10);
            }
        },
        None => Box::new(std::io::stdout()),
    };

    let style = match &args.color {
        Some(c) => Style::from_dotted_str(c),
        None => Style::new(),
    };

    let config = MeterConfig {
        delta: args.delta,
        filter,
        limit: if args.limit > 0 { Some(args.limit as u64) } else { None },
        chart: ChartMode::from_option(args.chart),
        style,
        timestamp: args.timestamp,
    };

    let tee_sink: Option<Box<dyn Write + Send>> = if args.no_tee {
        None
    } else {
        Some(Box::new(std::io::stdout()))
    };

    debug!("Measuring stdin throughput every {}s", config.delta);

    match pipeline::run(config, std::io::stdin(), report_sink, tee_sink) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(12)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_defaults() {
        let args = CliArgs::try_parse_from(["linerate"]).unwrap();
        assert_eq!(args.delta, 60);
        assert_eq!(args.pattern, None);
        assert_eq!(args.limit, 0);
        assert_eq!(args.out, None);
        assert!(!args.no_tee);
        assert_eq!(args.chart, -1.0);
        assert_eq!(args.color, None);
        assert!(!args.timestamp);
    }

    #[test]
    fn delta_must_be_positive() {
        assert!(CliArgs::try_parse_from(["linerate", "--delta", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["linerate", "--delta", "1"]).is_ok());
    }

    #[test]
    fn negative_limit_and_chart_values_parse() {
        let args = CliArgs::try_parse_from(["linerate", "--limit", "-5", "--chart", "-1.0"]).unwrap();
        assert_eq!(args.limit, -5);
        assert_eq!(args.chart, -1.0);
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(CliArgs::try_parse_from(["linerate", "--quiet", "--verbose"]).is_err());
    }
}
