#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use cluster_accuracy::data::{Dichotomizer, LoaderConfig, load_rater_table};
use cluster_accuracy::estimate_comparison;
use cluster_accuracy::report::ReportFile;
use std::process;

#[derive(Parser)]
#[command(
    name = "cluster-accuracy",
    about = "Cluster-adjusted sensitivity, specificity, PPV and NPV for multi-rater studies",
    long_about = "Estimates diagnostic accuracy of a binary test read by several raters per subject, \
                 with 95% Wald intervals whose variance treats each subject as one cluster."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct EstimateArgs {
    /// Path to a TSV file with one row per subject: gold column plus one column per rater
    table: String,

    /// Name of the gold-standard column
    #[arg(long, default_value = "gold")]
    gold_column: String,

    /// Name of the optional subject identifier column
    #[arg(long, default_value = "subject_id")]
    subject_column: String,

    /// Comma-separated rater columns (default: every other column)
    #[arg(long, value_delimiter = ',')]
    raters: Vec<String>,

    /// Readings at or above this value count as test positive
    #[arg(long, default_value = "0.5")]
    threshold: f64,

    /// Threshold for the gold-standard column (default: same as --threshold)
    #[arg(long)]
    gold_threshold: Option<f64>,

    /// Write the full report as TOML to this path
    #[arg(long, value_name = "PATH")]
    output: Option<String>,

    /// Also report observation-independent intervals for comparison
    #[arg(long)]
    compare_naive: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate Se, Sp, PPV and NPV with cluster-adjusted intervals
    #[command(about = "Estimate accuracy metrics (optionally outputs: report.toml)")]
    Estimate(EstimateArgs),

    /// Print a previously saved report
    #[command(about = "Print a saved TOML report")]
    Show {
        /// Path to a report written by `estimate --output`
        #[arg(value_name = "REPORT_PATH")]
        report: String,
    },

    /// Display version information
    Version,
}

fn estimate(args: EstimateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = LoaderConfig {
        gold_column: args.gold_column,
        subject_column: args.subject_column,
        rater_columns: args.raters,
        gold: Dichotomizer::new(args.gold_threshold.unwrap_or(args.threshold)),
        raters: Dichotomizer::new(args.threshold),
    };

    let table = load_rater_table(&args.table, &config)?;
    let comparison = estimate_comparison(&table)?;
    let report = ReportFile::new(&args.table, config, comparison, args.compare_naive);

    print!("{report}");

    if let Some(path) = args.output {
        report.save(&path)?;
        log::info!("Report written to '{path}'");
    }
    Ok(())
}

fn show(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = ReportFile::load(path)?;
    print!("{report}");
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Estimate(args)) => estimate(args),
        Some(Commands::Show { report }) => show(&report),
        Some(Commands::Version) => {
            println!("cluster-accuracy {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            let mut command = Cli::command();
            command.print_help().map_err(|e| e.into())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
