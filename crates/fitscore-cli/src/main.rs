//! The `fitscore` command-line tool.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(name = "fitscore", version, about = "School fitness-test grading engine")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade every record of a year
    Evaluate {
        /// School year to grade
        #[arg(long)]
        year: i32,

        /// Only this student
        #[arg(long)]
        student: Option<u64>,

        /// Write the new composite totals back to the dataset
        #[arg(long)]
        save: bool,

        /// Output format: text, json
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Recompute class and grade ranks for a year
    Rank {
        #[arg(long)]
        year: i32,
    },

    /// Show class, grade or school statistics
    Stats {
        #[arg(long)]
        year: i32,

        /// Statistics for one class
        #[arg(long, conflicts_with = "grade")]
        class: Option<u32>,

        /// Statistics for one grade
        #[arg(long)]
        grade: Option<u32>,

        /// Rank all grades by average score
        #[arg(long, conflicts_with_all = ["class", "grade"])]
        grades: bool,

        /// Save a full report (school, grades, classes) as JSON
        #[arg(long)]
        save: bool,

        /// Output format: text, json, markdown
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show a grade's or the school's scores over several years
    Trend {
        /// First year (inclusive)
        #[arg(long)]
        from: i32,

        /// Last year (inclusive)
        #[arg(long)]
        to: i32,

        /// Grade to follow (default: whole school)
        #[arg(long)]
        grade: Option<u32>,

        /// Output format: text, json
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Compare classes side by side, best average first
    CompareClasses {
        #[arg(long)]
        year: i32,

        /// Class ids (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        classes: Vec<u32>,

        /// Output format: text, json, markdown
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Compare two saved stats reports
    Diff {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Change in average score (points) that counts as significant
        #[arg(long, default_value = "1.0")]
        threshold: f64,

        /// Exit code 1 if any scope declined
        #[arg(long)]
        fail_on_decline: bool,

        /// Output format: text, json, markdown
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Validate grading rule TOML files
    Validate {
        /// Rule file or directory (default: rules_path from config)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Exit with an error if any warning is found
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Create starter config, rules and dataset
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fitscore=info".parse().expect("static directive")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Evaluate {
            year,
            student,
            save,
            format,
        } => commands::evaluate::execute(config, year, student, save, format).await,
        Commands::Rank { year } => commands::rank::execute(config, year).await,
        Commands::Stats {
            year,
            class,
            grade,
            grades,
            save,
            format,
        } => commands::stats::execute(config, year, class, grade, grades, save, format).await,
        Commands::Trend {
            from,
            to,
            grade,
            format,
        } => commands::trend::execute(config, from, to, grade, format).await,
        Commands::CompareClasses {
            year,
            classes,
            format,
        } => commands::compare_classes::execute(config, year, classes, format).await,
        Commands::Diff {
            baseline,
            current,
            threshold,
            fail_on_decline,
            format,
        } => commands::diff::execute(baseline, current, threshold, fail_on_decline, format),
        Commands::Validate {
            rules,
            deny_warnings,
        } => commands::validate::execute(config, rules, deny_warnings),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
