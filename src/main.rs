use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use log::{error, info};

use kartlap::{
    AnalysisConfig, KartlapError, SessionAnalyzer, load_session,
    writer::{render_summary, write_json_report, write_lap_records, write_summary},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify laps, assign sectors, detect events and compare the best laps
    Analyze {
        #[arg(short, long)]
        input: PathBuf,

        /// Config file, defaults to the user config directory
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// One JSON line per classified lap
        #[arg(long)]
        laps_jsonl: Option<PathBuf>,

        /// Text summary, printed to stdout when omitted
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Preferred success lap for the comparison
        #[arg(long)]
        success_lap: Option<u32>,
    },
    /// Compare two laps sample by sample
    Compare {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        success_lap: u32,

        #[arg(short, long)]
        average_lap: u32,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the default config so it can be edited
    InitConfig {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, KartlapError> {
    match path {
        Some(path) => AnalysisConfig::from_file(path),
        None => Ok(AnalysisConfig::from_local_file()?.unwrap_or_default()),
    }
}

fn analyze(
    input: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
    laps_jsonl: Option<&Path>,
    report_path: Option<&Path>,
    success_lap: Option<u32>,
) -> Result<(), KartlapError> {
    let analyzer = SessionAnalyzer::new(load_config(config)?);
    let mut session = load_session(input, analyzer.config())?;
    let report = analyzer.analyze(&mut session, success_lap);

    if let Some(output) = output {
        write_json_report(output, &report)?;
        info!("Report written to {}", output.display());
    }
    if let Some(laps_jsonl) = laps_jsonl {
        write_lap_records(laps_jsonl, &report.classification)?;
    }
    match report_path {
        Some(path) => write_summary(path, &report)?,
        None => print!("{}", render_summary(&report)),
    }
    Ok(())
}

fn compare(
    input: &Path,
    success_lap: u32,
    average_lap: u32,
    config: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), KartlapError> {
    let analyzer = SessionAnalyzer::new(load_config(config)?);
    let mut session = load_session(input, analyzer.config())?;
    let comparison = analyzer.compare_session(&mut session, success_lap, average_lap)?;

    match output {
        Some(output) => write_json_report(output, &comparison)?,
        None => {
            let json = serde_json::to_string_pretty(&comparison)
                .map_err(|e| KartlapError::ReportSerializeError { source: e })?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn init_config(output: Option<&Path>) -> Result<(), KartlapError> {
    let config = AnalysisConfig::default();
    let path = match output {
        Some(path) => {
            config.save(path)?;
            path.to_path_buf()
        }
        None => config.save_local()?,
    };
    info!("Default config written to {}", path.display());
    Ok(())
}

fn main() -> ExitCode {
    colog::init();

    let cli = Args::parse();
    let result = match &cli.command {
        Commands::Analyze {
            input,
            config,
            output,
            laps_jsonl,
            report,
            success_lap,
        } => analyze(
            input,
            config.as_deref(),
            output.as_deref(),
            laps_jsonl.as_deref(),
            report.as_deref(),
            *success_lap,
        ),
        Commands::Compare {
            input,
            success_lap,
            average_lap,
            config,
            output,
        } => compare(
            input,
            *success_lap,
            *average_lap,
            config.as_deref(),
            output.as_deref(),
        ),
        Commands::InitConfig { output } => init_config(output.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
