//! `u2l` command-line entry point.
//!
//! # Responsibility
//! - Parse flags into [`BuildOptions`] and run one build.
//! - Print diagnostics to stderr and map failures to exit status 1.

use clap::Parser;
use log::debug;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use u2l_core::{default_log_level, init_logging, run_build, BuildOptions};

/// Build unicode2latex lookup tables from a declaration file.
#[derive(Parser, Debug)]
#[command(name = "u2l", version)]
struct Cli {
    /// Declaration file (JSON array of relation entries).
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory for the lookup tables.
    #[arg(short, long, default_value = u2l_core::service::build_service::DEFAULT_TABLES_DIR)]
    tables: PathBuf,

    /// Write the compacted declarations here instead of rewriting --config.
    #[arg(long)]
    compacted: Option<PathBuf>,

    /// Keep the staging store in this SQLite file (replaced on each run).
    #[arg(long)]
    db: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logs go to stderr otherwise.
    #[arg(long)]
    log_dir: Option<String>,
}

impl Cli {
    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            config_path: self.config.clone(),
            tables_dir: self.tables.clone(),
            compacted_path: self.compacted.clone(),
            db_path: self.db.clone(),
        }
    }
}

/// Runs one build and returns the process exit status.
///
/// Failures are reported on `stderr` as the error's display text.
fn run(options: &BuildOptions, stderr: &mut impl Write) -> io::Result<u8> {
    debug!("event=cli_start module=cli status=ok options={options:?}");
    match run_build(options) {
        Ok(report) => {
            debug!(
                "event=cli_done module=cli status=ok artifacts={}",
                report.written.len()
            );
            Ok(0)
        }
        Err(err) => {
            writeln!(stderr, "{err}")?;
            Ok(1)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    if let Err(err) = init_logging(level, cli.log_dir.as_deref()) {
        eprintln!("u2l: {err}");
        return ExitCode::FAILURE;
    }

    match run(&cli.build_options(), &mut io::stderr()) {
        Ok(status) => ExitCode::from(status),
        Err(_) => ExitCode::FAILURE,
    }
}
