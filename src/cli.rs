use anyhow::Context;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use colored::*;
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::config::Config;
use crate::integrity::{ScanStats, Store};
use crate::logging;
use crate::notify;
use crate::progress;
use crate::scanner::IntegrityChecker;
use crate::schedule::RunScheduler;

#[derive(Parser)]
#[command(name = "rotwatch")]
#[command(version)]
#[command(about = "Detect silent data corruption (bit rot) in a directory tree")]
#[command(long_about = "Rotwatch fingerprints every file under ROOT_DIR and compares it with the \
    fingerprint recorded by the previous run. A file whose content changed while its \
    modification time did not is reported as corrupted.\n\n\
    Runs are resumable: if the process is stopped, the next invocation continues where it \
    left off. A new full run only starts once DAYS_BETWEEN_RUNS days have passed since the \
    last completed one, so rotwatch can be scheduled daily from cron.\n\n\
    Examples:\n  \
    rotwatch /mnt/archive          # Check every 14 days\n  \
    rotwatch /mnt/archive 30       # Check every 30 days")]
pub struct Cli {
    /// Directory tree to check
    #[arg(value_name = "ROOT_DIR")]
    pub root_dir: PathBuf,

    /// Minimum days between completed runs [default: 14]
    #[arg(value_name = "DAYS_BETWEEN_RUNS")]
    pub days_between_runs: Option<u64>,

    /// Increase console output verbosity (-v, -vv for more)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        // Validated before any persistent state is touched
        let root = match std::fs::canonicalize(&self.root_dir) {
            Ok(root) if root.is_dir() => root,
            _ => Cli::command()
                .error(
                    ErrorKind::ValueValidation,
                    format!("{} is not a directory", self.root_dir.display()),
                )
                .exit(),
        };

        if let Err(e) = logging::init(self.verbose) {
            eprintln!("{} {}", "Warning:".yellow(), e);
        }

        let mut config = Config::load()?;
        config.apply_cli_overrides(self.days_between_runs);
        let store = Store::new(&config);

        let decision = RunScheduler::from_config(&config).decide(&store);
        println!("{}", decision);
        if !decision.should_run() {
            println!("Not running on {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
            return Ok(());
        }

        println!(
            "Starting on {} ({})",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            root.display()
        );
        let notifier = notify::from_config(&config);
        let mut checker = IntegrityChecker::open(&config, &store, notifier.as_ref())?;
        if std::io::stderr().is_terminal() {
            checker = checker.with_spinner(progress::create_spinner("Checking files..."));
        }

        let log_path = checker.run_log().path().to_path_buf();
        let stats = checker
            .run(&root)
            .with_context(|| format!("Run aborted; see {}", log_path.display()))?;

        print_summary(&stats);
        println!("Log written to {}", log_path.display());
        Ok(())
    }
}

fn print_summary(stats: &ScanStats) {
    println!();
    println!("{}", "Run complete".bold());
    println!("  {:<12} {}", "Checked:", stats.hashed_files());
    println!("  {:<12} {}", "New:", stats.new_files);
    println!("  {:<12} {}", "Unchanged:", stats.unchanged_files);
    println!("  {:<12} {}", "Changed:", stats.changed_files);
    if stats.corrupted_files > 0 {
        println!(
            "  {:<12} {}",
            "Corrupted:".red().bold(),
            stats.corrupted_files.to_string().red().bold()
        );
    } else {
        println!("  {:<12} {}", "Corrupted:", "0".green());
    }
    if stats.unreadable_files > 0 {
        println!(
            "  {:<12} {}",
            "Unreadable:".yellow(),
            stats.unreadable_files.to_string().yellow()
        );
    }
    if stats.resumed_files > 0 {
        println!("  {:<12} {}", "Resumed:", stats.resumed_files);
    }
    println!("  {:<12} {}", "Pruned:", stats.pruned_entries);
}
