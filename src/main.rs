use std::fs::File;
use std::process::ExitCode;

use clap::Parser;
use simplelog::{CombinedLogger, Config as LogConfig, LevelFilter, SharedLogger, TermLogger, WriteLogger};

use takeout_sort::takeout_core::config::Config;
use takeout_sort::takeout_core::error::TakeoutError;
use takeout_sort::takeout_core::{pipeline, Cli};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
                _ => {
                    eprintln!("{e}");
                    return ExitCode::from(10);
                }
            }
        }
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![];

    let term_level = if cli.verbose { LevelFilter::Info } else { LevelFilter::Warn };
    loggers.push(TermLogger::new(
        term_level,
        LogConfig::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    ));

    if let Some(log_path) = &cli.log {
        match File::create(log_path) {
            Ok(file) => loggers.push(WriteLogger::new(cli.log_level, LogConfig::default(), file)),
            Err(e) => {
                eprintln!("failed to open log file {}: {e}", log_path.display());
                return ExitCode::from(1);
            }
        }
    }

    if CombinedLogger::init(loggers).is_err() {
        eprintln!("failed to initialize logging");
    }

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Processing failed: {e}");
            return ExitCode::from(10);
        }
    };

    match pipeline::run(&config) {
        Ok(stats) => {
            stats.print_summary();
            println!("DONE!");
            ExitCode::from(0)
        }
        Err(e) => {
            eprintln!("Processing failed: {e}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &TakeoutError) -> u8 {
    match error {
        TakeoutError::Config(_) => 10,
        TakeoutError::InputNotFound(_) => 11,
        TakeoutError::NoMediaFound(_) => 13,
        _ => 1,
    }
}
