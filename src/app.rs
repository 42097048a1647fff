// Declare modules
pub mod classifier;
pub mod cli;
pub mod command;
pub mod config;
pub mod formatter;
pub mod models;
pub mod runner;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::env;
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use self::classifier::classify;
use self::cli::{Cli, Commands, PackagingArgs};
use self::command::{parse_into, synthesize, TOOL_NAME};
use self::config::resolve_options;
use self::formatter::{format_outcome, format_preset, BuildOutcome, BuildReport, BUILD_BANNER};
use self::models::PackagingOptions;
use self::runner::{BuildSlot, ProcessRunner};

const INSTALL_COMMAND: &str = "pip3 install pyinstaller";

/// Parses arguments and dispatches to the chosen subcommand.
pub fn run() -> Result<ExitCode> {
    let args = Cli::parse();

    match args.command {
        Commands::Command(packaging) => {
            let options = load_options(packaging)?;
            println!("{}", render_command(&options));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Parse {
            command,
            preset_name,
        } => inject(command, &preset_name),
        Commands::Build { options, raw } => build(options, raw),
        Commands::Classify { file } => scan_log(file),
        Commands::Install => install(),
    }
}

fn load_options(args: PackagingArgs) -> Result<PackagingOptions> {
    let current_dir = env::current_dir().context("Failed to get current directory")?;
    // Simple heuristic: name of current folder
    let project_name = current_dir.file_name().and_then(|n| n.to_str());
    resolve_options(args, project_name)
}

fn render_command(options: &PackagingOptions) -> String {
    let synthesis = synthesize(options);
    for warning in &synthesis.warnings {
        log::warn!("{}", warning);
    }
    synthesis.command
}

fn inject(command: Option<String>, preset_name: &str) -> Result<ExitCode> {
    let text = match command {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read command from stdin")?;
            buf
        }
    };

    if !text.to_lowercase().contains(TOOL_NAME) {
        bail!("No command detected!");
    }

    let mut options = PackagingOptions::default();
    let warnings = parse_into(&mut options, text.trim()).context("Failed to parse command")?;
    for warning in &warnings {
        log::warn!("{}", warning);
    }

    print!("{}", format_preset(preset_name, &options)?);
    println!();
    println!("{}", render_command(&options));
    Ok(ExitCode::SUCCESS)
}

fn build(packaging: PackagingArgs, raw: Option<String>) -> Result<ExitCode> {
    let command = match raw {
        Some(raw) => raw,
        None => {
            if which::which(TOOL_NAME).is_err() {
                bail!("{} not installed (try `appbuilder install`)", TOOL_NAME);
            }
            let options = load_options(packaging)?;
            if options.existing_script().is_none() {
                log::warn!("No existing script selected; the tool will likely refuse to run");
            }
            render_command(&options)
        }
    };

    log::info!("Running: {}", command);
    println!("{}", BUILD_BANNER);
    let outcome = stream(&command)?;
    println!("{}", format_outcome(&outcome));

    Ok(match outcome {
        BuildOutcome::Failed(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn install() -> Result<ExitCode> {
    if let Ok(path) = which::which(TOOL_NAME) {
        log::info!("{} already installed at {}", TOOL_NAME, path.display());
        return Ok(ExitCode::SUCCESS);
    }

    log::info!("Running: {}", INSTALL_COMMAND);
    let outcome = stream(INSTALL_COMMAND)?;
    Ok(match outcome {
        BuildOutcome::Failed(messages) => {
            log::error!("Install failed: {}", messages.join("; "));
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    })
}

/// Runs `command` to completion, echoing each line as it arrives.
fn stream(command: &str) -> Result<BuildOutcome> {
    let mut slot = BuildSlot::default();
    let mut report = BuildReport::default();

    let runner = slot.start(command)?;
    for line in runner.lines() {
        println!("{}", report.render_line(&line));
    }

    let status = slot.take().and_then(ProcessRunner::wait);
    Ok(report.finish(status))
}

fn scan_log(file: Option<PathBuf>) -> Result<ExitCode> {
    let reader: Box<dyn BufRead> = match &file {
        Some(path) => Box::new(BufReader::new(
            fs::File::open(path).context(format!("Failed to open {:?}", path))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut found = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read log line")?;
        if let Some(diag) = classify(&line) {
            found += 1;
            println!("{}: [{}] {}", index + 1, diag.kind, diag.message);
        }
    }

    if found == 0 {
        log::info!("No known error signatures found.");
        return Ok(ExitCode::SUCCESS);
    }
    Ok(ExitCode::FAILURE)
}
