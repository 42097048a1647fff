use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Assemble, inspect and run PyInstaller packaging commands"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the packaging command for the given options
    Command(PackagingArgs),

    /// Read an existing command (argument or stdin) back into options
    Parse {
        /// Command text; read from stdin when omitted
        command: Option<String>,

        /// Table name used for the printed preset
        #[arg(long, default_value = "imported")]
        preset_name: String,
    },

    /// Run the packaging tool and watch its output for errors
    Build {
        #[command(flatten)]
        options: PackagingArgs,

        /// Run this command verbatim instead of synthesizing one
        #[arg(long)]
        raw: Option<String>,
    },

    /// Scan a saved build log (or stdin) for known error signatures
    Classify {
        /// Log file to scan
        file: Option<PathBuf>,
    },

    /// Install PyInstaller with pip if it is not on PATH
    Install,
}

#[derive(Args, Debug, Default)]
pub struct PackagingArgs {
    /// Use a named preset from presets.toml
    #[arg(long)]
    pub preset: Option<String>,

    /// Entry-point script (.py / .pyw)
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Application name (defaults to the script's file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// Icon file
    #[arg(long)]
    pub icon: Option<PathBuf>,

    /// Output directory for the build artifacts
    #[arg(long)]
    pub distpath: Option<PathBuf>,

    /// Show a console window when the app runs
    #[arg(long, conflicts_with = "noconsole")]
    pub console: bool,

    /// Hide the console window
    #[arg(long)]
    pub noconsole: bool,

    /// Bundle into a single executable
    #[arg(long, conflicts_with = "onedir")]
    pub onefile: bool,

    /// Bundle into a directory
    #[arg(long)]
    pub onedir: bool,

    /// Clear the build cache before building
    #[arg(long, conflicts_with = "no_clean")]
    pub clean: bool,

    /// Keep the build cache
    #[arg(long)]
    pub no_clean: bool,

    /// Extra data file under the script's folder (repeatable)
    #[arg(long)]
    pub add_file: Vec<PathBuf>,

    /// Extra data folder under the script's folder (repeatable)
    #[arg(long)]
    pub add_folder: Vec<PathBuf>,
}

fn pick(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl PackagingArgs {
    pub fn console_mode(&self) -> Option<bool> {
        pick(self.console, self.noconsole)
    }

    pub fn one_file_mode(&self) -> Option<bool> {
        pick(self.onefile, self.onedir)
    }

    pub fn clean_temp(&self) -> Option<bool> {
        pick(self.clean, self.no_clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn paired_flags_conflict() {
        let res = Cli::try_parse_from(["appbuilder", "command", "--onefile", "--onedir"]);
        assert!(res.is_err());
    }

    #[test]
    fn build_takes_packaging_args() {
        let cli = Cli::try_parse_from([
            "appbuilder",
            "build",
            "--script",
            "game.py",
            "--add-file",
            "a.txt",
            "--add-file",
            "b.txt",
            "--no-clean",
        ])
        .unwrap();
        let Commands::Build { options, raw } = cli.command else {
            panic!("expected build");
        };
        assert!(raw.is_none());
        assert_eq!(options.add_file.len(), 2);
        assert_eq!(options.clean_temp(), Some(false));
        assert_eq!(options.console_mode(), None);
    }
}
