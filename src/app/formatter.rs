use crate::app::classifier::{classify, Diagnostic};
use crate::app::models::PackagingOptions;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::process::ExitStatus;

pub const BUILD_BANNER: &str = "Application building initiated...";

/// Lines that mean the executable was written.
const SUCCESS_MARKERS: [&str; 2] = [
    "Building EXE from EXE-00.toc completed successfully",
    "Build complete!",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed(Vec<String>),
    Unknown,
}

/// Watches the output of one build and decides how it went.
#[derive(Debug, Default)]
pub struct BuildReport {
    diagnostics: Vec<Diagnostic>,
    completed: bool,
}

impl BuildReport {
    /// Records `line` and returns how it should be shown.
    pub fn render_line(&mut self, line: &str) -> String {
        if let Some(diag) = classify(line) {
            log::error!("{}: {}", diag.kind, diag.message);
            self.diagnostics.push(diag);
            return format!("!! {}", line);
        }

        if SUCCESS_MARKERS.iter().any(|m| line.contains(m)) {
            self.completed = true;
            return format!("** {} **", line);
        }

        line.to_string()
    }

    /// A non-zero exit fails the build even when no line was recognised.
    pub fn finish(self, status: Option<ExitStatus>) -> BuildOutcome {
        let mut messages: Vec<String> = self.diagnostics.into_iter().map(|d| d.message).collect();

        if let Some(status) = status.filter(|s| !s.success()) {
            messages.push(format!("process exited with {}", status));
        }

        if !messages.is_empty() {
            BuildOutcome::Failed(messages)
        } else if self.completed {
            BuildOutcome::Succeeded
        } else {
            BuildOutcome::Unknown
        }
    }
}

pub fn format_outcome(outcome: &BuildOutcome) -> String {
    match outcome {
        BuildOutcome::Succeeded => "Process Completed".to_string(),
        BuildOutcome::Failed(messages) => {
            let mut out = String::from("An error occurred.");
            for msg in messages {
                out.push_str(&format!("\n  - {}", msg));
            }
            out
        }
        BuildOutcome::Unknown => "Process finished without a completion message.".to_string(),
    }
}

/// Renders options as a named table in the presets file format.
pub fn format_preset(name: &str, options: &PackagingOptions) -> Result<String> {
    let mut table = BTreeMap::new();
    table.insert(name, options);
    toml::to_string(&table).context("Failed to serialize options as TOML")
}
