use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingArgument,
    ToolError,
    Generic,
    Fatal,
    ScriptFailed,
    HookFailed,
    BinaryMissing,
    BinaryLoad,
    Tagged,
    ScriptMissing,
    NotFound,
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::MissingArgument => "missing argument",
            ErrorKind::ToolError => "tool error",
            ErrorKind::Generic => "error",
            ErrorKind::Fatal => "fatal",
            ErrorKind::ScriptFailed => "script failed",
            ErrorKind::HookFailed => "hook failed",
            ErrorKind::BinaryMissing => "binary missing",
            ErrorKind::BinaryLoad => "binary load failure",
            ErrorKind::Tagged => "error",
            ErrorKind::ScriptMissing => "script missing",
            ErrorKind::NotFound => "not found",
            ErrorKind::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// A line of tool output recognised as a failure. `kind` names the rule
/// that won, not every rule the line would satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
}

// First match wins, so the order here decides overlapping cases. The
// case-insensitive `Error: ` rule shadows every "<Name>Error: " exception
// rule after it; those keep their slot but share its kind.
const PATTERNS: &[(ErrorKind, &str)] = &[
    // argument errors
    (
        ErrorKind::MissingArgument,
        r"pyinstaller: error: the following arguments are required: (\w+)",
    ),
    (ErrorKind::ToolError, r"pyinstaller: error: (.*)"),
    // runtime exceptions
    (ErrorKind::Generic, r"Error: (.*)"),
    (ErrorKind::Generic, r"ImportError: (.*)"),
    (ErrorKind::Generic, r"ModuleNotFoundError: (.*)"),
    (ErrorKind::Generic, r"FileNotFoundError: (.*)"),
    (ErrorKind::Generic, r"PermissionError: (.*)"),
    (ErrorKind::Generic, r"UnicodeDecodeError: (.*)"),
    // interpreter / packaging failures
    (ErrorKind::Fatal, r"FATAL: (.*)"),
    (ErrorKind::Generic, r"Fatal Python error: (.*)"),
    (ErrorKind::Generic, r"RecursionError: (.*)"),
    (ErrorKind::ScriptFailed, r"Failed to execute script (.*)"),
    // hooks
    (ErrorKind::HookFailed, r"Hook-.*' failed with: (.*)"),
    (ErrorKind::Generic, r"ModuleNotFoundError: No module named '(\w+)'"),
    // binaries
    (ErrorKind::BinaryMissing, r"Cannot find (.*)"),
    (ErrorKind::BinaryLoad, r"Failed to load (.*)"),
    // everything else
    (ErrorKind::Tagged, r"\[ERROR\] (.*)"),
    (ErrorKind::ScriptMissing, r"Script file .* does not exist."),
    (ErrorKind::NotFound, r"Unable to find .*"),
    (ErrorKind::Aborted, r"Aborting build process.*"),
];

static MATCHERS: LazyLock<Vec<(ErrorKind, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(kind, pattern)| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some((*kind, re)),
                Err(err) => {
                    log::error!("Skipping bad error pattern {:?}: {}", pattern, err);
                    None
                }
            }
        })
        .collect()
});

/// Checks one output line against the known failure signatures.
///
/// Returns the first capture group of the first matching pattern, or the
/// whole line when that pattern captures nothing.
pub fn classify(line: &str) -> Option<Diagnostic> {
    MATCHERS.iter().find_map(|(kind, re)| {
        let caps = re.captures(line)?;
        let message = match caps.get(1) {
            Some(group) => group.as_str().to_string(),
            None => line.to_string(),
        };
        Some(Diagnostic {
            kind: *kind,
            message,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(line: &str) -> Option<String> {
        classify(line).map(|d| d.message)
    }

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(MATCHERS.len(), PATTERNS.len());
    }

    #[test]
    fn module_not_found_yields_message() {
        assert_eq!(
            message("ModuleNotFoundError: No module named 'requests'").as_deref(),
            Some("No module named 'requests'")
        );
    }

    #[test]
    fn success_line_is_clean() {
        assert_eq!(
            classify("Building EXE from EXE-00.toc completed successfully"),
            None
        );
        assert_eq!(classify("12345 INFO: PyInstaller: 6.3.0"), None);
    }

    #[test]
    fn missing_argument_beats_generic_tool_error() {
        let diag = classify(
            "pyinstaller: error: the following arguments are required: scriptname",
        )
        .unwrap();
        assert_eq!(diag.kind, ErrorKind::MissingArgument);
        assert_eq!(diag.message, "scriptname");
    }

    #[test]
    fn tool_error_captures_rest_of_line() {
        let diag = classify("pyinstaller: error: unrecognized arguments: --bogus").unwrap();
        assert_eq!(diag.kind, ErrorKind::ToolError);
        assert_eq!(diag.message, "unrecognized arguments: --bogus");
    }

    #[test]
    fn matching_ignores_case() {
        let diag = classify("fatal: cannot open archive").unwrap();
        assert_eq!(diag.kind, ErrorKind::Fatal);
        assert_eq!(diag.message, "cannot open archive");
    }

    #[test]
    fn patterns_without_group_return_whole_line() {
        let line = "ERROR: Script file 'missing.py' does not exist.";
        // "Error: " wins first and captures the tail.
        assert_eq!(
            message(line).as_deref(),
            Some("Script file 'missing.py' does not exist.")
        );

        let line = "Script file 'missing.py' does not exist.";
        let diag = classify(line).unwrap();
        assert_eq!(diag.kind, ErrorKind::ScriptMissing);
        assert_eq!(diag.message, line);

        let line = "Unable to find \"C:\\data\\x.png\" when adding binary";
        assert_eq!(message(line).as_deref(), Some(line));
    }

    #[test]
    fn exception_lines_fall_under_the_broad_error_rule() {
        for line in [
            "ImportError: cannot import name 'x'",
            "FileNotFoundError: [Errno 2] No such file",
            "RecursionError: maximum recursion depth exceeded",
            "Fatal Python error: init_fs_encoding",
        ] {
            assert_eq!(classify(line).map(|d| d.kind), Some(ErrorKind::Generic), "{}", line);
        }
    }

    #[test]
    fn tagged_error_lines() {
        let diag = classify("[ERROR] hook crashed").unwrap();
        assert_eq!(diag.kind, ErrorKind::Tagged);
        assert_eq!(diag.message, "hook crashed");
    }

    #[test]
    fn hook_and_binary_failures() {
        assert_eq!(
            classify("Hook-'numpy' failed with: boom").map(|d| d.kind),
            Some(ErrorKind::HookFailed)
        );
        assert_eq!(
            message("Failed to load dynlib/dll libfoo.so").as_deref(),
            Some("dynlib/dll libfoo.so")
        );
        assert_eq!(
            classify("Cannot find libpython3.12.so").map(|d| d.kind),
            Some(ErrorKind::BinaryMissing)
        );
    }
}
