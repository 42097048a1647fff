use crate::app::models::{app_name_from, PackagingOptions};
use pathdiff::diff_paths;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const TOOL_NAME: &str = "pyinstaller";

/// Final path component that marks "every file in this folder".
const FOLDER_WILDCARDS: [&str; 2] = ["*.*", "*"];

/// An extra file or folder that could not be expressed relative to the script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisWarning {
    #[error("{} must be relative to {}", .file.display(), .base.display())]
    FileOutsideScriptDir { file: PathBuf, base: PathBuf },
    #[error("'{}' is not in the subpath of '{}'", .folder.display(), .base.display())]
    FolderOutsideScriptDir { folder: PathBuf, base: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    #[error("Invalid --add-data format: {0}")]
    MalformedAddData(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not split command into words: {0}")]
    Tokenize(#[from] shell_words::ParseError),
}

/// A rendered command plus the entries that were left out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub command: String,
    pub warnings: Vec<SynthesisWarning>,
}

pub fn synthesize(options: &PackagingOptions) -> Synthesis {
    let mut cmd = String::from(TOOL_NAME);
    let mut warnings = Vec::new();

    let script = options.existing_script();
    if let Some(script) = script {
        cmd.push_str(&format!(" \"{}\"", script.display()));
    }

    if options.clean_temp {
        cmd.push_str(" --clean");
    }
    cmd.push_str(if options.console_mode {
        " --console"
    } else {
        " --noconsole"
    });
    cmd.push_str(if options.one_file_mode {
        " --onefile"
    } else {
        " --onedir"
    });

    let name = options.app_name.trim();
    if !name.is_empty() {
        cmd.push_str(&format!(" --name \"{}\"", name));
    }

    if let Some(icon) = options.icon_path.as_deref().filter(|p| p.is_file()) {
        cmd.push_str(&format!(" --icon \"{}\"", icon.display()));
    }

    // add-data destinations are relative to the script's folder, so they
    // need a script to anchor them.
    if let Some(base) = script.map(script_dir) {
        for file in &options.extra_files {
            match relative_under(file, base) {
                Some(rel) => {
                    let rel_dir = rel.parent().unwrap_or(Path::new(""));
                    cmd.push_str(&format!(
                        " --add-data \"{};{}\"",
                        file.display(),
                        portable(rel_dir)
                    ));
                }
                None => warnings.push(SynthesisWarning::FileOutsideScriptDir {
                    file: file.clone(),
                    base: base.to_path_buf(),
                }),
            }
        }

        for folder in &options.extra_folders {
            match relative_under(folder, base) {
                Some(rel) => cmd.push_str(&format!(
                    " --add-data \"{}/*.*;{}\"",
                    folder.display(),
                    portable(&rel)
                )),
                None => warnings.push(SynthesisWarning::FolderOutsideScriptDir {
                    folder: folder.clone(),
                    base: base.to_path_buf(),
                }),
            }
        }
    }

    // An empty output dir means "let the tool pick its default".
    if let Some(dist) = options
        .output_dir
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty() && p.is_dir())
    {
        cmd.push_str(&format!(" --distpath \"{}\"", dist.display()));
    }

    Synthesis {
        command: cmd,
        warnings,
    }
}

/// Reads a packaging command back into `options`.
///
/// Console and clean flags are switched off first so that only the flags
/// present in `command` turn them on. Every other field keeps its value
/// unless the command sets it. Later flags override earlier ones, and a
/// value-taking flag with nothing after it is ignored. Nothing is touched
/// when the command cannot be split into words.
pub fn parse_into(
    options: &mut PackagingOptions,
    command: &str,
) -> Result<Vec<ParseWarning>, ParseError> {
    let parts = shell_words::split(command)?;
    let mut warnings = Vec::new();

    options.console_mode = false;
    options.clean_temp = false;
    let mut base_path: Option<PathBuf> = None;

    let mut index = 0;
    while index < parts.len() {
        let word = parts[index].as_str();
        let value = parts.get(index + 1).map(String::as_str);

        match (word, value) {
            _ if is_tool_token(word) => {}
            _ if is_script_token(word) => {
                let script = PathBuf::from(word);
                base_path = Some(script_dir(&script).to_path_buf());
                options.app_name = app_name_from(&script);
                options.script_path = Some(script);
            }
            ("--console", _) => options.console_mode = true,
            ("--noconsole", _) => options.console_mode = false,
            ("--onefile", _) => options.one_file_mode = true,
            ("--onedir", _) => options.one_file_mode = false,
            ("--clean", _) => options.clean_temp = true,
            ("--name", Some(name)) => {
                options.app_name = name.to_string();
                index += 1;
            }
            ("--icon", Some(icon)) => {
                if Path::new(icon).is_file() {
                    options.icon_path = Some(PathBuf::from(icon));
                }
                index += 1;
            }
            ("--add-data", Some(entry)) => {
                if let Err(warning) = apply_add_data(options, entry, base_path.as_deref()) {
                    warnings.push(warning);
                }
                index += 1;
            }
            ("--distpath", Some(dist)) => {
                if Path::new(dist).is_dir() {
                    options.output_dir = Some(PathBuf::from(dist));
                }
                index += 1;
            }
            _ => log::debug!("Ignoring token {:?}", word),
        }

        index += 1;
    }

    Ok(warnings)
}

fn apply_add_data(
    options: &mut PackagingOptions,
    entry: &str,
    base_path: Option<&Path>,
) -> Result<(), ParseWarning> {
    let (source, _dest) = match entry.split(';').collect::<Vec<_>>().as_slice() {
        [source, dest] => (*source, *dest),
        _ => return Err(ParseWarning::MalformedAddData(entry.to_string())),
    };

    let source = PathBuf::from(source.replace('\\', "/"));
    let is_folder = source
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| FOLDER_WILDCARDS.contains(&n));

    if is_folder {
        let folder = source.parent().unwrap_or(Path::new(""));
        options.extra_folders.push(PathBuf::from(portable(folder)));
    } else if let Some(base) = base_path {
        options
            .extra_files
            .push(PathBuf::from(portable(&base.join(&source))));
    } else {
        log::debug!("No script seen yet, dropping data file {}", source.display());
    }

    Ok(())
}

fn is_tool_token(word: &str) -> bool {
    let path = Path::new(word);
    let stem_matches = path
        .file_stem()
        .is_some_and(|s| s.to_string_lossy().eq_ignore_ascii_case(TOOL_NAME));
    let ext_ok = match path.extension() {
        None => true,
        Some(ext) => ext.eq_ignore_ascii_case("exe"),
    };
    stem_matches && ext_ok
}

fn is_script_token(word: &str) -> bool {
    let path = Path::new(word);
    let is_python = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("py") || ext.eq_ignore_ascii_case("pyw"));
    is_python && path.is_file()
}

fn script_dir(script: &Path) -> &Path {
    script.parent().unwrap_or(Path::new(""))
}

/// `path` relative to `base`, or None when it would have to climb out of `base`.
fn relative_under(path: &Path, base: &Path) -> Option<PathBuf> {
    let rel = diff_paths(path, base)?;
    let escapes = rel.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    (!escapes).then_some(rel)
}

/// Forward-slash rendering, with the empty path spelled `.`.
fn portable(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.is_empty() {
        ".".to_string()
    } else {
        s
    }
}
