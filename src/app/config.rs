use crate::app::cli::PackagingArgs;
use crate::app::models::{app_name_from, PackagingOptions};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug)]
struct PresetsFile {
    #[serde(flatten)]
    presets: HashMap<String, PresetConfig>,
}

#[derive(Deserialize, Debug, Clone, Default)]
struct PresetConfig {
    script: Option<PathBuf>,
    name: Option<String>,
    icon: Option<PathBuf>,
    distpath: Option<PathBuf>,
    console: Option<bool>,
    onefile: Option<bool>,
    clean: Option<bool>,
    add_file: Option<Vec<PathBuf>>,
    add_folder: Option<Vec<PathBuf>>,
}

pub fn presets_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home
        .join(".config")
        .join("appbuilder")
        .join("presets.toml"))
}

fn load_presets_file(path: &Path) -> Result<HashMap<String, PresetConfig>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content =
        fs::read_to_string(path).context(format!("Failed to read presets at {:?}", path))?;
    parse_presets(&content)
}

fn parse_presets(content: &str) -> Result<HashMap<String, PresetConfig>> {
    let parsed: PresetsFile = toml::from_str(content).context("Failed to parse presets.toml")?;
    Ok(parsed.presets)
}

/// Preset entries first, then CLI entries, duplicates dropped in order.
fn merge_vecs(preset_vec: Option<Vec<PathBuf>>, cli_vec: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut combined = preset_vec.unwrap_or_default();
    combined.extend(cli_vec);
    let mut seen = std::collections::HashSet::new();
    combined.retain(|item| seen.insert(item.clone()));
    combined
}

/// Builds the option set from defaults, a preset, and CLI flags, in
/// increasing priority.
pub fn resolve_options(args: PackagingArgs, project_name: Option<&str>) -> Result<PackagingOptions> {
    let presets = load_presets_file(&presets_path()?)?;
    Ok(merge(args, project_name, &presets))
}

fn merge(
    args: PackagingArgs,
    project_name: Option<&str>,
    presets: &HashMap<String, PresetConfig>,
) -> PackagingOptions {
    let console = args.console_mode();
    let one_file = args.one_file_mode();
    let clean = args.clean_temp();

    // Determine preset to use: CLI flag > Auto-detect > None
    let preset_key = args.preset.as_deref().or(project_name);
    let preset = match preset_key.and_then(|k| presets.get(k).map(|p| (k, p))) {
        Some((key, preset)) => {
            log::info!("Using preset '{}'", key);
            preset.clone()
        }
        None => {
            if let Some(wanted) = args.preset.as_deref() {
                log::warn!("Preset '{}' not found, using defaults", wanted);
            }
            PresetConfig::default()
        }
    };

    let defaults = PackagingOptions::default();
    let script_path = args.script.or(preset.script);
    let app_name = args
        .name
        .or(preset.name)
        .or_else(|| script_path.as_deref().map(app_name_from))
        .unwrap_or_default();

    PackagingOptions {
        script_path,
        app_name,
        icon_path: args.icon.or(preset.icon),
        output_dir: args.distpath.or(preset.distpath),
        console_mode: console.or(preset.console).unwrap_or(defaults.console_mode),
        one_file_mode: one_file.or(preset.onefile).unwrap_or(defaults.one_file_mode),
        clean_temp: clean.or(preset.clean).unwrap_or(defaults.clean_temp),
        extra_files: merge_vecs(preset.add_file, args.add_file),
        extra_folders: merge_vecs(preset.add_folder, args.add_folder),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESETS: &str = r#"
[flappy]
script = "/games/flappy/flappy.py"
icon = "/games/flappy/bird.ico"
console = true
onefile = false
add_folder = ["/games/flappy/images"]

[tool]
name = "Tool"
"#;

    fn presets() -> HashMap<String, PresetConfig> {
        parse_presets(PRESETS).unwrap()
    }

    #[test]
    fn defaults_without_preset() {
        let opts = merge(PackagingArgs::default(), None, &HashMap::new());
        assert_eq!(opts, PackagingOptions::default());
    }

    #[test]
    fn name_defaults_to_script_stem() {
        let args = PackagingArgs {
            script: Some("/src/my_app.pyw".into()),
            ..Default::default()
        };
        let opts = merge(args, None, &HashMap::new());
        assert_eq!(opts.app_name, "my_app");
    }

    #[test]
    fn preset_picked_by_directory_name() {
        let opts = merge(PackagingArgs::default(), Some("flappy"), &presets());
        assert_eq!(opts.app_name, "flappy");
        assert!(opts.console_mode);
        assert!(!opts.one_file_mode);
        assert!(opts.clean_temp);
        assert_eq!(opts.extra_folders, vec![PathBuf::from("/games/flappy/images")]);
    }

    #[test]
    fn cli_overrides_preset_and_lists_merge() {
        let args = PackagingArgs {
            preset: Some("flappy".into()),
            name: Some("Bird".into()),
            noconsole: true,
            onefile: true,
            add_folder: vec!["/games/flappy/sounds".into(), "/games/flappy/images".into()],
            ..Default::default()
        };
        let opts = merge(args, Some("ignored"), &presets());
        assert_eq!(opts.app_name, "Bird");
        assert!(!opts.console_mode);
        assert!(opts.one_file_mode);
        assert_eq!(
            opts.extra_folders,
            vec![
                PathBuf::from("/games/flappy/images"),
                PathBuf::from("/games/flappy/sounds"),
            ]
        );
    }

    #[test]
    fn unknown_preset_falls_back_to_defaults() {
        let args = PackagingArgs {
            preset: Some("missing".into()),
            ..Default::default()
        };
        let opts = merge(args, Some("tool"), &presets());
        assert_eq!(opts.app_name, "");
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(parse_presets("[broken").is_err());
    }
}
