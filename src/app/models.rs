use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to render one packaging command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingOptions {
    #[serde(rename = "script", skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    #[serde(rename = "name")]
    pub app_name: String,
    #[serde(rename = "icon", skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<PathBuf>,
    #[serde(rename = "distpath", skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(rename = "console")]
    pub console_mode: bool,
    #[serde(rename = "onefile")]
    pub one_file_mode: bool,
    #[serde(rename = "clean")]
    pub clean_temp: bool,
    #[serde(rename = "add_file")]
    pub extra_files: Vec<PathBuf>,
    #[serde(rename = "add_folder")]
    pub extra_folders: Vec<PathBuf>,
}

impl Default for PackagingOptions {
    fn default() -> Self {
        Self {
            script_path: None,
            app_name: String::new(),
            icon_path: None,
            output_dir: None,
            console_mode: false,
            one_file_mode: true,
            clean_temp: true,
            extra_files: Vec::new(),
            extra_folders: Vec::new(),
        }
    }
}

impl PackagingOptions {
    /// The script path, but only when it points at an existing file.
    pub fn existing_script(&self) -> Option<&Path> {
        self.script_path.as_deref().filter(|p| p.is_file())
    }
}

pub fn app_name_from(script: &Path) -> String {
    script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
