use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SETTINGS_FILE: &str = "phonebook_settings.json";
pub const SAMPLE_FILE: &str = "teachers_sample.csv";

/// File names we look for when neither the command line nor the settings
/// point at a contact file.
pub const DEFAULT_DATA_CANDIDATES: [&str; 8] = [
    "teachers.csv",
    "teacher_phonebook.csv",
    "teachers_phonebook.csv",
    "teacher_phone_book.csv",
    "teachers.xlsx",
    "teacher_phonebook.xlsx",
    "phonebook.xlsx",
    "PhoneBook.xlsx",
];

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub last_file: Option<String>,
}

impl Settings {
    /// Missing or corrupt settings are treated as empty, never an error.
    pub fn load(path: impl AsRef<Path>) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Settings::default(),
        }
    }

    /// Failing to persist settings is not worth interrupting the user for.
    pub fn save(&self, path: impl AsRef<Path>) {
        match serde_json::to_string_pretty(self) {
            Ok(text) => {
                if let Err(e) = fs::write(path, text) {
                    debug!("Could not write settings: {e}");
                }
            }
            Err(e) => debug!("Could not serialize settings: {e}"),
        }
    }
}

/// Resolve which file to load on startup: explicit path, then the last
/// loaded file, then conventional file names in `dir`, then the newest CSV
/// in `dir` (the bundled sample only as a last resort).
pub fn resolve_input_path(
    cli: Option<&Path>,
    settings: &Settings,
    dir: &Path,
) -> Option<PathBuf> {
    if let Some(path) = cli
        && path.is_file()
    {
        return Some(path.to_path_buf());
    }

    if let Some(last) = &settings.last_file {
        let path = PathBuf::from(last);
        if path.is_file() {
            return Some(path);
        }
    }

    for name in DEFAULT_DATA_CANDIDATES {
        let path = dir.join(name);
        if path.is_file() {
            return Some(path);
        }
    }

    let mut csv_files: Vec<(SystemTime, PathBuf)> = Vec::new();
    let mut sample = None;
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !name.ends_with(".csv") {
                continue;
            }
            if name == SAMPLE_FILE {
                sample = Some(path);
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            csv_files.push((modified, path));
        }
    }

    if let Some((_, path)) = csv_files.into_iter().max_by_key(|(modified, _)| *modified) {
        return Some(path);
    }
    sample
}
