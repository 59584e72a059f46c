use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const APP_NAME: &str = "Predictor Panel";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_SYMBOL: &str = "EURUSD";
pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;

/// Schema version written into the settings file.
pub const SETTINGS_VERSION: &str = "2.0";
pub const SETTINGS_FILE_NAME: &str = "config.json";
pub const LOG_DIR: &str = "log";
pub const LOG_FILE_NAME: &str = "predictor-panel.log";

/// Script names tried in order when no script path is configured.
pub const SCRIPT_CANDIDATES: &[&str] = &[
    "unified_predictor_v8.py",
    "unified_predictor_v8_fixed.py",
    "GGTHpredictor2.py",
];

#[cfg(windows)]
const PYTHON_NAMES: &[&str] = &["python.exe", "python3.exe"];
#[cfg(not(windows))]
const PYTHON_NAMES: &[&str] = &["python3", "python"];

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
}

fn working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// `PREDICTOR_PANEL_PYTHON`, else the first interpreter found on `PATH`.
pub fn default_python_executable() -> Option<PathBuf> {
    if let Some(path) = env_path("PREDICTOR_PANEL_PYTHON") {
        return Some(path);
    }

    let search_path = std::env::var_os("PATH")?;
    let found = std::env::split_paths(&search_path)
        .flat_map(|dir| PYTHON_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file());

    match &found {
        Some(p) => info!("Using Python interpreter {}", p.display()),
        None => warn!("No Python interpreter found on PATH; set PREDICTOR_PANEL_PYTHON"),
    }
    found
}

/// `PREDICTOR_PANEL_SCRIPT`, else the first candidate script next to the
/// binary or in the working directory. Falls back to the first candidate name
/// in the working directory even if it does not exist yet.
pub fn default_script_path() -> PathBuf {
    if let Some(path) = env_path("PREDICTOR_PANEL_SCRIPT") {
        return path;
    }

    let cwd = working_dir();
    let dirs: Vec<PathBuf> = executable_dir().into_iter().chain([cwd.clone()]).collect();
    find_script_in(&dirs).unwrap_or_else(|| cwd.join(SCRIPT_CANDIDATES[0]))
}

pub fn find_script_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| SCRIPT_CANDIDATES.iter().map(move |name| dir.join(name)))
        .find(|p| p.is_file())
}

pub fn settings_file_path() -> PathBuf {
    env_path("PREDICTOR_PANEL_SETTINGS").unwrap_or_else(|| working_dir().join(SETTINGS_FILE_NAME))
}

pub fn log_file_path() -> PathBuf {
    working_dir().join(LOG_DIR).join(LOG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_script_prefers_candidate_order() {
        let dir = std::env::temp_dir().join(format!("predictor_panel_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert_eq!(find_script_in(&[dir.clone()]), None);

        std::fs::write(dir.join("GGTHpredictor2.py"), "").unwrap();
        std::fs::write(dir.join("unified_predictor_v8_fixed.py"), "").unwrap();
        assert_eq!(
            find_script_in(&[dir.clone()]),
            Some(dir.join("unified_predictor_v8_fixed.py"))
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_default_script_path_always_has_a_file_name() {
        let path = default_script_path();
        assert!(path.file_name().is_some());
    }
}
