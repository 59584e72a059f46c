use crate::config::SETTINGS_VERSION;
use crate::error::ConfigurationError;
use crate::validation::check_mt5_path;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// The keys this application owns. Anything else in the file is left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    #[serde(default)]
    pub mt5_files_path: String,
    #[serde(default)]
    pub version: Option<String>,
}

pub struct SettingsStore {
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    /// Missing file means defaults.
    pub fn load(&self) -> Result<PersistedSettings> {
        if !self.file_path.exists() {
            return Ok(PersistedSettings::default());
        }

        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read settings file {}", self.file_path.display()))?;
        let settings: PersistedSettings =
            serde_json::from_str(&content).context("Failed to parse settings JSON")?;

        info!("Loaded settings from {:?}", self.file_path);
        Ok(settings)
    }

    fn load_document(&self) -> Result<Map<String, Value>> {
        if !self.file_path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read settings file {}", self.file_path.display()))?;
        match serde_json::from_str::<Value>(&content).context("Failed to parse settings JSON")? {
            Value::Object(map) => Ok(map),
            _ => bail!("Settings file {} is not a JSON object", self.file_path.display()),
        }
    }

    /// Stores the MT5 files directory, keeping every unrelated key.
    pub fn save_mt5_path(&self, raw: &str) -> Result<PathBuf> {
        let mt5_path = check_mt5_path(raw).map_err(|e| match e {
            ConfigurationError::Mt5PathNotSet => {
                anyhow::anyhow!("Please enter or browse to your MT5 Files directory.")
            }
            other => anyhow::Error::new(other),
        })?;

        let mut document = self.load_document()?;
        document.insert(
            "mt5_files_path".to_string(),
            Value::String(mt5_path.display().to_string()),
        );
        document.insert("version".to_string(), Value::String(SETTINGS_VERSION.to_string()));

        let content = serde_json::to_string_pretty(&Value::Object(document))
            .context("Failed to serialize settings")?;

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).context("Failed to create settings directory")?;
            }
        }

        // Atomic write: temp file then rename.
        let temp_path = self.file_path.with_extension("tmp");
        fs::write(&temp_path, content).context("Failed to write temp settings file")?;
        fs::rename(&temp_path, &self.file_path).context("Failed to rename settings file")?;

        info!("Saved MT5 path {} to {:?}", mt5_path.display(), self.file_path);
        Ok(mt5_path)
    }
}
