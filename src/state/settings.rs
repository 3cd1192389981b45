/// Persisted form settings
///
/// A single JSON file of namespaced objects (e.g. `previews`). Writes only
/// happen when the canonical JSON differs from what was last loaded or
/// saved, so callers can save after every render without touching disk.
use crate::error::{PreviewError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub struct SettingsStore {
    path: PathBuf,
    data: Map<String, Value>,
    last_saved: String,
}

impl SettingsStore {
    /// Load settings from `path`. A missing or unreadable file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(path = %path.display(), "ignoring malformed settings: {}", err);
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        let last_saved = canonical(&data);

        SettingsStore {
            path,
            data,
            last_saved,
        }
    }

    /// Get the default settings location
    /// Returns ~/.config/raw-previews/settings.json on Linux
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("raw-previews");
        path.push("settings.json");
        Some(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a namespace, falling back to the type's default when it is
    /// missing or no longer matches the expected shape
    pub fn get<T: DeserializeOwned + Default>(&self, namespace: &str) -> T {
        self.data
            .get(namespace)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Replace a namespace; nothing is written until `save_if_changed`
    pub fn update<T: Serialize>(&mut self, namespace: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.data.insert(namespace.to_string(), value);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        canonical(&self.data) != self.last_saved
    }

    /// Write the file if anything changed since the last load or save.
    /// Returns whether a write happened.
    pub fn save_if_changed(&mut self) -> Result<bool> {
        let current = canonical(&self.data);
        if current == self.last_saved {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| PreviewError::io(parent, e))?;
        }
        let pretty = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, pretty).map_err(|e| PreviewError::io(&self.path, e))?;

        self.last_saved = current;
        tracing::debug!(path = %self.path.display(), "saved settings");
        Ok(true)
    }
}

/// Key-sorted JSON used for change detection
fn canonical(data: &Map<String, Value>) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Value::Object(keys.into_iter().map(|k| (k.clone(), sorted(&map[k]))).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(&Value::Object(data.clone())).to_string()
}
