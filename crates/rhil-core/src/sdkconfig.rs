//! Build configuration snapshot (`config/sdkconfig.json`)

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::target::Target;

/// Location of the snapshot relative to the binary directory
pub const SDKCONFIG_JSON_SUBPATH: [&str; 2] = ["config", "sdkconfig.json"];

/// Key naming the target chip
const TARGET_KEY: &str = "IDF_TARGET";

/// Flat key/value dump of the build configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdkConfig {
    values: BTreeMap<String, Value>,
}

impl SdkConfig {
    /// Load the snapshot from a binary directory
    ///
    /// Returns `Ok(None)` if the build didn't produce one.
    pub fn load(binary_dir: &Path) -> Result<Option<Self>> {
        let mut path = binary_dir.to_path_buf();
        path.extend(SDKCONFIG_JSON_SUBPATH);

        if !path.is_file() {
            log::warn!("{} doesn't exist. Skipping...", path.display());
            return Ok(None);
        }

        let text = fs::read_to_string(&path).map_err(|source| CoreError::Io {
            path: path.clone(),
            source,
        })?;
        let values = serde_json::from_str(&text).map_err(|source| CoreError::Json {
            path: path.clone(),
            source,
        })?;

        Ok(Some(Self { values }))
    }

    /// Build a snapshot from already-parsed values
    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// Look up a raw value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a boolean option; missing keys read as `false`
    pub fn is_enabled(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Target chip named by the snapshot, if any
    pub fn target(&self) -> Option<Target> {
        self.get(TARGET_KEY).and_then(Value::as_str).map(Target::from)
    }

    /// All values, sorted by key
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/sdkconfig.json"),
            r#"{"IDF_TARGET": "esp32c3", "FREERTOS_HZ": 100, "SECURE_BOOT": false, "APP_ROLLBACK_ENABLE": true}"#,
        )
        .unwrap();

        let config = SdkConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.target(), Some(Target::new("esp32c3")));
        assert_eq!(config.get("FREERTOS_HZ").and_then(Value::as_u64), Some(100));
        assert!(config.is_enabled("APP_ROLLBACK_ENABLE"));
        assert!(!config.is_enabled("SECURE_BOOT"));
        assert!(!config.is_enabled("MISSING"));
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SdkConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_no_target_key() {
        let config = SdkConfig::from_values(BTreeMap::new());
        assert!(config.target().is_none());
    }
}
