//! INI file configuration adapter.

use crate::domain::holdings::{EffectMap, UnitEffect};
use crate::domain::transaction::TransactionType;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn section_keys(&self, section: &str) -> Vec<String> {
        let section = section.to_lowercase();
        self.config
            .get_map_ref()
            .get(&section)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Build the type-to-effect table: the canonical defaults overridden by
/// any `[unit_effects]` entries.
pub fn build_effect_map(
    config: &dyn ConfigPort,
) -> Result<EffectMap, crate::domain::error::FolioError> {
    let mut effects = EffectMap::default();

    for key in config.section_keys("unit_effects") {
        let tx_type = TransactionType::parse(&key).ok_or_else(|| {
            crate::domain::error::FolioError::ConfigInvalid {
                section: "unit_effects".into(),
                key: key.clone(),
                reason: "unknown transaction type".into(),
            }
        })?;
        let value = config
            .get_string("unit_effects", &key)
            .unwrap_or_default();
        let effect = UnitEffect::parse(&value).ok_or_else(|| {
            crate::domain::error::FolioError::ConfigInvalid {
                section: "unit_effects".into(),
                key: key.clone(),
                reason: format!("expected increase, decrease or cash_only, got '{value}'"),
            }
        })?;
        effects.set(tx_type, effect);
    }

    Ok(effects)
}
