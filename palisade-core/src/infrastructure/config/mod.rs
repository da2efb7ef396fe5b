// palisade-core/src/infrastructure/config/mod.rs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::infrastructure::error::InfrastructureError;

/// Storage format of the source dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Csv,
    Parquet,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Path to the dataset file, relative to the project directory.
    pub path: String,
    #[serde(default)]
    pub format: SourceFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub on_start: bool,
    #[serde(default)]
    pub on_completion: bool,
    #[serde(default = "default_true")]
    pub on_fail: bool,
    #[serde(default)]
    pub on_error_drop_breach: bool,
    #[serde(default = "default_threshold")]
    pub error_drop_threshold: u8,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> u8 {
    100
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_start: false,
            on_completion: false,
            on_fail: true,
            on_error_drop_breach: false,
            error_drop_threshold: 100,
        }
    }
}

/// One project = one gated table. Loaded from `palisade.yaml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    pub product_id: String,
    pub table: String,
    pub source: SourceConfig,

    /// Rules file, relative to the project directory.
    #[serde(default = "default_rules_path")]
    pub rules_path: String,

    /// Build artifacts directory (output parquet, stats).
    #[serde(default = "default_target_path")]
    pub target_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_table_view: Option<String>,

    #[serde(default = "default_true")]
    pub write_to_table: bool,
    #[serde(default)]
    pub write_error_records: bool,

    #[serde(default)]
    pub output_options: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub error_table_options: std::collections::HashMap<String, String>,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_rules_path() -> String {
    "rules.yaml".to_string()
}

fn default_target_path() -> String {
    "target".to_string()
}

// --- LOADER ---

#[instrument(skip(project_dir))] // Log automatique de l'entrée/sortie de la fonction
pub fn load_gate_config(project_dir: &Path) -> Result<GateConfig, InfrastructureError> {
    // 1. Découverte du fichier principal
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading gate configuration");

    // 2. Chargement YAML
    let content = fs::read_to_string(&config_path)?;
    let mut config: GateConfig = serde_yaml::from_str(&content)?;

    // 3. Override via Variables d'Environnement (Pattern 'Layering')
    // Permet de faire: PALISADE_TARGET_PATH=/tmp/build palisade run
    apply_env_overrides(&mut config);

    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    let candidates = ["palisade.yaml", "palisade_conf.yaml"];
    for filename in candidates {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, candidates
    )))
}

fn apply_env_overrides(config: &mut GateConfig) {
    if let Ok(val) = std::env::var("PALISADE_TARGET_PATH") {
        info!(old = ?config.target_path, new = ?val, "Overriding target path via ENV");
        config.target_path = val;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_load_gate_config_with_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("palisade.yaml"),
            "product_id: product1\n\
             table: employees\n\
             source:\n\
             \x20 path: data/employees.csv\n",
        )?;

        let config = load_gate_config(dir.path())?;
        assert_eq!(config.product_id, "product1");
        assert_eq!(config.table, "employees");
        assert_eq!(config.source.format, SourceFormat::Csv);
        assert_eq!(config.rules_path, "rules.yaml");
        assert_eq!(config.target_path, "target");
        assert!(config.write_to_table);
        assert!(!config.write_error_records);
        assert!(config.notifications.on_fail);
        assert_eq!(config.notifications.error_drop_threshold, 100);
        Ok(())
    }

    #[test]
    fn test_load_gate_config_missing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = load_gate_config(dir.path()).unwrap_err();
        assert!(matches!(err, InfrastructureError::ConfigNotFound(_)));
        Ok(())
    }

    #[test]
    fn test_load_gate_config_rejects_bad_threshold_type() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("palisade.yaml"),
            "product_id: product1\n\
             table: employees\n\
             source:\n\
             \x20 path: data/employees.csv\n\
             notifications:\n\
             \x20 error_drop_threshold: not_a_number\n",
        )?;

        let err = load_gate_config(dir.path()).unwrap_err();
        assert!(matches!(err, InfrastructureError::Yaml(_)));
        Ok(())
    }
}
