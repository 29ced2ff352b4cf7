use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::ClassifyRule;
use crate::graph::DEFAULT_DEPTH_BUDGET;

/// Controls which calls count as infrastructure boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Extra rules checked before the built-in vendor table.
    pub rules: Vec<ClassifyRule>,
    /// Set to false to use only the rules above.
    pub use_builtin: bool,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            rules: vec![],
            use_builtin: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where session state and rendered output land, relative to the repo root.
    pub output_dir: PathBuf,
    /// Ceiling on reference-chain depth during the dependency walk.
    pub depth_budget: usize,
    pub classification: ClassificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(".depslice"),
            depth_budget: DEFAULT_DEPTH_BUDGET,
            classification: ClassificationConfig::default(),
        }
    }
}

pub fn load_config(repo_root: &Path) -> Config {
    let primary = repo_root.join(".depslice.json");

    let text = std::fs::read_to_string(&primary);
    let Ok(text) = text else { return Config::default() };

    serde_json::from_str::<Config>(&text).unwrap_or_else(|_| Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CallCategory, MatchKind};

    #[test]
    fn missing_or_broken_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.output_dir, PathBuf::from(".depslice"));
        assert!(cfg.classification.use_builtin);

        std::fs::write(dir.path().join(".depslice.json"), "{ not json").unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.depth_budget, DEFAULT_DEPTH_BUDGET);
    }

    #[test]
    fn partial_config_keeps_unset_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".depslice.json"),
            r#"{
                "depth_budget": 64,
                "classification": {
                    "rules": [
                        { "pattern": "com.acme.Bus", "match": "type_name", "category": "queue" }
                    ]
                }
            }"#,
        )
        .unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.depth_budget, 64);
        assert_eq!(cfg.output_dir, PathBuf::from(".depslice"));
        assert_eq!(cfg.classification.rules.len(), 1);
        assert_eq!(cfg.classification.rules[0].category, CallCategory::Queue);
        assert_eq!(cfg.classification.rules[0].match_kind, MatchKind::TypeName);
        assert!(cfg.classification.use_builtin);
    }
}
