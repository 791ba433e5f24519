use crate::generator::profile::GeneratorConfig;
use anyhow::Context;
use fpcore::prelude::FingerprintingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_CLASSIFIER: &str = "wlan";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub fingerprinting: FingerprintingConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(spacing: f64, k: usize, weighted: bool, naive: bool) -> Self {
        let generator = GeneratorConfig {
            spacing,
            ..Default::default()
        };
        let fingerprinting = FingerprintingConfig {
            k,
            weighted,
            naive,
            locked: false,
            default_value: generator.sensitivity - 10.0,
            ..FingerprintingConfig::with_classifier(DEFAULT_CLASSIFIER)
        };
        Self {
            fingerprinting,
            generator,
        }
    }

    /// Engine configuration with a classifier filled in when the file left it empty.
    pub fn to_fingerprinting_config(&self) -> FingerprintingConfig {
        let mut config = self.fingerprinting.clone();
        if config.classifier.is_empty() {
            config.classifier = DEFAULT_CLASSIFIER.into();
        }
        config
    }
}
