use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use easyvisa_classifiers::config::PreprocessConfig;
use easyvisa_classifiers::trainer::{default_model_specs, ModelSpec};

/// Parameters of a full `easyvisa train` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub version: String,
    /// EasyVisa CSV to load.
    pub data_path: String,
    /// Directory receiving `model_comparison.csv` and the HTML report.
    pub output_dir: String,
    pub preprocessing: PreprocessConfig,
    /// Models to train, in comparison order.
    pub models: Vec<ModelSpec>,
    /// Largest accepted train minus test accuracy before a warning is logged.
    pub overfit_tolerance: f64,
    pub report: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            version: clap::crate_version!().to_string(),
            data_path: String::from("EasyVisa.csv"),
            output_dir: String::from("."),
            preprocessing: PreprocessConfig::default(),
            models: default_model_specs(),
            overfit_tolerance: 0.1,
            report: true,
        }
    }
}

impl TrainConfig {
    /// Replace file settings with the ones given on the command line.
    pub fn with_overrides(
        mut self,
        data_path: Option<&str>,
        output_dir: Option<&str>,
        no_report: bool,
    ) -> Self {
        if let Some(path) = data_path {
            self.data_path = path.to_string();
        }
        if let Some(dir) = output_dir {
            self.output_dir = dir.to_string();
        }
        if no_report {
            self.report = false;
        }
        self
    }

    pub fn comparison_path(&self) -> PathBuf {
        Path::new(&self.output_dir).join("model_comparison.csv")
    }

    pub fn report_path(&self) -> PathBuf {
        Path::new(&self.output_dir).join("easyvisa_report.html")
    }
}

/// Load a training configuration from a JSON file. Missing fields take
/// their defaults.
pub fn load_train_config<P: AsRef<Path>>(path: P) -> Result<TrainConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: TrainConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}
