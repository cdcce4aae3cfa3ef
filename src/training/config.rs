use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::transforms::AugmentConfig;

/// Every knob of the pipeline in one explicit object; stages receive it (or
/// values from it) as arguments instead of reading ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // Dataset
    pub data_root: PathBuf,
    pub archive_url: String,
    pub train_dir: String,
    pub val_dir: String,
    pub img_size: usize,

    // Training
    pub batch_size: usize,
    pub learning_rate: f64,
    pub epochs: usize,
    pub patience: usize,
    pub min_delta: f32,
    pub seed: u64,

    // Model
    pub trainable_stages: usize,
    pub pretrained_backbone: Option<PathBuf>,

    // Augmentation
    pub augment: AugmentConfig,

    // Outputs
    pub run_dir: PathBuf,
    pub sample_draws: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data/chest_xray"),
            archive_url:
                "https://prod-dcd-datasets-cache-zipfiles.s3.amazonaws.com/rscbjbr9sj-2.zip"
                    .to_string(),
            train_dir: "train".to_string(),
            val_dir: "val".to_string(),
            img_size: 224,
            batch_size: 16,
            learning_rate: 1e-5,
            epochs: 3,
            patience: 3,
            min_delta: 0.0,
            seed: 42,
            trainable_stages: 2,
            pretrained_backbone: None,
            augment: AugmentConfig::default(),
            run_dir: PathBuf::from("runs/xray"),
            sample_draws: 10,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: PipelineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn train_root(&self) -> PathBuf {
        self.data_root.join(&self.train_dir)
    }

    pub fn val_root(&self) -> PathBuf {
        self.data_root.join(&self.val_dir)
    }
}
