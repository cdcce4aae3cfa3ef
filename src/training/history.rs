use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metrics for one completed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// Append-only per-epoch record of the run, serializable next to the
/// checkpoint for later inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Epoch with the lowest validation loss, if any epochs ran.
    pub fn best_epoch(&self) -> Option<&EpochRecord> {
        self.records
            .iter()
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write history {}", path.display()))?;
        Ok(())
    }
}
