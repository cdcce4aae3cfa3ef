use anyhow::Result;

use crate::data::Label;

/// Inverse-frequency class weights: `total / (num_classes * count)`. Rarer
/// classes receive proportionally larger weight, so the loss does not let the
/// majority class dominate. Pure function of the label counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights {
    weights: [f32; Label::COUNT],
}

impl ClassWeights {
    pub fn from_labels(labels: &[Label]) -> Result<Self> {
        let mut counts = [0usize; Label::COUNT];
        for label in labels {
            counts[label.index()] += 1;
        }

        let total = labels.len();
        let mut weights = [0.0f32; Label::COUNT];
        for label in Label::ALL {
            let count = counts[label.index()];
            if count == 0 {
                return Err(anyhow::anyhow!(
                    "class {label} has no training samples, cannot weight the loss"
                ));
            }
            weights[label.index()] = total as f32 / (Label::COUNT as f32 * count as f32);
        }

        log::info!(
            "class weights: NORMAL={:.4}, PNEUMONIA={:.4}",
            weights[Label::Normal.index()],
            weights[Label::Pneumonia.index()]
        );

        Ok(Self { weights })
    }

    pub fn weight(&self, label: Label) -> f32 {
        self.weights[label.index()]
    }

    /// Per-sample weights for a batch, in batch order.
    pub fn for_batch(&self, labels: &[Label]) -> Vec<f32> {
        labels.iter().map(|l| self.weight(*l)).collect()
    }
}
