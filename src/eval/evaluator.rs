use anyhow::Result;
use burn::prelude::*;
use std::path::Path;

use crate::data::{Label, XrayDataLoader, XrayDataset};
use crate::eval::confusion::ConfusionMatrix;
use crate::eval::plots::render_confusion_heatmap;
use crate::model::XrayClassifier;

/// Result of one deterministic pass over the validation split.
pub struct Evaluation {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
}

/// Runs single forward passes over every validation batch, in dataset order,
/// and aggregates arg-max predictions into a confusion matrix. Read-only with
/// respect to the model.
pub struct Evaluator {
    batch_size: usize,
    img_size: usize,
}

impl Evaluator {
    pub fn new(batch_size: usize, img_size: usize) -> Self {
        Self {
            batch_size,
            img_size,
        }
    }

    pub fn evaluate<B: Backend>(
        &self,
        model: &XrayClassifier<B>,
        dataset: &XrayDataset,
        device: &B::Device,
    ) -> Result<Evaluation> {
        let loader: XrayDataLoader<B> = XrayDataLoader::validation(
            dataset.clone(),
            self.batch_size,
            self.img_size,
            device.clone(),
        );

        let mut pairs = Vec::with_capacity(dataset.len());
        for batch in loader {
            let predicted = model
                .forward(batch.images)
                .argmax(1)
                .into_data()
                .convert::<i64>()
                .to_vec::<i64>()
                .map_err(|e| anyhow::anyhow!("failed to read predictions: {e:?}"))?;

            for (truth, pred_idx) in batch.labels.iter().zip(predicted) {
                let predicted = Label::from_index(pred_idx as usize).ok_or_else(|| {
                    anyhow::anyhow!("prediction index {pred_idx} out of range")
                })?;
                pairs.push((*truth, predicted));
            }
        }

        let confusion = ConfusionMatrix::from_predictions(&pairs);
        let accuracy = confusion.accuracy();

        log::info!(
            "evaluated {} samples: accuracy={:.4}, recall(NORMAL)={:.4}, recall(PNEUMONIA)={:.4}",
            confusion.total(),
            accuracy,
            confusion.recall(Label::Normal),
            confusion.recall(Label::Pneumonia),
        );

        Ok(Evaluation {
            confusion,
            accuracy,
        })
    }

    /// Evaluates and writes the row-normalized heatmap next to the run.
    pub fn evaluate_and_render<B: Backend>(
        &self,
        model: &XrayClassifier<B>,
        dataset: &XrayDataset,
        device: &B::Device,
        heatmap_path: &Path,
    ) -> Result<Evaluation> {
        let evaluation = self.evaluate(model, dataset, device)?;
        render_confusion_heatmap(&evaluation.confusion, heatmap_path)?;
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::synthetic_split;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn evaluation_covers_every_sample_once() {
        let dir = synthetic_split(3, 2);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let device = Default::default();
        let model = XrayClassifier::<B>::new(&device, 2, 2).unwrap();

        let evaluation = Evaluator::new(2, 16).evaluate(&model, &ds, &device).unwrap();
        assert_eq!(evaluation.confusion.total(), 5);
        assert_eq!(evaluation.confusion.support(Label::Normal), 3);
        assert_eq!(evaluation.confusion.support(Label::Pneumonia), 2);
    }

    #[test]
    fn repeated_evaluation_is_identical() {
        let dir = synthetic_split(2, 2);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let device = Default::default();
        let model = XrayClassifier::<B>::new(&device, 2, 2).unwrap();

        let evaluator = Evaluator::new(2, 16);
        let a = evaluator.evaluate(&model, &ds, &device).unwrap();
        let b = evaluator.evaluate(&model, &ds, &device).unwrap();
        assert_eq!(a.confusion, b.confusion);
    }
}
