use anyhow::{Context, Result};
use burn::prelude::*;
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::data::{Label, XrayDataset};
use crate::model::XrayClassifier;

/// One qualitative prediction, for visual inspection only.
#[derive(Debug, Clone)]
pub struct SamplePrediction {
    pub path: PathBuf,
    pub truth: Label,
    pub predicted: Label,
    pub confidence: f32,
}

impl SamplePrediction {
    pub fn is_correct(&self) -> bool {
        self.truth == self.predicted
    }
}

/// Draws random validation images with replacement and runs single-image
/// inference on each, independently of the batch pipeline. Purely
/// observational; the model is never mutated.
pub struct SamplePredictor {
    img_size: usize,
    rng: StdRng,
}

impl SamplePredictor {
    pub fn new(img_size: usize, rng: StdRng) -> Self {
        Self { img_size, rng }
    }

    pub fn sample<B: Backend>(
        &mut self,
        model: &XrayClassifier<B>,
        dataset: &XrayDataset,
        draws: usize,
        device: &B::Device,
    ) -> Result<Vec<SamplePrediction>> {
        if dataset.is_empty() {
            return Err(anyhow::anyhow!("validation dataset is empty"));
        }

        let mut predictions = Vec::with_capacity(draws);
        for _ in 0..draws {
            let idx = self.rng.gen_range(0..dataset.len());
            let (path, truth) = dataset
                .get(idx)
                .ok_or_else(|| anyhow::anyhow!("sample index {idx} out of range"))?;
            predictions.push(self.predict_one(model, path, truth, device)?);
        }
        Ok(predictions)
    }

    fn predict_one<B: Backend>(
        &self,
        model: &XrayClassifier<B>,
        path: &Path,
        truth: Label,
        device: &B::Device,
    ) -> Result<SamplePrediction> {
        let img = image::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .to_rgb8();
        let size = self.img_size;
        let resized = image::imageops::resize(
            &img,
            size as u32,
            size as u32,
            image::imageops::FilterType::Triangle,
        );

        let mut pixels = Vec::with_capacity(3 * size * size);
        for c in 0..3 {
            for y in 0..size {
                for x in 0..size {
                    pixels.push(resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0);
                }
            }
        }
        let input =
            Tensor::<B, 4>::from_data(TensorData::new(pixels, [1, 3, size, size]), device);

        let probs = model
            .predict(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read probabilities: {e:?}"))?;

        let (best_idx, confidence) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (i, *p))
            .unwrap_or((0, 0.0));
        let predicted = Label::from_index(best_idx)
            .ok_or_else(|| anyhow::anyhow!("prediction index {best_idx} out of range"))?;

        Ok(SamplePrediction {
            path: path.to_path_buf(),
            truth,
            predicted,
            confidence,
        })
    }
}

/// Tiles the sampled images into one grid PNG, framing each thumbnail green
/// when the prediction matched the ground truth and red otherwise.
pub fn render_prediction_grid(
    predictions: &[SamplePrediction],
    thumb_size: u32,
    path: &Path,
) -> Result<()> {
    if predictions.is_empty() {
        return Err(anyhow::anyhow!("no predictions to render"));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    const BORDER: u32 = 4;
    let cols = predictions.len().min(5) as u32;
    let rows = (predictions.len() as u32).div_ceil(cols);
    let cell = thumb_size + 2 * BORDER;

    let mut canvas = RgbImage::from_pixel(cols * cell, rows * cell, Rgb([255, 255, 255]));

    for (i, prediction) in predictions.iter().enumerate() {
        let img = image::open(&prediction.path)
            .with_context(|| format!("failed to open {}", prediction.path.display()))?
            .to_rgb8();
        let thumb =
            image::imageops::resize(&img, thumb_size, thumb_size, image::imageops::FilterType::Triangle);

        let col = i as u32 % cols;
        let row = i as u32 / cols;
        let x0 = col * cell;
        let y0 = row * cell;

        let frame = if prediction.is_correct() {
            Rgb([40, 180, 60])
        } else {
            Rgb([210, 40, 40])
        };
        for y in 0..cell {
            for x in 0..cell {
                if x < BORDER || x >= cell - BORDER || y < BORDER || y >= cell - BORDER {
                    canvas.put_pixel(x0 + x, y0 + y, frame);
                }
            }
        }
        image::imageops::replace(&mut canvas, &thumb, (x0 + BORDER) as i64, (y0 + BORDER) as i64);
    }

    canvas
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("wrote prediction grid to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::synthetic_split;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use tempfile::TempDir;

    type B = NdArray;

    #[test]
    fn draws_requested_number_with_replacement() {
        let dir = synthetic_split(2, 1);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let device = Default::default();
        let model = XrayClassifier::<B>::new(&device, 2, 2).unwrap();

        let mut predictor = SamplePredictor::new(16, StdRng::seed_from_u64(11));
        // More draws than samples is fine: selection is with replacement.
        let predictions = predictor.sample(&model, &ds, 10, &device).unwrap();
        assert_eq!(predictions.len(), 10);
        for p in &predictions {
            assert!(p.confidence >= 0.0 && p.confidence <= 1.0);
        }
    }

    #[test]
    fn seeded_predictor_draws_the_same_indices() {
        let dir = synthetic_split(4, 4);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let device = Default::default();
        let model = XrayClassifier::<B>::new(&device, 2, 2).unwrap();

        let run = |seed: u64| {
            let mut predictor = SamplePredictor::new(16, StdRng::seed_from_u64(seed));
            predictor
                .sample(&model, &ds, 5, &device)
                .unwrap()
                .into_iter()
                .map(|p| p.path)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn grid_is_rendered() {
        let dir = synthetic_split(2, 2);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let device = Default::default();
        let model = XrayClassifier::<B>::new(&device, 2, 2).unwrap();

        let mut predictor = SamplePredictor::new(16, StdRng::seed_from_u64(5));
        let predictions = predictor.sample(&model, &ds, 4, &device).unwrap();

        let out = TempDir::new().unwrap();
        let path = out.path().join("grid.png");
        render_prediction_grid(&predictions, 32, &path).unwrap();
        assert!(path.is_file());
    }
}
