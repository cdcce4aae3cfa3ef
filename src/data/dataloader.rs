use crate::data::dataset::{Label, XrayDataset};
use crate::data::transforms::Augmentation;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One batch of decoded images with their one-hot targets.
pub struct XrayBatch<B: Backend> {
    /// `[n, 3, size, size]`, pixel values rescaled to [0, 1].
    pub images: Tensor<B, 4>,
    /// `[n, 2]`, exactly one component set per row.
    pub targets: Tensor<B, 2>,
    /// Labels in batch order, for metrics built on the CPU side.
    pub labels: Vec<Label>,
}

/// Batched iterator over a dataset split.
///
/// Training mode shuffles indices with a seeded rng and augments every image;
/// `reset` reshuffles for the next epoch. Validation mode iterates the
/// dataset order unchanged and applies no randomness at all, so repeated full
/// passes yield identical batches.
pub struct XrayDataLoader<B: Backend> {
    dataset: XrayDataset,
    batch_size: usize,
    img_size: usize,
    augmentation: Option<Augmentation>,
    shuffle: bool,
    rng: StdRng,
    device: B::Device,
    indices: Vec<usize>,
    current: usize,
}

impl<B: Backend> XrayDataLoader<B> {
    pub fn training(
        dataset: XrayDataset,
        batch_size: usize,
        img_size: usize,
        augmentation: Augmentation,
        seed: u64,
        device: B::Device,
    ) -> Self {
        let mut loader = Self {
            indices: (0..dataset.len()).collect(),
            dataset,
            batch_size,
            img_size,
            augmentation: Some(augmentation),
            shuffle: true,
            rng: StdRng::seed_from_u64(seed),
            device,
            current: 0,
        };
        loader.indices.shuffle(&mut loader.rng);
        loader
    }

    pub fn validation(
        dataset: XrayDataset,
        batch_size: usize,
        img_size: usize,
        device: B::Device,
    ) -> Self {
        Self {
            indices: (0..dataset.len()).collect(),
            dataset,
            batch_size,
            img_size,
            augmentation: None,
            shuffle: false,
            rng: StdRng::seed_from_u64(0),
            device,
            current: 0,
        }
    }

    /// Rewinds to the first batch; training loaders draw a fresh shuffle.
    pub fn reset(&mut self) {
        self.current = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    /// Number of batches in one full pass.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }
}

impl<B: Backend> Iterator for XrayDataLoader<B> {
    type Item = XrayBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.indices.len() {
            return None;
        }

        let end = (self.current + self.batch_size).min(self.indices.len());
        let batch_indices = self.indices[self.current..end].to_vec();
        self.current = end;

        let size = self.img_size;
        let mut pixels = Vec::with_capacity(batch_indices.len() * 3 * size * size);
        let mut labels = Vec::with_capacity(batch_indices.len());

        for idx in batch_indices {
            let Some((path, label)) = self.dataset.get(idx) else {
                continue;
            };
            let img = match image::open(path) {
                Ok(img) => img,
                Err(e) => {
                    log::warn!("skipping unreadable image {}: {e}", path.display());
                    continue;
                }
            };

            let mut rgb = img.to_rgb8();
            if let Some(aug) = &self.augmentation {
                rgb = aug.apply(&rgb, &mut self.rng);
            }
            let resized = image::imageops::resize(
                &rgb,
                size as u32,
                size as u32,
                image::imageops::FilterType::Triangle,
            );

            // Channel-first layout, rescaled by 1/255.
            for c in 0..3 {
                for y in 0..size {
                    for x in 0..size {
                        pixels.push(resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0);
                    }
                }
            }
            labels.push(label);
        }

        if labels.is_empty() {
            return self.next();
        }

        let n = labels.len();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [n, 3, size, size]),
            &self.device,
        );

        let mut one_hot = vec![0.0f32; n * Label::COUNT];
        for (row, label) in labels.iter().enumerate() {
            one_hot[row * Label::COUNT + label.index()] = 1.0;
        }
        let targets =
            Tensor::<B, 2>::from_data(TensorData::new(one_hot, [n, Label::COUNT]), &self.device);

        Some(XrayBatch {
            images,
            targets,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::synthetic_split;
    use crate::data::transforms::AugmentConfig;
    use burn::backend::NdArray;

    type B = NdArray;

    fn collect_labels(loader: XrayDataLoader<B>) -> Vec<Label> {
        loader.flat_map(|b| b.labels).collect()
    }

    #[test]
    fn one_hot_rows_sum_to_one() {
        let dir = synthetic_split(3, 2);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let loader = XrayDataLoader::<B>::training(
            ds,
            2,
            16,
            Augmentation::new(AugmentConfig::default()),
            42,
            Default::default(),
        );

        for batch in loader {
            let sums = batch.targets.sum_dim(1);
            for v in sums.into_data().to_vec::<f32>().unwrap() {
                assert!((v - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn validation_order_is_deterministic() {
        let dir = synthetic_split(4, 3);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();

        let first = collect_labels(XrayDataLoader::<B>::validation(
            ds.clone(),
            2,
            16,
            Default::default(),
        ));
        let second = collect_labels(XrayDataLoader::<B>::validation(
            ds.clone(),
            2,
            16,
            Default::default(),
        ));

        assert_eq!(first, second);
        assert_eq!(first, ds.labels());
    }

    #[test]
    fn validation_pixels_are_rescaled_identically() {
        let dir = synthetic_split(1, 1);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();

        let grab = |ds: XrayDataset| {
            let mut loader = XrayDataLoader::<B>::validation(ds, 4, 8, Default::default());
            let batch = loader.next().unwrap();
            batch.images.into_data().to_vec::<f32>().unwrap()
        };

        let a = grab(ds.clone());
        let b = grab(ds);
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn training_reset_reshuffles() {
        let dir = synthetic_split(8, 8);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let mut loader = XrayDataLoader::<B>::training(
            ds,
            4,
            8,
            Augmentation::new(AugmentConfig::default()),
            1,
            Default::default(),
        );

        let mut first = Vec::new();
        for batch in loader.by_ref() {
            first.extend(batch.labels);
        }
        loader.reset();
        let mut second = Vec::new();
        for batch in loader.by_ref() {
            second.extend(batch.labels);
        }

        assert_eq!(first.len(), second.len());
        // Same multiset of labels either way.
        let count = |v: &[Label]| v.iter().filter(|l| **l == Label::Normal).count();
        assert_eq!(count(&first), count(&second));
    }

    #[test]
    fn batch_count_rounds_up() {
        let dir = synthetic_split(3, 2);
        let ds = XrayDataset::from_dir(dir.path()).unwrap();
        let loader = XrayDataLoader::<B>::validation(ds, 2, 8, Default::default());
        assert_eq!(loader.num_batches(), 3);
        assert_eq!(loader.count(), 3);
    }
}
