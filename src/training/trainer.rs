use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use crate::data::{Augmentation, XrayBatch, XrayDataLoader, XrayDataset};
use crate::model::XrayClassifier;
use crate::training::class_weights::ClassWeights;
use crate::training::config::PipelineConfig;
use crate::training::early_stopping::{EarlyStopping, Verdict};
use crate::training::history::{EpochRecord, TrainingHistory};

/// Fine-tuning loop: bounded epochs, class-weighted cross-entropy, one
/// validation pass per epoch, early stopping with best-weights restoration.
pub struct Trainer<B: AutodiffBackend> {
    pub model: XrayClassifier<B>,
    optimizer: OptimizerAdaptor<Adam, XrayClassifier<B>, B>,
    config: PipelineConfig,
    device: B::Device,
    early_stopping: EarlyStopping,
    best_model: Option<XrayClassifier<B>>,
    history: TrainingHistory,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: PipelineConfig, num_classes: usize, device: B::Device) -> Result<Self> {
        let mut model = XrayClassifier::new(&device, num_classes, config.trainable_stages)?;
        if let Some(path) = &config.pretrained_backbone {
            model = model.with_pretrained_backbone(path, &device)?;
        }

        let optimizer = AdamConfig::new().init();
        let early_stopping = EarlyStopping::new(config.patience, config.min_delta);

        Ok(Self {
            model,
            optimizer,
            config,
            device,
            early_stopping,
            best_model: None,
            history: TrainingHistory::new(),
        })
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Runs the full fit loop and returns the history. The training loader
    /// reshuffles each epoch from one seeded rng stream; validation iterates
    /// the fixed dataset order on the inner (no-gradient) backend.
    pub fn fit(&mut self, train: &XrayDataset, val: &XrayDataset) -> Result<&TrainingHistory> {
        let class_weights = ClassWeights::from_labels(&train.labels())?;

        let mut train_loader: XrayDataLoader<B> = XrayDataLoader::training(
            train.clone(),
            self.config.batch_size,
            self.config.img_size,
            Augmentation::new(self.config.augment.clone()),
            self.config.seed,
            self.device.clone(),
        );

        std::fs::create_dir_all(&self.config.run_dir).with_context(|| {
            format!("failed to create run dir {}", self.config.run_dir.display())
        })?;

        let pb = ProgressBar::new(self.config.epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?,
        );

        for epoch in 1..=self.config.epochs {
            let epoch_start = Instant::now();

            let (train_loss, train_acc) = self.train_epoch(&mut train_loader, &class_weights);
            let (val_loss, val_acc) = self.validate_epoch(val);

            self.history.push(EpochRecord {
                epoch,
                loss: train_loss,
                accuracy: train_acc,
                val_loss,
                val_accuracy: val_acc,
            });

            pb.set_message(format!(
                "epoch {epoch}: loss={train_loss:.4} acc={train_acc:.3} val_loss={val_loss:.4} val_acc={val_acc:.3}"
            ));
            pb.inc(1);

            log::info!(
                "epoch {epoch}/{}: loss={train_loss:.4} acc={train_acc:.3} val_loss={val_loss:.4} val_acc={val_acc:.3} ({:.1}s)",
                self.config.epochs,
                epoch_start.elapsed().as_secs_f32()
            );

            match self.early_stopping.observe(val_loss) {
                Verdict::Improved => {
                    self.best_model = Some(self.model.clone());
                    self.save_checkpoint("best")?;
                }
                Verdict::Stalled => {
                    log::info!(
                        "no improvement for {} epoch(s), best val_loss={:.4}",
                        self.early_stopping.stalled_epochs(),
                        self.early_stopping.best_loss()
                    );
                }
                Verdict::Stop => {
                    log::info!(
                        "early stopping at epoch {epoch}, restoring best weights (val_loss={:.4})",
                        self.early_stopping.best_loss()
                    );
                    if let Some(best) = self.best_model.take() {
                        self.model = best;
                    }
                    break;
                }
            }
        }

        pb.finish_with_message("training done");
        self.save_checkpoint("final")?;
        Ok(&self.history)
    }

    fn train_epoch(
        &mut self,
        loader: &mut XrayDataLoader<B>,
        class_weights: &ClassWeights,
    ) -> (f32, f32) {
        loader.reset();

        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut seen = 0usize;
        let mut batches = 0usize;

        while let Some(batch) = loader.next() {
            let n = batch.labels.len();
            let logits = self.model.forward(batch.images.clone());

            let loss = self.weighted_cross_entropy(&batch, logits.clone(), class_weights);
            let loss_value = loss.clone().into_scalar().elem::<f32>();

            if loss_value.is_nan() || loss_value.is_infinite() {
                log::warn!("non-finite training loss, skipping optimizer step");
                continue;
            }

            correct += count_correct(logits, &batch.labels);
            seen += n;
            total_loss += loss_value;
            batches += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model =
                self.optimizer
                    .step(self.config.learning_rate, self.model.clone(), grads);

            if batches % 10 == 0 {
                log::debug!("batch {batches}: loss={loss_value:.4}");
            }
        }

        epoch_metrics(total_loss, batches, correct, seen)
    }

    fn validate_epoch(&self, val: &XrayDataset) -> (f32, f32) {
        let loader: XrayDataLoader<B::InnerBackend> = XrayDataLoader::validation(
            val.clone(),
            self.config.batch_size,
            self.config.img_size,
            <B::InnerBackend as Backend>::Device::default(),
        );
        let model = self.model.valid();

        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut seen = 0usize;
        let mut batches = 0usize;

        for batch in loader {
            let n = batch.labels.len();
            let logits = model.forward(batch.images.clone());

            // Validation loss is the plain (unweighted) cross-entropy.
            let log_probs = log_softmax(logits.clone(), 1);
            let loss = (batch.targets.clone() * log_probs).sum_dim(1).neg().mean();
            let loss_value = loss.into_scalar().elem::<f32>();

            if loss_value.is_nan() || loss_value.is_infinite() {
                log::warn!("non-finite validation loss, skipping batch");
                continue;
            }

            correct += count_correct(logits, &batch.labels);
            seen += n;
            total_loss += loss_value;
            batches += 1;
        }

        epoch_metrics(total_loss, batches, correct, seen)
    }

    /// Cross-entropy with each sample's loss scaled by the weight of its true
    /// class, then averaged over the batch.
    fn weighted_cross_entropy(
        &self,
        batch: &XrayBatch<B>,
        logits: Tensor<B, 2>,
        class_weights: &ClassWeights,
    ) -> Tensor<B, 1> {
        let n = batch.labels.len();
        let log_probs = log_softmax(logits, 1);
        let per_sample = (batch.targets.clone() * log_probs).sum_dim(1).neg();

        let weights = Tensor::<B, 2>::from_data(
            TensorData::new(class_weights.for_batch(&batch.labels), [n, 1]),
            &self.device,
        );

        (per_sample * weights).mean()
    }

    pub fn save_checkpoint(&self, name: &str) -> Result<()> {
        let checkpoint_dir = self.config.run_dir.join(name);
        std::fs::create_dir_all(&checkpoint_dir)
            .with_context(|| format!("failed to create {}", checkpoint_dir.display()))?;

        let record = self.model.clone().into_record();
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(record, checkpoint_dir.join("model"))
            .map_err(|e| anyhow::anyhow!("failed to save model: {e:?}"))?;

        let meta = serde_json::json!({
            "model_type": "XrayClassifier",
            "num_classes": crate::data::Label::COUNT,
            "img_size": self.config.img_size,
            "trainable_stages": self.config.trainable_stages,
            "checkpoint_name": name,
        });
        std::fs::write(
            checkpoint_dir.join("config.json"),
            serde_json::to_string_pretty(&meta)?,
        )?;

        log::info!("checkpoint '{name}' saved under {}", checkpoint_dir.display());
        Ok(())
    }
}

fn epoch_metrics(total_loss: f32, batches: usize, correct: usize, seen: usize) -> (f32, f32) {
    let loss = if batches > 0 {
        total_loss / batches as f32
    } else {
        f32::INFINITY
    };
    let acc = if seen > 0 {
        correct as f32 / seen as f32
    } else {
        0.0
    };
    (loss, acc)
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, labels: &[crate::data::Label]) -> usize {
    let predicted = logits
        .argmax(1)
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .unwrap_or_default();

    predicted
        .iter()
        .zip(labels)
        .filter(|(p, l)| **p as usize == l.index())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::synthetic_split;
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    type AB = Autodiff<NdArray>;

    fn tiny_config(run_dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.img_size = 16;
        config.batch_size = 2;
        config.epochs = 2;
        config.patience = 1;
        config.run_dir = run_dir.to_path_buf();
        config
    }

    #[test]
    fn fit_respects_the_epoch_budget() {
        let train = synthetic_split(4, 2);
        let val = synthetic_split(2, 2);
        let run = TempDir::new().unwrap();

        let train_ds = XrayDataset::from_dir(train.path()).unwrap();
        let val_ds = XrayDataset::from_dir(val.path()).unwrap();

        let config = tiny_config(run.path());
        let epochs = config.epochs;
        let mut trainer = Trainer::<AB>::new(config, 2, Default::default()).unwrap();
        let history = trainer.fit(&train_ds, &val_ds).unwrap();

        assert!(!history.is_empty());
        assert!(history.len() <= epochs);
        assert!(run.path().join("final").join("config.json").is_file());
    }

    #[test]
    fn patience_stop_restores_the_best_snapshot() {
        let train = synthetic_split(4, 2);
        let val = synthetic_split(2, 2);
        let run = TempDir::new().unwrap();

        let train_ds = XrayDataset::from_dir(train.path()).unwrap();
        let val_ds = XrayDataset::from_dir(val.path()).unwrap();

        let mut config = tiny_config(run.path());
        config.epochs = 3;
        let mut trainer = Trainer::<AB>::new(config, 2, Default::default()).unwrap();

        // Seed the stopper with a loss no real epoch can beat: the first
        // epoch stalls, exhausting the patience of 1, and the pre-placed
        // snapshot must come back as the live model.
        trainer.early_stopping.observe(0.0);
        let snapshot = trainer.model.clone();
        trainer.best_model = Some(snapshot.clone());

        trainer.fit(&train_ds, &val_ds).unwrap();

        assert_eq!(trainer.history.len(), 1);
        assert!(trainer.best_model.is_none());

        // The optimizer stepped during the epoch, so only restoration can
        // make the live model reproduce the snapshot's outputs.
        let device = Default::default();
        let x = Tensor::<NdArray, 4>::ones([1, 3, 16, 16], &device);
        let expected = snapshot.valid().forward(x.clone()).into_data();
        let actual = trainer.model.valid().forward(x).into_data();
        expected.assert_approx_eq(&actual, 5);
    }

    #[test]
    fn checkpoint_writes_model_and_metadata() {
        let run = TempDir::new().unwrap();
        let config = tiny_config(run.path());
        let trainer = Trainer::<AB>::new(config, 2, Default::default()).unwrap();
        trainer.save_checkpoint("best").unwrap();

        assert!(run.path().join("best").join("model.bin").is_file());
        assert!(run.path().join("best").join("config.json").is_file());
    }
}
