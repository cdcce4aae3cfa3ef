use anyhow::Result;
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::softmax;
use std::path::Path;

use crate::data::Label;
use crate::model::backbone::Backbone;
use crate::model::head::Head;

/// Backbone plus classification head. Construction validates the class count
/// up front so a dataset with an unexpected label set fails before any
/// training state exists.
#[derive(Module, Debug)]
pub struct XrayClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: Head<B>,
}

impl<B: Backend> XrayClassifier<B> {
    pub fn new(device: &B::Device, num_classes: usize, trainable_stages: usize) -> Result<Self> {
        if num_classes != Label::COUNT {
            return Err(anyhow::anyhow!(
                "classifier expects exactly {} classes, got {}",
                Label::COUNT,
                num_classes
            ));
        }

        let backbone = Backbone::new(device, trainable_stages);
        let head = Head::new(device, backbone.out_channels(), num_classes);
        Ok(Self { backbone, head })
    }

    /// Raw logits `[n, 2]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        self.head.forward(features)
    }

    /// Softmax class probabilities `[n, 2]`.
    pub fn predict(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Replaces the backbone parameters with a previously recorded backbone,
    /// leaving the freshly initialized head in place. This is the transfer
    /// step: generic features come from the record, the head and the unfrozen
    /// stages adapt during fine-tuning.
    pub fn with_pretrained_backbone(mut self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| anyhow::anyhow!("failed to load pretrained backbone {}: {e:?}", path.display()))?;
        self.backbone = self.backbone.load_record(record);
        log::info!("loaded pretrained backbone from {}", path.display());
        Ok(self)
    }

    /// Loads a full classifier checkpoint recorded by the trainer.
    pub fn load_file(self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.to_path_buf(), device)
            .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e:?}", path.display()))?;
        Ok(self.load_record(record))
    }
}
