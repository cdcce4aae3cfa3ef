use crate::model::blocks::{ConvBlock, ResidualBlock};
use burn::prelude::*;

/// Number of freezable units: the stem plus four downsampling stages.
pub const NUM_STAGES: usize = 5;

#[derive(Module, Debug)]
struct Stage<B: Backend> {
    down: ConvBlock<B>,
    block: ResidualBlock<B>,
}

impl<B: Backend> Stage<B> {
    fn new(device: &B::Device, in_channels: usize, out_channels: usize) -> Self {
        Self {
            down: ConvBlock::new(device, in_channels, out_channels, 3, 2),
            block: ResidualBlock::new(device, out_channels),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.block.forward(self.down.forward(x))
    }
}

/// Convolutional feature extractor over 224x224x3 input.
///
/// `freeze_from` marks the fine-tuning boundary: the activation leaving the
/// last frozen unit is detached, so every parameter before the boundary is
/// excluded from gradient updates while later stages and the head adapt to
/// the new domain.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stem: ConvBlock<B>,
    stage1: Stage<B>,
    stage2: Stage<B>,
    stage3: Stage<B>,
    stage4: Stage<B>,
    freeze_from: usize,
}

impl<B: Backend> Backbone<B> {
    /// `trainable_stages` counts units from the top of the network; the
    /// remaining `NUM_STAGES - trainable_stages` units are frozen.
    pub fn new(device: &B::Device, trainable_stages: usize) -> Self {
        let trainable = trainable_stages.min(NUM_STAGES);
        Self {
            stem: ConvBlock::new(device, 3, 32, 3, 2), // 224 -> 112
            stage1: Stage::new(device, 32, 64),        // 112 -> 56
            stage2: Stage::new(device, 64, 128),       // 56 -> 28
            stage3: Stage::new(device, 128, 256),      // 28 -> 14
            stage4: Stage::new(device, 256, 512),      // 14 -> 7
            freeze_from: NUM_STAGES - trainable,
        }
    }

    pub const fn out_channels(&self) -> usize {
        512
    }

    pub fn frozen_stages(&self) -> usize {
        self.freeze_from
    }

    /// Detaches the activation leaving the last frozen unit, cutting the
    /// gradient path to everything before it.
    fn freeze_boundary(&self, x: Tensor<B, 4>, unit: usize) -> Tensor<B, 4> {
        if self.freeze_from == unit {
            x.detach()
        } else {
            x
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.freeze_boundary(self.stem.forward(x), 1);
        let x = self.freeze_boundary(self.stage1.forward(x), 2);
        let x = self.freeze_boundary(self.stage2.forward(x), 3);
        let x = self.freeze_boundary(self.stage3.forward(x), 4);
        self.freeze_boundary(self.stage4.forward(x), 5)
    }
}
