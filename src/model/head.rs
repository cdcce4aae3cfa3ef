use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;

/// Classification head: global average pooling over the spatial grid, light
/// dropout, then a dense projection to one logit per class.
#[derive(Module, Debug)]
pub struct Head<B: Backend> {
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> Head<B> {
    pub fn new(device: &B::Device, in_channels: usize, num_classes: usize) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(0.2).init(),
            fc: LinearConfig::new(in_channels, num_classes).init(device),
            num_classes,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(x);
        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(x);
        self.fc.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn maps_features_to_class_logits() {
        let device = Default::default();
        let head = Head::<B>::new(&device, 512, 2);
        let x = Tensor::<B, 4>::zeros([3, 512, 7, 7], &device);
        assert_eq!(head.forward(x).dims(), [3, 2]);
    }
}
