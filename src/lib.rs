pub mod data;
pub mod eval;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use data::{Augmentation, Label, XrayBatch, XrayDataLoader, XrayDataset};
pub use eval::{ConfusionMatrix, Evaluator, SamplePredictor};
pub use model::{Backbone, Head, XrayClassifier};
pub use training::{ClassWeights, EarlyStopping, PipelineConfig, Trainer, TrainingHistory};
