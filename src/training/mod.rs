pub mod class_weights;
pub mod config;
pub mod early_stopping;
pub mod history;
pub mod trainer;

pub use class_weights::ClassWeights;
pub use config::PipelineConfig;
pub use early_stopping::{EarlyStopping, Verdict};
pub use history::{EpochRecord, TrainingHistory};
pub use trainer::Trainer;
