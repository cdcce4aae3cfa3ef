pub mod dataloader;
pub mod dataset;
pub mod download;
pub mod transforms;

pub use dataloader::{XrayBatch, XrayDataLoader};
pub use dataset::{Label, XrayDataset};
pub use download::fetch_dataset;
pub use transforms::{render_augmentation_grid, AugmentConfig, Augmentation};
