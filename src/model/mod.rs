pub mod backbone;
pub mod blocks;
pub mod classifier;
pub mod head;

pub use backbone::Backbone;
pub use classifier::XrayClassifier;
pub use head::Head;
