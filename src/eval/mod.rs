pub mod confusion;
pub mod evaluator;
pub mod plots;
pub mod predictor;

pub use confusion::ConfusionMatrix;
pub use evaluator::{Evaluation, Evaluator};
pub use plots::{render_confusion_heatmap, render_history};
pub use predictor::{render_prediction_grid, SamplePrediction, SamplePredictor};
