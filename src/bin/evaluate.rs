use burn::backend::NdArray;
use clap::Parser;

use xray_pneumonia::data::{Label, XrayDataset};
use xray_pneumonia::eval::Evaluator;
use xray_pneumonia::model::XrayClassifier;
use xray_pneumonia::training::PipelineConfig;

type MyBackend = NdArray;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate a trained checkpoint on the validation split")]
struct Args {
    /// Path to the pipeline config
    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: String,

    /// Checkpoint to load (the trainer writes runs/<dir>/best/model.bin)
    #[arg(short, long, default_value = "runs/xray/best/model")]
    weights: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = PipelineConfig::from_yaml(&args.config)
        .unwrap_or_else(|_| PipelineConfig::default());

    let val = XrayDataset::from_dir(config.val_root())?;
    println!("Validation split: {} images", val.len());

    let device = Default::default();
    let model = XrayClassifier::<MyBackend>::new(&device, val.num_classes(), config.trainable_stages)?
        .load_file(args.weights.as_ref(), &device)?;

    let evaluator = Evaluator::new(config.batch_size, config.img_size);
    let heatmap = config.run_dir.join("confusion.png");
    let evaluation = evaluator.evaluate_and_render(&model, &val, &device, &heatmap)?;

    println!("\n{}", evaluation.confusion);
    println!("Row-normalized:");
    let normalized = evaluation.confusion.normalized();
    for truth in Label::ALL {
        let row = normalized[truth.index()];
        println!("  true {truth:>10}: [{:.3}, {:.3}]", row[0], row[1]);
    }
    println!("\nAccuracy: {:.4}", evaluation.accuracy);
    println!("Heatmap written to {}", heatmap.display());
    Ok(())
}
