use burn::backend::NdArray;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use xray_pneumonia::data::XrayDataset;
use xray_pneumonia::eval::{render_prediction_grid, SamplePredictor};
use xray_pneumonia::model::XrayClassifier;
use xray_pneumonia::training::PipelineConfig;

type MyBackend = NdArray;

#[derive(Parser, Debug)]
#[command(author, version, about = "Show predictions for random validation images")]
struct Args {
    /// Path to the pipeline config
    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: String,

    /// Checkpoint to load
    #[arg(short, long, default_value = "runs/xray/best/model")]
    weights: String,

    /// Number of random draws (with replacement)
    #[arg(short, long)]
    draws: Option<usize>,

    /// Seed for the draw; omit for a different sample each run
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = PipelineConfig::from_yaml(&args.config)
        .unwrap_or_else(|_| PipelineConfig::default());
    let draws = args.draws.unwrap_or(config.sample_draws);

    let val = XrayDataset::from_dir(config.val_root())?;

    let device = Default::default();
    let model = XrayClassifier::<MyBackend>::new(&device, val.num_classes(), config.trainable_stages)?
        .load_file(args.weights.as_ref(), &device)?;

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut predictor = SamplePredictor::new(config.img_size, rng);
    let predictions = predictor.sample(&model, &val, draws, &device)?;

    println!("{:<40} {:>10} {:>10} {:>6}", "image", "true", "predicted", "conf");
    for p in &predictions {
        let name = p
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let marker = if p.is_correct() { "" } else { "  <-- miss" };
        println!(
            "{:<40} {:>10} {:>10} {:>5.2}{marker}",
            name, p.truth, p.predicted, p.confidence
        );
    }

    let correct = predictions.iter().filter(|p| p.is_correct()).count();
    println!("\n{correct}/{} correct", predictions.len());

    let grid = config.run_dir.join("predictions.png");
    render_prediction_grid(&predictions, 224, &grid)?;
    println!("Grid written to {}", grid.display());
    Ok(())
}
