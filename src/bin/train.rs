use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

use xray_pneumonia::data::{fetch_dataset, render_augmentation_grid, Augmentation, XrayDataset};
use xray_pneumonia::eval::render_history;
use xray_pneumonia::training::{PipelineConfig, Trainer};

type MyBackend = NdArray;
type MyAutodiffBackend = Autodiff<MyBackend>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fine-tune the pneumonia classifier")]
struct Args {
    /// Path to the pipeline config; created with defaults when missing
    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: String,

    /// Download the dataset archive first if the splits are missing
    #[arg(long)]
    fetch: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let config = if Path::new(&args.config).exists() {
        println!("Loading config from {}", args.config);
        PipelineConfig::from_yaml(&args.config)?
    } else {
        let config = PipelineConfig::default();
        if let Some(parent) = Path::new(&args.config).parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(&args.config)?;
        println!("Created default config at {}", args.config);
        config
    };

    println!("Training configuration:");
    println!("  data root:     {}", config.data_root.display());
    println!("  image size:    {0}x{0}", config.img_size);
    println!("  batch size:    {}", config.batch_size);
    println!("  learning rate: {}", config.learning_rate);
    println!("  epochs:        {}", config.epochs);
    println!("  patience:      {}", config.patience);
    println!("  run dir:       {}", config.run_dir.display());
    println!();

    if args.fetch {
        fetch_dataset(&config)?;
    }

    let train = XrayDataset::from_dir(config.train_root())?;
    let val = XrayDataset::from_dir(config.val_root())?;
    println!("Train split {}: {} images", train.root().display(), train.len());
    println!("Val split   {}: {} images\n", val.root().display(), val.len());

    let grid = config.run_dir.join("augmented_samples.png");
    render_augmentation_grid(
        &train,
        &Augmentation::new(config.augment.clone()),
        &mut StdRng::seed_from_u64(config.seed),
        config.sample_draws,
        config.img_size as u32,
        &grid,
    )?;
    println!("Augmented sample grid written to {}", grid.display());

    let device = Default::default();
    let mut trainer = Trainer::<MyAutodiffBackend>::new(config.clone(), train.num_classes(), device)?;

    let history = trainer.fit(&train, &val)?;
    history.save_json(config.run_dir.join("history.json"))?;
    render_history(history, &config.run_dir.join("curves.png"))?;

    if let Some(best) = history.best_epoch() {
        println!(
            "\nTraining finished. Best epoch {} (val_loss={:.4}, val_acc={:.3})",
            best.epoch, best.val_loss, best.val_accuracy
        );
    }
    println!("Checkpoints saved under {}", config.run_dir.display());
    Ok(())
}
