use clap::Parser;
use xray_pneumonia::data::fetch_dataset;
use xray_pneumonia::training::PipelineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download and extract the chest X-ray dataset")]
struct Args {
    /// Path to the pipeline config
    #[arg(short, long, default_value = "configs/pipeline.yaml")]
    config: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = if std::path::Path::new(&args.config).exists() {
        PipelineConfig::from_yaml(&args.config)?
    } else {
        PipelineConfig::default()
    };

    println!("Fetching dataset into {}", config.data_root.display());
    fetch_dataset(&config)?;
    println!("Dataset ready:");
    println!("  train: {}", config.train_root().display());
    println!("  val:   {}", config.val_root().display());
    Ok(())
}
