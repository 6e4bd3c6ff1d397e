use clap::Parser;

use log::{error, info};
use std::process::ExitCode;

use yolo_augment::{augment_dataset, Args};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.dataset_root.is_dir() {
        error!(
            "The specified dataset_root does not exist: {}",
            args.dataset_root.display()
        );
        return ExitCode::FAILURE;
    }

    let config = match args.to_augment_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Augmenting {} (splits: {}, {} variants per image, seed {})",
        config.dataset_root.display(),
        config.splits.join(", "),
        config.variants,
        config.seed
    );

    match augment_dataset(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Augmentation stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
