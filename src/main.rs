#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]

use clap::Parser;
use clashgen::cli::Args;
use clashgen::generator::{Generator, GeneratorConfig};
use tracing::Level;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let is_verbose = args.verbose;
    tracing_subscriber::fmt()
        .with_max_level(if is_verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path_or_url) => {
            tracing::info!("Loading generator config from: {}", path_or_url);
            GeneratorConfig::load(path_or_url).await?
        }
        None => GeneratorConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;

    let generator = Generator::new(config)?;
    generator.generate_to_file(None).await?;

    tracing::info!("Config generation complete!");
    Ok(())
}
