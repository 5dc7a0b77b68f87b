use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod catalog;
mod cli;
mod config;
mod recommend;
mod tmdb;

use config::Config;
use recommend::{PrecomputeOptions, Recommender, SnapshotStorage};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let base_path = args
        .data_dir
        .clone()
        .unwrap_or_else(config::default_base_path);
    let config = Config::load_with(&base_path);

    match args.command {
        cli::Command::Precompute { dataset } => {
            let items = catalog::load_dataset(&dataset)?;
            let embedder = recommend::embedder::from_config(&config.embedding, &base_path)?;
            let storage = SnapshotStorage::new(config.snapshot_dir());

            let options = PrecomputeOptions {
                alpha: config.alpha,
                beta: config.beta,
                batch_size: config.embedding.batch_size,
                show_progress: true,
            };
            let snapshot = recommend::pipeline::run(items, embedder.as_ref(), &storage, &options)?;

            println!(
                "indexed {} movies ({} dims, model '{}')",
                snapshot.len(),
                snapshot.dimensions(),
                embedder.model_name()
            );
            Ok(())
        }

        cli::Command::Recommend { title, top_k, json } => {
            let embedder: Arc<dyn recommend::TextEmbedder> =
                Arc::from(recommend::embedder::from_config(&config.embedding, &base_path)?);
            let storage = SnapshotStorage::new(config.snapshot_dir());
            let recommender = Recommender::load(
                embedder,
                &storage,
                config.alpha,
                config.beta,
                config.default_top_k,
            )
            .context("no usable snapshot; run `reelrec precompute` first")?;

            let movie = tmdb::TmdbClient::from_env()?.lookup(&title)?;
            log::info!("query movie: {} (tmdb id {})", movie.title, movie.id);

            let results = recommender.recommend(&movie.features(), top_k)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for (rank, rec) in results.iter().enumerate() {
                    println!("{:>3}. {:<48} {:.4}", rank + 1, rec.title, rec.score);
                }
            }
            Ok(())
        }

        cli::Command::Info {} => {
            let storage = SnapshotStorage::new(config.snapshot_dir());
            let info = storage
                .stat()
                .context("no snapshot found; run `reelrec precompute` first")?;

            println!("snapshot version: {}", info.version);
            println!("dimensions:       {}", info.dimensions);
            println!("vectors:          {}", info.vector_count);
            println!("items:            {}", info.item_count);
            if info.vector_count != info.item_count {
                println!("warning: vector/item counts disagree; snapshot will not load");
            }
            Ok(())
        }
    }
}
