#[macro_use]
extern crate prettytable;
use clap::Parser;
use commands::{handle_run, handle_upload, Commands, DEFAULT_SCHEDULE};
use dotenv::dotenv;
use ferry_core::config::Config;
use ferry_store::{connect, models::MultipartStore, StoreSettings};
use std::{process, sync::Arc};

pub mod commands;
pub mod progress;

/// Moves monthly trip record files into an S3 bucket.
///
/// With no command, runs the built-in schedule (green 2019 and 2020).
#[derive(Parser)]
#[clap(name = "ferry")]
struct Ferry {
    #[clap(subcommand)]
    commands: Option<Commands>,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let multi = progress::init_logger();

    let ferry = Ferry::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let store: Arc<dyn MultipartStore> = match connect(&StoreSettings::from_env()).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    let successful = match ferry.commands {
        None => {
            let schedule = DEFAULT_SCHEDULE
                .iter()
                .map(|(dataset, year)| (dataset.to_string(), *year))
                .collect();
            handle_run(schedule, false, config, store, &multi)
                .await
                .is_ok()
        }
        Some(Commands::Run {
            dataset,
            years,
            keep_going,
        }) => {
            let schedule = years.into_iter().map(|year| (dataset.clone(), year)).collect();
            handle_run(schedule, keep_going, config, store, &multi)
                .await
                .is_ok()
        }
        Some(Commands::Upload { file, key, prefix }) => {
            handle_upload(file, key, prefix, config, store).await.is_ok()
        }
    };

    if !successful {
        process::exit(1);
    }
}
