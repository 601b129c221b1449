use std::{path::PathBuf, sync::Arc};

use clap::Subcommand;
use ferry_core::{
    config::{Config, ErrorPolicy},
    fetch::Fetcher,
    pipeline::{PeriodOutcome, Pipeline, RunReport},
    upload::Uploader,
};
use ferry_store::models::MultipartStore;
use indicatif::MultiProgress;
use prettytable::Table;

use crate::progress::fetch_bar;

/// Dataset/year pairs moved when no command is given.
pub const DEFAULT_SCHEDULE: &[(&str, u16)] = &[("green", 2019), ("green", 2020)];

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, recompress and upload every month of the given years
    Run {
        /// Dataset tag, e.g. green, yellow, fhv
        #[clap(value_parser)]
        dataset: String,
        #[clap(value_parser, required = true)]
        years: Vec<u16>,
        /// Carry on with the next month when one fails and print a summary
        #[clap(long, action)]
        keep_going: bool,
    },
    /// Upload a single local file
    Upload {
        #[clap(value_parser)]
        file: PathBuf,
        /// Object key below the prefix (defaults to the file name)
        #[clap(long, value_parser)]
        key: Option<String>,
        /// Key prefix (defaults to FERRY_PREFIX or trip-data)
        #[clap(long, value_parser)]
        prefix: Option<String>,
    },
}

pub async fn handle_run(
    schedule: Vec<(String, u16)>,
    keep_going: bool,
    mut config: Config,
    store: Arc<dyn MultipartStore>,
    multi: &MultiProgress,
) -> Result<(), ()> {
    if keep_going {
        config.error_policy = ErrorPolicy::Continue;
    }

    let (bar, on_progress) = fetch_bar(multi);
    let pipeline = Pipeline::new(config, store).with_fetcher(Fetcher::with_progress(on_progress));

    let result = pipeline.run(&schedule).await;
    bar.finish_and_clear();

    match result {
        Ok(report) => {
            print_report(&report);
            if report.is_success() {
                Ok(())
            } else {
                log::error!("{} of {} periods failed", report.failed(), report.periods.len());
                Err(())
            }
        }
        Err(e) => {
            log::error!("{}", e);
            Err(())
        }
    }
}

pub async fn handle_upload(
    file: PathBuf,
    key: Option<String>,
    prefix: Option<String>,
    config: Config,
    store: Arc<dyn MultipartStore>,
) -> Result<(), ()> {
    let key = match key.or_else(|| {
        file.file_name()
            .map(|name| name.to_string_lossy().to_string())
    }) {
        Some(key) => key,
        None => {
            log::error!("{} has no file name, pass --key", file.display());
            return Err(());
        }
    };
    let prefix = prefix.unwrap_or_else(|| config.prefix.clone());

    let uploader = Uploader::new(store, config.transfer);
    match uploader
        .upload(&config.bucket, &file, &key, Some(&prefix))
        .await
    {
        Ok(report) => {
            println!(
                "Uploaded {} bytes to s3://{}/{} ({} part(s))",
                report.bytes, config.bucket, report.key, report.parts
            );
            Ok(())
        }
        Err(e) => {
            log::error!("{}", e);
            Err(())
        }
    }
}

fn print_report(report: &RunReport) {
    if report.periods.is_empty() {
        println!("Nothing to do.");
        return;
    }

    let mut table = Table::new();
    table.add_row(row!["Period", "Status", "Detail"]);
    for period in &report.periods {
        match &period.outcome {
            PeriodOutcome::Uploaded(upload) => {
                table.add_row(row![
                    period.period,
                    "uploaded",
                    format!("{} ({} bytes)", upload.key, upload.bytes)
                ]);
            }
            PeriodOutcome::Failed(failure) => {
                table.add_row(row![
                    period.period,
                    format!("failed after {}", failure.stage),
                    failure.error
                ]);
            }
        }
    }
    table.printstd();
}
