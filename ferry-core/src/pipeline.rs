use std::{fmt, sync::Arc};

use ferry_store::models::MultipartStore;

use crate::{
    config::{Config, ErrorPolicy},
    errors::FerryError,
    fetch::Fetcher,
    period::Period,
    recompress::recompress_gzip,
    scratch::ScratchFile,
    upload::{UploadReport, Uploader},
};

/// How far a period got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Fetched,
    Recompressed,
    Uploaded,
    Cleaned,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Fetched => "fetched",
            Stage::Recompressed => "recompressed",
            Stage::Uploaded => "uploaded",
            Stage::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// A period that stopped early. `stage` is the last stage it completed.
#[derive(Debug)]
pub struct PeriodFailure {
    pub stage: Stage,
    pub error: FerryError,
}

#[derive(Debug)]
pub enum PeriodOutcome {
    Uploaded(UploadReport),
    Failed(PeriodFailure),
}

#[derive(Debug)]
pub struct PeriodReport {
    pub period: Period,
    pub outcome: PeriodOutcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub periods: Vec<PeriodReport>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.periods
            .iter()
            .filter(|p| matches!(p.outcome, PeriodOutcome::Failed(_)))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn merge(&mut self, other: RunReport) {
        self.periods.extend(other.periods);
    }
}

/// Moves every month of a dataset from the source host into the bucket:
/// fetch, recompress, upload, clean up, one period after another.
pub struct Pipeline {
    config: Config,
    fetcher: Fetcher,
    uploader: Uploader,
}

impl Pipeline {
    pub fn new(config: Config, store: Arc<dyn MultipartStore>) -> Self {
        let uploader = Uploader::new(store, config.transfer);
        Pipeline {
            config,
            fetcher: Fetcher::new(),
            uploader,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs each `(dataset, year)` pair in order.
    pub async fn run(&self, schedule: &[(String, u16)]) -> Result<RunReport, FerryError> {
        let mut report = RunReport::default();
        for (dataset, year) in schedule {
            report.merge(self.run_year(dataset, *year).await?);
        }
        Ok(report)
    }

    /// Runs the twelve months of `year`.
    ///
    /// Under [`ErrorPolicy::Halt`] the first failed period ends the run with
    /// its error. Under [`ErrorPolicy::Continue`] failures are recorded in the
    /// report and the next month starts.
    pub async fn run_year(&self, dataset: &str, year: u16) -> Result<RunReport, FerryError> {
        let mut report = RunReport::default();
        for period in Period::months(dataset, year)? {
            let outcome = match self.run_period(&period).await {
                Ok(upload) => PeriodOutcome::Uploaded(upload),
                Err(failure) => {
                    log::error!(
                        "{} failed after stage '{}': {}",
                        period,
                        failure.stage,
                        failure.error
                    );
                    if self.config.error_policy == ErrorPolicy::Halt {
                        return Err(failure.error);
                    }
                    PeriodOutcome::Failed(failure)
                }
            };
            report.periods.push(PeriodReport { period, outcome });
        }
        Ok(report)
    }

    /// Runs one period. Both local files are removed before this returns,
    /// whichever stage failed.
    pub async fn run_period(&self, period: &Period) -> Result<UploadReport, PeriodFailure> {
        let raw = ScratchFile::new(self.config.work_dir.join(period.raw_file_name()));
        let compressed = ScratchFile::new(self.config.work_dir.join(period.compressed_file_name()));

        let mut stage = Stage::Pending;
        let result = self.advance(period, &raw, &compressed, &mut stage).await;

        drop(raw);
        drop(compressed);
        log::info!("{}: {}", period, Stage::Cleaned);

        result.map_err(|error| PeriodFailure { stage, error })
    }

    async fn advance(
        &self,
        period: &Period,
        raw: &ScratchFile,
        compressed: &ScratchFile,
        stage: &mut Stage,
    ) -> Result<UploadReport, FerryError> {
        let url = period.source_url(&self.config.source_host);
        self.fetcher.fetch(&url, raw.path()).await?;
        *stage = Stage::Fetched;
        log::info!("{}: {}", period, stage);

        recompress_gzip(raw.path().to_path_buf(), compressed.path().to_path_buf()).await?;
        *stage = Stage::Recompressed;
        log::info!("{}: {}", period, stage);

        let upload = self
            .uploader
            .upload(
                &self.config.bucket,
                compressed.path(),
                &period.compressed_file_name(),
                Some(&self.config.prefix),
            )
            .await?;
        *stage = Stage::Uploaded;
        log::info!("{}: {}", period, stage);

        Ok(upload)
    }
}
