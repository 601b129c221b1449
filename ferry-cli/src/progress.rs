use std::{sync::Arc, time::Duration};

use ferry_core::fetch::FetchProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(200);

/// Sets up `pretty_env_logger` behind `indicatif-log-bridge`, so log lines
/// are held back while a progress bar redraws. Defaults to `info`.
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            builder.filter_level(log::LevelFilter::Info);
        }
    }
    let logger = builder.build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}

/// A download bar that follows whichever file the fetcher is on.
///
/// The bar clears itself when a file is fully fetched, so nothing ticks over
/// the upload tracker's line. The next fetch brings it back.
pub fn fetch_bar(multi: &MultiProgress) -> (ProgressBar, FetchProgress) {
    let bar = multi.add(ProgressBar::new(0));
    bar.set_style(
        ProgressStyle::with_template(
            "  fetch {wide_bar:.cyan/dim} {bytes}/{total_bytes} [{bytes_per_sec}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );
    bar.enable_steady_tick(TICK);

    let handle = bar.clone();
    let on_progress: FetchProgress = Arc::new(move |downloaded, total| {
        let done = total.map_or(false, |t| downloaded >= t);
        if handle.is_finished() {
            if done {
                return;
            }
            handle.reset();
            handle.enable_steady_tick(TICK);
        }
        if let Some(total) = total {
            handle.set_length(total);
        }
        handle.set_position(downloaded);
        if done {
            handle.finish_and_clear();
        }
    });
    (bar, on_progress)
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    #[test]
    fn test_fetch_bar_clears_between_files() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let (bar, on_progress) = fetch_bar(&multi);

        on_progress(10, Some(40));
        assert!(!bar.is_finished());
        assert_eq!(bar.position(), 10);
        assert_eq!(bar.length(), Some(40));

        on_progress(40, Some(40));
        assert!(bar.is_finished());
        on_progress(40, Some(40));
        assert!(bar.is_finished());

        on_progress(5, None);
        assert!(!bar.is_finished());
        assert_eq!(bar.position(), 5);
        on_progress(8, Some(8));
        assert!(bar.is_finished());
    }
}
