use std::{
    io::Write,
    path::Path,
    sync::Arc,
};

use futures_util::StreamExt;
use reqwest::Client;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::errors::FerryError;

/// Called with `(bytes downloaded so far, content length if known)`.
pub type FetchProgress = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Downloads remote files into local paths, one attempt each.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    on_progress: FetchProgress,
}

impl Fetcher {
    /// A fetcher that rewrites a plain progress line on standard output.
    pub fn new() -> Self {
        Fetcher::with_progress(Arc::new(|downloaded, total| {
            let mut out = std::io::stdout();
            let _ = match total {
                Some(total) => write!(out, "\r{downloaded} / {total} bytes"),
                None => write!(out, "\r{downloaded} bytes"),
            };
            let _ = out.flush();
        }))
    }

    pub fn with_progress(on_progress: FetchProgress) -> Self {
        Fetcher::with_client(Client::new(), on_progress)
    }

    pub fn with_client(client: Client, on_progress: FetchProgress) -> Self {
        Fetcher {
            client,
            on_progress,
        }
    }

    /// Streams `url` into `destination`, creating or truncating it.
    /// Returns the number of bytes written.
    ///
    /// The destination is only created once the server has answered with a
    /// success status. Progress is reported per chunk, then once more as
    /// `(n, Some(n))` when the body is on disk.
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FerryError> {
        log::info!("Fetching {} -> {}", url, destination.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(url, e))?;

        if !response.status().is_success() {
            return Err(FerryError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_length = response.content_length();
        let mut file = File::create(destination)
            .await
            .map_err(|e| FerryError::io(destination, e))?;

        let mut downloaded = 0u64;
        let mut bytes_stream = response.bytes_stream();
        while let Some(data) = bytes_stream.next().await {
            let bytes = data.map_err(|e| network(url, e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| FerryError::io(destination, e))?;
            downloaded += bytes.len() as u64;
            (self.on_progress)(downloaded, content_length);
        }

        file.flush()
            .await
            .map_err(|e| FerryError::io(destination, e))?;
        (self.on_progress)(downloaded, Some(downloaded));

        log::info!("Fetched {} ({} bytes)", destination.display(), downloaded);
        Ok(downloaded)
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Fetcher::new()
    }
}

fn network(url: &str, source: reqwest::Error) -> FerryError {
    FerryError::Network {
        url: url.to_string(),
        source,
    }
}
