use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::catalog::ArchiveSource;
use crate::error::DatakeepError;

pub trait Downloader: Send + Sync {
    /// Fetches `source` into the file at `destination`, overwriting it.
    fn fetch(&self, source: &ArchiveSource, destination: &Path) -> Result<(), DatakeepError>;
}

#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, DatakeepError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("datakeep/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DatakeepError::Http(err.to_string()))?,
        );
        // Archives run to several gigabytes; only bound the connect phase.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| DatakeepError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, DatakeepError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::debug!(url, status, attempt, "retrying download");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && (err.is_timeout() || err.is_connect()) {
                        tracing::debug!(url, error = %err, attempt, "retrying download");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(DatakeepError::Http(err.to_string()));
                }
            }
        }
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, source: &ArchiveSource, destination: &Path) -> Result<(), DatakeepError> {
        let mut response = self.send_with_retries(&source.url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(DatakeepError::HttpStatus { status, message });
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| DatakeepError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| DatakeepError::Http(format!("{}: {err}", source.url)))?;
        Ok(())
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}
