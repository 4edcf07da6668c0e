//! HTTP client used to fetch installers
//!
//! Streams a response body to disk and reports progress as it goes. Only the
//! initial request is retried; a body that fails mid-stream is abandoned and
//! the partial file removed.

use futures::TryStreamExt;
use rust_i18n::t;
use std::time::Duration;
use tokio::{fs::File, io::AsyncWriteExt};

use super::{
    error::{HttpError, HttpResult},
    types::{DownloadRequest, Progress, ProgressState},
};

/// HTTP client implementation with streaming download support
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Creates a new HTTP client instance
    pub fn new() -> HttpResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client })
    }

    /// Downloads `request.url` into `request.save_path`.
    ///
    /// `on_progress` receives an `InProgress` update every time the whole
    /// percentage changes, and exactly one `Complete` at the end. Returns the
    /// number of bytes written. An empty body is an error and leaves no file
    /// behind.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> HttpResult<u64> {
        let response = self.execute_with_retry(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }

        if let Some(parent) = request.save_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let total_size = response.content_length().filter(|len| *len > 0);
        let mut file = File::create(&request.save_path).await?;

        let written = Self::write_body(response, &mut file, total_size, on_progress)
            .await
            .and_then(|downloaded| {
                if downloaded == 0 {
                    Err(HttpError::Response(t!("http.empty_body").to_string()))
                } else {
                    Ok(downloaded)
                }
            });

        match written {
            Ok(downloaded) => {
                file.flush().await?;
                drop(file);

                on_progress(Progress {
                    state: ProgressState::Complete,
                    bytes_processed: downloaded,
                    total_bytes: total_size,
                });
                Ok(downloaded)
            }
            Err(e) => {
                drop(file);
                if let Err(remove_err) = tokio::fs::remove_file(&request.save_path).await {
                    log::warn!(
                        "Failed to remove partial download {:?}: {}",
                        request.save_path,
                        remove_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_body(
        response: reqwest::Response,
        file: &mut File,
        total_size: Option<u64>,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> HttpResult<u64> {
        let mut downloaded: u64 = 0;
        let mut last_state: Option<ProgressState> = None;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.try_next().await.map_err(|e| {
            HttpError::Response(t!("http.download_failed", error = e.to_string()).to_string())
        })? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            let state = match total_size {
                Some(total) => ProgressState::InProgress((downloaded.min(total) * 100 / total) as u8),
                None => ProgressState::Unknown,
            };

            if last_state != Some(state) {
                on_progress(Progress {
                    state,
                    bytes_processed: downloaded,
                    total_bytes: total_size,
                });
                last_state = Some(state);
            }
        }

        Ok(downloaded)
    }

    /// Sends the request, retrying transient failures per the request's policy
    async fn execute_with_retry(&self, request: &DownloadRequest) -> HttpResult<reqwest::Response> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let mut builder = self.client.get(&request.url);
            if let Some(timeout) = request.timeout.filter(|t| *t > 0) {
                builder = builder.timeout(Duration::from_secs(timeout));
            }

            log::debug!("Requesting {} (attempt {})", request.url, attempts);

            match builder.send().await {
                Ok(response) if response.status().is_server_error()
                    && attempts <= request.retry_policy.max_retries =>
                {
                    log::warn!(
                        "Server error {} from {}, retrying",
                        response.status(),
                        request.url
                    );
                    tokio::time::sleep(request.retry_policy.get_delay(attempts - 1)).await;
                }
                Ok(response) => return Ok(response),
                Err(e) if request.retry_policy.should_retry(attempts, &e) => {
                    log::warn!("Request failed, retrying: {:?}", e);
                    tokio::time::sleep(request.retry_policy.get_delay(attempts - 1)).await;
                }
                Err(e) => return Err(HttpError::from(e)),
            }
        }
    }
}
