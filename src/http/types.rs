//! HTTP Types and Configurations
//!
//! Defines the types used by the installer download client: the download
//! request, retry policy and progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Retry policy configuration for failed requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub initial_delay: f32,
    /// Maximum retry delay in seconds
    pub max_delay: f32,
    /// Multiplier for exponential backoff
    pub backoff_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: 1.0,
            max_delay: 30.0,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that sends each request exactly once
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Determines if a request should be retried based on the attempt count and error
    pub fn should_retry(&self, attempt: u32, error: &reqwest::Error) -> bool {
        if attempt > self.max_retries {
            return false;
        }

        error.is_timeout()
            || error.is_connect()
            || error.status().map_or(false, |s| s.is_server_error())
    }

    /// Calculates the delay duration for the next retry attempt
    pub fn get_delay(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f32(delay.min(self.max_delay).max(0.0))
    }
}

/// Progress tracking states for file operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    /// Server did not announce a content length
    Unknown,
    /// Operation in progress with percentage
    InProgress(u8),
    /// Operation completed successfully
    Complete,
}

/// Progress information for file operations
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Current progress state
    pub state: ProgressState,
    /// Number of bytes processed
    pub bytes_processed: u64,
    /// Total number of bytes (if known)
    pub total_bytes: Option<u64>,
}

impl Progress {
    /// Percentage suitable for a progress bar, `None` while it cannot be known
    pub fn percent(&self) -> Option<u8> {
        match self.state {
            ProgressState::InProgress(p) => Some(p),
            ProgressState::Complete => Some(100),
            ProgressState::Unknown => None,
        }
    }
}

/// A file download request
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Where the body is written
    pub save_path: PathBuf,
    /// Total timeout in seconds, `None` means no timeout
    pub timeout: Option<u64>,
    /// Retry policy for the initial request
    pub retry_policy: RetryPolicy,
}

impl DownloadRequest {
    /// Creates a download request with the default retry policy and no timeout
    pub fn new(url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            save_path: save_path.into(),
            timeout: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sets the total request timeout in seconds
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Sets the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.get_delay(0), Duration::from_secs(1));
        assert_eq!(policy.get_delay(1), Duration::from_secs(2));
        assert_eq!(policy.get_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn test_progress_percent() {
        let progress = Progress {
            state: ProgressState::InProgress(42),
            bytes_processed: 42,
            total_bytes: Some(100),
        };
        assert_eq!(progress.percent(), Some(42));

        let unknown = Progress {
            state: ProgressState::Unknown,
            bytes_processed: 42,
            total_bytes: None,
        };
        assert_eq!(unknown.percent(), None);
    }
}
