//! Installer transport
//!
//! A thin reqwest wrapper that downloads a file with progress reporting.

mod client;
mod error;
mod types;

pub use client::HttpClient;
pub use error::{HttpError, HttpResult};
pub use types::{DownloadRequest, Progress, ProgressState, RetryPolicy};
