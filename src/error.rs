use serde::Serialize;
use thiserror::Error;

/// The single, unified error type for the entire crate.
///
/// This enum wraps all module-specific errors so callers get one type to
/// propagate and one JSON shape to report. The
/// `#[serde(tag = "module", content = "details")]` attribute keeps that
/// shape predictable.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "module", content = "details")]
pub enum AppError {
    /// Errors originating from the HTTP module.
    #[error(transparent)]
    Http(#[from] crate::http::HttpError),

    #[error(transparent)]
    Updater(#[from] crate::updater::UpdateError),

    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),

    #[error("{message}")]
    General { message: String },
}

impl AppError {
    /// JSON form with the display message added next to the details
    pub fn to_json(&self) -> serde_json::Value {
        let message = self.to_string();
        match serde_json::to_value(self) {
            Ok(mut value) => {
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("message".to_string(), serde_json::Value::String(message));
                }
                value
            }
            Err(e) => serde_json::json!({
                "module": "Internal",
                "details": {
                    "kind": "SerializationFailed",
                    "message": format!("Failed to serialize error: {}", e)
                },
                "message": message
            }),
        }
    }
}

impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.to_json().to_string()
    }
}

/// A universal Result type for fallible crate-level operations.
pub type Result<T> = std::result::Result<T, AppError>;
