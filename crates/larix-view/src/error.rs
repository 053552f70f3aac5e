use std::error::Error as _;
use thiserror::Error;

pub type ViewResult<T> = Result<T, ViewError>;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("View [{0}] not found")]
    NotFound(String),

    #[error("Template compilation failed in [{name}]: {message}")]
    Compile { name: String, message: String },

    #[error("Rendering [{name}] failed: {message}")]
    Render { name: String, message: String },

    #[error("Unknown component [{0}]")]
    UnknownComponent(String),

    #[error("Invalid view configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ViewError {
    pub fn compile(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            name: name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn from_tera(name: &str, error: tera::Error) -> Self {
        Self::Render {
            name: name.to_string(),
            message: tera_message(&error),
        }
    }
}

/// A tera error and its sources as one message
pub(crate) fn tera_message(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<ViewError> for larix_http::HttpError {
    fn from(error: ViewError) -> Self {
        match error {
            ViewError::NotFound(name) => larix_http::HttpError::not_found(format!("view [{}]", name)),
            other => larix_http::HttpError::internal(other.to_string()),
        }
    }
}
