use thiserror::Error;

#[derive(Error, Debug)]
pub enum MendError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot reach {service} while trying to {operation}: {message}")]
    Connectivity {
        service: &'static str,
        operation: String,
        message: String,
    },

    #[error("{service} request to {operation} failed with status {status}: {message}")]
    Api {
        service: &'static str,
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{kind} '{name}' not found{}", known_hint(.known))]
    NotFound {
        kind: &'static str,
        name: String,
        known: Vec<String>,
    },

    #[error("Timed out after {waited_secs}s waiting for {job_name} #{build_number} (the build is still running remotely)")]
    Timeout {
        job_name: String,
        build_number: u64,
        waited_secs: u64,
    },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Failed to apply fix to {path}: {message}")]
    Apply { path: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn known_hint(known: &[String]) -> String {
    if known.is_empty() {
        String::new()
    } else {
        format!(" (known: {})", known.join(", "))
    }
}

impl MendError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
            known: Vec::new(),
        }
    }

    /// Wraps a transport failure with the service and operation it interrupted.
    pub fn connectivity(
        service: &'static str,
        operation: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Connectivity {
            service,
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, MendError>;
