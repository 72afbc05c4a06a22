use thiserror::Error;

#[derive(Error, Debug)]
pub enum FocuscamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error on device {device}: {details}")]
    Camera { device: u32, details: String },

    #[error("Detection error: {details}")]
    Detection { details: String },

    #[error("Session '{id}' already exists")]
    SessionExists { id: String },

    #[error("Session '{id}' not found")]
    SessionNotFound { id: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl FocuscamError {
    pub fn camera<S: Into<String>>(device: u32, details: S) -> Self {
        Self::Camera {
            device,
            details: details.into(),
        }
    }

    pub fn detection<S: Into<String>>(details: S) -> Self {
        Self::Detection {
            details: details.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FocuscamError>;
