// rust/rendezvous-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendezvousError {

    #[error("Invalid worker list '{input}': {message}")]
    Parse {
        input: String,
        message: String,
    },

    #[error("Requested {requested} processes but only {available} slots are available")]
    InsufficientSlots {
        requested: usize,
        available: usize,
    },

    #[error("Rendezvous endpoint has already been initialized with a plan")]
    AlreadyInitialized,

    #[error("Rendezvous endpoint has already been started on port {port}")]
    AlreadyStarted {
        port: u16,
    },

    #[error("Rendezvous endpoint has not been started")]
    NotStarted,

    #[error("Failed to start rendezvous endpoint on '{address}': {message}")]
    EndpointStart {
        address: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Discovery artifact error at '{path}': {message}")]
    ArtifactIo {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to remove discovery artifact '{path}'")]
    ArtifactCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Rendezvous client error: {message}")]
    Client {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, RendezvousError>;

// Convenience constructors
impl RendezvousError {

    pub fn parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            message: message.into(),
        }
    }

    pub fn insufficient_slots(requested: usize, available: usize) -> Self {
        Self::InsufficientSlots { requested, available }
    }

    pub fn endpoint_start(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::EndpointStart {
            address: address.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn artifact_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn artifact_io_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            source: None,
        }
    }

    pub fn client_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Client {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
