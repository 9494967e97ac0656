//! Error types for the enrichment framework

use super::types::ShapeError;

#[derive(Debug)]
pub enum ContainerError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    NamespaceExists(String),
    NamespaceNotFound(String),
    KeyNotFound {
        namespace: String,
        key: String,
        available: Vec<String>,
    },
    Shape(ShapeError),
}

impl From<rusqlite::Error> for ContainerError {
    fn from(err: rusqlite::Error) -> Self {
        ContainerError::Database(err)
    }
}

impl From<std::io::Error> for ContainerError {
    fn from(err: std::io::Error) -> Self {
        ContainerError::Io(err)
    }
}

impl From<ShapeError> for ContainerError {
    fn from(err: ShapeError) -> Self {
        ContainerError::Shape(err)
    }
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::Database(e) => write!(f, "Database error: {}", e),
            ContainerError::Io(e) => write!(f, "IO error: {}", e),
            ContainerError::NamespaceExists(name) => {
                write!(f, "Namespace already exists: {}", name)
            }
            ContainerError::NamespaceNotFound(name) => {
                write!(f, "Namespace not found: {}", name)
            }
            ContainerError::KeyNotFound {
                namespace,
                key,
                available,
            } => write!(
                f,
                "Key '{}' not found in namespace '{}' (available: {})",
                key,
                namespace,
                available.join(", ")
            ),
            ContainerError::Shape(e) => write!(f, "Stored array corrupt: {}", e),
        }
    }
}

impl std::error::Error for ContainerError {}

#[derive(Debug)]
pub enum StageError {
    /// A declared required value could not be resolved: the referenced stage
    /// is not applied, or the field/path is absent.
    MissingDependency { stage: String, key: String },
    /// The stage violated the declared-keys audit contract.
    ContractViolation(String),
    /// The input recording is unusable for the requested analysis.
    DataQuality(String),
    Container(ContainerError),
}

impl From<ContainerError> for StageError {
    fn from(err: ContainerError) -> Self {
        StageError::Container(err)
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::MissingDependency { stage, key } => {
                write!(f, "Missing dependency: {}.{} is not available", stage, key)
            }
            StageError::ContractViolation(detail) => {
                write!(f, "Stage contract violation: {}", detail)
            }
            StageError::DataQuality(detail) => write!(f, "Data quality error: {}", detail),
            StageError::Container(e) => write!(f, "Container error: {}", e),
        }
    }
}

impl std::error::Error for StageError {}

#[derive(Debug)]
pub enum ChainError {
    EmptyChain,
    Stage { stage: String, source: StageError },
    Container(ContainerError),
    Checkpoint(std::io::Error),
}

impl From<ContainerError> for ChainError {
    fn from(err: ContainerError) -> Self {
        ChainError::Container(err)
    }
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::EmptyChain => write!(f, "Chain requires at least one stage"),
            ChainError::Stage { stage, source } => {
                write!(f, "Stage '{}' failed: {}", stage, source)
            }
            ChainError::Container(e) => write!(f, "Container error: {}", e),
            ChainError::Checkpoint(e) => write!(f, "Checkpoint error: {}", e),
        }
    }
}

impl std::error::Error for ChainError {}
