use std::path::PathBuf;
use thiserror::Error;

use crate::registry::DocumentStatus;

#[derive(Error, Debug)]
pub enum DocflowError {
    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Document {id} is '{status}', cannot {operation}")]
    InvalidState {
        id: String,
        status: DocumentStatus,
        operation: &'static str,
    },

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Document {id} is inconsistent: {reason}")]
    Inconsistent { id: String, reason: String },

    #[error("No extracted information for document {id}")]
    NoExtractedInfo { id: String },

    #[error("Job runner is shutting down")]
    ShuttingDown,
}

impl DocflowError {
    pub fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Failed to resolve secret: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source file not found: {0}")]
    SourceMissing(PathBuf),
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to start converter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Converter I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Converter exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("Converter produced no output")]
    EmptyOutput,

    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction is not configured: {0}")]
    NotConfigured(String),

    #[error("Extraction request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Extraction provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Extraction response was malformed: {0}")]
    MalformedResponse(String),

    #[error("Extraction failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode registry snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Registry snapshot at {location} is corrupt: {reason}")]
    Corrupt { location: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, DocflowError>;
