//! Crate-wide error taxonomy.
//!
//! One variant per error kind named in the error handling design: transport,
//! routing, resource, overlay, storage and protocol failures each get their
//! own case rather than a single opaque string, so callers can match on the
//! kind instead of parsing messages.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChordError {
    // ---- transport ----
    #[error("failed to send message to {destination}: {source}")]
    SendFailure {
        destination: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("rpc to {destination} did not reply within {timeout_ms}ms")]
    TimerExpired { destination: String, timeout_ms: u64 },

    // ---- routing ----
    #[error("no successor found for key {key}")]
    NoSuccessorFound { key: String },
    #[error("no predecessor found")]
    NoPredecessorFound,

    // ---- resource ----
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },
    #[error("no free ports available")]
    NoFreePorts,
    #[error("port {port} is not a valid TCP port")]
    InvalidPort { port: u32 },
    #[error("attempted to free port {port} which was not in use")]
    FreeingUnusedPort { port: u16 },

    // ---- overlay ----
    #[error("node initialization failed after {attempts} attempts")]
    ImpossibleInit { attempts: u32 },
    #[error("publish of key {key} failed after {attempts} attempts")]
    ImpossiblePublish { key: String, attempts: u32 },
    #[error("the overlay has no locally hosted nodes")]
    ChordIsEmpty,
    #[error("periodic_interval_ms {value} is out of the allowed range [{min}, {max}]")]
    InvalidTimeout { value: u64, min: u64, max: u64 },
    #[error("invalid file: {reason}")]
    InvalidFile { reason: String },
    #[error("file with key {key} was not found anywhere in the ring")]
    FileNotFoundInChord { key: String },

    // ---- storage ----
    #[error("no value stored locally for key {key}")]
    FileKeyError { key: String },

    // ---- protocol ----
    #[error("received an empty message")]
    EmptyMessage,
    #[error("received a message of unrecognized type: {type_tag}")]
    InvalidMessageType { type_tag: String },
    #[error("successor list is already at its maximum size {max}")]
    SuccessorListFull { max: usize },

    // ---- no locally hosted node on the given port (overlay bookkeeping) ----
    #[error("no node is hosted on port {port}")]
    NoNodeFoundOnPort { port: u16 },
}

impl ChordError {
    /// True for errors that represent "the value/entry is absent", which
    /// the API boundary converts to a plain not-found rather than a hard
    /// failure (per the error handling design's propagation policy).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChordError::FileKeyError { .. } | ChordError::FileNotFoundInChord { .. }
        )
    }
}

impl From<tonic::Status> for ChordError {
    fn from(status: tonic::Status) -> Self {
        ChordError::SendFailure {
            destination: "<remote>".to_string(),
            source: Box::new(status),
        }
    }
}

impl From<tonic::transport::Error> for ChordError {
    fn from(err: tonic::transport::Error) -> Self {
        ChordError::SendFailure {
            destination: "<remote>".to_string(),
            source: Box::new(err),
        }
    }
}

pub type ChordResult<T> = Result<T, ChordError>;
