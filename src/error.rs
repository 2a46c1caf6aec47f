//! Error type for ring-set creation, binding and mapping.
//!
//! Data loss is not an error: it only shows up in a reader's skip counter.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RingError>;

/// Enumerable error kinds, one per [`RingError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadName,
    UnknownRingSet,
    InvalidRingId,
    WriteToAllRings,
    NoFreeWriterId,
    NoFreeReaderId,
    AlreadyExists,
    InvalidConfig,
    Busy,
    Map,
    Protocol,
}

#[derive(Error, Debug)]
pub enum RingError {
    /// Ring-set name is empty, too long or uses characters outside `[A-Za-z0-9_.-]`.
    #[error("bad ring set name {0:?}")]
    BadName(String),

    #[error("unknown ring set {0:?}")]
    UnknownRingSet(String),

    #[error("invalid ring id {ring_id} (ring set has {nrings} rings)")]
    InvalidRingId { ring_id: usize, nrings: usize },

    #[error("cannot open ring id ALL for writing")]
    WriteToAllRings,

    #[error("no free writer id on ring {ring}")]
    NoFreeWriterId { ring: usize },

    /// `ring` is `None` when the reader asked for an id free on every ring.
    #[error("no free reader id on {}", match .ring { Some(r) => format!("ring {r}"), None => "all rings".to_string() })]
    NoFreeReaderId { ring: Option<usize> },

    #[error("ring set {0:?} already exists")]
    AlreadyExists(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Teardown refused because handles are still bound.
    #[error("ring set {name:?} still has {bound} bound handles")]
    Busy { name: String, bound: usize },

    #[error("failed to map shared region {name:?}: {source}")]
    Map {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RingError::BadName(_) => ErrorKind::BadName,
            RingError::UnknownRingSet(_) => ErrorKind::UnknownRingSet,
            RingError::InvalidRingId { .. } => ErrorKind::InvalidRingId,
            RingError::WriteToAllRings => ErrorKind::WriteToAllRings,
            RingError::NoFreeWriterId { .. } => ErrorKind::NoFreeWriterId,
            RingError::NoFreeReaderId { .. } => ErrorKind::NoFreeReaderId,
            RingError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            RingError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            RingError::Busy { .. } => ErrorKind::Busy,
            RingError::Map { .. } => ErrorKind::Map,
            RingError::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// The OS error behind a mapping failure, if any.
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            RingError::Map { source, .. } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn map(name: &str, source: io::Error) -> Self {
        RingError::Map {
            name: name.to_string(),
            source,
        }
    }
}
