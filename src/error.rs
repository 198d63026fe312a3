//! Error types for the meshwork cluster runtime.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::WorkerId;

/// Errors surfaced by cluster bootstrap, placement, and the node facade.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The configured worker count was zero.
    #[error("worker_count must be at least 1")]
    InvalidWorkerCount,

    /// The configured directory capacity was zero.
    #[error("table_size must be at least 1")]
    InvalidTableSize,

    /// The socket directory could not be created or chmodded.
    #[error("failed to prepare socket directory {path}: {source}")]
    SocketDir {
        /// The directory that could not be prepared.
        path: PathBuf,
        /// The underlying filesystem error.
        source: io::Error,
    },

    /// An actor is already mounted at the requested path.
    #[error("actor already spawned at path {0:?}")]
    ActorExists(String),

    /// The default spawn refused a path the ring assigns to another worker.
    ///
    /// Spawning such a path would let two workers register conflicting
    /// owners for it. Use `spawn_pinned` to override placement on purpose.
    #[error("path {path:?} is placed on worker {owner}, not worker {worker}")]
    MisplacedSpawn {
        /// The requested actor path.
        path: String,
        /// The worker the ring assigns the path to.
        owner: WorkerId,
        /// The worker that attempted the spawn.
        worker: WorkerId,
    },

    /// Not every worker bound its socket before the startup deadline.
    #[error("timed out waiting for {missing} of {total} workers to come up")]
    BarrierTimeout {
        /// Workers whose readiness entry never appeared.
        missing: usize,
        /// Total workers in the cluster.
        total: u32,
    },

    /// The cluster was shut down while this worker was still starting.
    #[error("cluster shut down during startup")]
    StartupAborted,

    /// A worker thread panicked instead of returning.
    #[error("worker {worker} panicked")]
    WorkerPanicked {
        /// The worker whose thread panicked.
        worker: WorkerId,
    },

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Envelope or payload codec failure.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Underlying I/O error (thread spawn, runtime construction).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the Unix-domain-socket mesh transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Binding the worker's listening socket failed.
    #[error("failed to bind worker socket at {path}: {source}")]
    Bind {
        /// The socket path that could not be bound.
        path: PathBuf,
        /// The underlying socket error.
        source: io::Error,
    },

    /// Connecting to a peer's listening socket failed.
    #[error("failed to connect to peer {peer} at {path}: {source}")]
    Connect {
        /// The peer that could not be reached.
        peer: WorkerId,
        /// The peer's socket path.
        path: PathBuf,
        /// The underlying socket error.
        source: io::Error,
    },

    /// A frame payload exceeded the wire limit.
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Offending payload length.
        len: usize,
        /// Maximum payload length on this transport.
        max: usize,
    },
}

/// Errors raised while encoding or decoding message envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Actor paths are non-empty identifiers.
    #[error("actor path must not be empty")]
    EmptyPath,

    /// The envelope ended before the announced field did.
    #[error("envelope truncated while reading {0}")]
    Truncated(&'static str),

    /// The destination path bytes were not valid UTF-8.
    #[error("actor path is not valid UTF-8")]
    InvalidPath,

    /// Payload serialization or deserialization failed.
    #[error("payload codec failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
