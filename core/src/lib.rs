//! Logseal core library: keccak-256 Merkle engine, microsecond timestamp
//! codec, checkpoint journal, durable append writer, and the batch worker
//! that anchors checkpoint batches to an external timestamp registry.
#![deny(missing_docs)]

/// Merkle batch worker: periodic sealing of due checkpoints into one tree.
pub mod batch;
/// Per-path checkpoint state machine and range hashing.
pub mod checkpoint;
/// Journal model and dated JSON persistence.
pub mod journal;
/// Order-independent keccak-256 Merkle engine.
pub mod merkle;
/// Registry publisher seam and stand-in implementations.
pub mod registry;
/// Microsecond-resolution timestamp codec.
pub mod ts;
/// Queue-draining log writer.
pub mod writer;

pub use journal::{CheckpointState, HistoryEntry, Journal, JournalError, JournalHandle};
pub use registry::RegistryPublisher;
pub use writer::{LogRecord, LogSink};
