//! Daemon building blocks: the UDP receiver boundary and the offline
//! journal verifier. The binary in `main.rs` wires them to the core
//! pipeline.
#![deny(missing_docs)]

/// UDP datagram boundary.
pub mod receiver;
/// Offline re-hash and proof verification over the journal.
pub mod verify;
