//! Polling core for a Thessla Green recuperator unit reachable over Modbus TCP.
//!
//! The crate owns a single TCP session to the device, sweeps a fixed set of
//! register blocks on a configurable interval, and publishes the last-read
//! values as an immutable snapshot. Writes go through the same serialization
//! discipline as the sweep, so reads and writes never interleave on the wire.

pub mod constants;
pub mod helpers;
pub mod poller;
pub mod registers;
pub mod session;
