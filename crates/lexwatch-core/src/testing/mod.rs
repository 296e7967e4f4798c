//! Test support: an in-memory backend and the JSONL replay harness.
//!
//! Replaying a recorded frame list is the deterministic way to exercise the
//! reducers end to end; the in-memory backend stands in for the websocket
//! when a test needs the command path too.

mod memory;
mod replay;

pub use memory::{MemoryBackend, MemoryConnector, MemoryTransport};
pub use replay::{
    MalformedLine, ReplayConfig, ReplayError, ReplayResult, ReplayRunner, list_fixtures,
};
