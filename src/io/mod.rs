//! IO modules - external system interfaces
//!
//! - `remote` - Durable store trait and startup snapshot
//! - `jsonl_store` - File-backed durable store (JSON / JSONL)
//! - `memory_store` - In-process durable store
//! - `sync_channel` - Typed queues for trailing durable writes
//! - `text_import` - Package/route text import and CSV reports
//! - `feedback` - Audible cues for the operator
//! - `console` - Line-oriented operator console

pub mod console;
pub mod feedback;
pub mod jsonl_store;
pub mod memory_store;
pub mod remote;
pub mod sync_channel;
pub mod text_import;

// Re-export commonly used types
pub use console::{Console, Flow};
pub use feedback::{Feedback, LogFeedback, RecordingFeedback, TerminalBell};
pub use jsonl_store::JsonlStore;
pub use memory_store::MemoryStore;
pub use remote::{load_snapshot, RemoteStore, Snapshot};
pub use sync_channel::{create_sync_channel, SyncFailure, SyncMessage, SyncQueues, SyncSender};
