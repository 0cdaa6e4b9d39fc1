//! SQLite persistence layer for Hashfleet.
//!
//! The orchestrator owns the database; agents only ever see files and
//! messages. Repositories are thin typed wrappers over sqlx queries, one per
//! aggregate, all sharing a small connection pool.

pub mod error;
pub mod models;
pub mod pool;
pub mod repo;
pub mod schema;

pub use error::{DbError, Result};
pub use pool::{connect, connect_memory, DbPool};
pub use repo::{
    AgentHashlistRepo, AgentRepo, BenchmarkRepo, BinaryRepo, FileResourceRepo, HashlistRepo,
    JobLayerRepo, JobRepo, NewJobExecution, NewJobTask, NewPresetJob, OfflineBufferRepo,
    PresetJobRepo, SettingsRepo, TaskRepo, CATEGORY_RULE, CATEGORY_WORDLIST,
};
