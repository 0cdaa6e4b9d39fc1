//! Typed repositories over the SQLite pool.

pub mod agent_hashlists;
pub mod agents;
pub mod benchmarks;
pub mod binaries;
pub mod files;
pub mod hashlists;
pub mod jobs;
pub mod layers;
pub mod offline;
pub mod presets;
pub mod settings;
pub mod tasks;

pub use agent_hashlists::AgentHashlistRepo;
pub use agents::AgentRepo;
pub use benchmarks::BenchmarkRepo;
pub use binaries::BinaryRepo;
pub use files::{FileResourceRepo, CATEGORY_RULE, CATEGORY_WORDLIST};
pub use hashlists::HashlistRepo;
pub use jobs::{JobRepo, NewJobExecution};
pub use layers::JobLayerRepo;
pub use offline::OfflineBufferRepo;
pub use presets::{NewPresetJob, PresetJobRepo};
pub use settings::SettingsRepo;
pub use tasks::{NewJobTask, TaskRepo};
