//! System setting keys and their canonical defaults.
//!
//! Settings live in a string-typed key/value table and are read per use, so
//! an admin change takes effect on the next cycle without a restart.

/// Upper bound on preset-job priority.
pub const KEY_MAX_JOB_PRIORITY: &str = "max_job_priority";
pub const DEFAULT_MAX_JOB_PRIORITY: i64 = 1000;

/// TTL for stored benchmarks, hours.
pub const KEY_BENCHMARK_CACHE_DURATION_HOURS: &str = "benchmark_cache_duration_hours";
pub const DEFAULT_BENCHMARK_CACHE_DURATION_HOURS: i64 = 168;

/// Remainder-absorption threshold, percent of the nominal chunk size.
pub const KEY_CHUNK_FLUCTUATION_PERCENTAGE: &str = "chunk_fluctuation_percentage";
pub const DEFAULT_CHUNK_FLUCTUATION_PERCENTAGE: i64 = 20;

/// Silence window before a running/assigned task is retried, minutes.
pub const KEY_TASK_HEARTBEAT_TIMEOUT_MINUTES: &str = "task_heartbeat_timeout_minutes";
/// Fallback key consulted when the heartbeat timeout is unset.
pub const KEY_TASK_TIMEOUT_MINUTES: &str = "task_timeout_minutes";
pub const DEFAULT_TASK_HEARTBEAT_TIMEOUT_MINUTES: i64 = 5;

/// Window a disconnected agent has to resume its task, minutes.
pub const KEY_RECONNECT_GRACE_PERIOD_MINUTES: &str = "reconnect_grace_period_minutes";
pub const DEFAULT_RECONNECT_GRACE_PERIOD_MINUTES: i64 = 5;

/// Retry budget per task.
pub const KEY_MAX_CHUNK_RETRY_ATTEMPTS: &str = "max_chunk_retry_attempts";
pub const DEFAULT_MAX_CHUNK_RETRY_ATTEMPTS: i64 = 3;

/// Agent-hashlist tracking row TTL, hours.
pub const KEY_AGENT_HASHLIST_RETENTION_HOURS: &str = "agent_hashlist_retention_hours";
pub const DEFAULT_AGENT_HASHLIST_RETENTION_HOURS: i64 = 24;

/// Grace window before an `agent_offline` event fires, minutes.
pub const KEY_AGENT_OFFLINE_BUFFER_MINUTES: &str = "agent_offline_buffer_minutes";
pub const DEFAULT_AGENT_OFFLINE_BUFFER_MINUTES: i64 = 10;

/// Consecutive task failures before a job is failed or an agent errored.
pub const MAX_CONSECUTIVE_FAILURES: i64 = 3;

/// Retransmit requests before a processing task is written off.
pub const MAX_RETRANSMIT_COUNT: i64 = 6;

/// How long a processing task may sit without updates before the sweep
/// evaluates its retransmit budget, minutes.
pub const PROCESSING_TIMEOUT_MINUTES: i64 = 30;

/// Offline buffer rows older than this are garbage-collected, days.
pub const OFFLINE_BUFFER_GC_DAYS: i64 = 7;
