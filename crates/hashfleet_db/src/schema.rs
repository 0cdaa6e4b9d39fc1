//! Embedded schema DDL.
//!
//! Every statement is idempotent (`IF NOT EXISTS`) so startup can apply the
//! schema unconditionally.

use crate::error::Result;
use crate::pool::DbPool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS hashlists (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        client_id TEXT,
        hash_type_id INTEGER NOT NULL,
        is_salted INTEGER NOT NULL DEFAULT 0,
        total_hashes INTEGER NOT NULL DEFAULT 0,
        cracked_hashes INTEGER NOT NULL DEFAULT 0,
        file_path TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hashes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        hashlist_id TEXT NOT NULL REFERENCES hashlists(id) ON DELETE CASCADE,
        hash_value TEXT NOT NULL,
        plain_text TEXT,
        is_cracked INTEGER NOT NULL DEFAULT 0,
        cracked_at TEXT
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_hashes_value ON hashes(hash_value)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_hashes_list ON hashes(hashlist_id, is_cracked)"#,
    r#"
    CREATE TABLE IF NOT EXISTS preset_jobs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        priority INTEGER NOT NULL DEFAULT 0,
        chunk_size_seconds INTEGER NOT NULL,
        attack_mode TEXT NOT NULL,
        wordlist_ids TEXT NOT NULL DEFAULT '[]',
        rule_ids TEXT NOT NULL DEFAULT '[]',
        mask TEXT,
        binary_version TEXT NOT NULL DEFAULT 'default',
        increment_mode TEXT NOT NULL DEFAULT 'off',
        increment_min INTEGER,
        increment_max INTEGER,
        status_updates_enabled INTEGER NOT NULL DEFAULT 1,
        is_small_job INTEGER NOT NULL DEFAULT 0,
        allow_high_priority_override INTEGER NOT NULL DEFAULT 0,
        max_agents INTEGER NOT NULL DEFAULT 0,
        base_keyspace INTEGER,
        effective_keyspace INTEGER,
        is_accurate_keyspace INTEGER NOT NULL DEFAULT 0,
        use_rule_splitting INTEGER NOT NULL DEFAULT 0,
        multiplication_factor INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS preset_increment_layers (
        id TEXT PRIMARY KEY,
        preset_job_id TEXT NOT NULL REFERENCES preset_jobs(id) ON DELETE CASCADE,
        layer_index INTEGER NOT NULL,
        mask TEXT NOT NULL,
        base_keyspace INTEGER NOT NULL DEFAULT 0,
        effective_keyspace INTEGER NOT NULL DEFAULT 0,
        UNIQUE (preset_job_id, layer_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id TEXT PRIMARY KEY,
        preset_job_id TEXT,
        hashlist_id TEXT NOT NULL REFERENCES hashlists(id),
        attack_mode TEXT NOT NULL,
        binary_version_id TEXT,
        priority INTEGER NOT NULL DEFAULT 0,
        chunk_size_seconds INTEGER NOT NULL DEFAULT 600,
        status TEXT NOT NULL DEFAULT 'pending',
        wordlist_ids TEXT NOT NULL DEFAULT '[]',
        rule_ids TEXT NOT NULL DEFAULT '[]',
        mask TEXT,
        base_keyspace INTEGER NOT NULL DEFAULT 0,
        total_keyspace INTEGER NOT NULL DEFAULT 0,
        effective_keyspace INTEGER NOT NULL DEFAULT 0,
        processed_keyspace INTEGER NOT NULL DEFAULT 0,
        dispatched_keyspace INTEGER NOT NULL DEFAULT 0,
        is_accurate_keyspace INTEGER NOT NULL DEFAULT 1,
        uses_rule_splitting INTEGER NOT NULL DEFAULT 0,
        multiplication_factor INTEGER NOT NULL DEFAULT 1,
        increment_mode TEXT NOT NULL DEFAULT 'off',
        increment_min INTEGER,
        increment_max INTEGER,
        max_agents INTEGER NOT NULL DEFAULT 0,
        consecutive_failures INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        overall_progress_percent REAL NOT NULL DEFAULT 0,
        created_by TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_status ON job_executions(status, priority, created_at)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_hashlist ON job_executions(hashlist_id)"#,
    r#"
    CREATE TABLE IF NOT EXISTS job_increment_layers (
        id TEXT PRIMARY KEY,
        job_execution_id TEXT NOT NULL REFERENCES job_executions(id) ON DELETE CASCADE,
        layer_index INTEGER NOT NULL,
        mask TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        base_keyspace INTEGER NOT NULL DEFAULT 0,
        effective_keyspace INTEGER NOT NULL DEFAULT 0,
        dispatched_keyspace INTEGER NOT NULL DEFAULT 0,
        processed_keyspace INTEGER NOT NULL DEFAULT 0,
        is_accurate_keyspace INTEGER NOT NULL DEFAULT 1,
        overall_progress_percent REAL NOT NULL DEFAULT 0,
        UNIQUE (job_execution_id, layer_index)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_tasks (
        id TEXT PRIMARY KEY,
        job_execution_id TEXT NOT NULL REFERENCES job_executions(id) ON DELETE CASCADE,
        increment_layer_id TEXT,
        agent_id TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        chunk_number INTEGER NOT NULL,
        chunk_duration INTEGER NOT NULL,
        benchmark_speed INTEGER,
        attack_cmd TEXT NOT NULL,
        keyspace_start INTEGER NOT NULL DEFAULT 0,
        keyspace_end INTEGER NOT NULL DEFAULT 0,
        keyspace_processed INTEGER NOT NULL DEFAULT 0,
        effective_keyspace_start INTEGER NOT NULL DEFAULT 0,
        effective_keyspace_end INTEGER NOT NULL DEFAULT 0,
        effective_keyspace_processed INTEGER NOT NULL DEFAULT 0,
        is_keyspace_split INTEGER NOT NULL DEFAULT 0,
        is_rule_split_task INTEGER NOT NULL DEFAULT 0,
        rule_start_index INTEGER,
        rule_end_index INTEGER,
        rule_chunk_path TEXT,
        retry_count INTEGER NOT NULL DEFAULT 0,
        retransmit_count INTEGER NOT NULL DEFAULT 0,
        expected_crack_count INTEGER NOT NULL DEFAULT 0,
        received_crack_count INTEGER NOT NULL DEFAULT 0,
        grace_deadline TEXT,
        assigned_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_tasks_job ON job_tasks(job_execution_id, status)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_tasks_agent ON job_tasks(agent_id, status)"#,
    r#"
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        owner_id TEXT,
        status TEXT NOT NULL DEFAULT 'idle',
        consecutive_failures INTEGER NOT NULL DEFAULT 0,
        hardware TEXT,
        last_seen_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS benchmarks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
        attack_mode TEXT NOT NULL,
        hash_type_id INTEGER NOT NULL,
        salt_count_bucket INTEGER,
        speed INTEGER NOT NULL,
        observed_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_benchmarks_key
        ON benchmarks(agent_id, attack_mode, hash_type_id, IFNULL(salt_count_bucket, -1))
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_hashlists (
        agent_id TEXT NOT NULL,
        hashlist_id TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_hash TEXT NOT NULL,
        last_used_at TEXT NOT NULL,
        PRIMARY KEY (agent_id, hashlist_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_offline_buffer (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT NOT NULL,
        disconnected_at TEXT NOT NULL,
        notification_due_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
    )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_offline_status ON agent_offline_buffer(status, notification_due_at)"#,
    r#"
    CREATE TABLE IF NOT EXISTS system_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS binary_versions (
        id TEXT PRIMARY KEY,
        version TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'cracker',
        file_path TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_resources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        line_count INTEGER,
        created_at TEXT NOT NULL
    )
    "#,
];

/// Apply the embedded schema to a pool.
pub async fn init_schema(pool: &DbPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::pool::connect_memory;

    #[tokio::test]
    async fn schema_applies_twice() {
        let pool = connect_memory().await.unwrap();
        // init_schema already ran in connect_memory; a second pass must be a no-op.
        super::init_schema(&pool).await.unwrap();
    }
}
