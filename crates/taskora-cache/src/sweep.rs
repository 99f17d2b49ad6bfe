//! Cursor-based pattern deletion.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use taskora_core::{TaskoraError, TaskoraResult};

/// SCAN batch size for pattern deletes.
const SCAN_BATCH: usize = 100;

/// Deletes keys matching a pattern with a cursor SCAN, one batch at a
/// time.
///
/// Callers must pass user- or prefix-scoped patterns; this is never run
/// over the whole keyspace.
pub async fn delete_pattern(pool: &Pool, pattern: &str) -> TaskoraResult<u64> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| TaskoraError::cache(format!("redis connection unavailable: {}", e)))?;

    let mut cursor: u64 = 0;
    let mut deleted: u64 = 0;

    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(&mut *conn)
            .await
            .map_err(|e| TaskoraError::cache(format!("scan of '{}' failed: {}", pattern, e)))?;

        if !batch.is_empty() {
            let removed: u64 = conn.del(&batch).await.map_err(|e| {
                TaskoraError::cache(format!("batch delete for '{}' failed: {}", pattern, e))
            })?;
            deleted += removed;
        }

        cursor = next;
        if cursor == 0 {
            break;
        }
    }

    Ok(deleted)
}
