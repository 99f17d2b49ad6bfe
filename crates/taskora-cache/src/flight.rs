//! Per-key request coalescing.
//!
//! A [`Flight`] group guarantees at most one in-flight loader per key
//! per process. The first caller for a key becomes the leader and runs
//! the loader; concurrent callers for the same key subscribe to the
//! leader's result instead of issuing their own load. Errors are
//! broadcast to followers exactly like values.
//!
//! The loader is driven by the leader's own task. If the leader is
//! cancelled mid-flight its followers observe the abandoned flight and
//! race to become the leader of a fresh one, so every surviving caller
//! still gets a result. This is the channel variant of the single-
//! flight contract: a cancelled leader aborts the load instead of
//! letting it run detached.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use taskora_core::{TaskoraError, TaskoraResult};
use tokio::sync::broadcast;
use tracing::debug;

type Shared<T> = Result<T, Arc<TaskoraError>>;

/// A single-flight group.
///
/// Separate groups should be used for workloads that must not block
/// each other (e.g. point reads vs. index rebuilds).
pub struct Flight<T> {
    inflight: Mutex<HashMap<String, broadcast::Sender<Shared<T>>>>,
}

impl<T> Default for Flight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Flight<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + 'static> Flight<T> {
    /// Runs `loader` for `key`, coalescing with any in-flight load.
    ///
    /// At most one loader executes per key at any instant; followers
    /// receive a clone of the leader's result.
    pub async fn work<F, Fut>(&self, key: &str, loader: F) -> TaskoraResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TaskoraResult<T>>,
    {
        let mut loader = Some(loader);

        loop {
            let role = {
                let mut inflight = self.inflight.lock();
                match inflight.entry(key.to_string()) {
                    Entry::Occupied(entry) => Role::Follower(entry.get().subscribe()),
                    Entry::Vacant(entry) => {
                        let (tx, _) = broadcast::channel(1);
                        entry.insert(tx.clone());
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let guard = FlightGuard { flight: self, key };
                    let loader = loader.take().expect("leader runs the loader once");
                    let result = loader().await;
                    drop(guard);

                    let shared = match &result {
                        Ok(value) => Ok(value.clone()),
                        Err(e) => Err(Arc::new(clone_for_broadcast(e))),
                    };
                    // Nobody listening is fine.
                    let _ = tx.send(shared);

                    return result;
                }
                Role::Follower(mut rx) => {
                    debug!(key, "Coalesced onto in-flight load");
                    match rx.recv().await {
                        Ok(Ok(value)) => return Ok(value),
                        Ok(Err(shared)) => return Err(clone_for_broadcast(&shared)),
                        // Leader abandoned the flight; race for a fresh one.
                        Err(broadcast::error::RecvError::Closed)
                        | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }
    }
}

enum Role<T> {
    Leader(broadcast::Sender<Shared<T>>),
    Follower(broadcast::Receiver<Shared<T>>),
}

/// Removes the in-flight entry when the leader finishes or is dropped.
struct FlightGuard<'a, T> {
    flight: &'a Flight<T>,
    key: &'a str,
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        self.flight.inflight.lock().remove(self.key);
    }
}

/// Rebuilds an error by kind so it can be handed to every waiter.
///
/// `Serialization` carries a non-cloneable source and degrades to
/// `Internal` with the same message.
fn clone_for_broadcast(err: &TaskoraError) -> TaskoraError {
    match err {
        TaskoraError::NotFound { resource_type, id } => TaskoraError::NotFound {
            resource_type: *resource_type,
            id: id.clone(),
        },
        TaskoraError::Validation(m) => TaskoraError::Validation(m.clone()),
        TaskoraError::Conflict(m) => TaskoraError::Conflict(m.clone()),
        TaskoraError::Unauthorized(m) => TaskoraError::Unauthorized(m.clone()),
        TaskoraError::Database(m) => TaskoraError::Database(m.clone()),
        TaskoraError::Cache(m) => TaskoraError::Cache(m.clone()),
        TaskoraError::CorruptCache { key, message } => TaskoraError::CorruptCache {
            key: key.clone(),
            message: message.clone(),
        },
        TaskoraError::LockUnavailable(m) => TaskoraError::LockUnavailable(m.clone()),
        TaskoraError::Configuration(m) => TaskoraError::Configuration(m.clone()),
        TaskoraError::Serialization(e) => TaskoraError::internal(e.to_string()),
        TaskoraError::Internal(m) => TaskoraError::Internal(m.clone()),
    }
}
