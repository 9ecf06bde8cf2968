//! Single-flight idempotency guard backed by the shared KV store.
//!
//! For a given client-supplied key, the compute closure runs at most once
//! across the cluster; concurrent retries either replay the cached result,
//! wait on the pending marker, or fail fast. Enforcement rests on the KV
//! backend's atomic `set_nx`, not on in-process locking, so the gateway
//! scales horizontally.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use acp_core::{ProtocolError, unix_now};
use acp_kv::SharedKvStore;

/// Sentinel for an in-flight compute.
pub const PENDING_SENTINEL: &str = "__pending__";
/// Sentinel for a compute that ran and failed.
pub const FAILED_SENTINEL: &str = "__failed__";

const FAIL_MARKER_TTL: Duration = Duration::from_secs(60);
const DEFAULT_WAIT_ATTEMPTS: u32 = 8;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Result of running a compute closure under the guard.
#[derive(Debug, Clone, PartialEq)]
pub struct Flight<T> {
    pub value: T,
    /// Whether the value was replayed from the cache of a prior execution.
    pub reused: bool,
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    kv: SharedKvStore,
    ttl: Duration,
    wait_attempts: u32,
    initial_backoff: Duration,
}

impl IdempotencyGuard {
    /// `ttl` must be at least the session TTL; expiring the record before
    /// the session it advanced would let a retried client re-run payment.
    pub fn new(kv: SharedKvStore, ttl: Duration) -> Self {
        Self {
            kv,
            ttl,
            wait_attempts: DEFAULT_WAIT_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }

    /// Overrides the lost-race wait loop; tests shorten it.
    pub fn with_wait(mut self, attempts: u32, initial_backoff: Duration) -> Self {
        self.wait_attempts = attempts;
        self.initial_backoff = initial_backoff;
        self
    }

    fn record_key(key: &str) -> String {
        format!("acp:{key}")
    }

    fn fail_marker_key(key: &str) -> String {
        format!("acp:{key}:fail")
    }

    /// Runs `compute` at most once for `key`. Without a key the closure runs
    /// inline and nothing is cached.
    ///
    /// Once the pending lock is taken, the closure runs on a detached task:
    /// a client disconnect must not abort it halfway, or every retry would
    /// wait on a sentinel nobody is going to resolve.
    pub async fn execute<T, F, Fut>(
        &self,
        key: Option<&str>,
        compute: F,
    ) -> Result<Flight<T>, ProtocolError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ProtocolError>> + Send + 'static,
    {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            let value = compute().await?;
            return Ok(Flight {
                value,
                reused: false,
            });
        };
        let record_key = Self::record_key(key);

        match self
            .kv
            .get(&record_key)
            .await
            .map_err(ProtocolError::Internal)?
        {
            Some(raw) if raw == PENDING_SENTINEL => {}
            Some(raw) if raw == FAILED_SENTINEL => {
                return Err(ProtocolError::IdempotentReplayOfFailure);
            }
            Some(raw) => {
                counter!("idempotency_replays_total").increment(1);
                debug!(idempotency_key = %key, "replaying cached result");
                return Ok(Flight {
                    value: decode(&raw)?,
                    reused: true,
                });
            }
            None => {}
        }

        let won = self
            .kv
            .set_nx(&record_key, PENDING_SENTINEL, self.ttl)
            .await
            .map_err(ProtocolError::Internal)?;
        if !won {
            return self.await_winner(key, &record_key).await;
        }

        let guard = self.clone();
        let task_key = key.to_string();
        let task_record = record_key.clone();
        let handle = tokio::spawn(async move {
            match compute().await {
                Ok(value) => match serde_json::to_string(&value) {
                    Ok(payload) => {
                        match guard.kv.set(&task_record, &payload, Some(guard.ttl)).await {
                            Ok(()) => Ok(Flight {
                                value,
                                reused: false,
                            }),
                            Err(err) => {
                                guard.mark_failed(&task_key, &task_record).await;
                                Err(ProtocolError::Internal(err))
                            }
                        }
                    }
                    Err(err) => {
                        guard.mark_failed(&task_key, &task_record).await;
                        Err(ProtocolError::Internal(err.into()))
                    }
                },
                Err(err) => {
                    guard.mark_failed(&task_key, &task_record).await;
                    Err(err)
                }
            }
        });

        handle.await.map_err(|err| {
            ProtocolError::Internal(anyhow::anyhow!("idempotent compute task failed: {err}"))
        })?
    }

    /// Replaces the pending sentinel with the failed sentinel plus the
    /// observability fail marker. Store errors here are logged, not
    /// propagated: the compute error is the one the caller needs.
    async fn mark_failed(&self, key: &str, record_key: &str) {
        counter!("idempotency_compute_failures_total").increment(1);
        if let Err(err) = self
            .kv
            .set(record_key, FAILED_SENTINEL, Some(FAIL_MARKER_TTL))
            .await
        {
            warn!(idempotency_key = %key, error = %err, "failed to store failure sentinel");
        }
        let stamp = unix_now().to_string();
        if let Err(err) = self
            .kv
            .set(&Self::fail_marker_key(key), &stamp, Some(FAIL_MARKER_TTL))
            .await
        {
            warn!(idempotency_key = %key, error = %err, "failed to store fail marker");
        }
    }

    /// Lost-race path: poll with doubling backoff until the winner's result
    /// or failure shows up. Never runs the compute closure.
    async fn await_winner<T>(&self, key: &str, record_key: &str) -> Result<Flight<T>, ProtocolError>
    where
        T: DeserializeOwned,
    {
        let fail_key = Self::fail_marker_key(key);
        let mut backoff = self.initial_backoff;
        for _ in 0..self.wait_attempts {
            tokio::time::sleep(backoff).await;
            match self
                .kv
                .get(record_key)
                .await
                .map_err(ProtocolError::Internal)?
            {
                Some(raw) if raw == PENDING_SENTINEL => {}
                Some(raw) if raw == FAILED_SENTINEL => {
                    return Err(ProtocolError::IdempotentReplayOfFailure);
                }
                Some(raw) => {
                    counter!("idempotency_replays_total").increment(1);
                    return Ok(Flight {
                        value: decode(&raw)?,
                        reused: true,
                    });
                }
                None => {}
            }
            if self
                .kv
                .get(&fail_key)
                .await
                .map_err(ProtocolError::Internal)?
                .is_some()
            {
                return Err(ProtocolError::IdempotentReplayOfFailure);
            }
            backoff = backoff.saturating_mul(2);
        }
        counter!("idempotency_wait_timeouts_total").increment(1);
        warn!(idempotency_key = %key, "gave up waiting for concurrent execution");
        Err(ProtocolError::IdempotencyTimeout)
    }
}

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|err| {
        ProtocolError::Internal(anyhow::Error::new(err).context("corrupt cached idempotent result"))
    })
}
