//! Typed checkout-session persistence over the shared KV store.
//!
//! Sessions are serialized as JSON under `acp:session:{id}` and expire with
//! the configured session TTL. The repository exclusively owns session
//! bytes: handlers load a value, mutate their local copy, and write it back
//! in one operation.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use acp_core::{CheckoutSession, now_rfc3339};
use acp_kv::SharedKvStore;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

#[derive(Clone)]
pub struct SessionRepository {
    kv: SharedKvStore,
    ttl: Duration,
}

impl SessionRepository {
    pub fn new(kv: SharedKvStore, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn with_default_ttl(kv: SharedKvStore) -> Self {
        Self::new(kv, Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }

    fn key(id: &str) -> String {
        format!("acp:session:{id}")
    }

    /// Returns `None` on miss or expiry; a stored value that fails to parse
    /// is a fatal error, not a miss.
    pub async fn get(&self, id: &str) -> Result<Option<CheckoutSession>> {
        let raw = self.kv.get(&Self::key(id)).await?;
        match raw {
            Some(payload) => {
                let session = serde_json::from_str(&payload)
                    .with_context(|| format!("corrupt session record {id}"))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Stamps `updated_at` and writes the session with a fresh TTL. The
    /// caller must not keep mutating the value without re-putting it.
    pub async fn put(&self, session: &mut CheckoutSession) -> Result<()> {
        session.updated_at = now_rfc3339();
        let payload = serde_json::to_string(session)
            .with_context(|| format!("serialize session {}", session.id))?;
        self.kv
            .set(&Self::key(&session.id), &payload, Some(self.ttl))
            .await?;
        debug!(session_id = %session.id, status = %session.status, "session persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_core::{Money, SessionStatus, Totals};
    use acp_kv::{KvStore, MemoryKvStore, shared_memory_store};
    use std::sync::Arc;

    fn session(id: &str) -> CheckoutSession {
        let subtotal = Money::new(1000, "USD");
        CheckoutSession {
            id: id.into(),
            status: SessionStatus::ReadyForPayment,
            items: vec![acp_core::LineItem {
                id: "prod-1".into(),
                title: "Widget".into(),
                quantity: 1,
                unit_price: subtotal.clone(),
                variant_id: None,
                sku: None,
                image_url: None,
            }],
            totals: Totals::from_components(subtotal, None, None, None).unwrap(),
            fulfillment: None,
            customer: None,
            messages: Vec::new(),
            links: Vec::new(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_and_stamps_updated_at() {
        let repo = SessionRepository::with_default_ttl(shared_memory_store());
        let mut stored = session("cs_1");
        repo.put(&mut stored).await.unwrap();
        assert_ne!(stored.updated_at, "2025-01-01T00:00:00Z");

        let loaded = repo.get("cs_1").await.unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(loaded.created_at <= loaded.updated_at);
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let repo = SessionRepository::with_default_ttl(shared_memory_store());
        assert!(repo.get("cs_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error_not_a_miss() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set("acp:session:cs_bad", "{not json", None)
            .await
            .unwrap();
        let repo = SessionRepository::with_default_ttl(kv);
        assert!(repo.get("cs_bad").await.is_err());
    }
}
