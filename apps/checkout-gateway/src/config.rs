use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use acp_security::DEFAULT_TOLERANCE_SECS;
use acp_session::DEFAULT_SESSION_TTL_SECS;

const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_API_VERSION: &str = "2025-09-12";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: SocketAddr,
    pub session_ttl: Duration,
    pub idempotency_ttl: Duration,
    pub signature_tolerance_secs: i64,
    pub webhook_timeout: Duration,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub merchant_name: String,
    /// Secret for inbound `Signature`/`Timestamp` verification; unset skips it.
    pub request_signature_secret: Option<String>,
    pub auth_bearer_token: Option<String>,
    pub api_version: String,
    pub catalog_url: Option<String>,
    pub psp_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            idempotency_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            signature_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            webhook_timeout: Duration::from_millis(DEFAULT_WEBHOOK_TIMEOUT_MS),
            webhook_url: None,
            webhook_secret: None,
            merchant_name: "Merchant".into(),
            request_signature_secret: None,
            auth_bearer_token: None,
            api_version: DEFAULT_API_VERSION.into(),
            catalog_url: None,
            psp_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Ok(bind) = std::env::var("BIND") {
            cfg.addr = bind.parse().context("invalid BIND address")?;
        }
        cfg.session_ttl = Duration::from_secs(env_u64("SESSION_TTL_SEC", DEFAULT_SESSION_TTL_SECS));

        // The idempotency record must outlive the session it created or
        // advanced; a shorter TTL would let a retry re-run payment.
        let idempotency_secs = env_u64("IDEMPOTENCY_TTL_SEC", cfg.session_ttl.as_secs());
        cfg.idempotency_ttl = if idempotency_secs < cfg.session_ttl.as_secs() {
            warn!(
                requested = idempotency_secs,
                clamped_to = cfg.session_ttl.as_secs(),
                "IDEMPOTENCY_TTL_SEC below SESSION_TTL_SEC; clamping up"
            );
            cfg.session_ttl
        } else {
            Duration::from_secs(idempotency_secs)
        };

        cfg.signature_tolerance_secs =
            env_i64("SIGNATURE_TOLERANCE_SEC", DEFAULT_TOLERANCE_SECS).max(0);
        cfg.webhook_timeout =
            Duration::from_millis(env_u64("WEBHOOK_TIMEOUT_MS", DEFAULT_WEBHOOK_TIMEOUT_MS).max(1));
        cfg.webhook_url = env_opt("WEBHOOK_URL");
        cfg.webhook_secret = env_opt("WEBHOOK_SECRET");
        if let Some(name) = env_opt("MERCHANT_NAME") {
            cfg.merchant_name = name;
        }
        cfg.request_signature_secret = env_opt("REQUEST_SIGNATURE_SECRET");
        cfg.auth_bearer_token = env_opt("AUTH_BEARER_TOKEN");
        if let Some(version) = env_opt("API_VERSION_ADVERTISED") {
            cfg.api_version = version;
        }
        cfg.catalog_url = env_opt("CATALOG_URL");
        cfg.psp_url = env_opt("PSP_URL");
        Ok(cfg)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_reference_values() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.session_ttl.as_secs(), 86_400);
        assert_eq!(cfg.idempotency_ttl, cfg.session_ttl);
        assert_eq!(cfg.signature_tolerance_secs, 300);
        assert_eq!(cfg.webhook_timeout.as_millis(), 30_000);
    }
}
