//! Identity Ledger
//!
//! External registry of agent identities. It only records existence:
//! - `register` must succeed before an agent is inserted locally
//! - `deactivate` must succeed before an agent is removed locally
//!
//! Two backends: an in-memory ledger (default) and a small REST client.
//! Signer identities are handed out round-robin by [`SignerPool`].

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Agent already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Agent not registered: {0}")]
    NotRegistered(String),

    #[error("Signer {signer} does not own agent {agent_id}")]
    SignerMismatch { agent_id: String, signer: String },

    #[error("Ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ledger error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid ledger URL: {0}")]
    InvalidUrl(String),
}

/// Existence registry for agent identities
#[async_trait]
pub trait IdentityLedger: Send + Sync {
    /// Called once at bootstrap; failure halts startup
    async fn initialize(&self) -> Result<(), LedgerError>;

    async fn register(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError>;

    async fn deactivate(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError>;
}

// ============ In-memory ============

#[derive(Debug, Clone)]
struct LedgerEntry {
    signer: String,
    active: bool,
}

/// Process-local ledger
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_active(&self, agent_id: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(agent_id)
            .is_some_and(|e| e.active)
    }
}

#[async_trait]
impl IdentityLedger for InMemoryLedger {
    async fn initialize(&self) -> Result<(), LedgerError> {
        info!("Using in-memory identity ledger");
        Ok(())
    }

    async fn register(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().await;
        if entries.get(agent_id).is_some_and(|e| e.active) {
            return Err(LedgerError::AlreadyRegistered(agent_id.to_string()));
        }
        entries.insert(
            agent_id.to_string(),
            LedgerEntry {
                signer: signer.to_string(),
                active: true,
            },
        );
        debug!("Ledger registered {} with {}", agent_id, signer);
        Ok(())
    }

    async fn deactivate(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(agent_id)
            .filter(|e| e.active)
            .ok_or_else(|| LedgerError::NotRegistered(agent_id.to_string()))?;
        if entry.signer != signer {
            return Err(LedgerError::SignerMismatch {
                agent_id: agent_id.to_string(),
                signer: signer.to_string(),
            });
        }
        entry.active = false;
        debug!("Ledger deactivated {}", agent_id);
        Ok(())
    }
}

// ============ HTTP ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    agent_id: &'a str,
    signer: &'a str,
}

#[derive(Serialize)]
struct DeactivateBody<'a> {
    signer: &'a str,
}

/// REST ledger client
pub struct HttpLedger {
    client: Client,
    base_url: Url,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let raw = base_url.into();
        let base_url = Url::parse(&raw).map_err(|e| LedgerError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::InvalidUrl(raw));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LedgerError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<(), LedgerError> {
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(LedgerError::Status { status, body })
    }
}

#[async_trait]
impl IdentityLedger for HttpLedger {
    async fn initialize(&self) -> Result<(), LedgerError> {
        let response = self
            .client
            .get(self.endpoint(&["health"])?)
            .send()
            .await?;
        Self::check(response).await?;
        info!("Identity ledger reachable at {}", self.base_url);
        Ok(())
    }

    async fn register(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError> {
        let response = self
            .client
            .post(self.endpoint(&["agents"])?)
            .json(&RegisterBody { agent_id, signer })
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(LedgerError::AlreadyRegistered(agent_id.to_string()));
        }
        Self::check(response).await
    }

    async fn deactivate(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError> {
        let response = self
            .client
            .post(self.endpoint(&["agents", agent_id, "deactivate"])?)
            .json(&DeactivateBody { signer })
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::NotRegistered(agent_id.to_string()));
        }
        Self::check(response).await
    }
}

// ============ Signers ============

/// Round-robin signer identities
#[derive(Debug)]
pub struct SignerPool {
    signers: Vec<String>,
    next: AtomicUsize,
}

impl SignerPool {
    pub fn new(signers: Vec<String>) -> Self {
        Self {
            signers,
            next: AtomicUsize::new(0),
        }
    }

    /// Next signer, or `None` when the pool is empty
    pub fn next_signer(&self) -> Option<String> {
        if self.signers.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.signers.len();
        Some(self.signers[index].clone())
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_deactivate() {
        let ledger = InMemoryLedger::new();
        ledger.register("A", "s0").await.unwrap();
        assert!(ledger.is_active("A").await);

        assert!(matches!(
            ledger.register("A", "s1").await,
            Err(LedgerError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            ledger.deactivate("A", "s1").await,
            Err(LedgerError::SignerMismatch { .. })
        ));

        ledger.deactivate("A", "s0").await.unwrap();
        assert!(!ledger.is_active("A").await);
        assert!(matches!(
            ledger.deactivate("A", "s0").await,
            Err(LedgerError::NotRegistered(_))
        ));

        // a deactivated id can be registered again
        ledger.register("A", "s2").await.unwrap();
    }

    #[tokio::test]
    async fn test_deactivate_unknown() {
        let ledger = InMemoryLedger::new();
        assert!(matches!(
            ledger.deactivate("ghost", "s0").await,
            Err(LedgerError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_signer_pool_round_robin() {
        let pool = SignerPool::new(vec!["a".into(), "b".into()]);
        let picks: Vec<String> = (0..5).filter_map(|_| pool.next_signer()).collect();
        assert_eq!(picks, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn test_empty_signer_pool() {
        let pool = SignerPool::new(vec![]);
        assert!(pool.is_empty());
        assert!(pool.next_signer().is_none());
    }

    #[test]
    fn test_http_ledger_endpoints() {
        for base in ["http://ledger.local/v1", "http://ledger.local/v1/"] {
            let ledger = HttpLedger::new(base, Duration::from_secs(5)).unwrap();
            assert_eq!(ledger.endpoint(&["health"]).unwrap().as_str(), "http://ledger.local/v1/health");
            assert_eq!(ledger.endpoint(&["agents"]).unwrap().as_str(), "http://ledger.local/v1/agents");
        }
    }

    #[test]
    fn test_http_ledger_encodes_agent_ids() {
        let ledger = HttpLedger::new("http://ledger.local", Duration::from_secs(5)).unwrap();
        let url = ledger.endpoint(&["agents", "a/b?c#d", "deactivate"]).unwrap();
        assert_eq!(url.path(), "/agents/a%2Fb%3Fc%23d/deactivate");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_http_ledger_rejects_bad_base_url() {
        for base in ["not a url", "mailto:ledger@example.com"] {
            assert!(matches!(
                HttpLedger::new(base, Duration::from_secs(5)),
                Err(LedgerError::InvalidUrl(_))
            ));
        }
    }
}
