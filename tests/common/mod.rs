//! Shared fixtures for integration tests

#![allow(dead_code)]

use agentnet::{
    AgentNetwork, CompletionOracle, CompletionRequest, IdentityLedger, InMemoryLedger, InteractionRules,
    LedgerError, NetworkTimings, OracleError, Purpose,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Oracle answering from a fixed script per purpose
pub struct ScriptedOracle {
    answers: Mutex<HashMap<&'static str, String>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedOracle {
    /// Everyone joins, replies "ack", classifies as chat and has nothing to add
    pub fn chatty() -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(HashMap::from([
                (Purpose::Participation.as_str(), "true".to_string()),
                (Purpose::Reply.as_str(), "ack".to_string()),
                (Purpose::Thought.as_str(), "NOTHING".to_string()),
                (Purpose::Analysis.as_str(), r#"{"type":"chat"}"#.to_string()),
                (Purpose::Plan.as_str(), "{}".to_string()),
            ])),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn answer(&self, purpose: Purpose, reply: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(purpose.as_str(), reply.to_string());
    }

    /// Make calls for `purpose` fail
    pub fn forget(&self, purpose: Purpose) {
        self.answers.lock().unwrap().remove(purpose.as_str());
    }

    pub fn calls(&self, purpose: Purpose) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(purpose.as_str())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CompletionOracle for ScriptedOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<String, OracleError> {
        let key = request.purpose.as_str();
        *self.calls.lock().unwrap().entry(key).or_insert(0) += 1;
        self.answers
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(OracleError::EmptyResponse)
    }
}

/// Ledger that refuses every registration after the first `allowed`
pub struct FlakyLedger {
    inner: InMemoryLedger,
    allowed: usize,
    registered: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(allowed: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryLedger::new(),
            allowed,
            registered: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl IdentityLedger for FlakyLedger {
    async fn initialize(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn register(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError> {
        if self.registered.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(LedgerError::Status {
                status: 503,
                body: "ledger unavailable".to_string(),
            });
        }
        self.inner.register(agent_id, signer).await
    }

    async fn deactivate(&self, agent_id: &str, signer: &str) -> Result<(), LedgerError> {
        self.inner.deactivate(agent_id, signer).await
    }
}

pub fn network_with(oracle: Arc<ScriptedOracle>, ledger: Arc<dyn IdentityLedger>) -> AgentNetwork {
    AgentNetwork::new(
        oracle,
        ledger,
        vec!["signer-a".to_string(), "signer-b".to_string()],
        InteractionRules::default(),
        NetworkTimings::default(),
    )
}

pub fn network(oracle: Arc<ScriptedOracle>) -> AgentNetwork {
    network_with(oracle, Arc::new(InMemoryLedger::new()))
}
