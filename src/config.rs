//! Configuration management

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ORACLE_URL: &str = "https://api.siliconflow.cn/v1/chat/completions";
const DEFAULT_ORACLE_MODEL: &str = "deepseek-ai/DeepSeek-R1-Distill-Qwen-7B";
const DEFAULT_SIGNER_COUNT: usize = 10;

/// Numeric rules governing connection strength and reply gating
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRules {
    /// Floor for every connection strength
    pub min_connection: f64,
    /// Ceiling for every connection strength
    pub max_connection: f64,
    /// Multiplier applied on a low-quality interaction
    pub decay_rate: f64,
    /// Scale of the boost on a positive interaction
    pub boost_rate: f64,
    /// Below this outgoing strength a non-leader stays silent
    pub response_threshold: f64,
    pub frequency_weight: f64,
    pub quality_weight: f64,
    /// Exponential decay per hour since the last interaction
    pub time_decay: f64,
    /// Flat boost added to every positive interaction
    pub baseline_boost: f64,
    /// Interaction count at which the frequency factor saturates
    pub frequency_saturation: u32,
    /// Qualities strictly above this count as positive
    pub positive_quality_cutoff: f64,
    /// Fan-out ceiling per session; `None` (default) disables it
    pub max_conversation_turns: Option<u32>,
    /// Sampling temperature at zero strength
    pub base_temperature: f64,
    /// Extra temperature per unit of strength
    pub temperature_scale: f64,
    /// Rolling context kept by each agent
    pub context_window: usize,
    pub max_workload: u32,
}

impl Default for InteractionRules {
    fn default() -> Self {
        Self {
            min_connection: 0.2,
            max_connection: 1.0,
            decay_rate: 0.98,
            boost_rate: 0.25,
            response_threshold: 0.15,
            frequency_weight: 0.4,
            quality_weight: 0.6,
            time_decay: 0.05,
            baseline_boost: 0.05,
            frequency_saturation: 15,
            positive_quality_cutoff: 0.3,
            max_conversation_turns: None,
            base_temperature: 0.7,
            temperature_scale: 0.3,
            context_window: 10,
            max_workload: 3,
        }
    }
}

impl InteractionRules {
    /// Clamp a strength into `[min_connection, max_connection]`
    pub fn clamp(&self, strength: f64) -> f64 {
        strength.clamp(self.min_connection, self.max_connection)
    }

    /// Sampling temperature for a reply given the outgoing strength
    pub fn temperature_for(&self, strength: f64) -> f64 {
        self.base_temperature + strength * self.temperature_scale
    }
}

/// Periods of the background loops
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkTimings {
    /// Idle "think" period per agent
    pub think_interval: Duration,
    /// Collaboration pulse period per task
    pub pulse_interval: Duration,
    /// Progress poll period per task
    pub poll_interval: Duration,
    /// How often the router checks for an idle session
    pub sweep_interval: Duration,
    /// Idle time after which the session is discarded
    pub session_timeout: Duration,
}

impl Default for NetworkTimings {
    fn default() -> Self {
        Self {
            think_interval: Duration::from_secs(10),
            pulse_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            session_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Completion oracle settings
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_url: String,
    /// Bearer token (optional - calls fail without it)
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ORACLE_URL.to_string(),
            api_key: None,
            model: DEFAULT_ORACLE_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP/WebSocket server
    pub bind_addr: SocketAddr,

    pub oracle: OracleConfig,

    /// Identity ledger base URL; in-memory ledger when unset
    pub ledger_url: Option<String>,

    /// Signer identities handed out round-robin to new agents
    pub signers: Vec<String>,

    /// Agents registered at startup
    pub bootstrap_agents: Vec<String>,

    /// Directory of static frontend files (optional)
    pub static_dir: Option<PathBuf>,

    /// Emit logs as JSON
    pub json_logs: bool,

    pub rules: InteractionRules,

    pub timings: NetworkTimings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            oracle: OracleConfig::default(),
            ledger_url: None,
            signers: default_signers(),
            bootstrap_agents: vec!["Agent1".into(), "Agent2".into(), "Agent3".into()],
            static_dir: None,
            json_logs: false,
            rules: InteractionRules::default(),
            timings: NetworkTimings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("AGENTNET_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("AGENTNET_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);
        let bind_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let oracle = OracleConfig {
            api_url: std::env::var("ORACLE_API_URL")
                .unwrap_or_else(|_| DEFAULT_ORACLE_URL.to_string()),
            api_key: std::env::var("ORACLE_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("ORACLE_MODEL")
                .unwrap_or_else(|_| DEFAULT_ORACLE_MODEL.to_string()),
            timeout: Duration::from_secs(
                std::env::var("ORACLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
        };

        let ledger_url = std::env::var("LEDGER_URL").ok().filter(|u| !u.is_empty());

        let signers = std::env::var("LEDGER_SIGNERS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| default_signers());

        let bootstrap_agents = std::env::var("AGENTNET_BOOTSTRAP_AGENTS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| Config::default().bootstrap_agents);

        let static_dir = std::env::var("AGENTNET_STATIC_DIR")
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                let dir = PathBuf::from("frontend");
                dir.is_dir().then_some(dir)
            });

        let json_logs = std::env::var("AGENTNET_LOG_JSON")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let rules = InteractionRules {
            max_conversation_turns: std::env::var("AGENTNET_MAX_TURNS")
                .ok()
                .and_then(|v| parse_turn_ceiling(&v)),
            ..InteractionRules::default()
        };

        Ok(Self {
            bind_addr,
            oracle,
            ledger_url,
            signers,
            bootstrap_agents,
            static_dir,
            json_logs,
            rules,
            timings: NetworkTimings::default(),
        })
    }
}

fn default_signers() -> Vec<String> {
    (0..DEFAULT_SIGNER_COUNT)
        .map(|i| format!("local-signer-{}", i))
        .collect()
}

/// Positive integers set the ceiling; anything else disables it
fn parse_turn_ceiling(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_match_network_constants() {
        let rules = InteractionRules::default();
        assert_eq!(rules.min_connection, 0.2);
        assert_eq!(rules.response_threshold, 0.15);
        assert_eq!(rules.max_conversation_turns, None);
        assert_eq!(rules.max_workload, 3);
    }

    #[test]
    fn test_clamp_and_temperature() {
        let rules = InteractionRules::default();
        assert_eq!(rules.clamp(5.0), 1.0);
        assert_eq!(rules.clamp(-1.0), 0.2);
        assert!((rules.temperature_for(1.0) - 1.0).abs() < 1e-9);
        assert!((rules.temperature_for(0.0) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_parse_turn_ceiling() {
        assert_eq!(parse_turn_ceiling("8"), Some(8));
        assert_eq!(parse_turn_ceiling(" 12 "), Some(12));
        assert_eq!(parse_turn_ceiling("0"), None);
        assert_eq!(parse_turn_ceiling("off"), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_default_signers() {
        let config = Config::default();
        assert_eq!(config.signers.len(), 10);
        assert_eq!(config.bootstrap_agents.len(), 3);
    }
}
