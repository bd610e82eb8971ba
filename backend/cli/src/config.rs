use serde::Deserialize;

/// Agora node runtime configuration, read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Log level
    pub log_level: String,
    /// This node's agent identity
    pub agent_id: String,
    pub agent_name: String,
    /// Issuer name stamped on verifiable credentials
    pub credential_issuer: String,
    /// Key for the local keyed-hash signer
    pub signing_key: String,
    /// Comma-separated validator ids for the consensus pool
    pub validators: Vec<String>,
    /// Approval ratio required for consensus
    pub consensus_threshold: f64,
    /// Minimum validator count before the consensus gate applies
    pub consensus_quorum: usize,
    /// Below-quorum behavior: auto-approve (low-trust mode) when true
    pub low_trust_auto_approve: bool,
    /// Mandate expiry sweep cadence in seconds
    pub expiry_sweep_secs: u64,
    /// Task timeout sweep cadence in seconds
    pub timeout_sweep_secs: u64,
    /// Terminal task retention in seconds
    pub task_retention_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            agent_id: "agora-node".to_string(),
            agent_name: "Agora Node".to_string(),
            credential_issuer: "agora".to_string(),
            signing_key: "dev-signing-key".to_string(),
            validators: Vec::new(),
            consensus_threshold: 2.0 / 3.0,
            consensus_quorum: 3,
            low_trust_auto_approve: false,
            expiry_sweep_secs: 30,
            timeout_sweep_secs: 5,
            task_retention_secs: 3600,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_or("AGORA_BIND_ADDRESS", defaults.bind_address),
            port: env_parse("AGORA_PORT", defaults.port),
            log_level: env_or("AGORA_LOG_LEVEL", defaults.log_level),
            agent_id: env_or("AGORA_AGENT_ID", defaults.agent_id),
            agent_name: env_or("AGORA_AGENT_NAME", defaults.agent_name),
            credential_issuer: env_or("AGORA_CREDENTIAL_ISSUER", defaults.credential_issuer),
            signing_key: env_or("AGORA_SIGNING_KEY", defaults.signing_key),
            validators: std::env::var("AGORA_VALIDATORS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.validators),
            consensus_threshold: env_parse("AGORA_CONSENSUS_THRESHOLD", defaults.consensus_threshold),
            consensus_quorum: env_parse("AGORA_CONSENSUS_QUORUM", defaults.consensus_quorum),
            low_trust_auto_approve: env_parse(
                "AGORA_LOW_TRUST_AUTO_APPROVE",
                defaults.low_trust_auto_approve,
            ),
            expiry_sweep_secs: env_parse("AGORA_EXPIRY_SWEEP_SECS", defaults.expiry_sweep_secs),
            timeout_sweep_secs: env_parse("AGORA_TIMEOUT_SWEEP_SECS", defaults.timeout_sweep_secs),
            task_retention_secs: env_parse("AGORA_TASK_RETENTION_SECS", defaults.task_retention_secs),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
