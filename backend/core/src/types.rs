use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identity and capability advertisement for one agent ("agent card").
///
/// The `id` is unique within a registry and immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub endpoints: Vec<AgentEndpoint>,
    pub auth_scheme: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentCard {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            capabilities: Vec::new(),
            endpoints: Vec::new(),
            auth_scheme: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_endpoint(mut self, endpoint: AgentEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Whether this card advertises a capability matching `key` by id or name.
    pub fn has_capability(&self, key: &str) -> bool {
        self.capabilities.iter().any(|c| c.id == key || c.name == key)
    }

    pub fn capability(&self, key: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.id == key || c.name == key)
    }
}

/// One advertised skill on an agent card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub id: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    /// Protocol version strings this capability speaks (e.g. "a2a/1.0").
    pub protocols: Vec<String>,
    pub constraints: Option<CapabilityConstraints>,
}

impl Capability {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::Value::Null,
            output_schema: serde_json::Value::Null,
            protocols: Vec::new(),
            constraints: None,
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    pub fn with_constraints(mut self, constraints: CapabilityConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn requires_payment(&self) -> bool {
        self.constraints
            .as_ref()
            .map(|c| c.requires_payment)
            .unwrap_or(false)
    }
}

/// Optional limits attached to a capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityConstraints {
    pub rate_limit_per_min: Option<u32>,
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub requires_payment: bool,
}

/// A reachable address for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEndpoint {
    pub url: String,
    pub transport: TransportKind,
    pub serialization: SerializationStyle,
    #[serde(default)]
    pub auth_schemes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Https,
    Ws,
    Wss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationStyle {
    Rpc,
    Rest,
}

/// Partial update applied to a registered card. The card id is never
/// changed by a patch, even if one is supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCardPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub capabilities: Option<Vec<Capability>>,
    pub endpoints: Option<Vec<AgentEndpoint>>,
    pub auth_scheme: Option<String>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}
