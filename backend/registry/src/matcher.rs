//! Capability matcher: discovery queries over the registry.
//!
//! All filter dimensions are ANDed. A card matches only if it satisfies
//! every requested capability, every requested protocol, and the text
//! filter when one is given.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use agora_core::AgentCard;

use crate::registry::AgentRegistry;

/// Discovery filter carried in `discovery` protocol requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFilter {
    /// Capability ids or names that must all be present.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Protocol versions that must each appear in some capability.
    #[serde(default)]
    pub protocols: Vec<String>,
    /// Case-insensitive substring match on card name/description.
    pub text: Option<String>,
    /// Filter on the requires-payment constraint flag.
    pub requires_payment: Option<bool>,
}

pub struct CapabilityMatcher {
    registry: Arc<AgentRegistry>,
}

impl CapabilityMatcher {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub async fn find(&self, filter: &DiscoveryFilter) -> Vec<AgentCard> {
        self.registry
            .list()
            .await
            .into_iter()
            .filter(|card| Self::matches(card, filter))
            .collect()
    }

    pub async fn find_by_capability(&self, capability: &str) -> Vec<AgentCard> {
        self.find(&DiscoveryFilter {
            capabilities: vec![capability.to_string()],
            ..Default::default()
        })
        .await
    }

    fn matches(card: &AgentCard, filter: &DiscoveryFilter) -> bool {
        if !filter.capabilities.iter().all(|c| card.has_capability(c)) {
            return false;
        }

        let protocols_ok = filter.protocols.iter().all(|p| {
            card.capabilities
                .iter()
                .any(|cap| cap.protocols.iter().any(|v| v == p))
        });
        if !protocols_ok {
            return false;
        }

        if let Some(text) = &filter.text {
            let needle = text.to_lowercase();
            let hit = card.name.to_lowercase().contains(&needle)
                || card.description.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }

        if let Some(paid) = filter.requires_payment {
            let any_paid = card.capabilities.iter().any(|c| c.requires_payment());
            if any_paid != paid {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{Capability, CapabilityConstraints};

    async fn seeded_registry() -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .register(
                AgentCard::new("a1", "Translator")
                    .with_description("Translates text between languages")
                    .with_capability(
                        Capability::new("cap-translate", "translate").with_protocol("a2a/1.0"),
                    ),
            )
            .await;
        registry
            .register(
                AgentCard::new("a2", "Summarizer")
                    .with_description("Summarizes long documents")
                    .with_capability(
                        Capability::new("cap-summarize", "summarize")
                            .with_protocol("a2a/2.0")
                            .with_constraints(CapabilityConstraints {
                                requires_payment: true,
                                ..Default::default()
                            }),
                    ),
            )
            .await;
        registry
    }

    #[tokio::test]
    async fn test_filter_by_capability_name() {
        let matcher = CapabilityMatcher::new(seeded_registry().await);
        let hits = matcher.find_by_capability("translate").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a1");
    }

    #[tokio::test]
    async fn test_filter_by_protocol() {
        let matcher = CapabilityMatcher::new(seeded_registry().await);
        let hits = matcher
            .find(&DiscoveryFilter {
                protocols: vec!["a2a/2.0".to_string()],
                ..Default::default()
            })
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a2");
    }

    #[tokio::test]
    async fn test_text_filter_is_case_insensitive() {
        let matcher = CapabilityMatcher::new(seeded_registry().await);
        let hits = matcher
            .find(&DiscoveryFilter {
                text: Some("DOCUMENTS".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a2");
    }

    #[tokio::test]
    async fn test_filters_are_anded() {
        let matcher = CapabilityMatcher::new(seeded_registry().await);
        // Capability matches a1 and protocol matches a2, so together nothing.
        let hits = matcher
            .find(&DiscoveryFilter {
                capabilities: vec!["translate".to_string()],
                protocols: vec!["a2a/2.0".to_string()],
                ..Default::default()
            })
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_requires_payment_filter() {
        let matcher = CapabilityMatcher::new(seeded_registry().await);
        let paid = matcher
            .find(&DiscoveryFilter {
                requires_payment: Some(true),
                ..Default::default()
            })
            .await;
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id, "a2");
    }
}
