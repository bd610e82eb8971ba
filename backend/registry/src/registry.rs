//! Agent registry: tracks all advertised agent cards, keyed by card id.
//!
//! Pure in-memory index. The only storage touch is export/import, which is
//! delegated to a caller-supplied `CardStore`.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use agora_core::{AgentCard, AgentCardPatch, AgoraError};

pub struct AgentRegistry {
    cards: Arc<RwLock<HashMap<String, AgentCard>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            cards: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or overwrite a card by id. Re-registering an existing id
    /// replaces the card, it never duplicates.
    pub async fn register(&self, card: AgentCard) {
        let mut cards = self.cards.write().await;
        if cards.contains_key(&card.id) {
            info!(agent_id = %card.id, "Re-registering agent card (overwrite)");
        } else {
            info!(agent_id = %card.id, name = %card.name, "Registered agent card");
        }
        cards.insert(card.id.clone(), card);
    }

    /// Remove a card. Returns whether it existed.
    pub async fn unregister(&self, id: &str) -> bool {
        let existed = self.cards.write().await.remove(id).is_some();
        if existed {
            info!(agent_id = %id, "Unregistered agent card");
        } else {
            warn!(agent_id = %id, "Unregister for unknown agent card");
        }
        existed
    }

    pub async fn get(&self, id: &str) -> Option<AgentCard> {
        self.cards.read().await.get(id).cloned()
    }

    /// Merge a partial update onto a stored card. The original id is
    /// preserved unconditionally.
    pub async fn update(&self, id: &str, patch: AgentCardPatch) -> Result<AgentCard, AgoraError> {
        let mut cards = self.cards.write().await;
        let card = cards
            .get_mut(id)
            .ok_or_else(|| AgoraError::not_found("agent card", id))?;

        if let Some(name) = patch.name {
            card.name = name;
        }
        if let Some(description) = patch.description {
            card.description = description;
        }
        if let Some(version) = patch.version {
            card.version = version;
        }
        if let Some(capabilities) = patch.capabilities {
            card.capabilities = capabilities;
        }
        if let Some(endpoints) = patch.endpoints {
            card.endpoints = endpoints;
        }
        if let Some(auth_scheme) = patch.auth_scheme {
            card.auth_scheme = Some(auth_scheme);
        }
        if let Some(metadata) = patch.metadata {
            card.metadata = metadata;
        }

        Ok(card.clone())
    }

    pub async fn list(&self) -> Vec<AgentCard> {
        self.cards.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.cards.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cards.read().await.is_empty()
    }

    /// Snapshot the full card set for external persistence.
    pub async fn export(&self) -> Vec<AgentCard> {
        self.list().await
    }

    /// Restore a card set, overwriting any ids already present.
    pub async fn import(&self, cards: Vec<AgentCard>) {
        let count = cards.len();
        let mut map = self.cards.write().await;
        for card in cards {
            map.insert(card.id.clone(), card);
        }
        info!(count, "Imported agent cards");
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
