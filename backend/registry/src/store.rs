//! Persistence seam for the registry.
//!
//! The registry itself never does I/O; callers hand it a `CardStore` when
//! they want the card set persisted or restored.
use anyhow::Result;
use async_trait::async_trait;

use agora_core::AgentCard;

use crate::registry::AgentRegistry;

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn save(&self, cards: &[AgentCard]) -> Result<()>;
    async fn load(&self) -> Result<Vec<AgentCard>>;
}

/// Persist the registry's current card set through the given store.
pub async fn persist(registry: &AgentRegistry, store: &dyn CardStore) -> Result<()> {
    let cards = registry.export().await;
    store.save(&cards).await
}

/// Restore cards from the given store into the registry.
pub async fn restore(registry: &AgentRegistry, store: &dyn CardStore) -> Result<usize> {
    let cards = store.load().await?;
    let count = cards.len();
    registry.import(cards).await;
    Ok(count)
}
