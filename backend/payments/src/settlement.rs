//! Settlement collaborator contract for the external payment rail.
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::types::Amount;

#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub success: bool,
    /// Rail-side reference for reconciliation.
    pub provider_ref: String,
}

#[async_trait]
pub trait SettlementRail: Send + Sync {
    async fn settle(&self, amount: &Amount, from: &str, to: &str) -> Result<SettlementOutcome>;
}

/// Rail for local mode and tests: settles instantly and synthesizes a
/// provider reference.
pub struct InstantRail;

#[async_trait]
impl SettlementRail for InstantRail {
    async fn settle(&self, _amount: &Amount, _from: &str, _to: &str) -> Result<SettlementOutcome> {
        Ok(SettlementOutcome {
            success: true,
            provider_ref: format!("instant-{}", Uuid::new_v4()),
        })
    }
}
