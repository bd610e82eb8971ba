//! Consensus validator: collects votes from a validator pool and decides
//! whether a proposal is certified.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::proposal::{ConsensusProposal, ConsensusResult, Vote};

/// Minimum validator count before the gate is meaningful.
pub const DEFAULT_QUORUM: usize = 3;
/// Approval ratio required for agreement (Byzantine 2/3 bound).
pub const DEFAULT_THRESHOLD: f64 = 2.0 / 3.0;

/// Source of votes. The transport behind it (in-process, RPC, gossip) is
/// outside this crate; only the threshold math here is normative.
#[async_trait]
pub trait ValidatorPool: Send + Sync {
    async fn vote(&self, validator: &str, proposal: &ConsensusProposal) -> bool;
}

/// Pool for local mode: every validator approves every proposal.
pub struct LocalPool;

#[async_trait]
impl ValidatorPool for LocalPool {
    async fn vote(&self, _validator: &str, _proposal: &ConsensusProposal) -> bool {
        true
    }
}

/// A pluggable agreement protocol.
#[async_trait]
pub trait ConsensusStrategy: Send + Sync {
    async fn evaluate(
        &self,
        proposal: &ConsensusProposal,
        validators: &[String],
    ) -> ConsensusResult;
}

/// Single-round threshold vote: every validator votes once, agreement is
/// reached when the approval ratio meets the threshold.
pub struct SingleRoundStrategy {
    pool: Arc<dyn ValidatorPool>,
    threshold: f64,
}

impl SingleRoundStrategy {
    pub fn new(pool: Arc<dyn ValidatorPool>) -> Self {
        Self {
            pool,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl ConsensusStrategy for SingleRoundStrategy {
    async fn evaluate(
        &self,
        proposal: &ConsensusProposal,
        validators: &[String],
    ) -> ConsensusResult {
        let mut votes = Vec::with_capacity(validators.len());
        for validator in validators {
            let approve = self.pool.vote(validator, proposal).await;
            votes.push(Vote {
                validator: validator.clone(),
                approve,
            });
        }

        let approvals = votes.iter().filter(|v| v.approve).count();
        let ratio = if validators.is_empty() {
            0.0
        } else {
            approvals as f64 / validators.len() as f64
        };

        ConsensusResult {
            achieved: ratio >= self.threshold,
            ratio,
            validators: validators.to_vec(),
            round: proposal.round,
            skipped: false,
        }
    }
}

/// The consensus gate. Holds the validator set, the quorum floor, and the
/// strategy used to evaluate proposals at or above quorum.
pub struct ConsensusValidator {
    strategy: Arc<dyn ConsensusStrategy>,
    validators: Vec<String>,
    quorum: usize,
    /// Below-quorum behavior: when set, proposals are auto-approved with
    /// `skipped = true` (low-trust mode); when unset, they are rejected.
    low_trust_auto_approve: bool,
}

impl ConsensusValidator {
    pub fn new(strategy: Arc<dyn ConsensusStrategy>, validators: Vec<String>) -> Self {
        Self {
            strategy,
            validators,
            quorum: DEFAULT_QUORUM,
            low_trust_auto_approve: false,
        }
    }

    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn with_low_trust_auto_approve(mut self, enabled: bool) -> Self {
        self.low_trust_auto_approve = enabled;
        self
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Submit a proposal to the gate.
    pub async fn submit(&self, proposal: &ConsensusProposal) -> ConsensusResult {
        if self.validators.len() < self.quorum {
            warn!(
                validators = self.validators.len(),
                quorum = self.quorum,
                auto_approve = self.low_trust_auto_approve,
                "Validator pool below quorum, consensus skipped"
            );
            return ConsensusResult {
                achieved: self.low_trust_auto_approve,
                ratio: 0.0,
                validators: self.validators.clone(),
                round: proposal.round,
                skipped: true,
            };
        }

        let result = self.strategy.evaluate(proposal, &self.validators).await;
        info!(
            proposal_id = %proposal.id,
            achieved = result.achieved,
            ratio = result.ratio,
            "Consensus round evaluated"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pool where a fixed set of validator ids approve everything and the
    /// rest reject everything.
    struct FixedPool {
        approvers: Vec<String>,
    }

    #[async_trait]
    impl ValidatorPool for FixedPool {
        async fn vote(&self, validator: &str, _proposal: &ConsensusProposal) -> bool {
            self.approvers.iter().any(|a| a == validator)
        }
    }

    fn validators(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{}", i)).collect()
    }

    fn gate(approving: usize, total: usize) -> ConsensusValidator {
        let pool = Arc::new(FixedPool {
            approvers: validators(approving),
        });
        ConsensusValidator::new(
            Arc::new(SingleRoundStrategy::new(pool)),
            validators(total),
        )
    }

    #[tokio::test]
    async fn test_unanimous_approval_achieves_consensus() {
        let result = gate(4, 4).submit(&ConsensusProposal::new("h", "p")).await;
        assert!(result.achieved);
        assert!(!result.skipped);
        assert_eq!(result.ratio, 1.0);
    }

    #[tokio::test]
    async fn test_below_threshold_rejects() {
        // 2 of 4 approve, below the 2/3 bound.
        let result = gate(2, 4).submit(&ConsensusProposal::new("h", "p")).await;
        assert!(!result.achieved);
        assert_eq!(result.ratio, 0.5);
    }

    #[tokio::test]
    async fn test_exactly_at_threshold_achieves() {
        // 2 of 3 approve, exactly 2/3.
        let result = gate(2, 3).submit(&ConsensusProposal::new("h", "p")).await;
        assert!(result.achieved);
    }

    #[tokio::test]
    async fn test_below_quorum_strict_mode_rejects() {
        let result = gate(2, 2).submit(&ConsensusProposal::new("h", "p")).await;
        assert!(!result.achieved);
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_below_quorum_low_trust_mode_approves() {
        let gate = gate(0, 2).with_low_trust_auto_approve(true);
        let result = gate.submit(&ConsensusProposal::new("h", "p")).await;
        assert!(result.achieved);
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_custom_quorum() {
        // Five validators, quorum raised to six: still skipped.
        let gate = gate(5, 5).with_quorum(6);
        let result = gate.submit(&ConsensusProposal::new("h", "p")).await;
        assert!(result.skipped);
    }
}
