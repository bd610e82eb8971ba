use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A content hash plus proposer, submitted for multi-party agreement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusProposal {
    pub id: Uuid,
    pub content_hash: String,
    pub proposer: String,
    pub round: u32,
}

impl ConsensusProposal {
    pub fn new(content_hash: impl Into<String>, proposer: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_hash: content_hash.into(),
            proposer: proposer.into(),
            round: 1,
        }
    }
}

/// One validator's vote on a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub validator: String,
    pub approve: bool,
}

/// Outcome of a consensus round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub achieved: bool,
    /// Fraction of validators that approved, in [0, 1].
    pub ratio: f64,
    pub validators: Vec<String>,
    pub round: u32,
    /// True when the validator pool was below quorum and the gate was
    /// skipped rather than evaluated.
    #[serde(default)]
    pub skipped: bool,
}

/// Hex sha256 over the canonical JSON encoding of a payload.
///
/// serde_json emits object keys in struct-field order, so hashing the same
/// struct always yields the same bytes.
pub fn canonical_hash<T: Serialize>(payload: &T) -> anyhow::Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload<'a> {
        id: &'a str,
        amount: u64,
    }

    #[test]
    fn test_canonical_hash_is_deterministic() {
        let a = canonical_hash(&Payload { id: "tx-1", amount: 100 }).unwrap();
        let b = canonical_hash(&Payload { id: "tx-1", amount: 100 }).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_canonical_hash_differs_on_content() {
        let a = canonical_hash(&Payload { id: "tx-1", amount: 100 }).unwrap();
        let b = canonical_hash(&Payload { id: "tx-1", amount: 101 }).unwrap();
        assert_ne!(a, b);
    }
}
