//! Multi-party agreement gate used to certify proposals as final.
//!
//! Independent of payment logic: any subsystem needing multi-party
//! agreement can submit a proposal. The shipped strategy is a single-round
//! threshold vote; a real multi-round Byzantine protocol can replace it
//! behind the [`ConsensusStrategy`] trait without touching callers.

pub mod proposal;
pub mod validator;

pub use proposal::{canonical_hash, ConsensusProposal, ConsensusResult, Vote};
pub use validator::{
    ConsensusStrategy, ConsensusValidator, LocalPool, SingleRoundStrategy, ValidatorPool,
    DEFAULT_QUORUM, DEFAULT_THRESHOLD,
};
