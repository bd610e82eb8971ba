//! AP2 payments layer: mandates, transactions, escrow, and settlement.
//!
//! A mandate is the user's payment authorization; a transaction is one
//! settlement attempt against it. Transactions are gated by the consensus
//! validator before they are final. Signing and the payment rail are
//! external collaborators consumed through traits.

pub mod mandate;
pub mod settlement;
pub mod signing;
pub mod transaction;
pub mod types;

pub use mandate::{MandateManager, ACTION_PAYMENT_EXECUTE};
pub use settlement::{InstantRail, SettlementOutcome, SettlementRail};
pub use signing::{KeyedHashSigner, Signer};
pub use transaction::{
    error_codes, EscrowEntry, PaymentOutcome, PaymentRequest, TransactionManager,
    TransactionMetrics,
};
pub use types::{
    Amount, CartItem, CredentialClaim, MandateKind, MandateStatus, PaymentMandate,
    PaymentTransaction, Receipt, RecurrenceFrequency, RecurrenceRule, TransactionStatus,
    VerifiableCredential,
};
