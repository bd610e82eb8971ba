use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monetary amount in integer minor units (cents for USD) plus ISO
/// currency code. Integer math keeps the cart-total invariant exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub value_minor: u64,
    pub currency: String,
    /// Optional spend ceiling; when unset the ceiling is `value_minor`.
    pub max_minor: Option<u64>,
}

impl Amount {
    pub fn new(value_minor: u64, currency: impl Into<String>) -> Self {
        Self {
            value_minor,
            currency: currency.into(),
            max_minor: None,
        }
    }

    pub fn with_ceiling(mut self, max_minor: u64) -> Self {
        self.max_minor = Some(max_minor);
        self
    }

    /// The most this amount authorizes spending.
    pub fn ceiling(&self) -> u64 {
        self.max_minor.unwrap_or(self.value_minor)
    }
}

/// One line item in a cart mandate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_minor: u64,
    pub total_minor: u64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: RecurrenceFrequency,
    /// Every N periods (e.g. every 2 weeks).
    pub interval: u32,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub max_occurrences: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MandateKind {
    Intent,
    Cart,
    Recurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandateStatus {
    Pending,
    Authorized,
    Executed,
    Cancelled,
    Expired,
}

impl MandateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled | Self::Expired)
    }
}

/// The signed claim inside a verifiable credential: binds a mandate to an
/// amount and the actions it permits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialClaim {
    pub mandate_id: String,
    pub amount: Amount,
    pub actions: Vec<String>,
}

/// A signed claim checkable without contacting the issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub claim: CredentialClaim,
    /// Hex signature over the canonical claim bytes.
    pub signature: String,
}

/// A user's payment authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMandate {
    pub id: String,
    pub kind: MandateKind,
    pub status: MandateStatus,
    pub amount: Option<Amount>,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub recurrence: Option<RecurrenceRule>,
    pub credential: Option<VerifiableCredential>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PaymentMandate {
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

/// Signed settlement summary attached to a completed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub amount: Amount,
    pub from_account: String,
    pub to_account: String,
    /// Hex signature over the canonical receipt body.
    pub signature: String,
}

/// One settlement attempt against a mandate. References the mandate by id
/// only; mandate state is owned by the MandateManager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: String,
    pub mandate_id: String,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub from_account: String,
    pub to_account: String,
    pub escrow_id: Option<String>,
    pub receipt: Option<Receipt>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
