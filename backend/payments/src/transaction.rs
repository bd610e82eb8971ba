//! Transaction manager: exclusive owner of the transaction and escrow
//! ledgers. Mandates are referenced by id only; their state is owned by
//! the MandateManager.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use agora_consensus::{canonical_hash, ConsensusProposal, ConsensusValidator};
use agora_core::{AgoraError, EventBus, EventKind};

use crate::mandate::MandateManager;
use crate::settlement::SettlementRail;
use crate::signing::Signer;
use crate::types::{Amount, PaymentTransaction, Receipt, TransactionStatus};

/// Wire-level error codes surfaced in payment responses.
pub mod error_codes {
    pub const INVALID_MANDATE: &str = "INVALID_MANDATE";
    pub const SETTLEMENT_FAILED: &str = "SETTLEMENT_FAILED";
    pub const CONSENSUS_REJECTED: &str = "CONSENSUS_REJECTED";
    pub const REFUND_EXCEEDS_ORIGINAL: &str = "REFUND_EXCEEDS_ORIGINAL";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

/// A payment execution request arriving over the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub mandate_id: String,
    pub amount: Amount,
    pub description: Option<String>,
}

/// Result of a payment or refund attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub success: bool,
    pub transaction: Option<PaymentTransaction>,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

impl PaymentOutcome {
    fn ok(transaction: PaymentTransaction) -> Self {
        Self {
            success: true,
            transaction: Some(transaction),
            error_code: None,
            error: None,
        }
    }

    fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction: None,
            error_code: Some(code.to_string()),
            error: Some(message.into()),
        }
    }

    fn failed_with(transaction: PaymentTransaction, code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction: Some(transaction),
            error_code: Some(code.to_string()),
            error: Some(message.into()),
        }
    }
}

/// Funds held while a transaction awaits consensus certification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowEntry {
    pub id: String,
    pub transaction_id: String,
    pub amount: Amount,
    pub released: bool,
}

/// Aggregated in-process transaction metrics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetrics {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub refunded: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

pub struct TransactionManager {
    transactions: Arc<RwLock<HashMap<String, PaymentTransaction>>>,
    escrow: Arc<RwLock<HashMap<String, EscrowEntry>>>,
    latencies_ms: Arc<RwLock<Vec<u64>>>,
    mandates: Arc<MandateManager>,
    consensus: Arc<ConsensusValidator>,
    rail: Arc<dyn SettlementRail>,
    signer: Arc<dyn Signer>,
    events: EventBus,
}

/// Fields bound into the consensus proposal hash for a settlement.
#[derive(Serialize)]
struct SettlementDigest<'a> {
    transaction_id: &'a str,
    value_minor: u64,
    currency: &'a str,
    provider_ref: &'a str,
    status: &'a str,
}

impl TransactionManager {
    pub fn new(
        mandates: Arc<MandateManager>,
        consensus: Arc<ConsensusValidator>,
        rail: Arc<dyn SettlementRail>,
        signer: Arc<dyn Signer>,
        events: EventBus,
    ) -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
            escrow: Arc::new(RwLock::new(HashMap::new())),
            latencies_ms: Arc::new(RwLock::new(Vec::new())),
            mandates,
            consensus,
            rail,
            signer,
            events,
        }
    }

    /// Execute a payment against an authorized mandate.
    ///
    /// Pipeline: mandate verify → escrow hold → settlement rail →
    /// consensus gate → receipt + mandate execute. A verify failure
    /// creates no transaction record at all.
    pub async fn execute_payment(
        &self,
        request: PaymentRequest,
        from_account: &str,
        to_account: &str,
    ) -> PaymentOutcome {
        let started = Utc::now();

        if !self.mandates.verify(&request.mandate_id, &request.amount).await {
            warn!(mandate_id = %request.mandate_id, "Payment refused: mandate verification failed");
            return PaymentOutcome::failed(
                error_codes::INVALID_MANDATE,
                format!("mandate {} did not verify", request.mandate_id),
            );
        }

        let now = Utc::now();
        let mut tx = PaymentTransaction {
            id: Uuid::new_v4().to_string(),
            mandate_id: request.mandate_id.clone(),
            amount: request.amount.clone(),
            status: TransactionStatus::Pending,
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            escrow_id: None,
            receipt: None,
            description: request.description.clone(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        self.store(tx.clone()).await;
        self.events.publish(
            EventKind::TransactionStarted,
            serde_json::json!({"transactionId": tx.id, "mandateId": tx.mandate_id}),
        );

        // Hold the amount in escrow while settlement and consensus run.
        let escrow_id = self.hold_escrow(&tx.id, &request.amount).await;
        tx.escrow_id = Some(escrow_id.clone());
        tx.status = TransactionStatus::Processing;
        self.store(tx.clone()).await;

        let settlement = match self
            .rail
            .settle(&request.amount, from_account, to_account)
            .await
        {
            Ok(outcome) if outcome.success => outcome,
            Ok(outcome) => {
                return self
                    .fail_transaction(
                        tx,
                        started,
                        error_codes::SETTLEMENT_FAILED,
                        format!("rail declined settlement ({})", outcome.provider_ref),
                    )
                    .await;
            }
            Err(e) => {
                error!(transaction_id = %tx.id, error = %e, "Settlement rail unreachable");
                return self
                    .fail_transaction(
                        tx,
                        started,
                        error_codes::SETTLEMENT_FAILED,
                        format!("settlement rail error: {}", e),
                    )
                    .await;
            }
        };

        // Certify the settlement before declaring it final.
        let digest = SettlementDigest {
            transaction_id: &tx.id,
            value_minor: tx.amount.value_minor,
            currency: &tx.amount.currency,
            provider_ref: &settlement.provider_ref,
            status: "settled",
        };
        let hash = match canonical_hash(&digest) {
            Ok(hash) => hash,
            Err(e) => {
                return self
                    .fail_transaction(
                        tx,
                        started,
                        error_codes::CONSENSUS_REJECTED,
                        format!("proposal hash failed: {}", e),
                    )
                    .await;
            }
        };
        let proposal = ConsensusProposal::new(hash, &tx.from_account);
        let result = self.consensus.submit(&proposal).await;

        if !result.achieved {
            // The mandate is left untouched so the caller can retry with a
            // fresh transaction against the same authorization.
            return self
                .fail_transaction(
                    tx,
                    started,
                    error_codes::CONSENSUS_REJECTED,
                    format!("consensus rejected settlement (ratio {:.2})", result.ratio),
                )
                .await;
        }

        let receipt = match self.build_receipt(&tx).await {
            Ok(receipt) => receipt,
            Err(e) => {
                return self
                    .fail_transaction(tx, started, error_codes::SETTLEMENT_FAILED, e.to_string())
                    .await;
            }
        };

        // The transaction completes only together with the mandate flip;
        // if the mandate changed underneath us the whole payment fails.
        if let Err(e) = self.mandates.execute(&tx.mandate_id).await {
            error!(mandate_id = %tx.mandate_id, error = %e, "Mandate execute failed post-consensus");
            return self
                .fail_transaction(tx, started, error_codes::INVALID_MANDATE, e.to_string())
                .await;
        }

        tx.status = TransactionStatus::Completed;
        tx.receipt = Some(receipt);
        tx.metadata.insert(
            "providerRef".to_string(),
            serde_json::Value::String(settlement.provider_ref),
        );
        if result.skipped {
            tx.metadata
                .insert("consensusSkipped".to_string(), serde_json::Value::Bool(true));
        }
        tx.updated_at = Utc::now();
        self.store(tx.clone()).await;
        self.release_escrow(&escrow_id).await;

        self.record_latency(started).await;
        info!(transaction_id = %tx.id, "Transaction completed");
        self.events.publish(
            EventKind::TransactionSettled,
            serde_json::json!({"transactionId": tx.id}),
        );
        PaymentOutcome::ok(tx)
    }

    async fn fail_transaction(
        &self,
        mut tx: PaymentTransaction,
        started: chrono::DateTime<Utc>,
        code: &str,
        message: String,
    ) -> PaymentOutcome {
        warn!(transaction_id = %tx.id, code, %message, "Transaction failed");
        tx.status = TransactionStatus::Failed;
        tx.updated_at = Utc::now();
        self.store(tx.clone()).await;
        if let Some(escrow_id) = &tx.escrow_id {
            self.void_escrow(escrow_id).await;
        }
        self.record_latency(started).await;
        self.events.publish(
            EventKind::TransactionFailed,
            serde_json::json!({"transactionId": tx.id, "code": code}),
        );
        PaymentOutcome::failed_with(tx, code, message)
    }

    async fn build_receipt(&self, tx: &PaymentTransaction) -> Result<Receipt, AgoraError> {
        let mut receipt = Receipt {
            transaction_id: tx.id.clone(),
            timestamp: Utc::now(),
            amount: tx.amount.clone(),
            from_account: tx.from_account.clone(),
            to_account: tx.to_account.clone(),
            signature: String::new(),
        };
        let body =
            serde_json::to_vec(&receipt).map_err(|e| AgoraError::Signing(e.to_string()))?;
        let signature = self
            .signer
            .sign(&body)
            .await
            .map_err(|e| AgoraError::Signing(e.to_string()))?;
        receipt.signature = hex::encode(signature);
        Ok(receipt)
    }

    /// Refund a completed transaction, fully or partially.
    ///
    /// Produces a new transaction with from/to reversed and a metadata
    /// back-reference; the original keeps its monetary fields and flips
    /// to `refunded`.
    pub async fn refund(
        &self,
        original_id: &str,
        amount: Option<Amount>,
    ) -> Result<PaymentTransaction, AgoraError> {
        let original = self
            .get(original_id)
            .await
            .ok_or_else(|| AgoraError::not_found("transaction", original_id))?;

        if original.status != TransactionStatus::Completed {
            return Err(AgoraError::StateConflict(format!(
                "transaction {} is {:?}, only completed transactions can be refunded",
                original_id, original.status
            )));
        }

        let refund_amount = amount.unwrap_or_else(|| original.amount.clone());
        if refund_amount.currency != original.amount.currency {
            return Err(AgoraError::Validation(
                "refund currency must match the original".into(),
            ));
        }
        if refund_amount.value_minor > original.amount.value_minor {
            return Err(AgoraError::Validation(format!(
                "refund of {} exceeds original amount {}",
                refund_amount.value_minor, original.amount.value_minor
            )));
        }

        let now = Utc::now();
        let mut metadata = HashMap::new();
        metadata.insert(
            "refundOf".to_string(),
            serde_json::Value::String(original_id.to_string()),
        );
        let refund_tx = PaymentTransaction {
            id: Uuid::new_v4().to_string(),
            mandate_id: original.mandate_id.clone(),
            amount: refund_amount,
            status: TransactionStatus::Completed,
            // Reversed route: money flows back to the payer.
            from_account: original.to_account.clone(),
            to_account: original.from_account.clone(),
            escrow_id: None,
            receipt: None,
            description: Some(format!("refund of {}", original_id)),
            metadata,
            created_at: now,
            updated_at: now,
        };

        {
            let mut transactions = self.transactions.write().await;
            if let Some(orig) = transactions.get_mut(original_id) {
                orig.status = TransactionStatus::Refunded;
                orig.updated_at = now;
            }
            transactions.insert(refund_tx.id.clone(), refund_tx.clone());
        }

        info!(original_id = %original_id, refund_id = %refund_tx.id, "Transaction refunded");
        self.events.publish(
            EventKind::TransactionRefunded,
            serde_json::json!({"transactionId": original_id, "refundId": refund_tx.id}),
        );
        Ok(refund_tx)
    }

    async fn store(&self, tx: PaymentTransaction) {
        self.transactions.write().await.insert(tx.id.clone(), tx);
    }

    async fn hold_escrow(&self, transaction_id: &str, amount: &Amount) -> String {
        let entry = EscrowEntry {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            amount: amount.clone(),
            released: false,
        };
        let id = entry.id.clone();
        self.escrow.write().await.insert(id.clone(), entry);
        id
    }

    async fn release_escrow(&self, escrow_id: &str) {
        let mut escrow = self.escrow.write().await;
        if let Some(entry) = escrow.get_mut(escrow_id) {
            entry.released = true;
        }
    }

    async fn void_escrow(&self, escrow_id: &str) {
        self.escrow.write().await.remove(escrow_id);
    }

    pub async fn escrow_entry(&self, escrow_id: &str) -> Option<EscrowEntry> {
        self.escrow.read().await.get(escrow_id).cloned()
    }

    async fn record_latency(&self, started: chrono::DateTime<Utc>) {
        let latency = Utc::now()
            .signed_duration_since(started)
            .num_milliseconds()
            .max(0) as u64;
        self.latencies_ms.write().await.push(latency);
    }

    pub async fn get(&self, id: &str) -> Option<PaymentTransaction> {
        self.transactions.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<PaymentTransaction> {
        self.transactions.read().await.values().cloned().collect()
    }

    /// Aggregate count, success rate, and average latency over every
    /// transaction processed in this process.
    pub async fn metrics(&self) -> TransactionMetrics {
        let transactions = self.transactions.read().await;
        let total = transactions.len() as u64;
        let completed = transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Completed)
            .count() as u64;
        let failed = transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Failed)
            .count() as u64;
        let refunded = transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Refunded)
            .count() as u64;
        drop(transactions);

        let latencies = self.latencies_ms.read().await;
        let avg_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
        };

        TransactionMetrics {
            total,
            completed,
            failed,
            refunded,
            success_rate: if total == 0 {
                1.0
            } else {
                (completed + refunded) as f64 / total as f64
            },
            avg_latency_ms,
        }
    }
}
