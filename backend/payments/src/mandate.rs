//! Mandate manager: exclusive owner of the mandate ledger.
//!
//! No other component mutates mandate status; the transaction manager
//! interacts through `verify` and `execute` only.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_core::{AgoraError, EventBus, EventKind};

use crate::signing::Signer;
use crate::types::{
    Amount, CartItem, CredentialClaim, MandateKind, MandateStatus, PaymentMandate,
    RecurrenceRule, VerifiableCredential,
};

/// Permission carried by the credential attached at authorization.
pub const ACTION_PAYMENT_EXECUTE: &str = "payment.execute";

pub struct MandateManager {
    mandates: Arc<RwLock<HashMap<String, PaymentMandate>>>,
    signer: Arc<dyn Signer>,
    issuer: String,
    events: EventBus,
}

impl MandateManager {
    pub fn new(signer: Arc<dyn Signer>, issuer: impl Into<String>, events: EventBus) -> Self {
        Self {
            mandates: Arc::new(RwLock::new(HashMap::new())),
            signer,
            issuer: issuer.into(),
            events,
        }
    }

    /// Create an INTENT mandate: a single planned payment with a TTL.
    pub async fn create_intent(
        &self,
        amount: Amount,
        ttl: Duration,
    ) -> Result<PaymentMandate, AgoraError> {
        if amount.value_minor == 0 {
            return Err(AgoraError::Validation("amount must be positive".into()));
        }
        let mandate = self
            .insert(MandateKind::Intent, Some(amount), Vec::new(), None, Some(ttl))
            .await;
        Ok(mandate)
    }

    /// Create a CART mandate from line items. The top-level amount is the
    /// sum of item totals; all items must share one currency.
    pub async fn create_cart(
        &self,
        items: Vec<CartItem>,
        ttl: Duration,
    ) -> Result<PaymentMandate, AgoraError> {
        if items.is_empty() {
            return Err(AgoraError::Validation("cart is empty".into()));
        }
        let currency = items[0].currency.clone();
        if items.iter().any(|i| i.currency != currency) {
            return Err(AgoraError::Validation(
                "cart items must share one currency".into(),
            ));
        }
        for item in &items {
            if item.total_minor != item.unit_price_minor * item.quantity as u64 {
                return Err(AgoraError::Validation(format!(
                    "item {} total does not match quantity × unit price",
                    item.id
                )));
            }
        }
        let total: u64 = items.iter().map(|i| i.total_minor).sum();
        let amount = Amount::new(total, currency);

        let mandate = self
            .insert(MandateKind::Cart, Some(amount), items, None, Some(ttl))
            .await;
        Ok(mandate)
    }

    /// Create a RECURRING mandate: a per-occurrence amount plus a
    /// recurrence rule. Expiry follows the rule's end date when set.
    pub async fn create_recurring(
        &self,
        amount: Amount,
        recurrence: RecurrenceRule,
    ) -> Result<PaymentMandate, AgoraError> {
        if amount.value_minor == 0 {
            return Err(AgoraError::Validation("amount must be positive".into()));
        }
        if recurrence.interval == 0 {
            return Err(AgoraError::Validation(
                "recurrence interval must be at least 1".into(),
            ));
        }
        let ttl = recurrence
            .end
            .map(|end| end.signed_duration_since(Utc::now()));
        let mandate = self
            .insert(
                MandateKind::Recurring,
                Some(amount),
                Vec::new(),
                Some(recurrence),
                ttl,
            )
            .await;
        Ok(mandate)
    }

    async fn insert(
        &self,
        kind: MandateKind,
        amount: Option<Amount>,
        items: Vec<CartItem>,
        recurrence: Option<RecurrenceRule>,
        ttl: Option<Duration>,
    ) -> PaymentMandate {
        let now = Utc::now();
        let mandate = PaymentMandate {
            id: Uuid::new_v4().to_string(),
            kind,
            status: MandateStatus::Pending,
            amount,
            items,
            recurrence,
            credential: None,
            user_id: None,
            created_at: now,
            updated_at: now,
            expires_at: ttl.map(|t| now + t),
        };

        self.mandates
            .write()
            .await
            .insert(mandate.id.clone(), mandate.clone());

        info!(mandate_id = %mandate.id, kind = ?kind, "Mandate created");
        self.events.publish(
            EventKind::MandateCreated,
            serde_json::json!({"mandateId": mandate.id}),
        );
        mandate
    }

    /// Authorize a pending mandate for a user, attaching a verifiable
    /// credential that binds the mandate id, amount, and permitted actions.
    pub async fn authorize(
        &self,
        mandate_id: &str,
        user_id: &str,
    ) -> Result<PaymentMandate, AgoraError> {
        let mut mandates = self.mandates.write().await;
        let mandate = mandates
            .get_mut(mandate_id)
            .ok_or_else(|| AgoraError::not_found("mandate", mandate_id))?;

        let now = Utc::now();
        if mandate.expired(now) && mandate.status == MandateStatus::Pending {
            mandate.status = MandateStatus::Expired;
            mandate.updated_at = now;
            drop(mandates);
            self.events.publish(
                EventKind::MandateExpired,
                serde_json::json!({"mandateId": mandate_id}),
            );
            return Err(AgoraError::StateConflict(format!(
                "mandate {} has expired",
                mandate_id
            )));
        }
        if mandate.status != MandateStatus::Pending {
            return Err(AgoraError::StateConflict(format!(
                "mandate {} cannot be authorized from {:?}",
                mandate_id, mandate.status
            )));
        }

        let amount = mandate.amount.clone().ok_or_else(|| {
            AgoraError::Validation("mandate has no amount to authorize".into())
        })?;
        let claim = CredentialClaim {
            mandate_id: mandate_id.to_string(),
            amount,
            actions: vec![ACTION_PAYMENT_EXECUTE.to_string()],
        };
        let claim_bytes =
            serde_json::to_vec(&claim).map_err(|e| AgoraError::Signing(e.to_string()))?;
        let signature = self
            .signer
            .sign(&claim_bytes)
            .await
            .map_err(|e| AgoraError::Signing(e.to_string()))?;

        mandate.credential = Some(VerifiableCredential {
            issuer: self.issuer.clone(),
            issued_at: now,
            claim,
            signature: hex::encode(signature),
        });
        mandate.status = MandateStatus::Authorized;
        mandate.user_id = Some(user_id.to_string());
        mandate.updated_at = now;
        let authorized = mandate.clone();
        drop(mandates);

        info!(mandate_id = %mandate_id, user_id = %user_id, "Mandate authorized");
        self.events.publish(
            EventKind::MandateAuthorized,
            serde_json::json!({"mandateId": mandate_id, "userId": user_id}),
        );
        Ok(authorized)
    }

    /// Cancel a mandate. Legal from any state except `executed`.
    pub async fn cancel(&self, mandate_id: &str) -> Result<(), AgoraError> {
        let mut mandates = self.mandates.write().await;
        let mandate = mandates
            .get_mut(mandate_id)
            .ok_or_else(|| AgoraError::not_found("mandate", mandate_id))?;

        if mandate.status == MandateStatus::Executed {
            return Err(AgoraError::StateConflict(format!(
                "mandate {} is already executed",
                mandate_id
            )));
        }

        mandate.status = MandateStatus::Cancelled;
        mandate.updated_at = Utc::now();
        drop(mandates);

        info!(mandate_id = %mandate_id, "Mandate cancelled");
        self.events.publish(
            EventKind::MandateCancelled,
            serde_json::json!({"mandateId": mandate_id}),
        );
        Ok(())
    }

    /// Mark an authorized mandate executed. Terminal and irreversible;
    /// called by the transaction manager once settlement is certified.
    pub async fn execute(&self, mandate_id: &str) -> Result<(), AgoraError> {
        let mut mandates = self.mandates.write().await;
        let mandate = mandates
            .get_mut(mandate_id)
            .ok_or_else(|| AgoraError::not_found("mandate", mandate_id))?;

        if mandate.status != MandateStatus::Authorized {
            return Err(AgoraError::StateConflict(format!(
                "mandate {} cannot be executed from {:?}",
                mandate_id, mandate.status
            )));
        }

        mandate.status = MandateStatus::Executed;
        mandate.updated_at = Utc::now();
        drop(mandates);

        info!(mandate_id = %mandate_id, "Mandate executed");
        self.events.publish(
            EventKind::MandateExecuted,
            serde_json::json!({"mandateId": mandate_id}),
        );
        Ok(())
    }

    /// Check whether a mandate authorizes spending `requested`.
    ///
    /// Never errors: every failure mode answers false. An expired mandate
    /// is flipped to `expired` as a side effect.
    pub async fn verify(&self, mandate_id: &str, requested: &Amount) -> bool {
        let mut mandates = self.mandates.write().await;
        let Some(mandate) = mandates.get_mut(mandate_id) else {
            debug!(mandate_id = %mandate_id, "Verify: mandate not found");
            return false;
        };

        let now = Utc::now();
        if mandate.expired(now) && !mandate.status.is_terminal() {
            warn!(mandate_id = %mandate_id, "Verify: mandate expired");
            mandate.status = MandateStatus::Expired;
            mandate.updated_at = now;
            drop(mandates);
            self.events.publish(
                EventKind::MandateExpired,
                serde_json::json!({"mandateId": mandate_id}),
            );
            return false;
        }

        if mandate.status != MandateStatus::Authorized {
            debug!(mandate_id = %mandate_id, status = ?mandate.status, "Verify: not authorized");
            return false;
        }

        let Some(amount) = &mandate.amount else {
            return false;
        };
        if amount.currency != requested.currency {
            debug!(mandate_id = %mandate_id, "Verify: currency mismatch");
            return false;
        }
        if requested.value_minor > amount.ceiling() {
            debug!(
                mandate_id = %mandate_id,
                requested = requested.value_minor,
                ceiling = amount.ceiling(),
                "Verify: amount above ceiling"
            );
            return false;
        }

        true
    }

    /// Flip every pending mandate past its expiry to `expired`.
    /// Returns the count changed. Runs on a periodic timer; safe to race
    /// with `authorize`/`verify` (last write wins).
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired = Vec::new();
        {
            let mut mandates = self.mandates.write().await;
            for mandate in mandates.values_mut() {
                if mandate.status == MandateStatus::Pending && mandate.expired(now) {
                    mandate.status = MandateStatus::Expired;
                    mandate.updated_at = now;
                    expired.push(mandate.id.clone());
                }
            }
        }
        for id in &expired {
            self.events.publish(
                EventKind::MandateExpired,
                serde_json::json!({"mandateId": id}),
            );
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expiry sweep flipped pending mandates");
        }
        expired.len()
    }

    pub async fn get(&self, mandate_id: &str) -> Option<PaymentMandate> {
        self.mandates.read().await.get(mandate_id).cloned()
    }

    pub async fn list(&self) -> Vec<PaymentMandate> {
        self.mandates.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::KeyedHashSigner;

    fn manager() -> MandateManager {
        MandateManager::new(
            Arc::new(KeyedHashSigner::new(b"test-key".to_vec())),
            "agora-test",
            EventBus::new(),
        )
    }

    fn item(id: &str, quantity: u32, unit_minor: u64, currency: &str) -> CartItem {
        CartItem {
            id: id.to_string(),
            name: id.to_string(),
            quantity,
            unit_price_minor: unit_minor,
            total_minor: unit_minor * quantity as u64,
            currency: currency.to_string(),
        }
    }

    #[tokio::test]
    async fn test_cart_total_equals_item_sum() {
        let mgr = manager();
        // $30 + $70 in cents.
        let mandate = mgr
            .create_cart(
                vec![item("a", 1, 3_000, "USD"), item("b", 1, 7_000, "USD")],
                Duration::minutes(5),
            )
            .await
            .unwrap();

        assert_eq!(mandate.amount.as_ref().unwrap().value_minor, 10_000);
        assert_eq!(mandate.status, MandateStatus::Pending);
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let err = manager().create_cart(Vec::new(), Duration::minutes(5)).await;
        assert!(matches!(err, Err(AgoraError::Validation(_))));
    }

    #[tokio::test]
    async fn test_mixed_currency_cart_rejected() {
        let err = manager()
            .create_cart(
                vec![item("a", 1, 3_000, "USD"), item("b", 1, 7_000, "EUR")],
                Duration::minutes(5),
            )
            .await;
        assert!(matches!(err, Err(AgoraError::Validation(_))));
    }

    #[tokio::test]
    async fn test_authorize_attaches_credential() {
        let mgr = manager();
        let mandate = mgr
            .create_intent(Amount::new(10_000, "USD"), Duration::minutes(5))
            .await
            .unwrap();

        let authorized = mgr.authorize(&mandate.id, "user-1").await.unwrap();
        assert_eq!(authorized.status, MandateStatus::Authorized);

        let credential = authorized.credential.unwrap();
        assert_eq!(credential.issuer, "agora-test");
        assert_eq!(credential.claim.mandate_id, mandate.id);
        assert_eq!(
            credential.claim.actions,
            vec![ACTION_PAYMENT_EXECUTE.to_string()]
        );
        assert!(!credential.signature.is_empty());
    }

    #[tokio::test]
    async fn test_authorize_expired_mandate_flips_status() {
        let mgr = manager();
        let mandate = mgr
            .create_intent(Amount::new(10_000, "USD"), Duration::milliseconds(1))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let err = mgr.authorize(&mandate.id, "user-1").await;
        assert!(matches!(err, Err(AgoraError::StateConflict(_))));
        assert_eq!(
            mgr.get(&mandate.id).await.unwrap().status,
            MandateStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_authorize_twice_rejected() {
        let mgr = manager();
        let mandate = mgr
            .create_intent(Amount::new(10_000, "USD"), Duration::minutes(5))
            .await
            .unwrap();
        mgr.authorize(&mandate.id, "user-1").await.unwrap();

        let err = mgr.authorize(&mandate.id, "user-1").await;
        assert!(matches!(err, Err(AgoraError::StateConflict(_))));
    }

    #[tokio::test]
    async fn test_cancel_executed_mandate_rejected() {
        let mgr = manager();
        let mandate = mgr
            .create_intent(Amount::new(10_000, "USD"), Duration::minutes(5))
            .await
            .unwrap();
        mgr.authorize(&mandate.id, "user-1").await.unwrap();
        mgr.execute(&mandate.id).await.unwrap();

        let err = mgr.cancel(&mandate.id).await;
        assert!(matches!(err, Err(AgoraError::StateConflict(_))));
        assert_eq!(
            mgr.get(&mandate.id).await.unwrap().status,
            MandateStatus::Executed
        );
    }

    #[tokio::test]
    async fn test_cancel_from_pending_and_authorized() {
        let mgr = manager();
        let pending = mgr
            .create_intent(Amount::new(100, "USD"), Duration::minutes(5))
            .await
            .unwrap();
        mgr.cancel(&pending.id).await.unwrap();
        assert_eq!(
            mgr.get(&pending.id).await.unwrap().status,
            MandateStatus::Cancelled
        );

        let authorized = mgr
            .create_intent(Amount::new(100, "USD"), Duration::minutes(5))
            .await
            .unwrap();
        mgr.authorize(&authorized.id, "user-1").await.unwrap();
        mgr.cancel(&authorized.id).await.unwrap();
        assert_eq!(
            mgr.get(&authorized.id).await.unwrap().status,
            MandateStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_execute_requires_authorized() {
        let mgr = manager();
        let mandate = mgr
            .create_intent(Amount::new(100, "USD"), Duration::minutes(5))
            .await
            .unwrap();
        assert!(mgr.execute(&mandate.id).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_truth_table() {
        let mgr = manager();

        // Absent mandate.
        assert!(!mgr.verify("missing", &Amount::new(100, "USD")).await);

        // Pending (not authorized).
        let pending = mgr
            .create_intent(Amount::new(10_000, "USD"), Duration::minutes(5))
            .await
            .unwrap();
        assert!(!mgr.verify(&pending.id, &Amount::new(100, "USD")).await);

        // Authorized, within ceiling.
        let ok = mgr
            .create_intent(Amount::new(10_000, "USD"), Duration::minutes(5))
            .await
            .unwrap();
        mgr.authorize(&ok.id, "user-1").await.unwrap();
        assert!(mgr.verify(&ok.id, &Amount::new(10_000, "USD")).await);
        assert!(mgr.verify(&ok.id, &Amount::new(5_000, "USD")).await);

        // Currency mismatch.
        assert!(!mgr.verify(&ok.id, &Amount::new(5_000, "EUR")).await);

        // Above the exact-amount ceiling.
        assert!(!mgr.verify(&ok.id, &Amount::new(10_001, "USD")).await);

        // Explicit max ceiling: $50 ceiling vs $75 request.
        let capped = mgr
            .create_intent(
                Amount::new(5_000, "USD").with_ceiling(5_000),
                Duration::minutes(5),
            )
            .await
            .unwrap();
        mgr.authorize(&capped.id, "user-1").await.unwrap();
        assert!(!mgr.verify(&capped.id, &Amount::new(7_500, "USD")).await);
    }

    #[tokio::test]
    async fn test_verify_expired_flips_status() {
        let mgr = manager();
        let mandate = mgr
            .create_intent(Amount::new(100, "USD"), Duration::milliseconds(1))
            .await
            .unwrap();
        mgr.authorize(&mandate.id, "user-1").await.ok();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert!(!mgr.verify(&mandate.id, &Amount::new(100, "USD")).await);
        assert_eq!(
            mgr.get(&mandate.id).await.unwrap().status,
            MandateStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let mgr = manager();
        let short = mgr
            .create_intent(Amount::new(100, "USD"), Duration::milliseconds(1))
            .await
            .unwrap();
        let long = mgr
            .create_intent(Amount::new(100, "USD"), Duration::minutes(5))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(mgr.sweep_expired().await, 1);
        assert_eq!(mgr.get(&short.id).await.unwrap().status, MandateStatus::Expired);
        assert_eq!(mgr.get(&long.id).await.unwrap().status, MandateStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_races_authorize_last_write_wins() {
        // The sweep and authorize may race on a mandate right at its
        // expiry boundary; whichever writes last wins and the result is
        // one of the two legal outcomes, never a corrupted third state.
        let mgr = Arc::new(manager());
        let mandate = mgr
            .create_intent(Amount::new(100, "USD"), Duration::milliseconds(2))
            .await
            .unwrap();

        let sweeper = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move {
                for _ in 0..20 {
                    mgr.sweep_expired().await;
                    tokio::time::sleep(std::time::Duration::from_micros(200)).await;
                }
            })
        };
        let authorizer = {
            let mgr = Arc::clone(&mgr);
            let id = mandate.id.clone();
            tokio::spawn(async move { mgr.authorize(&id, "user-1").await })
        };

        sweeper.await.unwrap();
        let _ = authorizer.await.unwrap();

        let status = mgr.get(&mandate.id).await.unwrap().status;
        assert!(
            status == MandateStatus::Expired || status == MandateStatus::Authorized,
            "unexpected status after race: {:?}",
            status
        );
    }

    mod transition_properties {
        use super::*;
        use proptest::prelude::*;

        /// Legal status edges: the only paths a mandate may take.
        fn legal(from: MandateStatus, to: MandateStatus) -> bool {
            use MandateStatus::*;
            if from == to {
                return true;
            }
            matches!(
                (from, to),
                (Pending, Authorized)
                    | (Pending, Cancelled)
                    | (Pending, Expired)
                    | (Authorized, Executed)
                    | (Authorized, Cancelled)
                    | (Authorized, Expired)
            )
        }

        proptest! {
            /// Random operation sequences never produce an illegal status
            /// transition.
            #[test]
            fn prop_status_path_is_monotone(ops in proptest::collection::vec(0..4u8, 1..24)) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                rt.block_on(async move {
                    let mgr = manager();
                    let mandate = mgr
                        .create_intent(Amount::new(10_000, "USD"), Duration::minutes(5))
                        .await
                        .unwrap();

                    let mut previous = mandate.status;
                    for op in ops {
                        match op {
                            0 => { let _ = mgr.authorize(&mandate.id, "user-1").await; }
                            1 => { let _ = mgr.cancel(&mandate.id).await; }
                            2 => { let _ = mgr.execute(&mandate.id).await; }
                            _ => { let _ = mgr.verify(&mandate.id, &Amount::new(100, "USD")).await; }
                        }
                        let current = mgr.get(&mandate.id).await.unwrap().status;
                        prop_assert!(
                            legal(previous, current),
                            "illegal transition {:?} -> {:?}",
                            previous,
                            current
                        );
                        previous = current;
                    }
                    Ok(())
                })?;
            }
        }
    }

    #[tokio::test]
    async fn test_recurring_mandate_creation() {
        let mgr = manager();
        let mandate = mgr
            .create_recurring(
                Amount::new(999, "USD"),
                RecurrenceRule {
                    frequency: crate::types::RecurrenceFrequency::Monthly,
                    interval: 1,
                    start: Utc::now(),
                    end: None,
                    max_occurrences: Some(12),
                },
            )
            .await
            .unwrap();
        assert_eq!(mandate.kind, MandateKind::Recurring);
        assert!(mandate.expires_at.is_none());
    }
}
