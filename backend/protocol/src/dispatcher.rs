//! Method dispatch for inbound protocol envelopes.
//!
//! Routes by method name: `discovery`, `negotiate`, `task.submit`,
//! `task.status`, `task.cancel`, `payment.execute`, `payment.refund`,
//! `agent.card`. Anything else answers method-not-found.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use agora_core::{AgentCard, AgoraError, TaskRequest};
use agora_payments::{error_codes as payment_errors, Amount, PaymentRequest, TransactionManager};
use agora_registry::{CapabilityMatcher, DiscoveryFilter};
use agora_tasks::TaskExecutor;

use crate::envelope::{error_codes, RpcRequest, RpcResponse};

/// Terms offered with an accepted negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationTerms {
    pub latency_ms: u64,
    pub cost_minor: u64,
    /// Advertised quality score in [0, 1].
    pub quality: f64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationRequest {
    pub capability: String,
    #[serde(default)]
    pub requirements: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<NegotiationTerms>,
}

#[derive(Debug, Deserialize)]
struct TaskIdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentParams {
    mandate_id: String,
    amount: Amount,
    description: Option<String>,
    from_account: String,
    to_account: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundParams {
    transaction_id: String,
    amount: Option<Amount>,
}

/// How long negotiated terms stay valid.
const TERMS_TTL_MINUTES: i64 = 10;

/// Stateless protocol dispatcher. All state lives in the delegated
/// components, passed in as explicit instances at construction.
pub struct Dispatcher {
    matcher: Arc<CapabilityMatcher>,
    tasks: Arc<TaskExecutor>,
    transactions: Arc<TransactionManager>,
    self_card: AgentCard,
}

impl Dispatcher {
    pub fn new(
        matcher: Arc<CapabilityMatcher>,
        tasks: Arc<TaskExecutor>,
        transactions: Arc<TransactionManager>,
        self_card: AgentCard,
    ) -> Self {
        Self {
            matcher,
            tasks,
            transactions,
            self_card,
        }
    }

    pub fn self_card(&self) -> &AgentCard {
        &self.self_card
    }

    /// Dispatch one envelope. Notifications (no id) run the handler and
    /// return `None`; every request with an id gets exactly one response.
    pub async fn dispatch(&self, request: RpcRequest) -> Option<RpcResponse> {
        let id = request.id.clone();
        debug!(method = %request.method, notification = request.is_notification(), "Dispatching");

        let response = self.route(&request).await;
        match id {
            Some(id) => Some(response.unwrap_or_else(|| {
                RpcResponse::error(
                    id.clone(),
                    error_codes::INTERNAL_ERROR,
                    "handler produced no response",
                )
            })),
            None => None,
        }
    }

    async fn route(&self, request: &RpcRequest) -> Option<RpcResponse> {
        let id = request.id.clone().unwrap_or(serde_json::Value::Null);
        let params = request.params.clone();

        let response = match request.method.as_str() {
            "discovery" => self.handle_discovery(id, params).await,
            "negotiate" => self.handle_negotiate(id, params).await,
            "task.submit" => self.handle_task_submit(id, params).await,
            "task.status" => self.handle_task_status(id, params).await,
            "task.cancel" => self.handle_task_cancel(id, params).await,
            "payment.execute" => self.handle_payment_execute(id, params).await,
            "payment.refund" => self.handle_payment_refund(id, params).await,
            "agent.card" => RpcResponse::success(
                id,
                serde_json::to_value(&self.self_card).unwrap_or_default(),
            ),
            other => RpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    async fn handle_discovery(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
    ) -> RpcResponse {
        let filter: DiscoveryFilter = match serde_json::from_value(params) {
            Ok(f) => f,
            Err(e) => return invalid_params(id, e),
        };
        let cards = self.matcher.find(&filter).await;
        RpcResponse::success(id, serde_json::to_value(cards).unwrap_or_default())
    }

    /// Accept a negotiation only when this agent actually holds the
    /// requested capability; otherwise reject with a reason.
    async fn handle_negotiate(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
    ) -> RpcResponse {
        let req: NegotiationRequest = match serde_json::from_value(params) {
            Ok(r) => r,
            Err(e) => return invalid_params(id, e),
        };

        let response = match self.self_card.capability(&req.capability) {
            Some(capability) => {
                let paid = capability.requires_payment();
                NegotiationResponse {
                    accepted: true,
                    reason: None,
                    terms: Some(NegotiationTerms {
                        latency_ms: 1_000,
                        cost_minor: if paid { 100 } else { 0 },
                        quality: 0.95,
                        expires_at: Utc::now() + Duration::minutes(TERMS_TTL_MINUTES),
                    }),
                }
            }
            None => NegotiationResponse {
                accepted: false,
                reason: Some("capability not available".to_string()),
                terms: None,
            },
        };

        RpcResponse::success(id, serde_json::to_value(response).unwrap_or_default())
    }

    async fn handle_task_submit(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
    ) -> RpcResponse {
        let request: TaskRequest = match serde_json::from_value(params) {
            Ok(r) => r,
            Err(e) => return invalid_params(id, e),
        };

        match self.tasks.submit(request).await {
            Ok(task_id) => RpcResponse::success(id, serde_json::json!({ "taskId": task_id })),
            Err(e) => agora_error(id, e),
        }
    }

    async fn handle_task_status(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
    ) -> RpcResponse {
        let p: TaskIdParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return invalid_params(id, e),
        };

        match self.tasks.get(&p.id).await {
            Some(record) => {
                RpcResponse::success(id, serde_json::to_value(record).unwrap_or_default())
            }
            None => RpcResponse::error(
                id,
                error_codes::TASK_NOT_FOUND,
                format!("task not found: {}", p.id),
            ),
        }
    }

    /// Idempotent: cancelling an already-terminal task answers
    /// `cancelled: false`, not an error.
    async fn handle_task_cancel(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
    ) -> RpcResponse {
        let p: TaskIdParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return invalid_params(id, e),
        };
        let cancelled = self.tasks.cancel(&p.id).await;
        RpcResponse::success(id, serde_json::json!({ "cancelled": cancelled }))
    }

    async fn handle_payment_execute(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
    ) -> RpcResponse {
        let p: PaymentParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return invalid_params(id, e),
        };

        let outcome = self
            .transactions
            .execute_payment(
                PaymentRequest {
                    mandate_id: p.mandate_id,
                    amount: p.amount,
                    description: p.description,
                },
                &p.from_account,
                &p.to_account,
            )
            .await;

        if outcome.success {
            return RpcResponse::success(id, serde_json::to_value(outcome).unwrap_or_default());
        }

        let code = match outcome.error_code.as_deref() {
            Some(payment_errors::INVALID_MANDATE) => error_codes::INVALID_MANDATE,
            _ => error_codes::INTERNAL_ERROR,
        };
        let message = outcome
            .error
            .clone()
            .unwrap_or_else(|| "payment failed".to_string());
        RpcResponse::error_with_data(
            id,
            code,
            message,
            serde_json::to_value(outcome).ok(),
        )
    }

    async fn handle_payment_refund(
        &self,
        id: serde_json::Value,
        params: serde_json::Value,
    ) -> RpcResponse {
        let p: RefundParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return invalid_params(id, e),
        };

        match self.transactions.refund(&p.transaction_id, p.amount).await {
            Ok(tx) => RpcResponse::success(id, serde_json::to_value(tx).unwrap_or_default()),
            Err(e) => agora_error(id, e),
        }
    }
}

fn invalid_params(id: serde_json::Value, e: serde_json::Error) -> RpcResponse {
    RpcResponse::error(
        id,
        error_codes::INVALID_PARAMS,
        format!("Invalid params: {}", e),
    )
}

fn agora_error(id: serde_json::Value, e: AgoraError) -> RpcResponse {
    let code = match &e {
        AgoraError::NotFound { .. } => error_codes::TASK_NOT_FOUND,
        AgoraError::Validation(_) => error_codes::INVALID_PARAMS,
        _ => error_codes::INTERNAL_ERROR,
    };
    RpcResponse::error(id, code, e.to_string())
}
