//! Axum routes for the Agora node.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use agora_payments::TransactionManager;
use agora_protocol::{error_codes, Dispatcher, RpcRequest, RpcResponse};

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    pub transactions: Arc<TransactionManager>,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/.well-known/agent-card", get(agent_card_handler))
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/metrics", get(metrics_handler))
        .with_state(state)
}

/// Starts the HTTP server for the node.
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let app = build_router(state).layer(CorsLayer::permissive());
    info!("Agora gateway listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// POST /rpc, the JSON-RPC dispatch plane.
///
/// Body parse failures answer a -32700 envelope; notifications answer
/// 204 with no body.
async fn rpc_handler(State(state): State<GatewayState>, body: String) -> impl IntoResponse {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "Unparseable RPC request");
            let resp = RpcResponse::error(
                serde_json::Value::Null,
                error_codes::PARSE_ERROR,
                format!("Parse error: {}", e),
            );
            return (StatusCode::OK, Json(resp)).into_response();
        }
    };

    match state.dispatcher.dispatch(request).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// GET /.well-known/agent-card, the A2A discovery convention.
async fn agent_card_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.dispatcher.self_card().clone())
}

/// GET /api/metrics, in-process transaction metrics.
async fn metrics_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.transactions.metrics().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_consensus::{ConsensusProposal, ConsensusValidator, SingleRoundStrategy, ValidatorPool};
    use agora_core::{AgentCard, Capability, EventBus};
    use agora_payments::{InstantRail, KeyedHashSigner, MandateManager, Signer};
    use agora_registry::{AgentRegistry, CapabilityMatcher};
    use agora_tasks::TaskExecutor;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;

    struct ApproveAll;

    #[async_trait]
    impl ValidatorPool for ApproveAll {
        async fn vote(&self, _validator: &str, _proposal: &ConsensusProposal) -> bool {
            true
        }
    }

    fn test_state() -> GatewayState {
        let events = EventBus::new();
        let registry = Arc::new(AgentRegistry::new());
        let matcher = Arc::new(CapabilityMatcher::new(Arc::clone(&registry)));
        let tasks = Arc::new(TaskExecutor::new(events.clone()));
        let signer: Arc<dyn Signer> = Arc::new(KeyedHashSigner::new(b"test-key".to_vec()));
        let mandates = Arc::new(MandateManager::new(
            Arc::clone(&signer),
            "agora-test",
            events.clone(),
        ));
        let consensus = Arc::new(ConsensusValidator::new(
            Arc::new(SingleRoundStrategy::new(Arc::new(ApproveAll))),
            vec!["v0".into(), "v1".into(), "v2".into()],
        ));
        let transactions = Arc::new(TransactionManager::new(
            mandates,
            consensus,
            Arc::new(InstantRail),
            signer,
            events,
        ));

        let self_card = AgentCard::new("self", "Agora Node")
            .with_capability(Capability::new("cap-echo", "echo"));

        GatewayState {
            dispatcher: Arc::new(Dispatcher::new(
                matcher,
                tasks,
                Arc::clone(&transactions),
                self_card,
            )),
            transactions,
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rpc_round_trip() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"agent.card","params":{}}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"]["id"], "self");
    }

    #[tokio::test]
    async fn test_rpc_parse_error() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/rpc")
            .body(Body::from("not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_notification_returns_no_content() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/rpc")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","method":"task.submit","params":{"id":"t1","capabilityId":"c","input":{}}}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_well_known_agent_card() {
        let app = build_router(test_state());
        let request = Request::builder()
            .uri("/.well-known/agent-card")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "Agora Node");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = build_router(test_state());
        let request = Request::builder()
            .uri("/api/metrics")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["total"], 0);
    }
}
