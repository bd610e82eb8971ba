//! HTTP gateway for an Agora node.
//!
//! Exposes the JSON-RPC dispatch plane plus the A2A agent-card discovery
//! endpoint. The transport is deliberately thin; all protocol behavior
//! lives in `agora-protocol` and the managers behind it.

pub mod server;

pub use server::{build_router, start_server, GatewayState};
