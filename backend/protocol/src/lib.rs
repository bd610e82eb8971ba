//! JSON-RPC 2.0 envelope and method dispatch for the A2A protocol.
//!
//! The dispatcher is stateless; all state lives in the components it
//! delegates to (registry, matcher, task executor, payment managers).

pub mod dispatcher;
pub mod envelope;

pub use dispatcher::{Dispatcher, NegotiationRequest, NegotiationResponse, NegotiationTerms};
pub use envelope::{error_codes, RpcError, RpcRequest, RpcResponse};
