//! Agent card registry and capability matcher.
//!
//! The registry is the authoritative in-memory index of agent cards; the
//! matcher layers AND-semantics discovery filters on top of it. Persistence
//! is delegated to a caller-supplied [`CardStore`].

pub mod matcher;
pub mod registry;
pub mod store;

pub use matcher::{CapabilityMatcher, DiscoveryFilter};
pub use registry::AgentRegistry;
pub use store::CardStore;
