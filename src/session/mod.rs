//! Session management: the serialized operation chain, per-load scope and
//! the reload/theme lifecycle

mod chain;
mod manager;
mod scope;

pub use chain::{Completion, OperationChain, SessionSlot};
pub use manager::{ContentReady, ListenerId, SessionManager, ThemeSource};
pub use scope::{ScopeCell, SessionScope};
