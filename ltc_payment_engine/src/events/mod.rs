//! Payment events and the hooks that subscribe to them.
//!
//! Events are only ever published after the ledger transaction that produced them has committed. Publication is
//! best-effort: a full or closed channel is logged, and never undoes the credit.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
