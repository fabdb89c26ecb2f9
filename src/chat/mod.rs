//! Chat core: delivery states, the presence heuristic, read syncs, the
//! dispatcher inbox and the service that sequences them.

pub mod delivery;
pub mod presence;
pub mod read_sync;
pub mod service;
pub mod threads;

#[cfg(test)]
pub mod testing;

pub use presence::PresenceEstimator;
pub use service::{ChatService, ChatSettings, Collaborators, OrderMessages, ReadSide, authenticate};
pub use threads::ThreadAggregator;
