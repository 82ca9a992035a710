//! Live chat relay: a hub coordinating per-connection sessions.

pub mod frame;
pub mod hub;
pub mod session;

pub use hub::{EvictReason, Hub, HubConfig, HubError};
pub use session::{ChatIdentity, SessionHandle, SessionId};
