//! Realtime transport: per-connection sessions, local registry, the cluster
//! bus and the typed wire protocol.

pub mod broker;
pub mod hub;
pub mod messenger;
pub mod protocol;
pub mod router;
pub mod session;
