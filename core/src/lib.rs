//! Offline-first data layer for the coach health tracker.
//!
//! Entries are written locally first and pushed to the remote service in the
//! background; the daily aggregate is fetched from the remote and cached.
//! [`session::Session`] ties the pieces together.

pub mod cache;
pub mod gateway;
pub mod models;
pub mod refresh;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod sync;
pub mod wire;

#[cfg(test)]
mod testing;

pub use gateway::{GatewayError, RemoteGateway};
pub use session::{Added, Session, SessionOptions, SessionStatus};
