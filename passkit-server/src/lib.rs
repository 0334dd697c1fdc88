//! Wallet pass update server: the Apple Wallet web service protocol
//! surface, the APNs push gateway client, the signer sidecar client, and
//! the periodic campaign trigger.

pub mod apns;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod signer;
pub mod tick;
