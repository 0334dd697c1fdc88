//! Wallet web service protocol handlers.

pub mod logs;
pub mod passes;
pub mod registrations;
