//! Wallet Pass Update Core Library
//!
//! This library provides the server-side state behind the Apple Wallet
//! web service protocol: pass and registration storage, signing identity
//! rotation, silent-push fan-out, and the drip-campaign scheduler.
//!
//! The HTTP protocol surface lives in the `passkit-server` crate; the two
//! external collaborators (pass serialization, raw push transport) are
//! trait seams defined here and implemented at the server boundary.

pub mod credentials;
pub mod notifier;
pub mod push;
pub mod scheduler;
pub mod serializer;
pub mod store;

pub use credentials::CredentialPool;
pub use notifier::{NotifySummary, UpdateNotifier};
pub use push::{PushEnvironment, PushError, PushGateway, PushOutcome};
pub use scheduler::{DripScheduler, SchedulerReport};
pub use serializer::{PassSerializer, SerializeError};
pub use store::models::{
    Device, EnrollmentStatus, IdentityStatus, Pass, Sequence, SequenceEnrollment, SequenceStep,
    SigningIdentity,
};
pub use store::sequences::StepAdvance;
pub use store::{Store, StoreError};

/// Result type for storage-backed operations.
pub type Result<T> = std::result::Result<T, StoreError>;
