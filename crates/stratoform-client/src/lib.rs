//! Stratoform service clients
//!
//! On-demand, memoized construction of per-service API clients bound to a
//! region and credentials, plus the error-envelope decoder that turns every
//! remote failure into exactly one [`ErrorKind`](stratoform_core::ErrorKind).
//!
//! Handlers never talk to `reqwest` directly; they go through [`ApiClient`]
//! obtained from a [`ClientFactory`] scoped to one operation.

pub mod classify;
pub mod client;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod retry;

// Re-exports
pub use classify::classify_status;
pub use client::ApiClient;
pub use credentials::Credentials;
pub use endpoint::EndpointResolver;
pub use error::{ApiError, ClientError, Result};
pub use factory::{ClientFactory, ClientKey};
pub use retry::{with_retry, RetryPolicy};
