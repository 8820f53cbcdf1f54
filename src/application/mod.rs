// Application layer - use cases and orchestration.
// The ledger service composes the account store, the ledger and the
// collaborator ports into the operations a front end calls.

mod credentials;
pub mod error;
mod retry;
mod service;

pub use credentials::CredentialGate;
pub use error::*;
pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, RetryPolicy};
pub use service::*;
