//! Port definitions for the collaborators the ledger core calls out to.
//!
//! The engine depends only on these traits; concrete implementations live in
//! `adapters` or are supplied by the embedding process.

mod credentials;
mod notifier;

pub use credentials::CredentialHasher;
pub use notifier::{DeliveryError, OverdraftNotice, OverdraftNotifier};
