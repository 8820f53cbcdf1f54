//! Adapters - concrete implementations of the collaborator ports

mod password;
mod log_notifier;

pub use password::Argon2Hasher;
pub use log_notifier::LogNotifier;
