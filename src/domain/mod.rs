mod account;
mod entry;
mod ledger;
mod money;

pub use account::*;
pub use entry::*;
pub use ledger::*;
pub use money::*;
