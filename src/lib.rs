//! Daily synchronization of the INSEE death registry into a Supabase table.

pub mod config;
pub mod fetch;
pub mod process;
pub mod record;
pub mod schedule;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use record::DecesRecord;
pub use sync::{SyncReport, Synchronizer};
