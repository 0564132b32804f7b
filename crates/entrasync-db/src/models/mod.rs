//! Row types and the SQL that reads and writes them.
//!
//! Each model maps one table. Query functions return raw `sqlx::Error`s;
//! the backends in this crate classify them into domain errors.

pub mod local_account;
pub mod review_entry;
pub mod work_item;

pub use local_account::LocalAccountRow;
pub use review_entry::ReviewEntryRow;
pub use work_item::WorkItemRow;
