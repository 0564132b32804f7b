//! # Database Layer
//!
//! `PostgreSQL` backends for entrasync:
//!
//! - [`PgUserStore`]: local accounts, unique by name and by mail
//! - [`PgWorkQueue`]: durable work queue shared by any number of workers
//! - [`PgReviewStore`]: orphaned-account review entries
//! - [`PgRunLock`]: advisory lock keeping reconciliation runs exclusive
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entrasync_db::{run_migrations, DbPool, PgWorkQueue};
//!
//! let pool = DbPool::connect(&database_url).await?;
//! run_migrations(&pool).await?;
//! let queue = PgWorkQueue::new(pool.clone(), QueueConfig::default());
//! ```

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod review_store;
pub mod run_lock;
pub mod user_store;
pub mod work_queue;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
pub use review_store::PgReviewStore;
pub use run_lock::{PgRunLock, RUN_LOCK_KEY};
pub use user_store::PgUserStore;
pub use work_queue::PgWorkQueue;
