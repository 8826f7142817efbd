pub mod criteria;
pub mod directory;
pub mod matches;
pub mod migrations;
pub mod pool;
pub mod skill_scores;
pub mod store;
pub mod util;

pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_from_url_checked};
pub use store::PgMatchingStore;
