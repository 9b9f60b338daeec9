// serena-sqlx: SQLx subscription store.
//
// One `sqlx::AnyPool` serves SQLite and Postgres. Dates and timestamps are
// stored as text so every statement runs unchanged on both.

pub mod migration;
pub mod query;
pub mod store;

pub use migration::{run_migrations, DatabaseKind};
pub use store::SqlxStore;
