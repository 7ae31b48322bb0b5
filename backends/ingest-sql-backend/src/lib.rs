/*!
A [`Backend`](cur_ingest::Backend) over `sqlx::AnyPool`, speaking either
Postgres or SQLite through one dialect-aware code path. Every table
column is `TEXT`; see [`schema`] for why.
*/

pub mod backend;
pub mod dialect;
pub mod error;
pub mod pool;
pub mod schema;
pub mod state_store;
pub mod writer;

pub use backend::SqlBackend;
pub use dialect::Dialect;
pub use error::Error;
