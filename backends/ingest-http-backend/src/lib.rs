/*!
A [`Backend`](cur_ingest::Backend) for warehouses fronted by a
ClickHouse-style HTTP SQL interface: queries are plain `POST`s to a base
URL, and bulk loads go straight from object storage into the warehouse
via its own `s3()`/`azureBlobStorage()` table functions rather than
through this process. `supports_native_object_store()` is `true`.
*/

pub mod backend;
pub mod client;
pub mod error;
pub mod schema;
pub mod state_store;
pub mod writer;

pub use backend::HttpBackend;
pub use error::Error;
