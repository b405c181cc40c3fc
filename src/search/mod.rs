//! Search backend contract: index lifecycle, alias management, bulk writes
//! and reads, all signed with SigV4 and grounded on the same request shapes
//! the upstream Elasticsearch client used.

pub mod gateway;
pub mod index_name;

pub use gateway::{SearchError, SearchGateway};
