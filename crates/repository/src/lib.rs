//! `groundwork-repository` — repository contracts and backends.
//!
//! CRUD and query pass-throughs over a backing store, keyed by
//! [`groundwork_core::Entity`] identity. Two backends: an in-memory
//! concurrent map (tests/dev) and Postgres via sqlx (production).

pub mod repository;

pub use repository::in_memory::InMemoryRepository;
pub use repository::postgres::{PgRepository, PgUnitOfWork, SqlEntity};
pub use repository::query::{NamedQueries, ParamValue, QueryArgs};
pub use repository::r#trait::{QueryExecutor, Repository, RepositoryError, RepositoryResult};
